//! Platform abstraction for post retrieval and mutation
//!
//! Wire-level clients live outside this crate. Each of them implements
//! [`PostSource`], which is the only surface the pruning pipeline talks to.
//!
//! # Examples
//!
//! ```no_run
//! use libplurprune::platforms::{PostSource, archive::ArchiveSource};
//! use libplurprune::types::Cursor;
//!
//! # async fn example() -> libplurprune::error::Result<()> {
//! let source = ArchiveSource::open("archive", "~/exports/mastodon.json")?;
//! let page = source.fetch_page("me", 100, &Cursor::start()).await?;
//! println!("{} posts, next cursor {}", page.posts.len(), page.next_cursor);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ActionKind, Cursor, Post};

pub mod archive;

// Mock source is available for all builds (not just tests) to support integration tests
pub mod mock;

/// One page of a user's history
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Posts in feed order (newest first)
    pub posts: Vec<Post>,
    /// Cursor for the following page; empty at end-of-history
    pub next_cursor: Cursor,
}

impl Page {
    pub fn new(posts: Vec<Post>, next_cursor: impl Into<Cursor>) -> Self {
        Self {
            posts,
            next_cursor: next_cursor.into(),
        }
    }

    /// The final page of a feed
    pub fn last(posts: Vec<Post>) -> Self {
        Self {
            posts,
            next_cursor: Cursor::start(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Source of a user's historical posts on one platform
///
/// Implementations must return pages newest-first and must signal the end of
/// history with an empty `next_cursor` (or by echoing the cursor they were
/// given).
#[async_trait]
pub trait PostSource: Send + Sync {
    /// Fetch one page of at most `page_size` posts starting at `cursor`
    ///
    /// # Errors
    ///
    /// Any error ends the current run with a fetch error. Network,
    /// authentication, and rate-limit problems should map to the matching
    /// `PlatformError` variant.
    async fn fetch_page(&self, user: &str, page_size: usize, cursor: &Cursor) -> Result<Page>;

    /// Perform one mutating call for `post`
    ///
    /// Called at most once per post per run and never retried by the caller.
    async fn execute_action(&self, action: ActionKind, post: &Post) -> Result<()>;

    /// Make completed actions durable
    ///
    /// Called once at the end of every live run. Remote platforms apply
    /// actions immediately and keep the default.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Lowercase platform label (e.g., "mastodon", "bluesky")
    fn platform_name(&self) -> &str;
}
