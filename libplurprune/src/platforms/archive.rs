//! File-backed post source
//!
//! Serves a user's history from a JSON export on disk. The export is either a
//! bare array of posts or an object with a `posts` array. Posts are served
//! newest-first regardless of their order in the file, and the cursor is the
//! position in that ordering.
//!
//! Actions never touch a remote service: they drop the record from the
//! in-memory archive, and [`ArchiveSource::persist`] writes what remains back
//! to disk.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PlatformError, Result};
use crate::platforms::{Page, PostSource};
use crate::types::{ActionKind, Cursor, Post};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ArchiveDocument {
    Bare(Vec<Post>),
    Wrapped { posts: Vec<Post> },
}

#[derive(Debug, Serialize)]
struct ArchiveOutput<'a> {
    posts: Vec<&'a Post>,
}

/// Post source backed by a JSON export
pub struct ArchiveSource {
    name: String,
    path: PathBuf,
    posts: Vec<Post>,
    removed: RwLock<HashSet<String>>,
}

impl ArchiveSource {
    /// Load an archive from disk
    ///
    /// The path is tilde-expanded. Posts without a platform label inherit `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid export.
    pub fn open(name: &str, path: impl AsRef<str>) -> Result<Self> {
        let expanded = shellexpand::tilde(path.as_ref()).to_string();
        let path = PathBuf::from(expanded);

        let content = std::fs::read_to_string(&path).map_err(|e| {
            PlatformError::Fetch(format!("Failed to read archive {}: {}", path.display(), e))
        })?;

        let posts = Self::parse(&content).map_err(|e| {
            PlatformError::Fetch(format!("Failed to parse archive {}: {}", path.display(), e))
        })?;

        info!(platform = %name, path = %path.display(), posts = posts.len(), "Loaded archive");
        Ok(Self::from_posts(name, path, posts))
    }

    /// Build an archive from posts already in memory
    pub fn from_posts(name: &str, path: impl AsRef<Path>, mut posts: Vec<Post>) -> Self {
        for post in &mut posts {
            if post.platform.is_empty() {
                post.platform = name.to_string();
            }
        }
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Self {
            name: name.to_string(),
            path: path.as_ref().to_path_buf(),
            posts,
            removed: RwLock::new(HashSet::new()),
        }
    }

    fn parse(content: &str) -> serde_json::Result<Vec<Post>> {
        let document: ArchiveDocument = serde_json::from_str(content)?;
        Ok(match document {
            ArchiveDocument::Bare(posts) => posts,
            ArchiveDocument::Wrapped { posts } => posts,
        })
    }

    /// Number of posts still in the archive
    pub fn remaining(&self) -> usize {
        let removed = self.removed.read();
        self.posts.iter().filter(|p| !removed.contains(&p.id)).count()
    }

    /// Path the archive was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the remaining posts back to the archive file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist(&self) -> Result<()> {
        let removed = self.removed.read();
        let output = ArchiveOutput {
            posts: self.posts.iter().filter(|p| !removed.contains(&p.id)).collect(),
        };
        let json = serde_json::to_string_pretty(&output).map_err(|e| {
            PlatformError::Action(format!("Failed to serialize archive: {}", e))
        })?;
        std::fs::write(&self.path, json)?;

        info!(
            platform = %self.name,
            path = %self.path.display(),
            removed = removed.len(),
            "Archive written"
        );
        Ok(())
    }

    fn parse_cursor(&self, cursor: &Cursor) -> Result<usize> {
        if cursor.is_empty() {
            return Ok(0);
        }
        cursor.as_str().parse::<usize>().map_err(|_| {
            PlatformError::Fetch(format!("Invalid archive cursor '{}'", cursor)).into()
        })
    }
}

#[async_trait]
impl PostSource for ArchiveSource {
    async fn fetch_page(&self, user: &str, page_size: usize, cursor: &Cursor) -> Result<Page> {
        let start = self.parse_cursor(cursor)?;
        let removed = self.removed.read();

        let mut posts = Vec::new();
        let mut position = start;
        while position < self.posts.len() && posts.len() < page_size {
            let post = &self.posts[position];
            if !removed.contains(&post.id) {
                posts.push(post.clone());
            }
            position += 1;
        }

        let next_cursor = if position < self.posts.len() {
            Cursor::new(position.to_string())
        } else {
            Cursor::start()
        };

        debug!(
            platform = %self.name,
            user = %user,
            cursor = %cursor,
            returned = posts.len(),
            next = %next_cursor,
            "Served archive page"
        );
        Ok(Page { posts, next_cursor })
    }

    async fn execute_action(&self, action: ActionKind, post: &Post) -> Result<()> {
        let mut removed = self.removed.write();
        if !self.posts.iter().any(|p| p.id == post.id) || !removed.insert(post.id.clone()) {
            return Err(PlatformError::Action(format!(
                "{} {}: record not found in archive",
                action,
                post.label()
            ))
            .into());
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.persist()
    }

    fn platform_name(&self) -> &str {
        &self.name
    }
}
