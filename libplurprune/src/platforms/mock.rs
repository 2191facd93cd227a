//! Mock post source for testing
//!
//! This module provides a configurable in-memory source that serves scripted
//! pages and can simulate latency, fetch failures, and per-post action
//! failures. Every call is recorded so tests can assert exactly which remote
//! calls the pipeline issued.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::{Page, PostSource};
use crate::types::{ActionKind, Cursor, Post};

/// Configuration for mock source behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Platform name (e.g., "mock-mastodon")
    pub name: String,

    /// Pages served in feed order; the first page is served at the start cursor
    pub pages: Vec<Page>,

    /// Fail the Nth fetch call (1-based) with this message
    pub fetch_error: Option<(usize, String)>,

    /// Post IDs whose mutating call fails
    pub failing_posts: HashSet<String>,

    /// Delay before completing a fetch (simulates network latency)
    pub delay: Duration,

    /// When set, every fetch waits for a permit from this semaphore
    pub fetch_gate: Option<Arc<Semaphore>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            pages: Vec::new(),
            fetch_error: None,
            failing_posts: HashSet::new(),
            delay: Duration::from_millis(0),
            fetch_gate: None,
        }
    }
}

/// Calls recorded by a [`MockSource`]
#[derive(Debug, Default)]
struct Recorder {
    fetches: Vec<Cursor>,
    actions: Vec<(ActionKind, String)>,
}

/// Mock post source for testing
///
/// Cloning shares the recorded calls, so a test can keep one handle while the
/// pipeline owns another.
#[derive(Clone)]
pub struct MockSource {
    config: Arc<MockConfig>,
    by_cursor: Arc<HashMap<Cursor, Page>>,
    recorder: Arc<Mutex<Recorder>>,
}

impl MockSource {
    /// Create a new mock source with the given configuration
    pub fn new(mut config: MockConfig) -> Self {
        let name = config.name.clone();
        for page in &mut config.pages {
            for post in &mut page.posts {
                if post.platform.is_empty() {
                    post.platform = name.clone();
                }
            }
        }

        let mut by_cursor = HashMap::new();
        let mut cursor = Cursor::start();
        for page in &config.pages {
            if by_cursor.contains_key(&cursor) {
                break;
            }
            by_cursor.insert(cursor.clone(), page.clone());
            cursor = page.next_cursor.clone();
            if cursor.is_empty() {
                break;
            }
        }

        Self {
            config: Arc::new(config),
            by_cursor: Arc::new(by_cursor),
            recorder: Arc::new(Mutex::new(Recorder::default())),
        }
    }

    /// Create a source serving the given pages
    pub fn paged(name: &str, pages: Vec<Page>) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            pages,
            ..Default::default()
        })
    }

    /// Create a source with a single final page
    pub fn single_page(name: &str, posts: Vec<Post>) -> Self {
        Self::paged(name, vec![Page::last(posts)])
    }

    /// Create a source whose Nth fetch fails
    pub fn fetch_failure(name: &str, pages: Vec<Page>, call: usize, error: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            pages,
            fetch_error: Some((call, error.to_string())),
            ..Default::default()
        })
    }

    /// Cursors passed to every fetch, in call order
    pub fn fetch_cursors(&self) -> Vec<Cursor> {
        self.recorder.lock().fetches.clone()
    }

    /// Number of fetch calls
    pub fn fetch_count(&self) -> usize {
        self.recorder.lock().fetches.len()
    }

    /// Mutating calls as `(action, post id)`, in call order
    pub fn actions(&self) -> Vec<(ActionKind, String)> {
        self.recorder.lock().actions.clone()
    }

    /// Number of mutating calls
    pub fn action_count(&self) -> usize {
        self.recorder.lock().actions.len()
    }
}

#[async_trait]
impl PostSource for MockSource {
    async fn fetch_page(&self, _user: &str, page_size: usize, cursor: &Cursor) -> Result<Page> {
        let call = {
            let mut recorder = self.recorder.lock();
            recorder.fetches.push(cursor.clone());
            recorder.fetches.len()
        };

        if let Some(gate) = &self.config.fetch_gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|e| PlatformError::Fetch(format!("Mock fetch gate closed: {}", e)))?;
            permit.forget();
        }

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some((failing_call, message)) = &self.config.fetch_error {
            if *failing_call == call {
                return Err(PlatformError::Fetch(message.clone()).into());
            }
        }

        let mut page = self.by_cursor.get(cursor).cloned().unwrap_or_default();
        page.posts.truncate(page_size);
        Ok(page)
    }

    async fn execute_action(&self, action: ActionKind, post: &Post) -> Result<()> {
        self.recorder.lock().actions.push((action, post.id.clone()));

        if self.config.failing_posts.contains(&post.id) {
            return Err(PlatformError::Action(format!("Mock {} rejected", action)).into());
        }
        Ok(())
    }

    fn platform_name(&self) -> &str {
        &self.config.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostKind;
    use chrono::Utc;

    fn post(id: &str) -> Post {
        Post::new(id, "alice", PostKind::Original, Utc::now())
    }

    #[tokio::test]
    async fn test_mock_serves_pages_by_cursor() {
        let source = MockSource::paged(
            "test",
            vec![
                Page::new(vec![post("1"), post("2")], "c1"),
                Page::last(vec![post("3")]),
            ],
        );

        let first = source.fetch_page("me", 100, &Cursor::start()).await.unwrap();
        assert_eq!(first.posts.len(), 2);
        assert_eq!(first.next_cursor, Cursor::from("c1"));
        assert_eq!(first.posts[0].platform, "test");

        let second = source.fetch_page("me", 100, &Cursor::from("c1")).await.unwrap();
        assert_eq!(second.posts[0].id, "3");
        assert!(second.next_cursor.is_empty());

        assert_eq!(
            source.fetch_cursors(),
            vec![Cursor::start(), Cursor::from("c1")]
        );
    }

    #[tokio::test]
    async fn test_mock_unknown_cursor_is_empty() {
        let source = MockSource::single_page("test", vec![post("1")]);
        let page = source.fetch_page("me", 100, &Cursor::from("nope")).await.unwrap();
        assert!(page.is_empty());
        assert!(page.next_cursor.is_empty());
    }

    #[tokio::test]
    async fn test_mock_repeated_cursor_serves_same_page() {
        let source = MockSource::paged(
            "test",
            vec![
                Page::new(vec![post("1")], "c1"),
                Page::new(vec![post("2")], "c1"),
            ],
        );

        let page = source.fetch_page("me", 100, &Cursor::from("c1")).await.unwrap();
        assert_eq!(page.posts[0].id, "2");
        assert_eq!(page.next_cursor, Cursor::from("c1"));
    }

    #[tokio::test]
    async fn test_mock_fetch_failure_on_nth_call() {
        let source = MockSource::fetch_failure(
            "test",
            vec![Page::new(vec![post("1")], "c1"), Page::last(vec![post("2")])],
            2,
            "502 Bad Gateway",
        );

        assert!(source.fetch_page("me", 100, &Cursor::start()).await.is_ok());
        let err = source
            .fetch_page("me", 100, &Cursor::from("c1"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("502 Bad Gateway"));
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_action_failure_and_recording() {
        let source = MockSource::new(MockConfig {
            name: "test".to_string(),
            failing_posts: ["bad".to_string()].into_iter().collect(),
            ..Default::default()
        });

        assert!(source.execute_action(ActionKind::Delete, &post("ok")).await.is_ok());
        let err = source
            .execute_action(ActionKind::Unlike, &post("bad"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Mock unlike rejected"));

        assert_eq!(
            source.actions(),
            vec![
                (ActionKind::Delete, "ok".to_string()),
                (ActionKind::Unlike, "bad".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_respects_page_size() {
        let source = MockSource::single_page("test", vec![post("1"), post("2"), post("3")]);
        let page = source.fetch_page("me", 2, &Cursor::start()).await.unwrap();
        assert_eq!(page.posts.len(), 2);
    }
}
