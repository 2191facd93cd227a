//! Core types for Plurprune

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of timeline item
///
/// `Like` and `Repost` entries are the viewer's own reaction records; their
/// identifiers point at the like/repost record, not at the post they target.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Original,
    Repost,
    Reply,
    Like,
    Quote,
}

impl PostKind {
    pub const ALL: [PostKind; 5] = [
        PostKind::Original,
        PostKind::Repost,
        PostKind::Reply,
        PostKind::Like,
        PostKind::Quote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Original => "original",
            Self::Repost => "repost",
            Self::Reply => "reply",
            Self::Like => "like",
            Self::Quote => "quote",
        }
    }
}

impl std::fmt::Display for PostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutating call issued against a platform for one post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Delete,
    Unlike,
    Unshare,
}

impl ActionKind {
    pub const ALL: [ActionKind; 3] = [ActionKind::Delete, ActionKind::Unlike, ActionKind::Unshare];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Unlike => "unlike",
            Self::Unshare => "unshare",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Engagement counters as reported by the platform
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Engagement {
    #[serde(default)]
    pub replies: u64,
    #[serde(default)]
    pub reposts: u64,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub quotes: u64,
}

/// The post a repost, like, or quote refers to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedPost {
    pub id: String,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One timeline item fetched from a platform
///
/// Posts are built fresh for every page and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: String,
    pub author: String,
    #[serde(default)]
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub kind: PostKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<EmbeddedPost>,
    #[serde(default)]
    pub engagement: Engagement,
    #[serde(default)]
    pub liked_by_viewer: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub platform: String,
}

impl Post {
    /// Create a post with default flags and counters
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        kind: PostKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            text: String::new(),
            created_at,
            kind,
            embedded: None,
            engagement: Engagement::default(),
            liked_by_viewer: false,
            pinned: false,
            platform: String::new(),
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }

    pub fn with_embedded(mut self, embedded: EmbeddedPost) -> Self {
        self.embedded = Some(embedded);
        self
    }

    pub fn with_engagement(mut self, engagement: Engagement) -> Self {
        self.engagement = engagement;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    pub fn liked_by_viewer(mut self) -> Self {
        self.liked_by_viewer = true;
        self
    }

    /// Age of the post relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    /// `platform:id` label used in logs and error lines
    pub fn label(&self) -> String {
        format!("{}:{}", self.platform, self.id)
    }
}

/// Opaque pagination token
///
/// Never parsed; only compared with the previous value and checked for emptiness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    /// The cursor for the first page of a feed
    pub fn start() -> Self {
        Self(String::new())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            write!(f, "<start>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for Cursor {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Cursor {
    fn from(value: String) -> Self {
        Self(value)
    }
}
