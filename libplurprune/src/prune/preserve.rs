//! Preservation overrides for in-scope posts

use serde::Serialize;

use crate::prune::options::PruneOptions;
use crate::types::{Post, PostKind};

/// Why an in-scope post is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreservationReason {
    Pinned,
    SelfLiked,
}

impl PreservationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pinned => "pinned",
            Self::SelfLiked => "self-liked",
        }
    }
}

impl std::fmt::Display for PreservationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// First matching preservation rule for `post`, if any
///
/// Pinned is checked first, so a pinned post the viewer also liked is
/// reported as pinned. Self-likes only protect the viewer's own originals.
pub fn evaluate(post: &Post, options: &PruneOptions) -> Option<PreservationReason> {
    if options.preserve_pinned && post.pinned {
        return Some(PreservationReason::Pinned);
    }
    if options.preserve_self_liked && post.liked_by_viewer && post.kind == PostKind::Original {
        return Some(PreservationReason::SelfLiked);
    }
    None
}
