//! Mapping from post kind to the undo call that removes it

use crate::prune::options::PruneOptions;
use crate::types::{ActionKind, Post, PostKind};

/// Action that removes a post of `kind` from the viewer's history
pub fn classify(kind: PostKind) -> ActionKind {
    match kind {
        PostKind::Like => ActionKind::Unlike,
        PostKind::Repost => ActionKind::Unshare,
        PostKind::Original | PostKind::Reply | PostKind::Quote => ActionKind::Delete,
    }
}

/// Whether the policy looks at this kind of record at all
///
/// Like and repost records are only considered when their switch is on;
/// everything else always is.
pub fn is_considered(post: &Post, options: &PruneOptions) -> bool {
    match post.kind {
        PostKind::Like => options.unlike,
        PostKind::Repost => options.unshare,
        PostKind::Original | PostKind::Reply | PostKind::Quote => true,
    }
}
