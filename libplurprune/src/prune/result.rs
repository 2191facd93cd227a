//! Accumulated outcome of a pruning run

use serde::Serialize;

use crate::types::{ActionKind, Cursor, Post};

/// What happened to one classified post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionOutcome {
    /// Dry run, no call issued
    Planned,
    Succeeded,
    Failed,
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only accumulator of classified posts and call outcomes
///
/// The four post lists hold everything that was classified, whether or not
/// the call was issued or succeeded. The counters only move for successful
/// live calls (and for preservation).
#[derive(Debug, Clone, Default, Serialize)]
pub struct PruneResult {
    pub posts_to_delete: Vec<Post>,
    pub posts_to_unlike: Vec<Post>,
    pub posts_to_unshare: Vec<Post>,
    pub posts_preserved: Vec<Post>,
    pub deleted_count: usize,
    pub unliked_count: usize,
    pub unshared_count: usize,
    pub preserved_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}

impl PruneResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts classified for `action`
    pub fn bucket(&self, action: ActionKind) -> &[Post] {
        match action {
            ActionKind::Delete => &self.posts_to_delete,
            ActionKind::Unlike => &self.posts_to_unlike,
            ActionKind::Unshare => &self.posts_to_unshare,
        }
    }

    fn bucket_mut(&mut self, action: ActionKind) -> &mut Vec<Post> {
        match action {
            ActionKind::Delete => &mut self.posts_to_delete,
            ActionKind::Unlike => &mut self.posts_to_unlike,
            ActionKind::Unshare => &mut self.posts_to_unshare,
        }
    }

    /// Number of successful live calls for `action`
    pub fn succeeded(&self, action: ActionKind) -> usize {
        match action {
            ActionKind::Delete => self.deleted_count,
            ActionKind::Unlike => self.unliked_count,
            ActionKind::Unshare => self.unshared_count,
        }
    }

    pub fn record_planned(&mut self, action: ActionKind, post: Post) {
        self.bucket_mut(action).push(post);
    }

    pub fn record_success(&mut self, action: ActionKind) {
        match action {
            ActionKind::Delete => self.deleted_count += 1,
            ActionKind::Unlike => self.unliked_count += 1,
            ActionKind::Unshare => self.unshared_count += 1,
        }
    }

    pub fn record_failure(&mut self, line: String) {
        self.error_count += 1;
        self.errors.push(line);
    }

    pub fn record_preserved(&mut self, post: Post) {
        self.posts_preserved.push(post);
        self.preserved_count += 1;
    }

    /// Fold one round into the running totals
    pub fn merge(&mut self, round: RoundResult) {
        let other = round.result;
        self.posts_to_delete.extend(other.posts_to_delete);
        self.posts_to_unlike.extend(other.posts_to_unlike);
        self.posts_to_unshare.extend(other.posts_to_unshare);
        self.posts_preserved.extend(other.posts_preserved);
        self.deleted_count += other.deleted_count;
        self.unliked_count += other.unliked_count;
        self.unshared_count += other.unshared_count;
        self.preserved_count += other.preserved_count;
        self.error_count += other.error_count;
        self.errors.extend(other.errors);
    }

    /// Posts that were classified or preserved
    pub fn processed(&self) -> usize {
        self.posts_to_delete.len()
            + self.posts_to_unlike.len()
            + self.posts_to_unshare.len()
            + self.posts_preserved.len()
    }

    pub fn summary(&self) -> PruneSummary {
        PruneSummary {
            to_delete: self.posts_to_delete.len(),
            to_unlike: self.posts_to_unlike.len(),
            to_unshare: self.posts_to_unshare.len(),
            preserved: self.preserved_count,
            deleted: self.deleted_count,
            unliked: self.unliked_count,
            unshared: self.unshared_count,
            errors: self.error_count,
        }
    }
}

/// Counts-only view of a [`PruneResult`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneSummary {
    pub to_delete: usize,
    pub to_unlike: usize,
    pub to_unshare: usize,
    pub preserved: usize,
    pub deleted: usize,
    pub unliked: usize,
    pub unshared: usize,
    pub errors: usize,
}

impl std::fmt::Display for PruneSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "deleted {}/{}, unliked {}/{}, unshared {}/{}, preserved {}, errors {}",
            self.deleted,
            self.to_delete,
            self.unliked,
            self.to_unlike,
            self.unshared,
            self.to_unshare,
            self.preserved,
            self.errors
        )
    }
}

/// Outcome of a single round
#[derive(Debug, Clone, Default)]
pub struct RoundResult {
    /// 1-based round number within the run
    pub round: u32,
    /// Cursor the page was fetched at
    pub cursor: Cursor,
    /// Cursor the page pointed to
    pub next_cursor: Cursor,
    pub fetched: usize,
    pub in_scope: usize,
    /// In-scope records ignored because their switch is off
    pub skipped: usize,
    /// Every executor outcome in call order
    pub actions: Vec<(ActionKind, ActionOutcome)>,
    pub result: PruneResult,
}

impl RoundResult {
    pub fn new(round: u32, cursor: Cursor) -> Self {
        Self {
            round,
            cursor,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostKind;
    use chrono::Utc;

    fn post(id: &str, kind: PostKind) -> Post {
        Post::new(id, "alice", kind, Utc::now())
    }

    #[test]
    fn test_planned_posts_do_not_move_counters() {
        let mut result = PruneResult::new();
        result.record_planned(ActionKind::Unshare, post("1", PostKind::Repost));

        assert_eq!(result.posts_to_unshare.len(), 1);
        assert_eq!(result.unshared_count, 0);
        assert_eq!(result.processed(), 1);
    }

    #[test]
    fn test_failure_appends_error_line() {
        let mut result = PruneResult::new();
        result.record_planned(ActionKind::Delete, post("1", PostKind::Original));
        result.record_failure("delete mastodon:1 failed: 500".to_string());

        assert_eq!(result.error_count, 1);
        assert_eq!(result.errors, vec!["delete mastodon:1 failed: 500"]);
        assert_eq!(result.deleted_count, 0);
    }

    #[test]
    fn test_merge_concatenates_and_adds() {
        let mut total = PruneResult::new();
        total.record_planned(ActionKind::Delete, post("1", PostKind::Original));
        total.record_success(ActionKind::Delete);

        let mut round = RoundResult::new(2, Cursor::from("c1"));
        round.result.record_planned(ActionKind::Delete, post("2", PostKind::Reply));
        round.result.record_success(ActionKind::Delete);
        round.result.record_planned(ActionKind::Unlike, post("3", PostKind::Like));
        round.result.record_failure("unlike x:3 failed: gone".to_string());
        round.result.record_preserved(post("4", PostKind::Original));

        total.merge(round);

        let ids: Vec<_> = total.posts_to_delete.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(total.deleted_count, 2);
        assert_eq!(total.posts_to_unlike.len(), 1);
        assert_eq!(total.unliked_count, 0);
        assert_eq!(total.preserved_count, 1);
        assert_eq!(total.error_count, 1);
        assert_eq!(total.processed(), 4);
    }

    #[test]
    fn test_summary_display() {
        let mut result = PruneResult::new();
        result.record_planned(ActionKind::Delete, post("1", PostKind::Original));
        result.record_planned(ActionKind::Delete, post("2", PostKind::Original));
        result.record_success(ActionKind::Delete);

        let summary = result.summary();
        assert_eq!(summary.to_delete, 2);
        assert_eq!(summary.deleted, 1);
        assert_eq!(
            summary.to_string(),
            "deleted 1/2, unliked 0/0, unshared 0/0, preserved 0, errors 0"
        );
    }

    #[test]
    fn test_bucket_and_succeeded_lookup() {
        let mut result = PruneResult::new();
        result.record_planned(ActionKind::Unlike, post("1", PostKind::Like));
        result.record_success(ActionKind::Unlike);

        assert_eq!(result.bucket(ActionKind::Unlike).len(), 1);
        assert!(result.bucket(ActionKind::Delete).is_empty());
        assert_eq!(result.succeeded(ActionKind::Unlike), 1);
    }
}
