//! Age and date filtering of fetched pages

use chrono::{DateTime, Utc};

use crate::prune::options::PruneOptions;
use crate::types::Post;

/// A page split by [`PruneOptions::is_in_scope`], feed order preserved
#[derive(Debug, Clone, Default)]
pub struct Partition {
    pub in_scope: Vec<Post>,
    pub out_of_scope: Vec<Post>,
}

impl Partition {
    /// The page straddles the threshold
    ///
    /// On a newest-first feed this means every later page is entirely in
    /// scope or was already judged, so the driver may stop here.
    pub fn is_mixed(&self) -> bool {
        !self.in_scope.is_empty() && !self.out_of_scope.is_empty()
    }
}

/// Split `posts` into in-scope and out-of-scope, judged at one instant
pub fn partition(posts: &[Post], options: &PruneOptions, now: DateTime<Utc>) -> Partition {
    let (in_scope, out_of_scope) = posts
        .iter()
        .cloned()
        .partition(|post| options.is_in_scope(post, now));

    Partition {
        in_scope,
        out_of_scope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PostKind;
    use chrono::TimeDelta;
    use std::time::Duration;

    fn page(now: DateTime<Utc>, ages: &[i64]) -> Vec<Post> {
        ages.iter()
            .enumerate()
            .map(|(i, days)| {
                Post::new(
                    format!("{}", i + 1),
                    "alice",
                    PostKind::Original,
                    now - TimeDelta::days(*days),
                )
            })
            .collect()
    }

    fn thirty_days() -> PruneOptions {
        PruneOptions::builder()
            .max_age(Duration::from_secs(30 * 86_400))
            .build()
            .unwrap()
    }

    #[test]
    fn test_partition_keeps_feed_order() {
        let now = Utc::now();
        let split = partition(&page(now, &[10, 40, 100]), &thirty_days(), now);

        let in_scope: Vec<_> = split.in_scope.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(in_scope, vec!["2", "3"]);
        assert_eq!(split.out_of_scope.len(), 1);
        assert_eq!(split.out_of_scope[0].id, "1");
        assert!(split.is_mixed());
    }

    #[test]
    fn test_partition_all_in_scope_is_not_mixed() {
        let now = Utc::now();
        let split = partition(&page(now, &[40, 50]), &thirty_days(), now);
        assert_eq!(split.in_scope.len(), 2);
        assert!(!split.is_mixed());
    }

    #[test]
    fn test_partition_none_in_scope() {
        let now = Utc::now();
        let split = partition(&page(now, &[1, 2, 3]), &thirty_days(), now);
        assert!(split.in_scope.is_empty());
        assert!(!split.is_mixed());
    }

    #[test]
    fn test_partition_empty_page() {
        let split = partition(&[], &thirty_days(), Utc::now());
        assert!(split.in_scope.is_empty());
        assert!(split.out_of_scope.is_empty());
    }
}
