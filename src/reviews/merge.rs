// src/reviews/merge.rs
//! Pure merge of a cached review list with a fresh fetch.
//!
//! Policy:
//! - fetched items at or before the cache head's timestamp are already known
//!   and dropped, together with everything after them;
//! - the remaining candidates either replace a cached review with the same id
//!   (an *update*) or are *new*;
//! - the rebuilt cache is `candidates ++ (cache - replaced)`, which keeps the
//!   head the most recent entry.
//!
//! No I/O and no failure mode; a failed fetch never reaches this function.

use std::collections::HashSet;

use super::Review;

/// Result of one merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The rebuilt cache, newest first.
    pub cache: Vec<Review>,
    /// Fresher copies of reviews that were already cached.
    pub updated: Vec<Review>,
    /// Reviews never seen before.
    pub new: Vec<Review>,
}

impl MergeOutcome {
    pub fn changed(&self) -> bool {
        !self.updated.is_empty() || !self.new.is_empty()
    }
}

/// Combine `cache` (newest first) with `fetched` from the review source.
pub fn merge(cache: Vec<Review>, fetched: Vec<Review>, package: &str) -> MergeOutcome {
    if fetched.is_empty() {
        return MergeOutcome {
            cache,
            ..Default::default()
        };
    }

    let mut candidates = newest_first_unique(fetched);

    // 1) Trim already-seen items: keep strictly-before the first item that
    //    is not newer than the cache head.
    if let Some(head) = cache.first().map(|r| r.modified) {
        let boundary = candidates
            .iter()
            .position(|r| r.modified <= head)
            .unwrap_or(candidates.len());
        candidates.truncate(boundary);
    }

    if candidates.is_empty() {
        tracing::trace!(package, "nothing newer than cache head");
        return MergeOutcome {
            cache,
            ..Default::default()
        };
    }

    // 2) Drop cached entries that a candidate supersedes.
    let mut replaced: HashSet<String> = HashSet::new();
    let mut rest = Vec::with_capacity(cache.len());
    {
        let ids: HashSet<&str> = candidates.iter().map(|r| r.id.as_str()).collect();
        for r in cache {
            if ids.contains(r.id.as_str()) {
                replaced.insert(r.id.clone());
            } else {
                rest.push(r);
            }
        }
    }

    let (updated, new): (Vec<Review>, Vec<Review>) = candidates
        .iter()
        .cloned()
        .partition(|r| replaced.contains(&r.id));

    // 3) Rebuild.
    let mut rebuilt = candidates;
    rebuilt.extend(rest);

    tracing::debug!(
        package,
        new = new.len(),
        updated = updated.len(),
        cached = rebuilt.len(),
        "merged fetched reviews"
    );

    MergeOutcome {
        cache: rebuilt,
        updated,
        new,
    }
}

/// Sort newest-first (stable) when the source did not, and keep only the
/// first copy of any id repeated inside one fetch.
fn newest_first_unique(mut fetched: Vec<Review>) -> Vec<Review> {
    let sorted = fetched.windows(2).all(|w| w[0].modified >= w[1].modified);
    if !sorted {
        fetched.sort_by(|a, b| b.modified.cmp(&a.modified));
    }
    let mut seen = HashSet::with_capacity(fetched.len());
    fetched.retain(|r| seen.insert(r.id.clone()));
    fetched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reviews::testing::review;

    const PKG: &str = "com.example.app";

    fn ids(list: &[Review]) -> Vec<&str> {
        list.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn edited_review_moves_to_front_as_update() {
        let cache = vec![review("r1", 100)];
        let mut edited = review("r1", 150);
        edited.text = "edited".into();
        let fetched = vec![review("r2", 200), edited.clone()];

        let out = merge(cache, fetched, PKG);
        assert_eq!(ids(&out.cache), vec!["r2", "r1"]);
        assert_eq!(out.cache[1].text, "edited");
        assert_eq!(ids(&out.new), vec!["r2"]);
        assert_eq!(out.updated, vec![edited]);
    }

    #[test]
    fn empty_cache_takes_everything_as_new() {
        let out = merge(Vec::new(), vec![review("a", 5), review("b", 3)], PKG);
        assert_eq!(ids(&out.new), vec!["a", "b"]);
        assert!(out.updated.is_empty());
        assert_eq!(ids(&out.cache), vec!["a", "b"]);
    }

    #[test]
    fn empty_fetch_is_noop() {
        let cache = vec![review("a", 5)];
        let out = merge(cache.clone(), Vec::new(), PKG);
        assert_eq!(out.cache, cache);
        assert!(!out.changed());
    }

    #[test]
    fn boundary_at_first_item_keeps_cache_untouched() {
        let cache = vec![review("a", 10), review("b", 5)];
        let out = merge(cache.clone(), vec![review("a", 10), review("b", 5)], PKG);
        assert_eq!(out.cache, cache);
        assert!(!out.changed());
    }

    #[test]
    fn boundary_keeps_everything_strictly_before_it() {
        let cache = vec![review("a", 10)];
        let fetched = vec![review("c", 30), review("b", 20), review("a", 10), review("z", 1)];
        let out = merge(cache, fetched, PKG);
        assert_eq!(ids(&out.new), vec!["c", "b"]);
        assert_eq!(ids(&out.cache), vec!["c", "b", "a"]);
    }

    #[test]
    fn unsorted_fetch_is_sorted_before_trimming() {
        let cache = vec![review("a", 10)];
        // Out of order: the stale item first would otherwise stop the scan.
        let fetched = vec![review("a", 10), review("c", 30), review("b", 20)];
        let out = merge(cache, fetched, PKG);
        assert_eq!(ids(&out.cache), vec!["c", "b", "a"]);
        assert_eq!(out.new.len(), 2);
    }

    #[test]
    fn repeated_id_in_one_fetch_keeps_freshest() {
        let out = merge(Vec::new(), vec![review("a", 9), review("a", 4)], PKG);
        assert_eq!(out.cache.len(), 1);
        assert_eq!(out.cache[0].modified.seconds, 9);
    }

    #[test]
    fn equal_timestamp_with_subsecond_difference_counts_as_newer() {
        let cache = vec![review("a", 10)];
        let mut b = review("b", 10);
        b.modified.nanos = 500;
        let out = merge(cache, vec![b], PKG);
        assert_eq!(ids(&out.new), vec!["b"]);
    }
}
