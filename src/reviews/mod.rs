// src/reviews/mod.rs
//! Review model and the per-(user, package) review cache.
//!
//! Caches are kept newest-first: the head of every list is the most recently
//! modified review, and no identifier appears twice in one list. Only
//! [`ReviewStore::merge`] extends or reorders a cache.

pub mod merge;
pub mod source;

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use merge::{merge, MergeOutcome};

/// Source-side modification time, seconds plus sub-second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds: i64,
    #[serde(default)]
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self { seconds, nanos }
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self {
            seconds: dt.timestamp(),
            nanos: dt.timestamp_subsec_nanos(),
        }
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.seconds, self.nanos)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S UTC")),
            None => write!(f, "{}s", self.seconds),
        }
    }
}

/// One user review as returned by the review source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub author: String,
    /// 0..=5
    pub stars: u8,
    pub text: String,
    pub modified: Timestamp,
    pub package: String,
    pub user: String,
}

/// A package some user asked us to watch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRegistration {
    pub package: String,
    pub user: String,
}

impl PackageRegistration {
    pub fn new(user: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            user: user.into(),
        }
    }
}

/// What a merge reported back, once the cache itself has been stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeDelta {
    pub updated: Vec<Review>,
    pub new: Vec<Review>,
}

impl MergeDelta {
    pub fn changed(&self) -> bool {
        !self.updated.is_empty() || !self.new.is_empty()
    }
}

/// Review caches keyed by user, then package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewStore {
    caches: HashMap<String, HashMap<String, Vec<Review>>>,
}

impl ReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sure an (empty) cache exists for a freshly registered package.
    pub fn ensure(&mut self, user: &str, package: &str) {
        self.caches
            .entry(user.to_string())
            .or_default()
            .entry(package.to_string())
            .or_default();
    }

    /// Cached reviews for `(user, package)`, newest first. Empty if unknown.
    pub fn get(&self, user: &str, package: &str) -> &[Review] {
        self.caches
            .get(user)
            .and_then(|pkgs| pkgs.get(package))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All caches of one user, in no particular order.
    pub fn for_user(&self, user: &str) -> impl Iterator<Item = (&str, &[Review])> {
        self.caches
            .get(user)
            .into_iter()
            .flat_map(|pkgs| pkgs.iter().map(|(p, list)| (p.as_str(), list.as_slice())))
    }

    /// Merge a fresh fetch into the cache for `(user, package)` and return
    /// the new/updated subsets. The caller must hold the shared lock.
    pub fn merge(&mut self, user: &str, package: &str, fetched: Vec<Review>) -> MergeDelta {
        let slot = self
            .caches
            .entry(user.to_string())
            .or_default()
            .entry(package.to_string())
            .or_default();
        let MergeOutcome {
            cache,
            updated,
            new,
        } = merge::merge(std::mem::take(slot), fetched, package);
        *slot = cache;
        MergeDelta { updated, new }
    }

    pub fn total_reviews(&self) -> usize {
        self.caches
            .values()
            .flat_map(|pkgs| pkgs.values())
            .map(Vec::len)
            .sum()
    }
}
