// src/alerts/mod.rs
//! Per-user alert definitions and the merge-result hook that feeds them.
//!
//! Two kinds share one shape (webhook, package, throttle):
//! - `new_reviews` counts reviews merged as new since the last fire;
//! - `updated_reviews` buffers edited reviews, newest first.

pub mod dispatch;
pub mod throttle;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reviews::Review;
pub use throttle::Throttle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertVariant {
    NewReviews,
    UpdatedReviews,
}

impl fmt::Display for AlertVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertVariant::NewReviews => "new_reviews",
            AlertVariant::UpdatedReviews => "updated_reviews",
        })
    }
}

/// Pending content of an alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    NewReviews { count: usize },
    UpdatedReviews { buffer: Vec<Review> },
}

impl AlertKind {
    pub fn empty(variant: AlertVariant) -> Self {
        match variant {
            AlertVariant::NewReviews => AlertKind::NewReviews { count: 0 },
            AlertVariant::UpdatedReviews => AlertKind::UpdatedReviews { buffer: Vec::new() },
        }
    }

    pub fn variant(&self) -> AlertVariant {
        match self {
            AlertKind::NewReviews { .. } => AlertVariant::NewReviews,
            AlertKind::UpdatedReviews { .. } => AlertVariant::UpdatedReviews,
        }
    }

    /// Number of reviews waiting to be reported.
    pub fn pending(&self) -> usize {
        match self {
            AlertKind::NewReviews { count } => *count,
            AlertKind::UpdatedReviews { buffer } => buffer.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub webhook: String,
    pub package: String,
    #[serde(flatten)]
    pub throttle: Throttle,
    #[serde(flatten)]
    pub kind: AlertKind,
}

impl Alert {
    pub fn new(
        variant: AlertVariant,
        webhook: impl Into<String>,
        package: impl Into<String>,
        frequency_secs: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            webhook: webhook.into(),
            package: package.into(),
            throttle: Throttle::new(frequency_secs, now),
            kind: AlertKind::empty(variant),
        }
    }

    pub fn has_pending(&self) -> bool {
        self.kind.pending() > 0
    }

    /// Reset the counter / buffer after a fire.
    pub fn clear(&mut self) {
        self.kind = AlertKind::empty(self.kind.variant());
    }
}

/// Identifies one alert: names are unique within a user's namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AlertKey {
    pub user: String,
    pub name: String,
}

/// All alert definitions, keyed by user then alert name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertRegistry {
    by_user: HashMap<String, BTreeMap<String, Alert>>,
}

impl AlertRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, user: &str, name: &str) -> bool {
        self.get(user, name).is_some()
    }

    /// Returns false (and leaves the registry alone) if the name is taken.
    pub fn insert(&mut self, user: &str, name: &str, alert: Alert) -> bool {
        let alerts = self.by_user.entry(user.to_string()).or_default();
        if alerts.contains_key(name) {
            return false;
        }
        alerts.insert(name.to_string(), alert);
        true
    }

    pub fn remove(&mut self, user: &str, name: &str) -> Option<Alert> {
        let alerts = self.by_user.get_mut(user)?;
        let removed = alerts.remove(name);
        if alerts.is_empty() {
            self.by_user.remove(user);
        }
        removed
    }

    pub fn get(&self, user: &str, name: &str) -> Option<&Alert> {
        self.by_user.get(user)?.get(name)
    }

    pub fn get_mut(&mut self, user: &str, name: &str) -> Option<&mut Alert> {
        self.by_user.get_mut(user)?.get_mut(name)
    }

    /// A user's alerts, ordered by name.
    pub fn for_user(&self, user: &str) -> impl Iterator<Item = (&str, &Alert)> {
        self.by_user
            .get(user)
            .into_iter()
            .flat_map(|alerts| alerts.iter().map(|(n, a)| (n.as_str(), a)))
    }

    /// Keys of every alert of one variant, across users.
    pub fn keys(&self, variant: AlertVariant) -> Vec<AlertKey> {
        let mut keys: Vec<AlertKey> = self
            .by_user
            .iter()
            .flat_map(|(user, alerts)| {
                alerts
                    .iter()
                    .filter(move |(_, a)| a.kind.variant() == variant)
                    .map(move |(name, _)| AlertKey {
                        user: user.clone(),
                        name: name.clone(),
                    })
            })
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.by_user.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Feed one merge result into every alert of `user` bound to `package`.
    /// Runs under the shared lock held by the poll cycle.
    pub fn on_merge_result(&mut self, user: &str, package: &str, updated: &[Review], new: &[Review]) {
        let Some(alerts) = self.by_user.get_mut(user) else {
            return;
        };
        for alert in alerts.values_mut().filter(|a| a.package == package) {
            match &mut alert.kind {
                AlertKind::NewReviews { count } => *count += new.len(),
                AlertKind::UpdatedReviews { buffer } => {
                    if !updated.is_empty() {
                        let mut fresh = updated.to_vec();
                        fresh.append(buffer);
                        *buffer = fresh;
                    }
                }
            }
        }
    }
}
