// src/alerts/throttle.rs
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Minimum-interval gate for one alert.
/// - Closed while `now < last_fired + interval`.
/// - `should_fire` never mutates; `record` is called when the alert fires,
///   whether or not the webhook accepted the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throttle {
    #[serde(rename = "frequency_secs")]
    min_interval_secs: u64,
    last_fired: DateTime<Utc>,
}

impl Throttle {
    /// A fresh gate starts closed: the first fire happens one interval after
    /// registration.
    pub fn new(min_interval_secs: u64, registered_at: DateTime<Utc>) -> Self {
        Self {
            min_interval_secs,
            last_fired: registered_at,
        }
    }

    pub fn min_interval_secs(&self) -> u64 {
        self.min_interval_secs
    }

    pub fn last_fired(&self) -> DateTime<Utc> {
        self.last_fired
    }

    /// First instant the gate is open again; `None` if that lies beyond the
    /// representable range.
    pub fn next_open(&self) -> Option<DateTime<Utc>> {
        let secs = i64::try_from(self.min_interval_secs).ok()?;
        let step = ChronoDuration::try_seconds(secs)?;
        self.last_fired.checked_add_signed(step)
    }

    pub fn should_fire(&self, now: DateTime<Utc>) -> bool {
        self.next_open().is_some_and(|at| now >= at)
    }

    pub fn record(&mut self, now: DateTime<Utc>) {
        self.last_fired = now;
    }
}
