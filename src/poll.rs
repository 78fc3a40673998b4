// src/poll.rs
//! Poll scheduler: fetch every registered package concurrently, merge each
//! result under the shared lock, persist once if anything changed, sleep.
//! Persisting covers the review cache and the alert counters/buffers it fed.
//!
//! A failed or empty fetch leaves that package's cache untouched; the
//! package is simply tried again on the next cycle.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use once_cell::sync::OnceCell;
use tokio::task::{JoinHandle, JoinSet};

use crate::state::AppState;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("poll_cycles_total", "Completed poll cycles.");
        describe_counter!("poll_fetch_errors_total", "Review source fetch failures.");
        describe_counter!("poll_new_reviews_total", "Reviews merged as new.");
        describe_counter!("poll_updated_reviews_total", "Reviews merged as updates.");
        describe_gauge!("poll_last_run_ts", "Unix ts of the last finished poll cycle.");
    });
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Fetch tasks launched.
    pub launched: usize,
    pub failed: usize,
    pub empty: usize,
    pub new: usize,
    pub updated: usize,
    pub persisted: bool,
}

/// One merge cycle.
pub async fn poll_once(state: &AppState) -> PollReport {
    ensure_metrics_described();

    let targets = state.core.lock().packages.clone();
    let mut report = PollReport {
        launched: targets.len(),
        ..Default::default()
    };

    let mut fetches = JoinSet::new();
    for reg in targets {
        let source = state.source.clone();
        fetches.spawn(async move {
            let res = source.fetch(&reg).await;
            (reg, res)
        });
    }

    let mut changed = false;
    while let Some(joined) = fetches.join_next().await {
        let (reg, res) = match joined {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = ?e, "fetch task aborted");
                report.failed += 1;
                continue;
            }
        };
        let fetched = match res {
            Ok(list) if list.is_empty() => {
                tracing::debug!(user = %reg.user, package = %reg.package, "empty fetch, skipped");
                report.empty += 1;
                continue;
            }
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(
                    error = ?e,
                    user = %reg.user,
                    package = %reg.package,
                    source = state.source.name(),
                    "review fetch failed"
                );
                counter!("poll_fetch_errors_total").increment(1);
                report.failed += 1;
                continue;
            }
        };

        let delta = {
            let mut core = state.core.lock();
            core.apply_fetch(&reg, fetched)
        };
        if delta.changed() {
            tracing::info!(
                user = %reg.user,
                package = %reg.package,
                new = delta.new.len(),
                updated = delta.updated.len(),
                "reviews merged"
            );
            changed = true;
        }
        report.new += delta.new.len();
        report.updated += delta.updated.len();
    }

    counter!("poll_cycles_total").increment(1);
    counter!("poll_new_reviews_total").increment(report.new as u64);
    counter!("poll_updated_reviews_total").increment(report.updated as u64);
    gauge!("poll_last_run_ts").set(chrono::Utc::now().timestamp() as f64);

    if changed {
        state.persist_reviews().await;
        state.persist_alerts().await;
        report.persisted = true;
    }

    report
}

/// Run [`poll_once`] forever, sleeping `poll_interval_secs` after each cycle.
pub fn spawn_poll_loop(state: AppState) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.poll_interval_secs);
    tokio::spawn(async move {
        loop {
            let report = poll_once(&state).await;
            tracing::debug!(
                target: "poll",
                launched = report.launched,
                failed = report.failed,
                new = report.new,
                updated = report.updated,
                "poll cycle done"
            );
            tokio::time::sleep(period).await;
        }
    })
}
