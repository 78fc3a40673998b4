// src/alerts/dispatch.rs
//! Alert dispatch cycles.
//!
//! One loop per alert variant. Each cycle launches one task per alert; a task
//! takes the lock, checks throttle and pending content, renders the digest,
//! clears the alert and stamps `last_fired`, releases the lock, and only then
//! posts to the webhook. The cycle waits for one completion signal per task
//! (sent right after the read-and-clear step) before it moves on, then joins
//! the tasks to collect delivery outcomes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use super::{AlertKey, AlertKind, AlertVariant};
use crate::notify::digest::{render_digest, NEW_REVIEWS_HEADER, UPDATED_REVIEWS_HEADER};
use crate::state::{AppState, Core};

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("alerts_sent_total", "Digests accepted by a webhook.");
        describe_counter!("alerts_failed_total", "Digests the webhook rejected or never received.");
    });
}

/// A digest ready to leave the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub key: AlertKey,
    pub webhook: String,
    pub text: String,
    pub shown: usize,
    pub hidden: usize,
}

/// Read-and-clear step for one alert. Must run under the shared lock.
///
/// Returns `None` without touching anything when the alert is gone, still
/// throttled, or has nothing pending.
pub fn take_digest(
    core: &mut Core,
    key: &AlertKey,
    now: DateTime<Utc>,
    max_shown: usize,
) -> Option<Outgoing> {
    let Core { reviews, alerts, .. } = core;
    let alert = alerts.get_mut(&key.user, &key.name)?;
    if !alert.throttle.should_fire(now) || !alert.has_pending() {
        return None;
    }

    let (text, shown, hidden) = match &alert.kind {
        AlertKind::NewReviews { count } => {
            let cached = reviews.get(&key.user, &alert.package);
            let shown = (*count).min(max_shown).min(cached.len());
            let hidden = count - shown;
            (render_digest(NEW_REVIEWS_HEADER, &cached[..shown], hidden), shown, hidden)
        }
        AlertKind::UpdatedReviews { buffer } => {
            let shown = buffer.len().min(max_shown);
            let hidden = buffer.len() - shown;
            (render_digest(UPDATED_REVIEWS_HEADER, &buffer[..shown], hidden), shown, hidden)
        }
    };

    alert.clear();
    alert.throttle.record(now);

    Some(Outgoing {
        key: key.clone(),
        webhook: alert.webhook.clone(),
        text,
        shown,
        hidden,
    })
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Tasks launched this cycle.
    pub launched: usize,
    /// Alerts whose state was taken and cleared.
    pub fired: usize,
    pub delivered: usize,
    pub failed: usize,
}

enum TaskOutcome {
    Skipped,
    Delivered,
    Failed,
}

/// One dispatch cycle for `variant` at time `now`.
pub async fn dispatch_once(
    state: &AppState,
    variant: AlertVariant,
    now: DateTime<Utc>,
) -> DispatchReport {
    ensure_metrics_described();

    let keys = state.core.lock().alerts.keys(variant);
    if keys.is_empty() {
        return DispatchReport::default();
    }

    let (done_tx, mut done_rx) = mpsc::channel::<()>(keys.len());
    let mut tasks = JoinSet::new();
    let max_shown = state.config.max_reviews_shown;

    for key in keys {
        let core = state.core.clone();
        let sender = state.sender.clone();
        let done = done_tx.clone();
        tasks.spawn(async move {
            let prepared = {
                let mut guard = core.lock();
                take_digest(&mut guard, &key, now, max_shown)
            };
            // Alert state is settled for this cycle.
            let _ = done.send(()).await;
            drop(done);

            let Some(out) = prepared else {
                return TaskOutcome::Skipped;
            };
            match sender.post(&out.webhook, &out.text).await {
                Ok(()) => {
                    tracing::info!(
                        user = %out.key.user,
                        alert = %out.key.name,
                        shown = out.shown,
                        hidden = out.hidden,
                        "alert sent"
                    );
                    counter!("alerts_sent_total").increment(1);
                    TaskOutcome::Delivered
                }
                Err(e) => {
                    tracing::warn!(
                        error = ?e,
                        user = %out.key.user,
                        alert = %out.key.name,
                        "alert delivery failed, digest dropped"
                    );
                    counter!("alerts_failed_total").increment(1);
                    TaskOutcome::Failed
                }
            }
        });
    }
    drop(done_tx);

    let launched = tasks.len();
    let mut settled = 0usize;
    while settled < launched {
        match done_rx.recv().await {
            Some(()) => settled += 1,
            // every sender dropped: the remaining tasks died before signalling
            None => break,
        }
    }
    tracing::trace!(%variant, launched, settled, "dispatch state settled");

    let mut report = DispatchReport {
        launched,
        ..Default::default()
    };
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(TaskOutcome::Skipped) => {}
            Ok(TaskOutcome::Delivered) => {
                report.fired += 1;
                report.delivered += 1;
            }
            Ok(TaskOutcome::Failed) => {
                report.fired += 1;
                report.failed += 1;
            }
            Err(e) => tracing::warn!(error = ?e, %variant, "dispatch task aborted"),
        }
    }

    if report.fired > 0 {
        state.persist_alerts().await;
    }
    report
}

/// Run [`dispatch_once`] for `variant` every `alert_interval_secs`.
pub fn spawn_dispatch_loop(state: AppState, variant: AlertVariant) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.alert_interval_secs);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(period).await;
            let report = dispatch_once(&state, variant, Utc::now()).await;
            if report.fired > 0 {
                tracing::info!(
                    %variant,
                    fired = report.fired,
                    delivered = report.delivered,
                    failed = report.failed,
                    "dispatch cycle done"
                );
            }
        }
    })
}
