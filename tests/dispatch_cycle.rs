// tests/dispatch_cycle.rs

mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};

use common::{harness, harness_with, review, RecordingSender, PKG, USER};
use review_alerts::alerts::{Alert, AlertVariant};
use review_alerts::reviews::PackageRegistration;
use review_alerts::{dispatch_once, Core};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
}

/// One package with `n` merged reviews and the given alerts, all registered
/// at `t0` with a 60 s interval.
fn core_with(n: usize, alerts: &[(&str, AlertVariant)]) -> Core {
    let mut core = Core::default();
    core.register(USER, PKG);
    for (name, variant) in alerts {
        let hook = format!("http://hooks.local/{name}");
        core.alerts
            .insert(USER, name, Alert::new(*variant, hook, PKG, 60, t0()));
    }
    let fetched = (0..n).map(|i| review(&format!("r{i}"), 500 - i as i64)).collect();
    core.apply_fetch(&PackageRegistration::new(USER, PKG), fetched);
    core
}

#[tokio::test]
async fn never_sends_before_interval_elapsed() {
    let h = harness(core_with(3, &[("a", AlertVariant::NewReviews)]));

    for secs in [0, 1, 30, 59] {
        let report = dispatch_once(&h.state, AlertVariant::NewReviews, t0() + Duration::seconds(secs)).await;
        assert_eq!(report.launched, 1);
        assert_eq!(report.fired, 0, "fired {secs}s after registration");
    }
    assert!(h.sender.sent().is_empty());
    assert_eq!(h.state.core.lock().alerts.get(USER, "a").unwrap().kind.pending(), 3);

    let report = dispatch_once(&h.state, AlertVariant::NewReviews, t0() + Duration::seconds(60)).await;
    assert_eq!(report.delivered, 1);

    // Gate closes again from the new last_fired.
    h.state
        .core
        .lock()
        .apply_fetch(&PackageRegistration::new(USER, PKG), vec![review("late", 900)]);
    let report = dispatch_once(&h.state, AlertVariant::NewReviews, t0() + Duration::seconds(119)).await;
    assert_eq!(report.fired, 0);
    assert_eq!(h.sender.sent().len(), 1);
}

#[tokio::test]
async fn two_alerts_on_one_package_each_send_once() {
    let h = harness(core_with(
        15,
        &[("a", AlertVariant::NewReviews), ("b", AlertVariant::NewReviews)],
    ));
    let now = t0() + Duration::minutes(5);

    let report = dispatch_once(&h.state, AlertVariant::NewReviews, now).await;
    assert_eq!(report.launched, 2);
    assert_eq!(report.delivered, 2);

    let mut sent = h.sender.sent();
    sent.sort();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].0, "http://hooks.local/a");
    assert_eq!(sent[1].0, "http://hooks.local/b");
    for (_, text) in &sent {
        assert!(text.starts_with("## You have new reviews:"));
        assert_eq!(text.matches("ReviewId:").count(), 10);
        assert!(text.ends_with("and 5 more not shown."));
    }

    {
        let core = h.state.core.lock();
        for name in ["a", "b"] {
            let alert = core.alerts.get(USER, name).unwrap();
            assert_eq!(alert.kind.pending(), 0);
            assert_eq!(alert.throttle.last_fired(), now);
        }
    }

    // Nothing left to send on the next cycle.
    let again = dispatch_once(&h.state, AlertVariant::NewReviews, now + Duration::minutes(5)).await;
    assert_eq!(again.fired, 0);
    assert_eq!(h.sender.sent().len(), 2);
}

#[tokio::test]
async fn delivery_failure_still_clears_and_advances() {
    let h = harness_with(
        core_with(4, &[("a", AlertVariant::NewReviews)]),
        RecordingSender::failing(),
    );
    let now = t0() + Duration::seconds(61);

    let report = dispatch_once(&h.state, AlertVariant::NewReviews, now).await;
    assert_eq!(report.fired, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.delivered, 0);
    assert_eq!(h.sender.sent().len(), 1);

    let alert = h.state.core.lock().alerts.get(USER, "a").unwrap().clone();
    assert!(!alert.has_pending());
    assert_eq!(alert.throttle.last_fired(), now);

    // Cleared state is what gets persisted.
    let saved = h.store.saved_alerts();
    assert_eq!(saved.get(USER, "a").unwrap(), &alert);
}

#[tokio::test]
async fn loops_only_see_their_own_variant() {
    let mut core = core_with(2, &[("new", AlertVariant::NewReviews), ("edits", AlertVariant::UpdatedReviews)]);
    core.apply_fetch(
        &PackageRegistration::new(USER, PKG),
        vec![review("r0", 600), review("fresh", 550)],
    );
    let h = harness(core);
    let now = t0() + Duration::hours(1);

    let edits = dispatch_once(&h.state, AlertVariant::UpdatedReviews, now).await;
    assert_eq!(edits.launched, 1);
    assert_eq!(edits.delivered, 1);
    let sent = h.sender.sent();
    assert_eq!(sent[0].0, "http://hooks.local/edits");
    assert!(sent[0].1.starts_with("## Some reviews have been updated:"));
    assert!(sent[0].1.contains("ReviewId:**r0**"));
    assert!(!sent[0].1.contains("more not shown"));

    // the counting alert is still pending: 2 initial + 1 fresh
    assert_eq!(h.state.core.lock().alerts.get(USER, "new").unwrap().kind.pending(), 3);
}
