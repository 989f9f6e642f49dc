//! End-to-end test: delayed candidates wait for the right lifecycle event.

use chrono::{Duration, Utc};
use ota_core::CandidateOutcome;
use ota_tests::Harness;
use ota_types::DelayCondition;

#[tokio::test]
async fn delay_holds_candidate_until_background() {
    let h = Harness::new();
    let updater = h.boot().await;
    let b = h.download(&updater, "1.1.0").await;

    updater.delay_update(DelayCondition::Background).unwrap();
    assert!(matches!(
        updater.offer_candidate("1.1.0", &b.version).unwrap(),
        CandidateOutcome::Deferred(_)
    ));
    assert!(updater.current().unwrap().bundle.version.is_builtin());
    assert_eq!(updater.machine().deferred_candidate(), Some(b.version.clone()));

    let applied = updater.on_background().unwrap().unwrap();
    assert_eq!(applied.version, b.version);
    assert_eq!(updater.current().unwrap().bundle.version, b.version);
    assert!(updater.machine().deferred_candidate().is_none());
}

#[tokio::test]
async fn cancel_delay_before_background_activates_immediately() {
    let h = Harness::new();
    let updater = h.boot().await;
    let b = h.download(&updater, "1.1.0").await;

    updater.delay_update(DelayCondition::Background).unwrap();
    updater.offer_candidate("1.1.0", &b.version).unwrap();

    let applied = updater.cancel_delay().unwrap().unwrap();
    assert_eq!(applied.version, b.version);
    assert_eq!(updater.current().unwrap().bundle.version, b.version);
    assert!(updater.on_background().unwrap().is_none());
}

#[tokio::test]
async fn cancel_delay_without_candidate_restores_immediate_mode() {
    let h = Harness::new();
    let updater = h.boot().await;
    let b = h.download(&updater, "1.1.0").await;

    updater.delay_update(DelayCondition::Background).unwrap();
    assert!(updater.cancel_delay().unwrap().is_none());
    assert!(matches!(
        updater.offer_candidate("1.1.0", &b.version).unwrap(),
        CandidateOutcome::Activated(_)
    ));
}

#[tokio::test]
async fn delay_flag_is_consumed_once() {
    let h = Harness::new();
    let updater = h.boot().await;
    let a = h.download(&updater, "1.1.0").await;
    let b = h.download(&updater, "1.2.0").await;

    updater.delay_update(DelayCondition::Background).unwrap();
    updater.offer_candidate("1.1.0", &a.version).unwrap();
    updater.on_background().unwrap();
    updater.notify_app_ready().unwrap();

    // Flag consumed: the next candidate activates right away.
    assert!(matches!(
        updater.offer_candidate("1.2.0", &b.version).unwrap(),
        CandidateOutcome::Activated(_)
    ));
}

#[tokio::test]
async fn kill_condition_applies_at_next_cold_start() {
    let h = Harness::new();
    let b = {
        let updater = h.boot().await;
        let b = h.download(&updater, "1.1.0").await;
        updater.delay_update(DelayCondition::Kill).unwrap();
        updater.offer_candidate("1.1.0", &b.version).unwrap();
        assert!(updater.on_background().unwrap().is_none());
        b
    };

    let updater = h.open().await;
    let report = updater.startup().unwrap();
    assert!(report.rolled_back.is_none());
    assert_eq!(report.deferred_applied.unwrap().version, b.version);
    assert_eq!(updater.current().unwrap().bundle.version, b.version);
    assert!(updater.machine().record().health_check_armed);
}

#[tokio::test]
async fn background_condition_survives_restart() {
    let h = Harness::new();
    let b = {
        let updater = h.boot().await;
        let b = h.download(&updater, "1.1.0").await;
        updater.delay_update(DelayCondition::Background).unwrap();
        updater.offer_candidate("1.1.0", &b.version).unwrap();
        b
    };

    let updater = h.boot().await;
    assert!(updater.current().unwrap().bundle.version.is_builtin());
    assert_eq!(updater.on_background().unwrap().unwrap().version, b.version);
}

#[tokio::test]
async fn date_condition_waits_for_deadline() {
    let h = Harness::new();
    let updater = h.boot().await;
    let b = h.download(&updater, "1.1.0").await;

    updater
        .delay_update(DelayCondition::Date(Utc::now() + Duration::hours(6)))
        .unwrap();
    updater.offer_candidate("1.1.0", &b.version).unwrap();
    assert!(updater.on_background().unwrap().is_none());

    updater
        .delay_update(DelayCondition::Date(Utc::now() - Duration::seconds(1)))
        .unwrap();
    assert_eq!(updater.on_background().unwrap().unwrap().version, b.version);
}

#[tokio::test]
async fn next_schedules_without_switching() {
    let h = Harness::new();
    let updater = h.boot().await;
    let b = h.download(&updater, "1.1.0").await;

    updater.next(&b.version).unwrap();
    assert!(updater.current().unwrap().bundle.version.is_builtin());

    assert_eq!(updater.on_background().unwrap().unwrap().version, b.version);
}

#[tokio::test]
async fn deleting_deferred_candidate_clears_it() {
    let h = Harness::new();
    let updater = h.boot().await;
    let b = h.download(&updater, "1.1.0").await;
    updater.next(&b.version).unwrap();

    updater.delete(&b.version).unwrap();
    assert!(updater.machine().deferred_candidate().is_none());
    assert!(updater.on_background().unwrap().is_none());
}
