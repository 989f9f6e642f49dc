//! End-to-end test: major-version candidates are held, normal ones flow
//! through to activation.

use ota_core::CandidateOutcome;
use ota_tests::{collect_events, next_event, Harness};
use ota_types::{EventKind, UpdaterEvent};

#[tokio::test]
async fn major_candidate_is_never_auto_activated() {
    let h = Harness::new();
    let updater = h.boot().await;
    let mut major = collect_events(&updater, EventKind::MajorAvailable);
    let b = h.download(&updater, "2.0.0").await;

    let outcome = updater.offer_candidate("2.0.0", &b.version).unwrap();
    assert_eq!(outcome, CandidateOutcome::MajorHeld);
    assert_eq!(
        next_event(&mut major).await,
        Some(UpdaterEvent::MajorAvailable {
            version: "2.0.0".into()
        })
    );

    // Still inactive, also after a backgrounding.
    assert!(updater.on_background().unwrap().is_none());
    assert!(updater.current().unwrap().bundle.version.is_builtin());

    // An explicit set is the only way in.
    updater.set(&b.version, None).unwrap();
    assert_eq!(updater.current().unwrap().bundle.version, b.version);
}

#[tokio::test]
async fn normal_candidate_announced_and_activated() {
    let h = Harness::new();
    let updater = h.boot().await;
    let mut available = collect_events(&updater, EventKind::UpdateAvailable);
    let b = h.download(&updater, "1.4.2").await;

    let outcome = updater.offer_candidate("1.4.2", &b.version).unwrap();
    match outcome {
        CandidateOutcome::Activated(info) => assert_eq!(info.version, b.version),
        other => panic!("expected activation, got {:?}", other),
    }
    assert!(updater.machine().record().health_check_armed);

    match next_event(&mut available).await {
        Some(UpdaterEvent::UpdateAvailable { version }) => assert_eq!(version.version, b.version),
        other => panic!("expected updateAvailable, got {:?}", other),
    }
}

#[tokio::test]
async fn same_version_is_ignored() {
    let h = Harness::new();
    let updater = h.boot().await;
    let b = h.download(&updater, "1.1.0").await;
    updater.set(&b.version, None).unwrap();

    assert_eq!(
        updater.offer_candidate("1.1.0", &b.version).unwrap(),
        CandidateOutcome::Ignored
    );
}

#[tokio::test]
async fn disabled_gate_lets_major_through() {
    let mut h = Harness::new();
    h.config.updates.breaking_update_gate = false;
    let updater = h.boot().await;
    let b = h.download(&updater, "3.0.0").await;

    assert!(matches!(
        updater.offer_candidate("3.0.0", &b.version).unwrap(),
        CandidateOutcome::Activated(_)
    ));
}

#[tokio::test]
async fn errored_candidate_is_refused_by_automatic_flow() {
    let h = Harness::new();
    let b = {
        let updater = h.boot().await;
        let b = h.download(&updater, "1.1.0").await;
        updater.set(&b.version, None).unwrap();
        b
    };

    // Rolled back and marked error on restart.
    let updater = h.boot().await;
    assert!(matches!(
        updater.offer_candidate("1.1.0", &b.version),
        Err(ota_core::UpdaterError::InvalidBundle { .. })
    ));
    assert!(updater.current().unwrap().bundle.version.is_builtin());
}
