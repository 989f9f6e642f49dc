//! End-to-end test: switching operations racing from several threads leave
//! a consistent record, in memory and on disk.

use std::fs;
use std::thread;

use ota_core::Updater;
use ota_tests::Harness;
use ota_types::{ActivationRecord, BundleId, BundleStatus};

const ROUNDS: usize = 40;

fn status_of(updater: &Updater, id: &BundleId) -> Option<BundleStatus> {
    updater
        .list()
        .into_iter()
        .find(|v| v.version == *id)
        .map(|v| v.status)
}

fn assert_consistent(h: &Harness, updater: &Updater) {
    let record = updater.machine().record();

    let active = status_of(updater, &record.active_id).expect("active bundle missing");
    if record.health_check_armed {
        assert!(!record.active_id.is_builtin(), "builtin active while armed");
    } else {
        assert_eq!(active, BundleStatus::Success, "unarmed active not confirmed");
    }
    assert_eq!(
        status_of(updater, &record.previous_good_id),
        Some(BundleStatus::Success)
    );

    let persisted = fs::read_to_string(h.config.storage.root_dir.join("activation.json")).unwrap();
    let persisted: ActivationRecord = serde_json::from_str(&persisted).unwrap();
    assert_eq!(persisted.revision, record.revision);
    assert_eq!(persisted, record);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_switches_keep_record_consistent() {
    let h = Harness::new();
    let updater = h.boot().await;
    let a = h.download(&updater, "1.1.0").await.version;
    let b = h.download(&updater, "1.2.0").await.version;

    let (updater_ref, a_ref, b_ref) = (&updater, &a, &b);
    thread::scope(|s| {
        s.spawn(move || {
            for _ in 0..ROUNDS {
                updater_ref.set(a_ref, None).unwrap();
            }
        });
        s.spawn(move || {
            for _ in 0..ROUNDS {
                updater_ref.set(b_ref, None).unwrap();
            }
        });
        s.spawn(move || {
            for _ in 0..ROUNDS {
                updater_ref.notify_app_ready().unwrap();
            }
        });
        s.spawn(move || {
            for i in 0..ROUNDS {
                updater_ref.reset(i % 2 == 0).unwrap();
            }
        });
        s.spawn(move || {
            for _ in 0..ROUNDS {
                let record = updater_ref.machine().record();
                assert!(status_of(updater_ref, &record.active_id).is_some());
            }
        });
    });

    assert_consistent(&h, &updater);

    // A final confirm settles whichever bundle won the race.
    updater.notify_app_ready().unwrap();
    assert_consistent(&h, &updater);
    assert!(!updater.machine().record().health_check_armed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_switches_then_crash_rolls_back_to_confirmed_bundle() {
    let h = Harness::new();
    let (a, b) = {
        let updater = h.boot().await;
        let a = h.download(&updater, "1.1.0").await.version;
        let b = h.download(&updater, "1.2.0").await.version;

        let (updater_ref, a_ref, b_ref) = (&updater, &a, &b);
        thread::scope(|s| {
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    updater_ref.set(a_ref, None).unwrap();
                    updater_ref.notify_app_ready().unwrap();
                }
            });
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    updater_ref.set(b_ref, None).unwrap();
                }
            });
        });
        // Leave the window open so the restart has something to judge.
        updater.set(&b, None).unwrap();
        if !updater.machine().record().health_check_armed {
            updater.set(&a, None).unwrap();
        }
        assert_consistent(&h, &updater);
        (a, b)
    };

    let updater = h.open().await;
    let before = updater.machine().record();
    let report = updater.startup().unwrap();

    if before.health_check_armed {
        let outcome = report.rolled_back.expect("armed record not rolled back");
        assert_eq!(outcome.abandoned.id, before.active_id);
        assert_ne!(outcome.restored.id, before.active_id);
    }
    let record = updater.machine().record();
    assert!(!record.health_check_armed);
    assert!(record.active_id == a || record.active_id == b || record.active_id.is_builtin());
    assert_eq!(status_of(&updater, &record.active_id), Some(BundleStatus::Success));
}
