//! Integration tests for the sync orchestrator.
//!
//! Each test runs the real worker and HTTP adapter against an in-process
//! fake of the remote posts service.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use common::{manual_sync_config, post, Harness, CREATED_ID};
use quotesync_client::storage::FileStorage;
use quotesync_client::sync::{SyncOutcome, SyncPhase, SyncReport, SYNC_FAILED_NOTICE};
use quotesync_engine::{Origin, RecordStore, RetryPolicy};

fn every_cycle() -> RetryPolicy {
    RetryPolicy::every_cycle(5)
}

#[tokio::test]
async fn test_full_cycle_pulls_merges_and_pushes() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::open(dir.path()).unwrap();
    let h = Harness::start_with_storage(manual_sync_config(every_cycle()), storage).await;

    h.mirror
        .state
        .set_posts(vec![post(1, "server text", "x"), post(2, "brand new", "y")]);
    {
        let mut store = h.store.lock().await;
        store
            .import_json(r#"[{"id": "srv-1", "text": "stale text", "category": "x"}]"#, Utc::now())
            .unwrap();
        store.add_local("Written offline", "mine", Utc::now()).unwrap();
    }

    let outcome = h.sync.sync_now().await.unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Synced(SyncReport {
            additions: 1,
            replacements: 1,
            conflicts: 1,
            pushed: 1,
            pending_retry: 0,
            abandoned: 0,
        })
    );
    assert_eq!(
        h.notifier.last().as_deref(),
        Some("Sync complete: 1 new from server • 1 replaced by server • 1 local synced")
    );

    // Persisted state reflects the whole cycle
    let reopened = RecordStore::open(FileStorage::open(dir.path()).unwrap());
    assert_eq!(reopened.len(), 3);
    assert_eq!(reopened.get("srv-1").unwrap().text, "server text");
    assert!(reopened.get("srv-2").unwrap().synced);
    let pushed = reopened.get(&format!("srv-{}", CREATED_ID)).unwrap();
    assert_eq!(pushed.text, "Written offline");
    assert!(pushed.synced);
    assert!(reopened.pending().is_empty());
}

#[tokio::test]
async fn test_second_cycle_reports_no_changes() {
    let h = Harness::start(manual_sync_config(every_cycle())).await;
    h.mirror.state.set_posts(vec![post(1, "a", "b")]);

    let first = h.sync.sync_now().await.unwrap();
    assert!(matches!(first, SyncOutcome::Synced(_)));

    let second = h.sync.sync_now().await.unwrap();
    assert_eq!(second, SyncOutcome::NoChanges);
    assert_eq!(h.notifier.last().as_deref(), Some("Sync complete: no changes"));
}

#[tokio::test]
async fn test_pull_failure_aborts_cycle() {
    let h = Harness::start(manual_sync_config(every_cycle())).await;
    h.mirror.state.fail_fetch.store(true, Ordering::SeqCst);
    let local = h
        .store
        .lock()
        .await
        .add_local("Keep me", "mine", Utc::now())
        .unwrap();

    let outcome = h.sync.sync_now().await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Failed { .. }));
    assert_eq!(h.mirror.state.pushes(), 0);
    assert_eq!(h.notifier.last().as_deref(), Some(SYNC_FAILED_NOTICE));

    let store = h.store.lock().await;
    assert_eq!(store.records(), &[local]);

    let status = h.sync.status();
    assert_eq!(status.phase, SyncPhase::Idle);
    assert_eq!(status.last_outcome, Some(outcome));
}

#[tokio::test]
async fn test_failed_push_is_retried_next_cycle() {
    let h = Harness::start(manual_sync_config(every_cycle())).await;
    h.mirror.state.fail_push.store(true, Ordering::SeqCst);
    let local = h
        .store
        .lock()
        .await
        .add_local("Retry me", "mine", Utc::now())
        .unwrap();

    let outcome = h.sync.sync_now().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Synced(SyncReport {
            pending_retry: 1,
            ..SyncReport::default()
        })
    );
    {
        let store = h.store.lock().await;
        let pending = store.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, local.id);
        assert_eq!(pending[0].push.attempts, 1);
    }

    h.mirror.state.fail_push.store(false, Ordering::SeqCst);
    let outcome = h.sync.sync_now().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Synced(report) if report.pushed == 1));

    let store = h.store.lock().await;
    assert!(store.pending().is_empty());
    assert!(store.get(local.id.as_str()).is_none());
    assert_eq!(store.records()[0].id.origin(), Origin::Remote);
}

#[tokio::test]
async fn test_exhausted_retries_abandon_delivery() {
    let h = Harness::start(manual_sync_config(RetryPolicy::every_cycle(2))).await;
    h.mirror.state.fail_push.store(true, Ordering::SeqCst);
    h.store
        .lock()
        .await
        .add_local("Doomed", "mine", Utc::now())
        .unwrap();

    h.sync.sync_now().await.unwrap();
    h.sync.sync_now().await.unwrap();
    assert_eq!(h.mirror.state.pushes(), 2);

    let outcome = h.sync.sync_now().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Synced(SyncReport {
            abandoned: 1,
            ..SyncReport::default()
        })
    );
    assert_eq!(
        h.notifier.last().as_deref(),
        Some("Sync complete: 1 delivery abandoned")
    );

    // Never pushed again, never reported again
    let outcome = h.sync.sync_now().await.unwrap();
    assert_eq!(outcome, SyncOutcome::NoChanges);
    assert_eq!(h.mirror.state.pushes(), 2);

    let store = h.store.lock().await;
    assert_eq!(store.abandoned().count(), 1);
    assert!(!store.records()[0].synced);
}

#[tokio::test]
async fn test_recent_failure_backs_off() {
    let policy = RetryPolicy::new(5).with_initial_backoff(Duration::from_secs(3600));
    let h = Harness::start(manual_sync_config(policy)).await;
    h.mirror.state.fail_push.store(true, Ordering::SeqCst);
    h.store
        .lock()
        .await
        .add_local("Later", "mine", Utc::now())
        .unwrap();

    h.sync.sync_now().await.unwrap();
    let outcome = h.sync.sync_now().await.unwrap();

    assert_eq!(h.mirror.state.pushes(), 1);
    assert_eq!(
        outcome,
        SyncOutcome::Synced(SyncReport {
            pending_retry: 1,
            ..SyncReport::default()
        })
    );
}

#[tokio::test]
async fn test_same_remote_id_for_two_pushes() {
    let h = Harness::start(manual_sync_config(every_cycle())).await;
    let (first, second) = {
        let mut store = h.store.lock().await;
        (
            store.add_local("one", "x", Utc::now()).unwrap(),
            store.add_local("two", "x", Utc::now()).unwrap(),
        )
    };

    let outcome = h.sync.sync_now().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Synced(report) if report.pushed == 2));

    let store = h.store.lock().await;
    assert_eq!(store.len(), 2);
    assert!(store.records().iter().all(|r| r.synced));
    assert_eq!(store.records()[0].id, format!("srv-{}", CREATED_ID).as_str());
    assert_eq!(store.records()[0].text, first.text);
    assert_eq!(store.records()[1].id, second.id);
}

#[tokio::test]
async fn test_concurrent_triggers_are_coalesced() {
    let h = Harness::start(manual_sync_config(every_cycle())).await;
    h.mirror.state.fetch_delay_ms.store(300, Ordering::SeqCst);
    h.mirror.state.set_posts(vec![post(1, "a", "b")]);

    let mut status = h.sync.subscribe();
    let first = {
        let sync = h.sync.clone();
        tokio::spawn(async move { sync.sync_now().await.unwrap() })
    };
    status
        .wait_for(|s| s.phase == SyncPhase::Pulling)
        .await
        .unwrap();

    let queued: Vec<_> = (0..3)
        .map(|_| {
            let sync = h.sync.clone();
            tokio::spawn(async move { sync.sync_now().await.unwrap() })
        })
        .collect();

    let first = first.await.unwrap();
    let mut later = Vec::new();
    for task in queued {
        later.push(task.await.unwrap());
    }

    assert!(matches!(first, SyncOutcome::Synced(_)));
    assert!(later.iter().all(|o| *o == SyncOutcome::NoChanges));
    assert_eq!(h.mirror.state.fetches(), 2);
    assert_eq!(h.mirror.state.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_local_add_during_push_is_kept() {
    let h = Harness::start(manual_sync_config(every_cycle())).await;
    h.mirror.state.push_delay_ms.store(300, Ordering::SeqCst);
    h.store
        .lock()
        .await
        .add_local("Early", "x", Utc::now())
        .unwrap();

    let mut status = h.sync.subscribe();
    let cycle = {
        let sync = h.sync.clone();
        tokio::spawn(async move { sync.sync_now().await.unwrap() })
    };
    status
        .wait_for(|s| s.phase == SyncPhase::Pushing)
        .await
        .unwrap();

    let late = h
        .store
        .lock()
        .await
        .add_local("Late", "x", Utc::now())
        .unwrap();

    let outcome = cycle.await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Synced(report) if report.pushed == 1));

    let store = h.store.lock().await;
    assert_eq!(store.len(), 2);
    assert_eq!(store.pending(), vec![late]);
}

#[tokio::test]
async fn test_timer_triggers_first_cycle() {
    let mut config = manual_sync_config(every_cycle());
    config.initial_delay = Duration::from_millis(50);
    let h = Harness::start(config).await;
    h.mirror.state.set_posts(vec![post(7, "from timer", "t")]);

    let mut status = h.sync.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        status.wait_for(|s| s.last_outcome.is_some()),
    )
    .await
    .expect("timer never fired")
    .unwrap();

    assert_eq!(h.mirror.state.fetches(), 1);
    assert!(h.store.lock().await.get("srv-7").is_some());
}

#[tokio::test]
async fn test_imported_duplicate_id_is_pushed_once() {
    let h = Harness::start(manual_sync_config(every_cycle())).await;
    h.mirror.state.set_posts(vec![post(1, "A", "x")]);
    h.sync.sync_now().await.unwrap();

    h.store
        .lock()
        .await
        .import_json(r#"[{"id": "srv-1", "text": "Z", "category": "x"}]"#, Utc::now())
        .unwrap();

    let outcome = h.sync.sync_now().await.unwrap();
    assert!(matches!(outcome, SyncOutcome::Synced(report) if report.pushed == 1));
    {
        let store = h.store.lock().await;
        let records: Vec<_> = store
            .records()
            .iter()
            .map(|r| (r.id.as_str().to_string(), r.text.clone(), r.synced))
            .collect();
        assert_eq!(
            records,
            vec![
                ("srv-1".to_string(), "A".to_string(), true),
                (format!("srv-{}", CREATED_ID), "Z".to_string(), true),
            ]
        );
    }

    let outcome = h.sync.sync_now().await.unwrap();
    assert_eq!(outcome, SyncOutcome::NoChanges);
    assert_eq!(h.mirror.state.pushes(), 1);
}
