//! Sync orchestrator.
//!
//! A single worker task owns every sync cycle, so two cycles never overlap.
//! Both triggers, the recurring timer and [`SyncHandle::sync_now`], go
//! through the same request queue. Requests that arrive while a cycle is
//! running are coalesced into the next cycle and share its outcome.
//!
//! # Cycle
//!
//! 1. Pull the remote snapshot. A failure aborts the cycle.
//! 2. Merge it into the store and persist, under the store lock on the
//!    blocking pool.
//! 3. Push the pending records one at a time, outside the lock.
//! 4. Re-acquire the lock, fold the push results back into the slots they
//!    were captured from, persist once.
//! 5. Publish the outcome to the status watchers and the notifier.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use quotesync_engine::{PendingPush, PushDecision, PushOutcome};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SyncConfig;
use crate::notify::Notifier;
use crate::remote::RemoteMirror;
use crate::{with_store, SharedStore};

pub const SYNC_FAILED_NOTICE: &str = "Sync failed. Check your connection and try again.";
pub const NO_CHANGES_NOTICE: &str = "Sync complete: no changes";

const REQUEST_QUEUE: usize = 64;

/// Where the orchestrator currently is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    #[default]
    Idle,
    Pulling,
    Merging,
    Pushing,
}

/// Counts describing one completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Remote records new to the local collection
    pub additions: usize,
    /// Local records overwritten by the remote version
    pub replacements: usize,
    /// Ids whose content differed on both sides
    pub conflicts: usize,
    /// Local records acknowledged by the remote mirror this cycle
    pub pushed: usize,
    /// Records that failed or were deferred by backoff
    pub pending_retry: usize,
    /// Records that exhausted their retry budget this cycle
    pub abandoned: usize,
}

impl SyncReport {
    fn has_changes(&self) -> bool {
        self.additions + self.replacements + self.pushed + self.pending_retry + self.abandoned > 0
    }

    fn parts(&self) -> Vec<String> {
        [
            (self.additions, "new from server"),
            (self.replacements, "replaced by server"),
            (self.pushed, "local synced"),
            (self.pending_retry, "pending retry"),
            (self.abandoned, "delivery abandoned"),
        ]
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, label)| format!("{} {}", count, label))
        .collect()
    }
}

/// Result of one sync cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SyncOutcome {
    /// The cycle completed and changed something
    Synced(SyncReport),
    /// The cycle completed without any change
    NoChanges,
    /// The pull step failed; nothing was merged or pushed
    Failed { reason: String },
}

impl SyncOutcome {
    /// The user-facing notification text.
    pub fn message(&self) -> String {
        match self {
            SyncOutcome::Synced(report) => {
                format!("Sync complete: {}", report.parts().join(" • "))
            }
            SyncOutcome::NoChanges => NO_CHANGES_NOTICE.to_string(),
            SyncOutcome::Failed { .. } => SYNC_FAILED_NOTICE.to_string(),
        }
    }
}

/// Snapshot of the orchestrator state for status queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub last_outcome: Option<SyncOutcome>,
}

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("sync worker is not running")]
    WorkerStopped,
}

type Waiter = oneshot::Sender<SyncOutcome>;

/// Cheap, cloneable access to a running orchestrator.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    requests: mpsc::Sender<Waiter>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncHandle {
    /// Request a cycle and wait for its outcome.
    ///
    /// If a cycle is already running, the request joins the next one.
    pub async fn sync_now(&self) -> Result<SyncOutcome, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(tx)
            .await
            .map_err(|_| SyncError::WorkerStopped)?;
        rx.await.map_err(|_| SyncError::WorkerStopped)
    }

    /// Current phase and last outcome.
    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }
}

/// The single sync worker.
pub struct SyncOrchestrator {
    store: SharedStore,
    remote: Arc<dyn RemoteMirror>,
    notifier: Arc<dyn Notifier>,
    config: SyncConfig,
    status: watch::Sender<SyncStatus>,
    requests: mpsc::Receiver<Waiter>,
}

impl SyncOrchestrator {
    pub fn new(
        store: SharedStore,
        remote: Arc<dyn RemoteMirror>,
        notifier: Arc<dyn Notifier>,
        config: SyncConfig,
    ) -> (Self, SyncHandle) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE);
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());

        let orchestrator = Self {
            store,
            remote,
            notifier,
            config,
            status: status_tx,
            requests: request_rx,
        };
        let handle = SyncHandle {
            requests: request_tx,
            status: status_rx,
        };
        (orchestrator, handle)
    }

    /// Run the worker on the tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Serve triggers until every [`SyncHandle`] is dropped.
    pub async fn run(mut self) {
        let period = self.config.interval.max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + self.config.initial_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = period.as_secs(),
            initial_delay_ms = self.config.initial_delay.as_millis() as u64,
            "Sync worker started"
        );

        loop {
            let mut waiters = Vec::new();

            tokio::select! {
                _ = ticker.tick() => {
                    tracing::debug!("Timer triggered sync");
                }
                request = self.requests.recv() => match request {
                    Some(waiter) => waiters.push(waiter),
                    None => break,
                },
            }

            while let Ok(waiter) = self.requests.try_recv() {
                waiters.push(waiter);
            }

            let outcome = self.run_cycle().await;
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }

        tracing::info!("Sync worker stopped");
    }

    #[tracing::instrument(name = "sync_cycle", skip(self))]
    async fn run_cycle(&self) -> SyncOutcome {
        self.set_phase(SyncPhase::Pulling);
        let snapshot = match self.remote.fetch_remote(self.config.fetch_limit).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Pull failed, aborting cycle: {}", e);
                return self.finish(SyncOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };

        self.set_phase(SyncPhase::Merging);
        let fetched = snapshot.len();
        let merged = with_store(&self.store, move |store| {
            let summary = store.merge_remote(&snapshot);
            (summary, store.pending_pushes())
        })
        .await;
        let (summary, pending) = match merged {
            Ok(merged) => merged,
            Err(e) => {
                tracing::error!("Merge task failed: {}", e);
                return self.finish(SyncOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };
        tracing::debug!(
            fetched,
            additions = summary.additions,
            replacements = summary.replacements,
            pending = pending.len(),
            "Merged remote snapshot"
        );

        self.set_phase(SyncPhase::Pushing);
        let (outcomes, deferred) = self.push_pending(pending).await;
        let applied = with_store(&self.store, move |store| {
            store.apply_push_outcomes(outcomes)
        })
        .await;
        let acks = match applied {
            Ok(acks) => acks,
            Err(e) => {
                tracing::error!("Acknowledgment task failed: {}", e);
                return self.finish(SyncOutcome::Failed {
                    reason: e.to_string(),
                });
            }
        };
        if acks.id_collisions > 0 {
            tracing::debug!(
                collisions = acks.id_collisions,
                "Kept local ids for acknowledgments with taken remote ids"
            );
        }

        let report = SyncReport {
            additions: summary.additions,
            replacements: summary.replacements,
            conflicts: summary.conflicts,
            pushed: acks.acknowledged,
            pending_retry: acks.failed + deferred,
            abandoned: acks.abandoned,
        };

        let outcome = if report.has_changes() {
            SyncOutcome::Synced(report)
        } else {
            SyncOutcome::NoChanges
        };
        self.finish(outcome)
    }

    /// Push each record in order; returns the outcomes and how many records backed off.
    async fn push_pending(&self, pending: Vec<PendingPush>) -> (Vec<PushOutcome>, usize) {
        let mut outcomes = Vec::with_capacity(pending.len());
        let mut deferred = 0;

        for entry in pending {
            let record = &entry.record;
            match self.config.retry.decide(record, Utc::now()) {
                PushDecision::Attempt => {}
                PushDecision::Backoff { retry_at } => {
                    tracing::debug!(id = %record.id, %retry_at, "Push backing off");
                    deferred += 1;
                    continue;
                }
                PushDecision::Abandon => {
                    tracing::warn!(
                        id = %record.id,
                        attempts = record.push.attempts,
                        "Push retry budget exhausted, abandoning delivery"
                    );
                    outcomes.push(entry.abandoned());
                    continue;
                }
            }

            match self.remote.push_record(record).await {
                Ok(pushed) => {
                    tracing::debug!(local_id = %record.id, remote_id = %pushed.id, "Push acknowledged");
                    outcomes.push(entry.acknowledged(pushed));
                }
                Err(e) => {
                    tracing::warn!(
                        id = %record.id,
                        attempt = record.push.attempts + 1,
                        "Push failed: {}",
                        e
                    );
                    outcomes.push(entry.failed(Utc::now()));
                }
            }
        }

        (outcomes, deferred)
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.status.send_modify(|status| status.phase = phase);
    }

    fn finish(&self, outcome: SyncOutcome) -> SyncOutcome {
        tracing::info!(?outcome, "Sync cycle finished");
        self.status.send_modify(|status| {
            status.phase = SyncPhase::Idle;
            status.last_outcome = Some(outcome.clone());
        });
        self.notifier.notify(&outcome.message());
        outcome
    }
}
