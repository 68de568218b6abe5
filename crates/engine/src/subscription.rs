//! Live progress subscription for one job at a time.
//!
//! The manager owns at most one store subscription per orchestrator
//! instance. Each snapshot is projected through the pure stage projection;
//! out-of-order stage numbers are discarded so the UI only ever observes
//! non-decreasing progress. The first terminal snapshot invokes the
//! terminal callback and implicitly detaches; later touches of the record
//! are never read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use wayfarer_core::error::JobError;
use wayfarer_core::job::{GenerationJob, JobResult};
use wayfarer_core::stage::{stage_advances, StageModel};
use wayfarer_core::types::JobId;

use crate::resolver::JobOutcome;
use crate::store::{JobStore, StoreError};

/// Delay between subscribe retries while the store self-heals.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

struct ActiveSubscription {
    job_id: JobId,
    token: CancellationToken,
}

/// Opens and tears down the single live subscription.
pub struct SubscriptionManager {
    store: Arc<dyn JobStore>,
    active: Mutex<Option<ActiveSubscription>>,
}

impl SubscriptionManager {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            active: Mutex::new(None),
        }
    }

    /// Attach to a job's live feed.
    ///
    /// Idempotent: attaching to the job that is already live keeps the
    /// existing subscription; attaching to a different job detaches the
    /// old one first, so no two subscriptions are ever live at once.
    /// The feed is opened before this returns, so a write that lands right
    /// after `attach` is already covered. The spawned reader also stops
    /// when `parent` is cancelled.
    pub async fn attach<U, T>(
        &self,
        job_id: JobId,
        parent: &CancellationToken,
        on_update: U,
        on_terminal: T,
    ) where
        U: Fn(StageModel) + Send + Sync + 'static,
        T: FnOnce(JobOutcome) + Send + 'static,
    {
        let mut active = self.active.lock().await;

        if let Some(prev) = active.take() {
            if prev.job_id == job_id && !prev.token.is_cancelled() {
                *active = Some(prev);
                return;
            }
            tracing::debug!(old_job_id = %prev.job_id, new_job_id = %job_id, "detaching previous subscription");
            prev.token.cancel();
        }

        // Open the feed up front; only a transient failure is deferred to
        // the reader's retry loop.
        let initial = match self.store.subscribe(job_id).await {
            Ok(rx) => Some(rx),
            Err(StoreError::PermissionDenied(msg)) => {
                tracing::error!(%job_id, error = %msg, "store denied the subscription");
                on_terminal(Err(JobError::Channel(msg)));
                return;
            }
            Err(e) => {
                tracing::warn!(%job_id, error = %e, "store subscription unavailable; deferring to retry");
                None
            }
        };

        let token = parent.child_token();
        let store = Arc::clone(&self.store);
        tokio::spawn(run_subscription(
            store,
            job_id,
            initial,
            token.clone(),
            on_update,
            on_terminal,
        ));

        *active = Some(ActiveSubscription { job_id, token });
    }

    /// Stop the live subscription. Safe to call repeatedly; a second call
    /// is a no-op.
    pub async fn detach(&self) {
        if let Some(sub) = self.active.lock().await.take() {
            sub.token.cancel();
        }
    }
}

async fn run_subscription<U, T>(
    store: Arc<dyn JobStore>,
    job_id: JobId,
    initial: Option<broadcast::Receiver<GenerationJob>>,
    token: CancellationToken,
    on_update: U,
    on_terminal: T,
) where
    U: Fn(StageModel) + Send + Sync + 'static,
    T: FnOnce(JobOutcome) + Send + 'static,
{
    // The callback is consumed by the first terminal signal.
    let mut on_terminal = Some(on_terminal);

    // Use the feed `attach` already opened, or wait out transient store
    // failures here. A record that never becomes subscribable is covered
    // by the backstop timer, not by an error.
    let mut rx = match initial {
        Some(rx) => rx,
        None => loop {
            tokio::select! {
                _ = token.cancelled() => return,
                subscribed = store.subscribe(job_id) => match subscribed {
                    Ok(rx) => break rx,
                    Err(StoreError::PermissionDenied(msg)) => {
                        tracing::error!(%job_id, error = %msg, "store denied the subscription");
                        if let Some(terminal) = on_terminal.take() {
                            terminal(Err(JobError::Channel(msg)));
                        }
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(%job_id, error = %e, "store subscription unavailable; retrying");
                        tokio::select! {
                            _ = token.cancelled() => return,
                            _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
                        }
                    }
                }
            }
        },
    };

    let mut seen_stage: Option<u32> = None;

    loop {
        tokio::select! {
            // Checked first: a detached reader must not surface an update
            // that raced with its cancellation.
            biased;
            _ = token.cancelled() => return,
            received = rx.recv() => match received {
                Ok(job) => {
                    if job.status.is_terminal() {
                        tracing::info!(%job_id, status = job.status.as_str(), "job reached terminal status");
                        if let Some(terminal) = on_terminal.take() {
                            terminal(JobResult::from_job(&job));
                        }
                        // Implicit detach: stop reading even if the record
                        // is touched again.
                        return;
                    }

                    if stage_advances(seen_stage, job.progress.stage) {
                        seen_stage = Some(job.progress.stage);
                        on_update(StageModel::project(&job.progress));
                    } else {
                        tracing::debug!(
                            %job_id,
                            stage = job.progress.stage,
                            seen = seen_stage,
                            "discarded out-of-order progress update",
                        );
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    // Transient: the next snapshot carries the full state.
                    tracing::warn!(%job_id, skipped, "progress channel lagged; continuing");
                }
                Err(RecvError::Closed) => {
                    tracing::error!(%job_id, "progress channel closed before a terminal status");
                    if let Some(terminal) = on_terminal.take() {
                        terminal(Err(JobError::Channel(
                            "progress channel closed before a terminal status".into(),
                        )));
                    }
                    return;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
