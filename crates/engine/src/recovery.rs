//! Timeout & recovery: attributing a just-completed job to a submission
//! whose call timed out, or whose live subscription went quiet.
//!
//! The monitor polls the store for the requester's most recent completed
//! job and accepts it only inside a bounded recency window, so stale jobs
//! are never misattributed to the current attempt. While polling it emits
//! synthetic, clearly-flagged progress frames so the UI keeps moving;
//! those frames carry no authority.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use wayfarer_core::error::JobError;
use wayfarer_core::job::JobResult;
use wayfarer_core::recovery::acceptable_candidate;
use wayfarer_core::stage::{StageModel, TOTAL_STAGES};
use wayfarer_core::types::{JobId, RequesterId};

use crate::resolver::ResolverRegistry;
use crate::store::JobStore;

/// Message shown on synthetic frames while recovery polls.
const SYNTHETIC_MESSAGE: &str = "Still working on your itinerary";

/// One recovery attempt for one pending submission.
pub struct RecoveryMonitor {
    store: Arc<dyn JobStore>,
    registry: Arc<ResolverRegistry>,
    requester: RequesterId,
    /// The registry key this monitor is armed for. In the call-timeout
    /// path this is the engine-local placeholder id, never a real job id.
    pending_key: JobId,
    window: Duration,
    poll_interval: Duration,
}

impl RecoveryMonitor {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<ResolverRegistry>,
        requester: RequesterId,
        pending_key: JobId,
        window: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            registry,
            requester,
            pending_key,
            window,
            poll_interval,
        }
    }

    /// Run until the pending entry resolves, the window is exhausted, or
    /// the token is cancelled. `delay` is zero when the submission call
    /// itself timed out, or the grace window when the job id is known.
    pub async fn run<U>(self, delay: Duration, token: CancellationToken, on_update: U)
    where
        U: Fn(StageModel) + Send + Sync + 'static,
    {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        // The live subscription may have resolved everything during the
        // grace period.
        if !self.registry.is_pending(self.pending_key) {
            return;
        }

        tracing::info!(
            requester = self.requester,
            window_secs = self.window.as_secs(),
            "starting recovery poll",
        );

        let deadline = tokio::time::Instant::now() + self.window;
        let mut ticker = tokio::time::interval(self.poll_interval);
        let mut synthetic_stage: u32 = 1;

        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = ticker.tick() => {
                    if tokio::time::Instant::now() >= deadline {
                        if self.registry.fire(self.pending_key, Err(JobError::Timeout)) {
                            tracing::warn!(
                                requester = self.requester,
                                "recovery window exhausted without a candidate",
                            );
                        }
                        return;
                    }

                    match self.store.latest_completed(self.requester).await {
                        Ok(Some(job))
                            if acceptable_candidate(&job, self.requester, Utc::now(), self.window) =>
                        {
                            match JobResult::from_job(&job) {
                                Ok(result) => {
                                    // The recovered id may differ from the one the
                                    // orchestrator originally expected; the match is
                                    // requester + recency + terminal-success.
                                    if self.registry.fire(self.pending_key, Ok(result)) {
                                        tracing::info!(
                                            job_id = %job.id,
                                            requester = self.requester,
                                            "recovered a completed job",
                                        );
                                    }
                                    return;
                                }
                                Err(e) => {
                                    tracing::debug!(job_id = %job.id, error = %e, "candidate record unusable");
                                }
                            }
                        }
                        Ok(_) => {
                            // Cosmetic filler for the waiting period only.
                            synthetic_stage = (synthetic_stage + 1).min(TOTAL_STAGES);
                            on_update(StageModel::synthetic(synthetic_stage, SYNTHETIC_MESSAGE));
                        }
                        Err(e) if e.is_transient() => {
                            tracing::warn!(error = %e, "recovery poll failed; retrying");
                        }
                        Err(e) => {
                            // The backstop timer still guarantees an outcome.
                            tracing::error!(error = %e, "recovery poll failed; giving up");
                            return;
                        }
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryJobStore;
    use tokio::sync::oneshot;
    use wayfarer_core::job::GenerationJob;

    const WINDOW: Duration = Duration::from_secs(300);
    const POLL: Duration = Duration::from_secs(5);

    async fn completed_job(store: &MemoryJobStore, requester: RequesterId, age_secs: i64) -> JobId {
        let job = GenerationJob::accepted(
            uuid::Uuid::new_v4(),
            requester,
            serde_json::json!({}),
            5,
            Utc::now() - chrono::Duration::seconds(age_secs),
        );
        let id = job.id;
        store.insert(job).await;
        store.complete(id, serde_json::json!({"days": []})).await;
        id
    }

    fn monitor(
        store: &Arc<MemoryJobStore>,
        registry: &Arc<ResolverRegistry>,
        pending_key: JobId,
    ) -> RecoveryMonitor {
        RecoveryMonitor::new(
            Arc::clone(store) as Arc<dyn JobStore>,
            Arc::clone(registry),
            1,
            pending_key,
            WINDOW,
            POLL,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_candidate_resolves_the_pending_entry() {
        let store = Arc::new(MemoryJobStore::new());
        let recovered = completed_job(&store, 1, 30).await;

        let registry = Arc::new(ResolverRegistry::new());
        let pending_key = uuid::Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        registry.register(pending_key, tx).unwrap();

        tokio::spawn(monitor(&store, &registry, pending_key).run(
            Duration::ZERO,
            CancellationToken::new(),
            |_| {},
        ));

        let outcome = rx.await.unwrap();
        let result = outcome.unwrap();
        assert_eq!(result.id, recovered);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_candidate_times_out_instead() {
        let store = Arc::new(MemoryJobStore::new());
        completed_job(&store, 1, 600).await; // 10 minutes old, outside the window

        let registry = Arc::new(ResolverRegistry::new());
        let pending_key = uuid::Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        registry.register(pending_key, tx).unwrap();

        tokio::spawn(monitor(&store, &registry, pending_key).run(
            Duration::ZERO,
            CancellationToken::new(),
            |_| {},
        ));

        assert_eq!(rx.await.unwrap(), Err(JobError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn other_requesters_jobs_are_ignored() {
        let store = Arc::new(MemoryJobStore::new());
        completed_job(&store, 2, 30).await;

        let registry = Arc::new(ResolverRegistry::new());
        let pending_key = uuid::Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        registry.register(pending_key, tx).unwrap();

        tokio::spawn(monitor(&store, &registry, pending_key).run(
            Duration::ZERO,
            CancellationToken::new(),
            |_| {},
        ));

        assert_eq!(rx.await.unwrap(), Err(JobError::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn synthetic_frames_are_emitted_while_waiting() {
        let store = Arc::new(MemoryJobStore::new());
        let registry = Arc::new(ResolverRegistry::new());
        let pending_key = uuid::Uuid::new_v4();
        let (tx, _rx) = oneshot::channel();
        registry.register(pending_key, tx).unwrap();

        let (frame_tx, mut frame_rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(monitor(&store, &registry, pending_key).run(
            Duration::ZERO,
            CancellationToken::new(),
            move |model| {
                let _ = frame_tx.send(model);
            },
        ));

        let first = frame_rx.recv().await.unwrap();
        let second = frame_rx.recv().await.unwrap();
        assert!(first.synthetic);
        assert!(second.synthetic);
        assert!(second.active_stage >= first.active_stage);
        assert!(second.active_stage <= TOTAL_STAGES);
    }

    #[tokio::test(start_paused = true)]
    async fn grace_delay_skips_recovery_when_already_resolved() {
        let store = Arc::new(MemoryJobStore::new());
        let registry = Arc::new(ResolverRegistry::new());
        let pending_key = uuid::Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        registry.register(pending_key, tx).unwrap();

        let handle = tokio::spawn(monitor(&store, &registry, pending_key).run(
            Duration::from_secs(60),
            CancellationToken::new(),
            |_| {},
        ));

        // The live path resolves during the grace period.
        registry.fire(pending_key, Err(JobError::Cancelled));
        assert_eq!(rx.await.unwrap(), Err(JobError::Cancelled));

        handle.await.unwrap();
        assert!(!registry.is_pending(pending_key));
    }
}
