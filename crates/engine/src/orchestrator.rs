//! The job submission orchestrator.
//!
//! `submit()` makes exactly one backend call, then wires the resolver
//! registry, the live subscription, and the recovery monitor together so
//! the caller's future settles exactly once: with the result, or with one
//! error from the protocol taxonomy. A driver task owns the submission
//! lifecycle, so the orchestrator cannot be wedged by a caller dropping
//! the `submit()` future mid-await.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch, Mutex};
use tokio_util::sync::CancellationToken;
use wayfarer_core::error::JobError;
use wayfarer_core::job::{JobResult, Progress};
use wayfarer_core::request::ItineraryRequest;
use wayfarer_core::stage::{StageModel, TOTAL_STAGES};
use wayfarer_core::types::{JobId, RequesterId};

use crate::backend::{BackendError, GenerationBackend};
use crate::config::EngineConfig;
use crate::estimate::EstimateCache;
use crate::recovery::RecoveryMonitor;
use crate::resolver::{JobOutcome, ResolverRegistry};
use crate::store::JobStore;
use crate::subscription::SubscriptionManager;

// ---------------------------------------------------------------------------
// Observable state
// ---------------------------------------------------------------------------

/// What a UI layer can observe between and after submissions.
#[derive(Debug, Clone, Default)]
pub struct GeneratorState {
    pub is_generating: bool,
    pub progress: Option<StageModel>,
    pub error: Option<String>,
    pub result: Option<JobResult>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

struct InFlight {
    /// Registry key of the pending submission. `None` until the backend
    /// call returns (or times out into the placeholder-key path).
    key: Option<JobId>,
    token: CancellationToken,
}

/// One orchestrator instance drives one generation job at a time.
///
/// All coordination state (the resolver map, the single subscription
/// handle) is owned by the instance; separate instances never share it.
pub struct ItineraryGenerator {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn GenerationBackend>,
    store: Arc<dyn JobStore>,
    registry: Arc<ResolverRegistry>,
    subscriptions: SubscriptionManager,
    estimates: EstimateCache,
    config: EngineConfig,
    identity: Option<RequesterId>,
    state: watch::Sender<GeneratorState>,
    in_flight: Mutex<Option<InFlight>>,
}

impl ItineraryGenerator {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        store: Arc<dyn JobStore>,
        identity: Option<RequesterId>,
        config: EngineConfig,
    ) -> Self {
        let (state, _) = watch::channel(GeneratorState::default());
        Self {
            inner: Arc::new(Inner {
                subscriptions: SubscriptionManager::new(Arc::clone(&store)),
                estimates: EstimateCache::new(Arc::clone(&backend), config.estimate_ttl),
                registry: Arc::new(ResolverRegistry::new()),
                backend,
                store,
                config,
                identity,
                state,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Watch the observable state.
    pub fn state(&self) -> watch::Receiver<GeneratorState> {
        self.inner.state.subscribe()
    }

    /// Current observable state, for callers that don't need a watcher.
    pub fn snapshot(&self) -> GeneratorState {
        self.inner.state.borrow().clone()
    }

    /// Submit a generation job and await its single outcome.
    pub async fn submit(&self, request: ItineraryRequest) -> Result<JobResult, JobError> {
        let inner = &self.inner;
        let requester = inner.identity.ok_or(JobError::Unauthenticated)?;
        request.validate_for_submit()?;

        let token = CancellationToken::new();
        {
            let mut in_flight = inner.in_flight.lock().await;
            if in_flight.is_some() {
                return Err(JobError::InvalidState);
            }
            *in_flight = Some(InFlight {
                key: None,
                token: token.clone(),
            });
        }

        tracing::info!(
            requester,
            destination = %request.destination,
            "submitting generation job",
        );
        inner.state.send_replace(GeneratorState {
            is_generating: true,
            progress: Some(StageModel::project(&Progress::initial(TOTAL_STAGES))),
            error: None,
            result: None,
        });

        let (done_tx, done_rx) = oneshot::channel();
        tokio::spawn(Inner::drive(
            Arc::clone(inner),
            request,
            requester,
            token,
            done_tx,
        ));

        done_rx
            .await
            .unwrap_or(Err(JobError::Channel("submission driver stopped".into())))
    }

    /// Stop waiting for the in-flight job and reject its outcome with
    /// `Cancelled`. Client-local only: the backend may keep working on the
    /// job; this is a documented limitation of the protocol, not a bug.
    pub async fn cancel(&self) {
        let current = {
            let in_flight = self.inner.in_flight.lock().await;
            in_flight.as_ref().map(|f| (f.key, f.token.clone()))
        };

        if let Some((key, token)) = current {
            tracing::info!("cancelling the in-flight submission");
            token.cancel();
            if let Some(key) = key {
                self.inner.registry.fire(key, Err(JobError::Cancelled));
            }
        }
    }

    /// Cancel anything in flight and clear all observable state. Safe to
    /// call at any time, including mid-flight.
    pub async fn reset(&self) {
        self.cancel().await;
        // Let the driver finish its cleanup so the cleared state is final.
        while self.inner.in_flight.lock().await.is_some() {
            tokio::task::yield_now().await;
        }
        self.inner.state.send_replace(GeneratorState::default());
    }

    /// Advisory cost estimate, cached and rate-limit tolerant.
    pub async fn estimate(&self, request: &ItineraryRequest) -> Result<f64, JobError> {
        self.inner.estimates.estimate(request).await
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

impl Inner {
    /// Owns one submission end to end: run the protocol, then tear down
    /// the subscription and timers, clear the in-flight slot, and publish
    /// the outcome.
    async fn drive(
        inner: Arc<Inner>,
        request: ItineraryRequest,
        requester: RequesterId,
        token: CancellationToken,
        done_tx: oneshot::Sender<JobOutcome>,
    ) {
        let outcome = Self::run_submission(&inner, &request, requester, &token).await;

        inner.subscriptions.detach().await;
        token.cancel();
        *inner.in_flight.lock().await = None;
        inner.publish_outcome(&outcome);

        // A dropped receiver just means the caller stopped waiting.
        let _ = done_tx.send(outcome);
    }

    async fn run_submission(
        inner: &Arc<Inner>,
        request: &ItineraryRequest,
        requester: RequesterId,
        token: &CancellationToken,
    ) -> JobOutcome {
        let (resolve_tx, resolve_rx) = oneshot::channel();

        let call = tokio::select! {
            _ = token.cancelled() => return Err(JobError::Cancelled),
            result = tokio::time::timeout(
                inner.config.submit_call_timeout,
                inner.backend.submit(request, requester),
            ) => result,
        };

        let pending_key = match call {
            Ok(Ok(job_id)) => {
                tracing::info!(%job_id, requester, "backend accepted the job");
                if inner.registry.register(job_id, resolve_tx).is_err() {
                    return Err(JobError::InvalidState);
                }
                ResolverRegistry::arm_backstop(
                    &inner.registry,
                    job_id,
                    inner.config.backstop_after_accept(),
                );

                let registry = Arc::clone(&inner.registry);
                let progress_inner = Arc::clone(inner);
                inner
                    .subscriptions
                    .attach(
                        job_id,
                        token,
                        move |model| progress_inner.publish_progress(model),
                        move |outcome| {
                            registry.fire(job_id, outcome);
                        },
                    )
                    .await;

                // If the subscription goes quiet past the grace window,
                // recovery takes over.
                Self::spawn_recovery(inner, requester, job_id, inner.config.grace_window, token);
                job_id
            }
            Ok(Err(BackendError::Rejected(msg))) => {
                tracing::warn!(requester, error = %msg, "backend rejected the submission");
                return Err(JobError::BackendRejected(msg));
            }
            Ok(Err(e)) => {
                tracing::error!(requester, error = %e, "submission call failed");
                return Err(JobError::BackendRejected(e.to_string()));
            }
            Err(_) => {
                // The call timed out before producing a job id; the job
                // itself may well be running. Register under an
                // engine-local placeholder key and let recovery find the
                // completed job by requester + recency.
                let placeholder = uuid::Uuid::new_v4();
                tracing::warn!(
                    requester,
                    "submission call timed out before a job id; entering recovery",
                );
                if inner.registry.register(placeholder, resolve_tx).is_err() {
                    return Err(JobError::InvalidState);
                }
                ResolverRegistry::arm_backstop(
                    &inner.registry,
                    placeholder,
                    inner.config.backstop_after_call_timeout(),
                );
                Self::spawn_recovery(inner, requester, placeholder, Duration::ZERO, token);
                placeholder
            }
        };

        // Expose the key so `cancel()` can fire the pending entry; if a
        // cancel slipped in while the key was unknown, honor it now.
        {
            let mut in_flight = inner.in_flight.lock().await;
            if let Some(current) = in_flight.as_mut() {
                current.key = Some(pending_key);
            }
        }
        if token.is_cancelled() {
            inner.registry.fire(pending_key, Err(JobError::Cancelled));
        }

        match resolve_rx.await {
            Ok(outcome) => outcome,
            // The entry was cleared without firing.
            Err(_) => Err(JobError::Cancelled),
        }
    }

    fn spawn_recovery(
        inner: &Arc<Inner>,
        requester: RequesterId,
        pending_key: JobId,
        delay: Duration,
        token: &CancellationToken,
    ) {
        let monitor = RecoveryMonitor::new(
            Arc::clone(&inner.store),
            Arc::clone(&inner.registry),
            requester,
            pending_key,
            inner.config.recovery_window,
            inner.config.recovery_poll_interval,
        );
        let progress_inner = Arc::clone(inner);
        tokio::spawn(monitor.run(delay, token.child_token(), move |model| {
            progress_inner.publish_progress(model)
        }));
    }

    fn publish_progress(&self, model: StageModel) {
        self.state.send_modify(|state| {
            if state.is_generating {
                state.progress = Some(model);
            }
        });
    }

    fn publish_outcome(&self, outcome: &JobOutcome) {
        self.state.send_modify(|state| {
            state.is_generating = false;
            match outcome {
                Ok(result) => {
                    state.result = Some(result.clone());
                    state.error = None;
                }
                Err(e) => {
                    state.error = Some(e.to_string());
                }
            }
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryJobStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use wayfarer_core::request::PreferenceProfile;

    struct IdleBackend;

    #[async_trait]
    impl GenerationBackend for IdleBackend {
        async fn submit(
            &self,
            _request: &ItineraryRequest,
            _requester: RequesterId,
        ) -> Result<JobId, BackendError> {
            Err(BackendError::Rejected("no capacity".into()))
        }

        async fn estimate(&self, _request: &ItineraryRequest) -> Result<f64, BackendError> {
            Ok(1_000.0)
        }
    }

    fn generator(identity: Option<RequesterId>) -> ItineraryGenerator {
        ItineraryGenerator::new(
            Arc::new(IdleBackend),
            Arc::new(MemoryJobStore::new()),
            identity,
            EngineConfig::default(),
        )
    }

    fn request() -> ItineraryRequest {
        ItineraryRequest {
            destination: "Rome".into(),
            start_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2030, 1, 5).unwrap(),
            group_size: 2,
            budget: None,
            notes: None,
            profile: Some(PreferenceProfile {
                id: 11,
                interests: vec![],
                travel_style: None,
                budget_ceiling: None,
            }),
        }
    }

    #[tokio::test]
    async fn missing_identity_fails_before_any_call() {
        let generator = generator(None);
        assert_eq!(
            generator.submit(request()).await.unwrap_err(),
            JobError::Unauthenticated
        );
        assert!(!generator.snapshot().is_generating);
    }

    #[tokio::test]
    async fn invalid_request_fails_before_any_call() {
        let generator = generator(Some(1));
        let mut req = request();
        req.profile = None;
        assert!(matches!(
            generator.submit(req).await.unwrap_err(),
            JobError::InvalidRequest(_)
        ));
    }

    #[tokio::test]
    async fn backend_rejection_surfaces_and_clears_state() {
        let generator = generator(Some(1));
        let err = generator.submit(request()).await.unwrap_err();
        assert_eq!(err, JobError::BackendRejected("no capacity".into()));

        let state = generator.snapshot();
        assert!(!state.is_generating);
        assert!(state.error.is_some());
        assert!(state.result.is_none());
    }

    #[tokio::test]
    async fn cancel_without_submission_is_a_noop() {
        let generator = generator(Some(1));
        generator.cancel().await;
        generator.reset().await;
        assert!(!generator.snapshot().is_generating);
    }
}
