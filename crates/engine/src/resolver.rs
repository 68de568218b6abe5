//! The resolver registry: the bridge between a synchronous `submit()` call
//! and the asynchronous arrival of its one outcome.
//!
//! Whichever path reports first (live subscription, recovery poll, or the
//! backstop timer) fires the entry; every later signal for the same job is
//! a no-op. The map is constructor-owned, one per orchestrator instance,
//! so concurrent instances (tests included) can never cross-contaminate
//! pending resolvers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use wayfarer_core::error::JobError;
use wayfarer_core::job::JobResult;
use wayfarer_core::types::JobId;

/// The single outcome of one submission.
pub type JobOutcome = Result<JobResult, JobError>;

/// Duplicate registration is a programmer error (double-submission bug),
/// never silently absorbed.
#[derive(Debug, thiserror::Error)]
#[error("a resolver is already registered for job {0}")]
pub struct AlreadyRegistered(pub JobId);

struct PendingResolver {
    sender: oneshot::Sender<JobOutcome>,
    backstop: Option<AbortHandle>,
}

/// At-most-once outcome delivery, keyed by job id.
pub struct ResolverRegistry {
    entries: Mutex<HashMap<JobId, PendingResolver>>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, PendingResolver>> {
        // A poisoned lock only means a panic elsewhere; the map itself is
        // still consistent (every mutation is a single insert or remove).
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register the pending resolver for a job.
    pub fn register(
        &self,
        job_id: JobId,
        sender: oneshot::Sender<JobOutcome>,
    ) -> Result<(), AlreadyRegistered> {
        let mut entries = self.lock();
        if entries.contains_key(&job_id) {
            return Err(AlreadyRegistered(job_id));
        }
        entries.insert(
            job_id,
            PendingResolver {
                sender,
                backstop: None,
            },
        );
        Ok(())
    }

    /// Start the backstop timer for a registered entry: after `deadline`
    /// the entry fires with `Timeout`, so the caller's future is never
    /// left pending forever. The timer's abort handle is owned by the
    /// entry and aborted the instant the entry fires through any path.
    pub fn arm_backstop(registry: &Arc<Self>, job_id: JobId, deadline: Duration) {
        let owned = Arc::clone(registry);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            if owned.fire(job_id, Err(JobError::Timeout)) {
                tracing::warn!(%job_id, "backstop deadline elapsed; submission timed out");
            }
        })
        .abort_handle();

        let mut entries = registry.lock();
        match entries.get_mut(&job_id) {
            Some(entry) => entry.backstop = Some(handle),
            // The entry already fired between registration and arming.
            None => handle.abort(),
        }
    }

    /// Deliver the outcome for a job. Returns `true` and consumes the
    /// entry if one was pending; `false` (no-op) otherwise. This is what
    /// makes racing terminal signals safe.
    pub fn fire(&self, job_id: JobId, outcome: JobOutcome) -> bool {
        let entry = self.lock().remove(&job_id);
        match entry {
            Some(entry) => {
                if let Some(backstop) = entry.backstop {
                    backstop.abort();
                }
                // A dropped receiver just means the caller went away.
                let _ = entry.sender.send(outcome);
                true
            }
            None => {
                tracing::debug!(%job_id, "no pending resolver; terminal signal ignored");
                false
            }
        }
    }

    /// Drop a pending entry without delivering an outcome. The awaiting
    /// side observes a closed channel.
    pub fn clear(&self, job_id: JobId) {
        if let Some(entry) = self.lock().remove(&job_id) {
            if let Some(backstop) = entry.backstop {
                backstop.abort();
            }
        }
    }

    pub fn is_pending(&self, job_id: JobId) -> bool {
        self.lock().contains_key(&job_id)
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wayfarer_core::job::JobStatus;

    fn result(job_id: JobId) -> JobResult {
        JobResult {
            id: job_id,
            request: serde_json::Value::Null,
            response: serde_json::json!({}),
            status: JobStatus::Completed,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn fire_delivers_exactly_once() {
        let registry = ResolverRegistry::new();
        let job_id = uuid::Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        registry.register(job_id, tx).unwrap();

        assert!(registry.fire(job_id, Ok(result(job_id))));
        assert!(!registry.fire(job_id, Err(JobError::Timeout)));

        let outcome = rx.await.unwrap();
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn fire_unregistered_job_is_noop() {
        let registry = ResolverRegistry::new();
        assert!(!registry.fire(uuid::Uuid::new_v4(), Err(JobError::Timeout)));
    }

    #[tokio::test]
    async fn duplicate_registration_raises() {
        let registry = ResolverRegistry::new();
        let job_id = uuid::Uuid::new_v4();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();

        registry.register(job_id, tx1).unwrap();
        let err = registry.register(job_id, tx2).unwrap_err();
        assert_eq!(err.0, job_id);
        // The original entry survives the failed attempt.
        assert!(registry.is_pending(job_id));
    }

    #[tokio::test]
    async fn clear_drops_entry_without_outcome() {
        let registry = ResolverRegistry::new();
        let job_id = uuid::Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        registry.register(job_id, tx).unwrap();

        registry.clear(job_id);
        assert!(!registry.is_pending(job_id));
        assert!(rx.await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn backstop_fires_timeout() {
        let registry = Arc::new(ResolverRegistry::new());
        let job_id = uuid::Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        registry.register(job_id, tx).unwrap();
        ResolverRegistry::arm_backstop(&registry, job_id, Duration::from_secs(30));

        let outcome = rx.await.unwrap();
        assert_eq!(outcome, Err(JobError::Timeout));
        assert!(!registry.is_pending(job_id));
    }

    #[tokio::test(start_paused = true)]
    async fn firing_cancels_the_backstop() {
        let registry = Arc::new(ResolverRegistry::new());
        let job_id = uuid::Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        registry.register(job_id, tx).unwrap();
        ResolverRegistry::arm_backstop(&registry, job_id, Duration::from_secs(30));

        assert!(registry.fire(job_id, Ok(result(job_id))));

        // Jump far past the backstop deadline; the aborted timer must not
        // have produced a second outcome (the channel is consumed).
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.await.unwrap().is_ok());
    }
}
