//! The Job Record Store seam.
//!
//! The store is an external collaborator: it is mutated exclusively by the
//! backend worker, while this engine only reads and subscribes. The trait
//! exposes exactly what the protocol needs: a point read, the recovery
//! query, and a live per-job subscription.

use async_trait::async_trait;
use tokio::sync::broadcast;
use wayfarer_core::job::GenerationJob;
use wayfarer_core::types::{JobId, RequesterId};

pub mod memory;

/// Errors from the Job Record Store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(JobId),

    /// The store is momentarily unreachable. Transient: callers log and
    /// keep waiting for the channel to self-heal.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Authorization failure. Non-transient: escalated to the caller.
    #[error("store permission denied: {0}")]
    PermissionDenied(String),
}

impl StoreError {
    /// Whether waiting and retrying is the right response.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Read/subscribe access to generation job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Point read of one job record.
    async fn fetch(&self, job_id: JobId) -> Result<Option<GenerationJob>, StoreError>;

    /// The most recently created `completed` job for a requester
    /// (created-at descending, limit one). Drives recovery polling.
    async fn latest_completed(
        &self,
        requester: RequesterId,
    ) -> Result<Option<GenerationJob>, StoreError>;

    /// Live subscription: the receiver yields a full job snapshot after
    /// every write to the record.
    async fn subscribe(
        &self,
        job_id: JobId,
    ) -> Result<broadcast::Receiver<GenerationJob>, StoreError>;
}
