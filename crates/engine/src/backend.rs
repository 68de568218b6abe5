//! The generation backend seam.
//!
//! The backend owns the itinerary-content generation itself (model
//! prompting, lookups); this engine only submits work to it and reads the
//! job id back. The submission call carries a caller-configured deadline
//! and may exceed it without the underlying job failing; that case is
//! what the recovery path exists for.

use async_trait::async_trait;
use wayfarer_core::request::ItineraryRequest;
use wayfarer_core::types::{JobId, RequesterId};

pub mod http;

/// Errors from the generation backend entry point.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    /// The backend handled the call and refused it before producing a job.
    #[error("{0}")]
    Rejected(String),

    /// Too many estimate calls; the caller should fall back locally.
    #[error("rate limited")]
    RateLimited,

    /// The call failed outright (network, 5xx).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// The backend job-submission entry point.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Ask the backend to start a generation job. On success the job
    /// record already exists in the store under the returned id.
    async fn submit(
        &self,
        request: &ItineraryRequest,
        requester: RequesterId,
    ) -> Result<JobId, BackendError>;

    /// Advisory cost estimate for a (possibly incomplete) request.
    async fn estimate(&self, request: &ItineraryRequest) -> Result<f64, BackendError>;
}
