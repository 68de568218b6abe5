//! The error taxonomy for the generation job protocol.

/// Outcome-bearing error for one itinerary generation submission.
///
/// `Unauthenticated`, `InvalidRequest`, `InvalidState`, and
/// `BackendRejected` are detected synchronously, before a pending resolver
/// exists. The remaining variants are delivered through the single resolver
/// entry for the submission, so a caller observes exactly one outcome no
/// matter which path produced it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("No requester identity available")]
    Unauthenticated,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("A generation job is already in flight")]
    InvalidState,

    #[error("Generation request rejected: {0}")]
    BackendRejected(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Timed out waiting for the generation job")]
    Timeout,

    #[error("Generation cancelled")]
    Cancelled,

    #[error("Progress channel failed: {0}")]
    Channel(String),
}

impl JobError {
    /// Stable machine-readable code, used by the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidState => "INVALID_STATE",
            Self::BackendRejected(_) => "BACKEND_REJECTED",
            Self::GenerationFailed(_) => "GENERATION_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Channel(_) => "CHANNEL_ERROR",
        }
    }
}
