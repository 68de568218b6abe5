//! Job record model for itinerary generation.
//!
//! A [`GenerationJob`] is owned by the backend worker: the client reads and
//! subscribes but never writes. Status transitions are monotonic: once a
//! terminal status is reached the record is never rewritten.

use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::types::{JobId, RequesterId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Generating,
    Completed,
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal (`Completed` or `Failed`).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Forward-only transition check.
    ///
    /// `Pending` may move to any later status, `Generating` only to a
    /// terminal one, and terminal statuses never change again.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        match self {
            Self::Pending => next != Self::Pending,
            Self::Generating => next.is_terminal(),
            Self::Completed | Self::Failed => false,
        }
    }

    /// Stable string form, matching the stored representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Raw progress counters written by the backend worker.
///
/// `stage` is 1-based and non-decreasing across successive writes for the
/// same job; `total_stages` is always `>= stage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub stage: u32,
    pub total_stages: u32,
    pub message: String,
}

impl Progress {
    pub fn new(stage: u32, total_stages: u32, message: impl Into<String>) -> Self {
        Self {
            stage,
            total_stages,
            message: message.into(),
        }
    }

    /// Progress of a job that has not started generating yet.
    pub fn initial(total_stages: u32) -> Self {
        Self::new(1, total_stages, "Waiting for the generator to start")
    }
}

// ---------------------------------------------------------------------------
// Job record
// ---------------------------------------------------------------------------

/// One job record, as stored by the Job Record Store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationJob {
    pub id: JobId,
    pub requester_id: RequesterId,
    /// The immutable parameters that defined the job, write-once.
    pub request: serde_json::Value,
    pub status: JobStatus,
    pub progress: Progress,
    /// Present only when `status == Completed`.
    pub response: Option<serde_json::Value>,
    /// Present only when `status == Failed`.
    pub error_message: Option<String>,
    pub error_details: Option<serde_json::Value>,
    pub created_at: Timestamp,
    /// Set exactly once, in the same write that sets the terminal status.
    pub completed_at: Option<Timestamp>,
}

impl GenerationJob {
    /// A freshly accepted job, before the worker has written anything.
    pub fn accepted(
        id: JobId,
        requester_id: RequesterId,
        request: serde_json::Value,
        total_stages: u32,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            requester_id,
            request,
            status: JobStatus::Pending,
            progress: Progress::initial(total_stages),
            response: None,
            error_message: None,
            error_details: None,
            created_at,
            completed_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// The single success outcome delivered to the caller of `submit()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: JobId,
    pub request: serde_json::Value,
    pub response: serde_json::Value,
    pub status: JobStatus,
    pub completed_at: Option<Timestamp>,
}

impl JobResult {
    /// Build a result from a completed job record.
    ///
    /// Returns `GenerationFailed` for a failed record (surfacing the
    /// worker's error message) and `Channel` for a record that claims to be
    /// completed without a response payload.
    pub fn from_job(job: &GenerationJob) -> Result<Self, JobError> {
        match job.status {
            JobStatus::Completed => match &job.response {
                Some(response) => Ok(Self {
                    id: job.id,
                    request: job.request.clone(),
                    response: response.clone(),
                    status: JobStatus::Completed,
                    completed_at: job.completed_at,
                }),
                None => Err(JobError::Channel(
                    "completed job record carries no response payload".into(),
                )),
            },
            JobStatus::Failed => Err(JobError::GenerationFailed(
                job.error_message
                    .clone()
                    .unwrap_or_else(|| "generation failed without details".into()),
            )),
            other => Err(JobError::Channel(format!(
                "job record is not terminal (status {})",
                other.as_str()
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
