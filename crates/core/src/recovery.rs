//! Recovery-window acceptance: deciding whether a polled job record may be
//! attributed to the current submission attempt.

use std::time::Duration;

use crate::job::{GenerationJob, JobStatus};
use crate::types::{RequesterId, Timestamp};

/// Whether `created_at` falls inside the bounded recency window ending at
/// `now`.
///
/// Records created "in the future" relative to `now` (clock skew between
/// client and store) are accepted; the window only guards against *stale*
/// jobs being misattributed.
pub fn within_recovery_window(created_at: Timestamp, now: Timestamp, window: Duration) -> bool {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::TimeDelta::MAX);
    now - created_at <= window
}

/// Whether a polled job may resolve the current submission attempt.
///
/// The match is requester + recency + terminal-success; the job's request
/// parameters are deliberately not compared (see DESIGN.md).
pub fn acceptable_candidate(
    job: &GenerationJob,
    requester: RequesterId,
    now: Timestamp,
    window: Duration,
) -> bool {
    job.requester_id == requester
        && job.status == JobStatus::Completed
        && within_recovery_window(job.created_at, now, window)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
