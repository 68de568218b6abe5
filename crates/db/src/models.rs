//! Row model for the `itinerary_jobs` table and status id mapping.

use sqlx::FromRow;
use wayfarer_core::job::{GenerationJob, JobStatus, Progress};
use wayfarer_core::types::{JobId, RequesterId, Timestamp};

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Database id for each [`JobStatus`]. Seed order is fixed; never renumber.
pub fn status_id(status: JobStatus) -> StatusId {
    match status {
        JobStatus::Pending => 1,
        JobStatus::Generating => 2,
        JobStatus::Completed => 3,
        JobStatus::Failed => 4,
    }
}

/// Inverse of [`status_id`]. `None` for ids no release has ever written.
pub fn status_from_id(id: StatusId) -> Option<JobStatus> {
    match id {
        1 => Some(JobStatus::Pending),
        2 => Some(JobStatus::Generating),
        3 => Some(JobStatus::Completed),
        4 => Some(JobStatus::Failed),
        _ => None,
    }
}

/// A row from the `itinerary_jobs` table.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub id: JobId,
    pub requester_id: RequesterId,
    pub request: serde_json::Value,
    pub status_id: StatusId,
    pub stage: i32,
    pub total_stages: i32,
    pub progress_message: String,
    pub response: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub error_details: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl JobRow {
    /// Convert into the domain job record.
    ///
    /// Unknown status ids map to `Pending` rather than failing the read:
    /// the record is display-only on this side and a newer writer may know
    /// states this build does not.
    pub fn into_job(self) -> GenerationJob {
        GenerationJob {
            id: self.id,
            requester_id: self.requester_id,
            request: self.request,
            status: status_from_id(self.status_id).unwrap_or(JobStatus::Pending),
            progress: Progress::new(
                self.stage.max(1) as u32,
                self.total_stages.max(1) as u32,
                self.progress_message,
            ),
            response: self.response,
            error_message: self.error_message,
            error_details: self.error_details,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn status_ids_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Generating,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status_from_id(status_id(status)), Some(status));
        }
    }

    #[test]
    fn unknown_status_id_is_none() {
        assert_eq!(status_from_id(0), None);
        assert_eq!(status_from_id(99), None);
    }

    fn row() -> JobRow {
        JobRow {
            id: uuid::Uuid::new_v4(),
            requester_id: 7,
            request: serde_json::json!({"destination": "Rome"}),
            status_id: 3,
            stage: 5,
            total_stages: 5,
            progress_message: "done".into(),
            response: Some(serde_json::json!({"days": []})),
            error_message: None,
            error_details: None,
            created_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    #[test]
    fn row_maps_to_domain_job() {
        let row = row();
        let id = row.id;
        let job = row.into_job();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress.stage, 5);
        assert!(job.response.is_some());
    }

    #[test]
    fn unknown_status_maps_to_pending() {
        let mut row = row();
        row.status_id = 42;
        assert_eq!(row.into_job().status, JobStatus::Pending);
    }

    #[test]
    fn zero_stage_clamps_to_one() {
        let mut row = row();
        row.stage = 0;
        row.total_stages = 0;
        let job = row.into_job();
        assert_eq!(job.progress.stage, 1);
        assert_eq!(job.progress.total_stages, 1);
    }
}
