//! Repository for the `itinerary_jobs` table.
//!
//! Terminal transitions are guarded in SQL (`completed_at IS NULL`), so a
//! record reaches at most one terminal state no matter how many writers
//! race. Progress writes are likewise guarded to keep `stage`
//! non-decreasing.

use sqlx::PgPool;
use wayfarer_core::job::JobStatus;
use wayfarer_core::types::{JobId, RequesterId};

use crate::models::{status_id, JobRow};

/// Column list for `itinerary_jobs` queries.
const COLUMNS: &str = "\
    id, requester_id, request, status_id, stage, total_stages, \
    progress_message, response, error_message, error_details, \
    created_at, completed_at";

/// CRUD for itinerary generation jobs.
pub struct ItineraryJobRepo;

impl ItineraryJobRepo {
    /// Create a new pending job. Called by the backend worker when it
    /// accepts a submission; the engine never writes rows.
    pub async fn create(
        pool: &PgPool,
        requester: RequesterId,
        request: &serde_json::Value,
        total_stages: u32,
    ) -> Result<JobRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO itinerary_jobs (requester_id, request, status_id, total_stages) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(requester)
            .bind(request)
            .bind(status_id(JobStatus::Pending))
            .bind(total_stages as i32)
            .fetch_one(pool)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: JobId) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM itinerary_jobs WHERE id = $1");
        sqlx::query_as::<_, JobRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The most recently created completed job for a requester. Drives
    /// recovery polling; the recency bound is applied by the caller.
    pub async fn latest_completed(
        pool: &PgPool,
        requester: RequesterId,
    ) -> Result<Option<JobRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM itinerary_jobs \
             WHERE requester_id = $1 AND status_id = $2 \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, JobRow>(&query)
            .bind(requester)
            .bind(status_id(JobStatus::Completed))
            .fetch_optional(pool)
            .await
    }

    /// Worker write: advance progress. The guard keeps `stage`
    /// non-decreasing and never touches a terminal record. Returns `true`
    /// when a row was updated.
    pub async fn update_progress(
        pool: &PgPool,
        id: JobId,
        stage: u32,
        total_stages: u32,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE itinerary_jobs \
             SET status_id = $2, stage = $3, total_stages = $4, progress_message = $5 \
             WHERE id = $1 AND completed_at IS NULL AND stage <= $3",
        )
        .bind(id)
        .bind(status_id(JobStatus::Generating))
        .bind(stage as i32)
        .bind(total_stages as i32)
        .bind(message)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Worker write: terminal success. `completed_at` is set in the same
    /// statement that sets the status; the guard makes the write
    /// first-write-wins.
    pub async fn complete(
        pool: &PgPool,
        id: JobId,
        response: &serde_json::Value,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE itinerary_jobs \
             SET status_id = $2, response = $3, stage = total_stages, \
                 completed_at = NOW() \
             WHERE id = $1 AND completed_at IS NULL",
        )
        .bind(id)
        .bind(status_id(JobStatus::Completed))
        .bind(response)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Worker write: terminal failure. First write wins.
    pub async fn fail(
        pool: &PgPool,
        id: JobId,
        message: &str,
        details: Option<&serde_json::Value>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE itinerary_jobs \
             SET status_id = $2, error_message = $3, error_details = $4, \
                 completed_at = NOW() \
             WHERE id = $1 AND completed_at IS NULL",
        )
        .bind(id)
        .bind(status_id(JobStatus::Failed))
        .bind(message)
        .bind(details)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
