//! Handlers for the `/jobs` resource.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use wayfarer_core::types::JobId;

use crate::error::{ApiError, ApiResult};
use crate::identity::Requester;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/jobs/{id}
///
/// Fetch a single job record. Requesters can only see their own jobs.
pub async fn get_job(
    Requester(requester): Requester,
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> ApiResult<impl IntoResponse> {
    let job = state
        .store
        .fetch(job_id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound { entity: "Job" })?;

    if job.requester_id != requester {
        return Err(ApiError::Forbidden(
            "Cannot view another requester's job".into(),
        ));
    }

    Ok(Json(DataResponse { data: job }))
}
