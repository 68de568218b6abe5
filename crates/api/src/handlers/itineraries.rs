//! Handlers for the `/itineraries` resource.
//!
//! `generate` drives one full submission: it builds a fresh orchestrator
//! for the request, submits, and holds the connection open until the
//! single outcome arrives, whatever the protocol produced. Clients that
//! want incremental progress follow the `/ws` feed in parallel.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use wayfarer_core::job::JobResult;
use wayfarer_core::request::ItineraryRequest;
use wayfarer_engine::ItineraryGenerator;

use crate::error::ApiResult;
use crate::identity::Requester;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/itineraries/generate
///
/// Submit a generation job and await its outcome. One orchestrator
/// instance per request: the in-flight guard and resolver map are scoped
/// to this submission alone.
pub async fn generate(
    Requester(requester): Requester,
    State(state): State<AppState>,
    Json(request): Json<ItineraryRequest>,
) -> ApiResult<impl IntoResponse> {
    let generator = ItineraryGenerator::new(
        Arc::clone(&state.backend),
        Arc::clone(&state.store),
        Some(requester),
        state.engine.as_ref().clone(),
    );

    let result: JobResult = generator.submit(request).await?;

    tracing::info!(
        job_id = %result.id,
        requester,
        "generation completed",
    );

    Ok(Json(DataResponse { data: result }))
}

/// POST /api/v1/itineraries/estimate
///
/// Advisory cost estimate for a (possibly incomplete) request. Cached and
/// rate-limit tolerant; this endpoint only fails on requests that are
/// invalid on their face.
pub async fn estimate(
    Requester(requester): Requester,
    State(state): State<AppState>,
    Json(request): Json<ItineraryRequest>,
) -> ApiResult<impl IntoResponse> {
    let estimated_cost = state.estimates.estimate(&request).await?;

    tracing::debug!(requester, estimated_cost, "estimate served");

    Ok(Json(DataResponse {
        data: serde_json::json!({ "estimated_cost": estimated_cost }),
    }))
}
