//! Requester identity extractor.
//!
//! Identity resolution (accounts, sessions, tokens) is the platform
//! gateway's concern; by the time a request reaches this service the
//! requester id arrives pre-resolved in the `X-Requester-Id` header. A
//! missing or malformed header surfaces the protocol's `Unauthenticated`
//! error before any backend call is made.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use wayfarer_core::error::JobError;
use wayfarer_core::types::RequesterId;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated requester, extracted from `X-Requester-Id`.
///
/// ```ignore
/// async fn my_handler(Requester(requester): Requester) -> ApiResult<Json<()>> {
///     tracing::info!(requester, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Requester(pub RequesterId);

impl FromRequestParts<AppState> for Requester {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get("x-requester-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<RequesterId>().ok())
            .ok_or(ApiError::Job(JobError::Unauthenticated))?;

        Ok(Requester(id))
    }
}
