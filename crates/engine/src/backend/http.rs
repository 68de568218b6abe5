//! HTTP client for the generation backend service.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use wayfarer_core::request::ItineraryRequest;
use wayfarer_core::types::{JobId, RequesterId};

use super::{BackendError, GenerationBackend};

/// JSON client for a generation service exposing `POST /generate` and
/// `POST /estimate`.
///
/// The transport-level deadline on submissions is owned by the engine
/// (`tokio::time::timeout`), not by this client, so the reqwest client is
/// built without a per-request timeout.
pub struct HttpGenerationBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    requester_id: RequesterId,
    request: &'a ItineraryRequest,
}

#[derive(Deserialize)]
struct SubmitReply {
    job_id: JobId,
}

#[derive(Deserialize)]
struct EstimateReply {
    estimated_cost: f64,
}

#[derive(Deserialize)]
struct ErrorReply {
    error: String,
}

impl HttpGenerationBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }

    /// Pull the service's error message out of a non-success reply,
    /// falling back to the status line.
    async fn rejection_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ErrorReply>().await {
            Ok(body) => body.error,
            Err(_) => format!("backend returned {status}"),
        }
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn submit(
        &self,
        request: &ItineraryRequest,
        requester: RequesterId,
    ) -> Result<JobId, BackendError> {
        let response = self
            .client
            .post(self.url("generate"))
            .json(&SubmitBody {
                requester_id: requester,
                request,
            })
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let reply: SubmitReply = response
                .json()
                .await
                .map_err(|e| BackendError::Unavailable(format!("malformed reply: {e}")))?;
            Ok(reply.job_id)
        } else if status.is_client_error() {
            Err(BackendError::Rejected(
                Self::rejection_message(response).await,
            ))
        } else {
            Err(BackendError::Unavailable(format!(
                "backend returned {status}"
            )))
        }
    }

    async fn estimate(&self, request: &ItineraryRequest) -> Result<f64, BackendError> {
        let response = self
            .client
            .post(self.url("estimate"))
            .json(request)
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited);
        }
        if status.is_success() {
            let reply: EstimateReply = response
                .json()
                .await
                .map_err(|e| BackendError::Unavailable(format!("malformed reply: {e}")))?;
            Ok(reply.estimated_cost)
        } else if status.is_client_error() {
            Err(BackendError::Rejected(
                Self::rejection_message(response).await,
            ))
        } else {
            Err(BackendError::Unavailable(format!(
                "backend returned {status}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let backend = HttpGenerationBackend::new("http://localhost:9100/");
        assert_eq!(backend.url("generate"), "http://localhost:9100/generate");

        let backend = HttpGenerationBackend::new("http://localhost:9100");
        assert_eq!(backend.url("estimate"), "http://localhost:9100/estimate");
    }
}
