//! Cost estimate cache: throttles duplicate estimate calls and degrades to
//! the local formula when the backend refuses.
//!
//! Estimates are advisory. Whatever the backend does (rate limiting,
//! rejection, outage) the caller gets a number, never an error, except
//! for requests that are invalid on their face.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use wayfarer_core::error::JobError;
use wayfarer_core::estimation::{estimate_fingerprint, local_estimate};
use wayfarer_core::request::ItineraryRequest;

use crate::backend::{BackendError, GenerationBackend};

struct CachedEstimate {
    value: f64,
    stored_at: Instant,
}

/// TTL cache keyed by the estimate fingerprint of the request.
pub struct EstimateCache {
    backend: Arc<dyn GenerationBackend>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedEstimate>>,
}

impl EstimateCache {
    pub fn new(backend: Arc<dyn GenerationBackend>, ttl: Duration) -> Self {
        Self {
            backend,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Estimate the cost of a (possibly incomplete) request.
    pub async fn estimate(&self, request: &ItineraryRequest) -> Result<f64, JobError> {
        request.validate_fields()?;
        let key = estimate_fingerprint(request);

        {
            let entries = self.entries.lock().await;
            if let Some(entry) = entries.get(&key) {
                if entry.stored_at.elapsed() <= self.ttl {
                    return Ok(entry.value);
                }
            }
        }

        let value = match self.backend.estimate(request).await {
            Ok(value) => value,
            Err(BackendError::RateLimited) => {
                tracing::debug!("estimate rate limited; falling back to the local formula");
                local_estimate(request)
            }
            Err(e) => {
                tracing::warn!(error = %e, "estimate backend failed; falling back to the local formula");
                local_estimate(request)
            }
        };

        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.stored_at.elapsed() <= self.ttl);
        entries.insert(
            key,
            CachedEstimate {
                value,
                stored_at: Instant::now(),
            },
        );

        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
