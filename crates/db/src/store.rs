//! `JobStore` implementation on PostgreSQL with LISTEN/NOTIFY fan-out.
//!
//! A single listener task holds a `LISTEN wayfarer_job_changed`
//! connection. Each notification carries a job id; the task refetches the
//! row and broadcasts the fresh snapshot to that job's subscribers.
//! Subscribers always receive whole snapshots, so a missed notification
//! during a reconnect is healed by the next write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use wayfarer_core::job::GenerationJob;
use wayfarer_core::types::{JobId, RequesterId};
use wayfarer_engine::store::{JobStore, StoreError};

use crate::repository::ItineraryJobRepo;

/// NOTIFY channel written by the `itinerary_jobs` trigger.
const NOTIFY_CHANNEL: &str = "wayfarer_job_changed";

/// Buffer capacity for each job's broadcast channel.
const CHANNEL_CAPACITY: usize = 64;

/// Delay before reconnecting a failed listener connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// SQLSTATE for insufficient privilege: the one store error that must
/// not be retried.
const SQLSTATE_INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Postgres-backed Job Record Store.
pub struct PgJobStore {
    pool: PgPool,
    feeds: Arc<RwLock<HashMap<JobId, broadcast::Sender<GenerationJob>>>>,
    shutdown: CancellationToken,
}

impl PgJobStore {
    /// Create the store and start its listener task.
    pub fn start(pool: PgPool) -> Arc<Self> {
        let store = Arc::new(Self {
            pool,
            feeds: Arc::new(RwLock::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        });

        let listener = Arc::clone(&store);
        tokio::spawn(async move { listener.listen_loop().await });

        store
    }

    /// Stop the listener task. Existing subscribers observe a closed
    /// channel once their job's feed is dropped.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Hold the LISTEN connection, refetch notified jobs, and fan their
    /// snapshots out. Reconnects forever on transient failures.
    async fn listen_loop(&self) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }

            let mut listener = match PgListener::connect_with(&self.pool).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::warn!(error = %e, "job listener connect failed; retrying");
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return,
                        _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                    }
                }
            };

            if let Err(e) = listener.listen(NOTIFY_CHANNEL).await {
                tracing::warn!(error = %e, "LISTEN failed; reconnecting");
                continue;
            }
            tracing::info!(channel = NOTIFY_CHANNEL, "job listener attached");

            loop {
                let notification = tokio::select! {
                    _ = self.shutdown.cancelled() => return,
                    received = listener.recv() => received,
                };

                match notification {
                    Ok(notification) => {
                        let Ok(job_id) = notification.payload().parse::<JobId>() else {
                            tracing::warn!(
                                payload = notification.payload(),
                                "ignoring malformed job notification",
                            );
                            continue;
                        };
                        self.fan_out(job_id).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "job listener dropped; reconnecting");
                        break;
                    }
                }
            }
        }
    }

    /// Refetch a job and broadcast the snapshot to its subscribers.
    async fn fan_out(&self, job_id: JobId) {
        let sender = {
            let feeds = self.feeds.read().await;
            match feeds.get(&job_id) {
                Some(sender) => sender.clone(),
                // Nobody is watching this job.
                None => return,
            }
        };

        match ItineraryJobRepo::find_by_id(&self.pool, job_id).await {
            Ok(Some(row)) => {
                if sender.send(row.into_job()).is_err() {
                    // The last subscriber left; drop the feed.
                    self.feeds.write().await.remove(&job_id);
                }
            }
            Ok(None) => {
                tracing::warn!(%job_id, "notified about a job that no longer exists");
            }
            Err(e) => {
                tracing::error!(%job_id, error = %e, "failed to refetch notified job");
            }
        }
    }
}

/// Classify a sqlx error into the store error taxonomy. Permission
/// failures are non-transient; everything else is worth retrying.
fn classify_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some(SQLSTATE_INSUFFICIENT_PRIVILEGE) {
            return StoreError::PermissionDenied(db_err.to_string());
        }
    }
    StoreError::Unavailable(err.to_string())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn fetch(&self, job_id: JobId) -> Result<Option<GenerationJob>, StoreError> {
        let row = ItineraryJobRepo::find_by_id(&self.pool, job_id)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(row.map(|r| r.into_job()))
    }

    async fn latest_completed(
        &self,
        requester: RequesterId,
    ) -> Result<Option<GenerationJob>, StoreError> {
        let row = ItineraryJobRepo::latest_completed(&self.pool, requester)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(row.map(|r| r.into_job()))
    }

    async fn subscribe(
        &self,
        job_id: JobId,
    ) -> Result<broadcast::Receiver<GenerationJob>, StoreError> {
        // Subscribing to a record that does not exist is a caller bug,
        // not something the listener can heal.
        if self.fetch(job_id).await?.is_none() {
            return Err(StoreError::NotFound(job_id));
        }

        let mut feeds = self.feeds.write().await;
        let sender = feeds
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Ok(sender.subscribe())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_are_non_transient() {
        // RowNotFound has no SQLSTATE; it classifies as transient
        // unavailability rather than a permission failure.
        let err = classify_sqlx_error(sqlx::Error::RowNotFound);
        assert!(err.is_transient());
    }
}
