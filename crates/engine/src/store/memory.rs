//! In-memory Job Record Store backed by per-job broadcast channels.
//!
//! Used by the engine's tests and by deployments that embed the generation
//! worker in the same process. The writer API mirrors what the backend
//! worker does to a real store; terminal writes are first-write-wins, so a
//! record can never leave its terminal state.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use wayfarer_core::job::{GenerationJob, JobStatus, Progress};
use wayfarer_core::types::{JobId, RequesterId};

use super::{JobStore, StoreError};

/// Buffer capacity for each job's broadcast channel. Slow receivers past
/// this observe `RecvError::Lagged` and catch up from the next snapshot.
const CHANNEL_CAPACITY: usize = 64;

struct Entry {
    job: GenerationJob,
    feed: broadcast::Sender<GenerationJob>,
}

/// Thread-safe in-memory store; wrap in `Arc` and share.
pub struct MemoryJobStore {
    entries: RwLock<HashMap<JobId, Entry>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a freshly accepted job record.
    pub async fn insert(&self, job: GenerationJob) {
        let (feed, _) = broadcast::channel(CHANNEL_CAPACITY);
        self.entries
            .write()
            .await
            .insert(job.id, Entry { job, feed });
    }

    /// Worker write: advance progress. Marks the job `Generating` when it
    /// was still `Pending`. Returns `false` when the job is already
    /// terminal (the write is dropped).
    pub async fn update_progress(&self, job_id: JobId, progress: Progress) -> bool {
        self.mutate(job_id, |job| {
            if job.status.is_terminal() {
                return false;
            }
            if job.status == JobStatus::Pending {
                job.status = JobStatus::Generating;
            }
            job.progress = progress.clone();
            true
        })
        .await
    }

    /// Worker write: terminal success. First write wins; a second terminal
    /// write is dropped and returns `false`.
    pub async fn complete(&self, job_id: JobId, response: serde_json::Value) -> bool {
        self.mutate(job_id, |job| {
            if !job.status.can_transition_to(JobStatus::Completed) {
                return false;
            }
            job.status = JobStatus::Completed;
            job.response = Some(response.clone());
            job.completed_at = Some(Utc::now());
            true
        })
        .await
    }

    /// Worker write: terminal failure. First write wins.
    pub async fn fail(
        &self,
        job_id: JobId,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> bool {
        let message = message.into();
        self.mutate(job_id, |job| {
            if !job.status.can_transition_to(JobStatus::Failed) {
                return false;
            }
            job.status = JobStatus::Failed;
            job.error_message = Some(message.clone());
            job.error_details = details.clone();
            job.completed_at = Some(Utc::now());
            true
        })
        .await
    }

    /// Re-broadcast the current snapshot without changing it: the
    /// "unexpected extra write" a subscriber must tolerate after a
    /// terminal status.
    pub async fn touch(&self, job_id: JobId) {
        let entries = self.entries.read().await;
        if let Some(entry) = entries.get(&job_id) {
            let _ = entry.feed.send(entry.job.clone());
        }
    }

    /// Tear down the job's feed without a terminal write, so subscribers
    /// observe a closed channel. Simulates a non-transient channel
    /// failure.
    pub async fn drop_feed(&self, job_id: JobId) {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get_mut(&job_id) {
            let (feed, _) = broadcast::channel(CHANNEL_CAPACITY);
            entry.feed = feed;
        }
    }

    async fn mutate(&self, job_id: JobId, mut f: impl FnMut(&mut GenerationJob) -> bool) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&job_id) else {
            return false;
        };
        if !f(&mut entry.job) {
            return false;
        }
        // Zero receivers just means nobody is watching yet.
        let _ = entry.feed.send(entry.job.clone());
        true
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn fetch(&self, job_id: JobId) -> Result<Option<GenerationJob>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .get(&job_id)
            .map(|e| e.job.clone()))
    }

    async fn latest_completed(
        &self,
        requester: RequesterId,
    ) -> Result<Option<GenerationJob>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|e| {
                e.job.requester_id == requester && e.job.status == JobStatus::Completed
            })
            .max_by_key(|e| e.job.created_at)
            .map(|e| e.job.clone()))
    }

    async fn subscribe(
        &self,
        job_id: JobId,
    ) -> Result<broadcast::Receiver<GenerationJob>, StoreError> {
        self.entries
            .read()
            .await
            .get(&job_id)
            .map(|e| e.feed.subscribe())
            .ok_or(StoreError::NotFound(job_id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
