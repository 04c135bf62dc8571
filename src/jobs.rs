use crate::{backends::BackendKind, types::VideoResult};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus { Pending, Running, Completed, Failed, Cancelled }

/// A render request running in the background on behalf of an HTTP caller.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub backend: BackendKind,
    pub status: JobStatus,
    pub result: Option<VideoResult>,
    pub created_at: Instant,
    /// Set once the job leaves Pending/Running; drives eviction.
    pub settled_at: Option<Instant>,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: Uuid,
    pub backend: BackendKind,
    pub status: JobStatus,
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<VideoResult>,
}

impl Job {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            backend,
            status: JobStatus::Pending,
            result: None,
            created_at: Instant::now(),
            settled_at: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Records the outcome unless the job was already cancelled.
    pub fn finish(&mut self, result: VideoResult) {
        if self.status == JobStatus::Cancelled { return; }
        self.status = if result.success { JobStatus::Completed } else { JobStatus::Failed };
        self.result = Some(result);
        self.settled_at = Some(Instant::now());
    }

    fn expired(&self, retention: Duration) -> bool {
        self.settled_at.is_some_and(|at| at.elapsed() >= retention)
    }

    pub fn to_status_response(&self) -> JobStatusResponse {
        JobStatusResponse {
            job_id: self.id,
            backend: self.backend,
            status: self.status,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            result: self.result.clone(),
        }
    }
}

/// How long a settled job stays queryable before it is evicted.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Clone)]
pub struct JobStore {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
    retention: Duration,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETENTION)
    }
}

impl JobStore {
    pub fn with_retention(retention: Duration) -> Self {
        Self { jobs: Arc::default(), retention }
    }

    /// Evicts expired settled jobs before recording the new one.
    pub async fn insert(&self, job: Job) -> Uuid {
        let id = job.id;
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, j| !j.expired(self.retention));
        if jobs.len() < before {
            debug!(evicted = before - jobs.len(), "evicted settled render jobs");
        }
        jobs.insert(id, job);
        id
    }

    pub async fn get(&self, id: &Uuid) -> Option<Job> {
        let jobs = self.jobs.read().await;
        jobs.get(id).filter(|j| !j.expired(self.retention)).cloned()
    }

    pub async fn update<F: FnOnce(&mut Job)>(&self, id: &Uuid, f: F) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            f(job);
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Returns false when the job is unknown or already settled.
    pub async fn cancel(&self, id: &Uuid) -> bool {
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(id) {
            Some(job) if matches!(job.status, JobStatus::Pending | JobStatus::Running) => {
                job.cancel.cancel();
                job.status = JobStatus::Cancelled;
                job.settled_at = Some(Instant::now());
                true
            }
            _ => false,
        }
    }
}
