//! Job table abstraction.
//!
//! [`JobStore`] is the identity-keyed table behind the job state machine.
//! [`InMemoryJobStore`] keeps one lock per job so a status read of one
//! entry never waits on a write to another.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use motility_core::job::Job;
use motility_core::types::JobId;
use tokio::sync::RwLock;

use crate::error::{PipelineError, PipelineResult};

/// Get/set/delete by job identity.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails if the identity is already present.
    async fn insert(&self, job: Job) -> PipelineResult<()>;

    async fn get(&self, id: JobId) -> PipelineResult<Option<Job>>;

    /// Replace an existing job. `JobNotFound` if it was deleted.
    async fn set(&self, job: Job) -> PipelineResult<()>;

    /// Remove a job, returning it if it existed.
    async fn delete(&self, id: JobId) -> PipelineResult<Option<Job>>;

    /// Snapshot of every job, in no particular order.
    async fn list(&self) -> PipelineResult<Vec<Job>>;
}

/// Process-local job table.
///
/// A deleted entry is emptied under its own write lock before it leaves
/// the table, so a writer still holding the entry sees `JobNotFound`.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Entry>>,
}

type Entry = Arc<RwLock<Option<Job>>>;

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, id: JobId) -> Option<Entry> {
        self.jobs.read().await.get(&id).cloned()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: Job) -> PipelineResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(PipelineError::Store(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, Arc::new(RwLock::new(Some(job))));
        Ok(())
    }

    async fn get(&self, id: JobId) -> PipelineResult<Option<Job>> {
        match self.entry(id).await {
            Some(entry) => Ok(entry.read().await.clone()),
            None => Ok(None),
        }
    }

    async fn set(&self, job: Job) -> PipelineResult<()> {
        let id = job.id;
        let entry = self.entry(id).await.ok_or(PipelineError::JobNotFound(id))?;
        let mut slot = entry.write().await;
        match slot.as_mut() {
            Some(current) => {
                *current = job;
                Ok(())
            }
            None => Err(PipelineError::JobNotFound(id)),
        }
    }

    async fn delete(&self, id: JobId) -> PipelineResult<Option<Job>> {
        let removed = self.jobs.write().await.remove(&id);
        match removed {
            Some(entry) => Ok(entry.write().await.take()),
            None => Ok(None),
        }
    }

    async fn list(&self) -> PipelineResult<Vec<Job>> {
        let entries: Vec<Entry> = self.jobs.read().await.values().cloned().collect();
        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(job) = entry.read().await.clone() {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }
}
