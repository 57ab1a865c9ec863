//! Persistence of finished reports.
//!
//! `save` returns an opaque reference that is recorded on the job and later
//! handed back to `load` and `delete`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use motility_core::report::Report;
use tokio::sync::RwLock;

use crate::error::{PipelineError, PipelineResult};

#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Persist `report`, returning the reference to load it by.
    async fn save(&self, report: &Report) -> PipelineResult<String>;

    async fn load(&self, result_ref: &str) -> PipelineResult<Arc<Report>>;

    /// Remove a persisted report. Removing a missing report is not an error.
    async fn delete(&self, result_ref: &str) -> PipelineResult<()>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Reports kept in process memory, keyed `memory://<job_id>`.
#[derive(Default)]
pub struct InMemoryReportStore {
    reports: RwLock<HashMap<String, Arc<Report>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.reports.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.reports.read().await.is_empty()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn save(&self, report: &Report) -> PipelineResult<String> {
        let result_ref = format!("memory://{}", report.analysis_id);
        self.reports
            .write()
            .await
            .insert(result_ref.clone(), Arc::new(report.clone()));
        Ok(result_ref)
    }

    async fn load(&self, result_ref: &str) -> PipelineResult<Arc<Report>> {
        self.reports
            .read()
            .await
            .get(result_ref)
            .cloned()
            .ok_or_else(|| PipelineError::Store(format!("report {result_ref} not found")))
    }

    async fn delete(&self, result_ref: &str) -> PipelineResult<()> {
        self.reports.write().await.remove(result_ref);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON files
// ---------------------------------------------------------------------------

/// Pretty-printed JSON documents at `<dir>/<job_id>_results.json`.
///
/// The reference returned by `save` is the file path.
pub struct JsonReportStore {
    dir: PathBuf,
}

impl JsonReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, report: &Report) -> PathBuf {
        self.dir.join(format!("{}_results.json", report.analysis_id))
    }
}

#[async_trait]
impl ReportStore for JsonReportStore {
    async fn save(&self, report: &Report) -> PipelineResult<String> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(report);
        let body = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, body).await?;
        tracing::debug!(path = %path.display(), "Report written");
        Ok(path.to_string_lossy().into_owned())
    }

    async fn load(&self, result_ref: &str) -> PipelineResult<Arc<Report>> {
        let body = tokio::fs::read(result_ref).await?;
        Ok(Arc::new(serde_json::from_slice(&body)?))
    }

    async fn delete(&self, result_ref: &str) -> PipelineResult<()> {
        match tokio::fs::remove_file(result_ref).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
