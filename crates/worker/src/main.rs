use std::sync::Arc;
use std::time::Duration;

use motility_core::job::JobStatus;
use motility_core::types::JobId;
use motility_pipeline::report_store::JsonReportStore;
use motility_pipeline::store::InMemoryJobStore;
use motility_pipeline::{AnalysisService, PipelineConfig};
use motility_worker::replay::ReplayEngine;
use motility_worker::telemetry::init_tracing;

/// Seconds running jobs get to finish once shutdown starts.
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Analyse every fixture named on the command line, then exit.
///
/// | Env Var                   | Default | Meaning                               |
/// |---------------------------|---------|---------------------------------------|
/// | `ANALYSIS_PARAMETERS`     | unset   | JSON parameter override for each job  |
/// | `SHUTDOWN_TIMEOUT_SECS`   | `30`    | Grace period for running jobs         |
///
/// Pipeline settings are read by [`PipelineConfig::from_env`].
#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let sources: Vec<String> = std::env::args().skip(1).collect();
    if sources.is_empty() {
        tracing::error!("Usage: motility-worker <fixture.json>...");
        std::process::exit(2);
    }

    let config = PipelineConfig::from_env();
    let raw_parameters = std::env::var("ANALYSIS_PARAMETERS").ok();
    let shutdown_timeout = std::env::var("SHUTDOWN_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS));

    tracing::info!(
        max_concurrent_jobs = config.max_concurrent_jobs,
        results_dir = %config.results_dir.display(),
        "Worker starting",
    );

    let engine = Arc::new(ReplayEngine::default());
    let service = AnalysisService::start(
        &config,
        engine.clone(),
        engine,
        Arc::new(InMemoryJobStore::new()),
        Arc::new(JsonReportStore::new(config.results_dir.clone())),
    );

    let mut submitted: Vec<(JobId, String)> = Vec::with_capacity(sources.len());
    for source in &sources {
        match service.submit(source, raw_parameters.as_deref()).await {
            Ok(id) => {
                tracing::info!(job_id = %id, source = %source, "Job submitted");
                submitted.push((id, source.clone()));
            }
            Err(e) => tracing::error!(source = %source, error = %e, "Submission rejected"),
        }
    }

    let failures = tokio::select! {
        () = shutdown_signal() => submitted.len(),
        count = wait_all(&service, &submitted) => count,
    };

    service.shutdown(shutdown_timeout).await;
    tracing::info!(jobs = submitted.len(), failures, "Worker stopped");

    if failures > 0 || submitted.len() < sources.len() {
        std::process::exit(1);
    }
}

/// Wait for every job and log its outcome. Returns the number that did not
/// complete.
async fn wait_all(service: &AnalysisService, jobs: &[(JobId, String)]) -> usize {
    let mut failures = 0;
    for (id, source) in jobs {
        match service.wait_for_terminal(*id).await {
            Ok(view) if view.status == JobStatus::Completed => match service.result(*id).await {
                Ok(report) => tracing::info!(
                    job_id = %id,
                    source = %source,
                    result = view.result_ref.as_deref().unwrap_or_default(),
                    total_sperm = report.summary.total_sperm_detected,
                    average_motility = report.summary.average_motility_percentage,
                    average_velocity = report.summary.average_velocity,
                    "Analysis completed",
                ),
                Err(e) => {
                    failures += 1;
                    tracing::error!(job_id = %id, error = %e, "Report unavailable");
                }
            },
            Ok(view) => {
                failures += 1;
                tracing::error!(job_id = %id, source = %source, message = %view.message, "Analysis failed");
            }
            Err(e) => {
                failures += 1;
                tracing::error!(job_id = %id, error = %e, "Lost track of job");
            }
        }
    }
    failures
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
