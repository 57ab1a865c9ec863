//! Background task queue for analysis jobs.
//!
//! Submissions go into a bounded `mpsc` channel. A single dispatcher task
//! drains it, waits for one of `max_concurrent` semaphore permits, and
//! spawns the job. Each job gets its own [`CancellationToken`] so a
//! deleted job can be stopped between frames without touching the others.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use motility_core::types::JobId;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::error::{PipelineError, PipelineResult};
use crate::runner::{AnalysisTask, JobRunner};

struct QueuedTask {
    task: AnalysisTask,
    cancel: CancellationToken,
}

type TokenRegistry = Arc<RwLock<HashMap<JobId, CancellationToken>>>;

/// Handle to the dispatcher. Shared via `Arc`.
pub struct TaskQueue {
    sender: mpsc::Sender<QueuedTask>,
    tokens: TokenRegistry,
    /// Stops the dispatcher; per-job tokens are independent of it.
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TaskQueue {
    /// Spawn the dispatcher and return the queue handle.
    pub fn start(runner: Arc<JobRunner>, max_concurrent: usize, capacity: usize) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let tokens: TokenRegistry = Arc::new(RwLock::new(HashMap::new()));
        let shutdown = CancellationToken::new();

        let dispatcher = Dispatcher {
            runner,
            receiver,
            tokens: Arc::clone(&tokens),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: JoinSet::new(),
        };
        let handle = tokio::spawn(dispatcher.run(shutdown.clone()));

        tracing::info!(max_concurrent, capacity, "Task queue started");

        Arc::new(Self {
            sender,
            tokens,
            shutdown,
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    /// Hand a task to the dispatcher without waiting.
    ///
    /// Fails with `QueueUnavailable` when the queue is full or shut down.
    pub async fn enqueue(&self, task: AnalysisTask) -> PipelineResult<()> {
        let job_id = task.job_id;
        let cancel = CancellationToken::new();
        self.tokens.write().await.insert(job_id, cancel.clone());

        if let Err(e) = self.sender.try_send(QueuedTask { task, cancel }) {
            self.tokens.write().await.remove(&job_id);
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue is full",
                mpsc::error::TrySendError::Closed(_) => "queue is shut down",
            };
            return Err(PipelineError::QueueUnavailable(reason.to_string()));
        }
        tracing::debug!(job_id = %job_id, "Task enqueued");
        Ok(())
    }

    /// Cancel a queued or running job. Returns `false` if it is unknown
    /// or already finished.
    pub async fn cancel(&self, job_id: JobId) -> bool {
        match self.tokens.write().await.remove(&job_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id = %job_id, "Task cancelled");
                true
            }
            None => false,
        }
    }

    /// Stop accepting work and wait up to `timeout` for running jobs.
    ///
    /// Jobs still running after the timeout are cancelled; queued jobs
    /// that never started are recorded as failed. Returns once every job
    /// has committed its terminal state.
    pub async fn shutdown(&self, timeout: Duration) {
        self.shutdown.cancel();
        let Some(mut handle) = self.dispatcher.lock().await.take() else {
            return;
        };
        if tokio::time::timeout(timeout, &mut handle).await.is_err() {
            tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Jobs still running at shutdown timeout, cancelling",
            );
            for (_, token) in self.tokens.write().await.drain() {
                token.cancel();
            }
            // Cancelled jobs still record their terminal state.
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Task dispatcher panicked");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct Dispatcher {
    runner: Arc<JobRunner>,
    receiver: mpsc::Receiver<QueuedTask>,
    tokens: TokenRegistry,
    permits: Arc<Semaphore>,
    in_flight: JoinSet<()>,
}

impl Dispatcher {
    async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Task dispatcher shutting down");
                    break;
                }
                Some(_) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {}
                queued = self.receiver.recv() => {
                    let Some(queued) = queued else { break };
                    if !self.dispatch(queued, &shutdown).await {
                        break;
                    }
                }
            }
        }

        self.receiver.close();
        while let Some(queued) = self.receiver.recv().await {
            self.tokens.write().await.remove(&queued.task.job_id);
            self.runner.abandon(queued.task).await;
        }
        while self.in_flight.join_next().await.is_some() {}
        tracing::info!("Task dispatcher stopped");
    }

    /// Spawn one task once a permit is free. Returns `false` if shutdown
    /// was requested while waiting.
    async fn dispatch(&mut self, queued: QueuedTask, shutdown: &CancellationToken) -> bool {
        let QueuedTask { task, cancel } = queued;
        let job_id = task.job_id;

        if cancel.is_cancelled() {
            tracing::debug!(job_id = %job_id, "Skipping cancelled task");
            return true;
        }

        let permit = tokio::select! {
            _ = shutdown.cancelled() => {
                self.tokens.write().await.remove(&job_id);
                self.runner.abandon(task).await;
                return false;
            }
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };

        // Deleted while waiting for a slot.
        if cancel.is_cancelled() {
            tracing::debug!(job_id = %job_id, "Skipping cancelled task");
            return true;
        }

        let runner = Arc::clone(&self.runner);
        let tokens = Arc::clone(&self.tokens);
        self.in_flight.spawn(async move {
            runner.run(task, cancel).await;
            tokens.write().await.remove(&job_id);
            drop(permit);
        });
        true
    }
}
