// crates/navslam-engine/src/queue.rs
// ============================================================================
// Module: Map Job Queue
// Description: Single-worker FIFO queue for map builds.
// Purpose: Serialize engine builds and record durable job status.
// Dependencies: navslam-core, navslam-config, tokio, thiserror, tracing
// ============================================================================

//! ## Overview
//! A [`JobQueue`] owns one worker task that drains build tasks in arrival
//! order, so at most one build runs against the engine at a time. Every job
//! moves `queued -> in_progress -> completed | failed` in the durable store.
//! Status writes and reads go through a [`RetryPolicy`] that retries only
//! transient store errors with exponential backoff.
//!
//! Each job runs in its own task; an error or panic in one job is recorded as
//! `failed` and the worker moves on.
//!
//! Shutdown closes the queue to new work, lets the in-flight job finish, and
//! leaves jobs that never started in `queued`.
//!
//! Security posture: job keys become map file names; keys are validated by
//! the map directory before any file is written.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use navslam_config::JobsConfig;
use navslam_core::JobKey;
use navslam_core::JobRecord;
use navslam_core::JobStatus;
use navslam_core::JobStatusStore;
use navslam_core::StoreError;
use thiserror::Error;
use tokio::sync::Notify;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::maps::MapArchive;
use crate::maps::MapDirectory;
use crate::pipeline::BuildTask;
use crate::pipeline::MapBuildPipeline;

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Retry policy for durable status operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Delay before the first retry; each later delay doubles.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Builds the policy from job configuration.
    #[must_use]
    pub const fn from_config(jobs: &JobsConfig) -> Self {
        Self {
            retries: jobs.retry_attempts,
            base_delay: jobs.retry_base(),
        }
    }

    /// Runs `attempt`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the first permanent error, or the last transient error once
    /// retries are exhausted.
    pub async fn run<T, F>(&self, operation: &str, mut attempt: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Result<T, StoreError> + Send,
    {
        let mut delay = self.base_delay;
        let mut retries_left = self.retries;
        loop {
            match attempt() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && retries_left > 0 => {
                    warn!(
                        operation,
                        error = %err,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "transient job store error; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    retries_left -= 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Shutdown has been initiated.
    #[error("job queue is closed")]
    QueueClosed,
    /// The job key cannot name a stored map.
    #[error("invalid job key: {0}")]
    InvalidKey(String),
    /// Durable status operation failed after retries.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Receipt for an accepted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTicket {
    /// Job key.
    pub key: JobKey,
    /// Jobs waiting ahead of this one when it was accepted.
    pub position: usize,
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// State shared between the queue handle and its worker.
struct Shared {
    /// Durable job status store.
    store: Arc<dyn JobStatusStore>,
    /// Build pipeline.
    builder: Arc<dyn MapBuildPipeline>,
    /// Destination for completed builds.
    archive: Arc<dyn MapArchive>,
    /// Retry policy for store operations.
    retry: RetryPolicy,
    /// Tasks waiting for the worker.
    pending: Mutex<VecDeque<BuildTask>>,
    /// Wakes the worker when a task arrives.
    notify: Notify,
    /// Set once shutdown starts; rejects new work.
    closed: AtomicBool,
    /// True while the worker loop runs.
    running: AtomicBool,
    /// Shutdown signal for the worker.
    shutdown: watch::Sender<bool>,
    /// Accepted jobs not yet finished.
    outstanding: watch::Sender<usize>,
}

impl Shared {
    /// Locks the pending list, recovering from poisoning.
    fn pending(&self) -> MutexGuard<'_, VecDeque<BuildTask>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Closes the queue to new work and signals the worker.
    ///
    /// Returns false when the queue was already closed.
    fn close(&self) -> bool {
        let newly_closed = {
            let _pending = self.pending();
            !self.closed.swap(true, Ordering::SeqCst)
        };
        self.shutdown.send_replace(true);
        newly_closed
    }

    /// Writes a job status through the retry policy.
    async fn mark(
        &self,
        key: &JobKey,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        self.retry
            .run("update_status", || self.store.update_status(key, status, error_message))
            .await
    }

    /// Runs one job to completion, returning a failure description on error.
    async fn run_job(self: Arc<Self>, task: BuildTask) -> Result<(), String> {
        self.mark(&task.key, JobStatus::InProgress, None).await.map_err(|err| err.to_string())?;
        let outcome = self.builder.build(&task).await.map_err(|err| err.to_string())?;
        self.archive.persist(&task.key, &outcome).await.map_err(|err| err.to_string())?;
        self.mark(&task.key, JobStatus::Completed, None).await.map_err(|err| err.to_string())?;
        Ok(())
    }

    /// Runs `task` in its own task and records failures.
    async fn process(self: &Arc<Self>, task: BuildTask) {
        let key = task.key.clone();
        info!(job = %key, "job started");
        let failure = match tokio::spawn(Arc::clone(self).run_job(task)).await {
            Ok(Ok(())) => None,
            Ok(Err(message)) => Some(message),
            Err(join) => Some(format!("job task aborted: {join}")),
        };
        match failure {
            None => info!(job = %key, "job completed"),
            Some(message) => {
                warn!(job = %key, error = %message, "job failed");
                if let Err(err) = self.mark(&key, JobStatus::Failed, Some(&message)).await {
                    error!(job = %key, error = %err, "failed to record job failure");
                }
            }
        }
    }
}

/// Worker loop: drains tasks until shutdown is signalled.
async fn worker_loop(shared: Arc<Shared>) {
    let mut shutdown = shared.shutdown.subscribe();
    info!("job worker started");
    loop {
        if shared.closed.load(Ordering::SeqCst) || *shutdown.borrow() {
            break;
        }
        let next = shared.pending().pop_front();
        let Some(task) = next else {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = shared.notify.notified() => {}
            }
            continue;
        };
        shared.process(task).await;
        shared.outstanding.send_modify(|count| *count = count.saturating_sub(1));
    }
    shared.running.store(false, Ordering::SeqCst);
    info!(remaining = shared.pending().len(), "job worker stopped");
}

// ============================================================================
// SECTION: Job Queue
// ============================================================================

/// Single-worker map build queue.
///
/// Dropping the queue without [`JobQueue::shutdown`] still closes it; the
/// worker finishes its in-flight job and exits on its own.
pub struct JobQueue {
    /// State shared with the worker.
    shared: Arc<Shared>,
    /// Worker handle, taken by the first shutdown.
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobQueue {
    /// Creates the queue and starts its worker on the current runtime.
    #[must_use]
    pub fn start(
        store: Arc<dyn JobStatusStore>,
        builder: Arc<dyn MapBuildPipeline>,
        archive: Arc<dyn MapArchive>,
        retry: RetryPolicy,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (outstanding, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            store,
            builder,
            archive,
            retry,
            pending: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            running: AtomicBool::new(true),
            shutdown,
            outstanding,
        });
        let worker = tokio::spawn(worker_loop(Arc::clone(&shared)));
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Accepts `task`, records it as queued, and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::QueueClosed`] after shutdown,
    /// [`QueueError::InvalidKey`] when the key cannot name a map file, and
    /// [`QueueError::Store`] when the queued status cannot be written.
    pub async fn enqueue(&self, task: BuildTask) -> Result<JobTicket, QueueError> {
        MapDirectory::validate_map_id(task.key.as_str())
            .map_err(|_| QueueError::InvalidKey(task.key.to_string()))?;
        if self.is_closed() {
            return Err(QueueError::QueueClosed);
        }
        self.shared.mark(&task.key, JobStatus::Queued, None).await?;
        let key = task.key.clone();
        let accepted = {
            let mut pending = self.shared.pending();
            if self.is_closed() {
                None
            } else {
                pending.push_back(task);
                Some(pending.len() - 1)
            }
        };
        let Some(position) = accepted else {
            let message = QueueError::QueueClosed.to_string();
            if let Err(err) = self.shared.mark(&key, JobStatus::Failed, Some(&message)).await {
                warn!(job = %key, error = %err, "failed to record rejected job");
            }
            return Err(QueueError::QueueClosed);
        };
        self.shared.outstanding.send_modify(|count| *count += 1);
        self.shared.notify.notify_one();
        info!(job = %key, position, "job queued");
        Ok(JobTicket {
            key,
            position,
        })
    }

    /// Returns the number of jobs waiting to start.
    #[must_use]
    pub fn queue_length(&self) -> usize {
        self.shared.pending().len()
    }

    /// Returns true while the worker loop runs.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Returns true once shutdown has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Reads the durable status of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Store`] when the read fails after retries.
    pub async fn status(&self, key: &JobKey) -> Result<Option<JobRecord>, QueueError> {
        let store = &self.shared.store;
        Ok(self.shared.retry.run("read_status", || store.read_status(key)).await?)
    }

    /// Waits until every accepted job has finished.
    ///
    /// Does not return while jobs remain queued after shutdown.
    pub async fn wait_idle(&self) {
        let mut outstanding = self.shared.outstanding.subscribe();
        let _ = outstanding.wait_for(|count| *count == 0).await;
    }

    /// Closes the queue and waits for the worker to stop.
    ///
    /// The in-flight job finishes; jobs that never started stay `queued`.
    /// Later calls return immediately.
    pub async fn shutdown(&self) {
        if !self.shared.close() {
            return;
        }
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(worker) = worker
            && let Err(err) = worker.await
        {
            error!(error = %err, "job worker terminated abnormally");
        }
        info!(left_queued = self.queue_length(), "job queue shut down");
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        if self.shared.close() {
            info!("job queue dropped; worker will stop after the in-flight job");
        }
    }
}
