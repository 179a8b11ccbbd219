//! Bounded-concurrency job queue
//!
//! Jobs are kept in creation order. A single scheduler task claims the
//! earliest pending job whenever a concurrency permit is free and hands it to
//! a worker task, which runs it through the [`JobRunner`] with retry and
//! backoff on rate-limit failures.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::media::MediaData;
use crate::providers::JobRunner;

use super::events::JobEvent;
use super::retry::{FailureKind, RetryPolicy, classify};
use super::types::{Job, JobId, JobPayload, JobStats, JobStatus, JobType, NewJob};

/// Capacity of the lifecycle event channel
const EVENT_CAPACITY: usize = 256;

/// Scheduling parameters
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Jobs allowed in progress at once (at least 1)
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
    /// Pause between launches within one scheduling pass
    pub start_stagger: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueConfig::default().into()
    }
}

impl From<&QueueConfig> for QueueOptions {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            retry: config.retry_policy(),
            start_stagger: config.start_stagger(),
        }
    }
}

impl From<QueueConfig> for QueueOptions {
    fn from(config: QueueConfig) -> Self {
        Self::from(&config)
    }
}

/// A job handed from the scheduler to a worker
struct Claimed {
    id: JobId,
    job_type: JobType,
    payload: JobPayload,
}

struct Inner {
    jobs: RwLock<Vec<Job>>,
    runner: Arc<dyn JobRunner>,
    policy: RetryPolicy,
    stagger: Duration,
    max_concurrent: usize,
    permits: Arc<Semaphore>,
    wake: Notify,
    events: broadcast::Sender<JobEvent>,
    stats: watch::Sender<JobStats>,
    cancel: CancellationToken,
}

/// In-memory job queue with at most N jobs in progress
pub struct JobQueue {
    inner: Arc<Inner>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("max_concurrent", &self.inner.max_concurrent)
            .field("stats", &self.stats())
            .finish()
    }
}

impl JobQueue {
    pub fn new(runner: Arc<dyn JobRunner>, options: QueueOptions) -> Self {
        let max_concurrent = options.max_concurrent.max(1);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (stats, _) = watch::channel(JobStats::default());

        Self {
            inner: Arc::new(Inner {
                jobs: RwLock::new(Vec::new()),
                runner,
                policy: options.retry,
                stagger: options.start_stagger,
                max_concurrent,
                permits: Arc::new(Semaphore::new(max_concurrent)),
                wake: Notify::new(),
                events,
                stats,
                cancel: CancellationToken::new(),
            }),
            scheduler: Mutex::new(None),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    /// Enqueue one job as pending
    pub fn add_job(&self, job: NewJob) -> Result<JobId> {
        Ok(self.add_jobs(vec![job])?[0])
    }

    /// Enqueue several jobs, keeping their order
    pub fn add_jobs(&self, new_jobs: Vec<NewJob>) -> Result<Vec<JobId>> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::QueueShutdown);
        }

        let created: Vec<Job> = new_jobs
            .into_iter()
            .map(|new| Job::new(new.job_type, new.payload))
            .collect();
        let ids: Vec<JobId> = created.iter().map(|j| j.id).collect();

        {
            let mut jobs = self.inner.write_jobs();
            for job in &created {
                debug!(job_id = %job.id, job_type = %job.job_type, "Job queued");
            }
            jobs.extend(created.iter().cloned());
            self.inner.publish_stats(&jobs);
        }

        for job in &created {
            self.inner.emit(JobEvent::Queued {
                id: job.id,
                job_type: job.job_type,
            });
        }
        self.inner.wake.notify_one();

        Ok(ids)
    }

    /// Snapshot of every job in creation order
    pub fn jobs(&self) -> Vec<Job> {
        self.inner.read_jobs().clone()
    }

    pub fn get(&self, id: JobId) -> Option<Job> {
        self.inner.read_jobs().iter().find(|j| j.id == id).cloned()
    }

    pub fn stats(&self) -> JobStats {
        *self.inner.stats.borrow()
    }

    /// Drop completed and failed jobs. Returns how many were removed.
    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.inner.write_jobs();
        let before = jobs.len();
        jobs.retain(|j| !j.status.is_terminal());
        let removed = before - jobs.len();
        self.inner.publish_stats(&jobs);
        removed
    }

    /// Receive lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Start processing. Calling it again while running has no effect.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::QueueShutdown);
        }

        let mut scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if scheduler.is_some() {
            return Ok(());
        }

        let inner = Arc::clone(&self.inner);
        *scheduler = Some(tokio::spawn(run_scheduler(inner)));

        info!(max_concurrent = self.inner.max_concurrent, "Job queue started");
        Ok(())
    }

    /// Wait until no job is pending or in progress
    pub async fn wait_idle(&self, timeout: Option<Duration>) -> Result<JobStats> {
        let mut rx = self.inner.stats.subscribe();
        let cancel = self.inner.cancel.clone();

        let wait = async move {
            tokio::select! {
                biased;
                stats = rx.wait_for(JobStats::is_idle) => {
                    stats.map(|s| *s).map_err(|_| Error::QueueShutdown)
                }
                _ = cancel.cancelled() => Err(Error::QueueShutdown),
            }
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                Error::Timeout(format!(
                    "queue still busy after {}s",
                    limit.as_secs_f32()
                ))
            })?,
            None => wait.await,
        }
    }

    /// Stop scheduling, abort in-flight jobs and wait for the workers to exit.
    ///
    /// Jobs that were in progress are failed; pending jobs stay pending.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!(error = %e, "Queue scheduler ended abnormally");
        }
        info!("Job queue shut down");
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn read_jobs(&self) -> RwLockReadGuard<'_, Vec<Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, Vec<Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_stats(&self, jobs: &[Job]) {
        self.stats.send_replace(JobStats::from_jobs(jobs));
    }

    fn emit(&self, event: JobEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Move the earliest pending job to in-progress
    fn claim_next(&self) -> Option<Claimed> {
        let claimed = {
            let mut jobs = self.write_jobs();
            let job = jobs.iter_mut().find(|j| j.status == JobStatus::Pending)?;
            job.status = JobStatus::InProgress;
            job.started_at = Some(Utc::now());
            let claimed = Claimed {
                id: job.id,
                job_type: job.job_type,
                payload: job.payload.clone(),
            };
            self.publish_stats(&jobs);
            claimed
        };

        info!(job_id = %claimed.id, job_type = %claimed.job_type, "Job started");
        self.emit(JobEvent::Started {
            id: claimed.id,
            job_type: claimed.job_type,
        });
        Some(claimed)
    }

    fn has_pending(&self) -> bool {
        self.read_jobs().iter().any(|j| j.status == JobStatus::Pending)
    }

    fn record_attempt(&self, id: JobId, attempts: u32) {
        if let Some(job) = self.write_jobs().iter_mut().find(|j| j.id == id) {
            job.attempts = attempts;
        }
    }

    /// Move an in-progress job to a terminal state
    fn finish(&self, claim: &Claimed, outcome: Result<MediaData>) {
        let event = {
            let mut jobs = self.write_jobs();
            let Some(job) = jobs.iter_mut().find(|j| j.id == claim.id) else {
                warn!(job_id = %claim.id, "Finished job is no longer in the queue");
                return;
            };
            if job.status.is_terminal() {
                warn!(job_id = %claim.id, status = %job.status, "Ignoring result for finished job");
                return;
            }

            job.finished_at = Some(Utc::now());
            let event = match outcome {
                Ok(media) => {
                    info!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        bytes = media.len(),
                        duration_ms = job.duration_ms().unwrap_or_default(),
                        "Job completed"
                    );
                    let event = JobEvent::Completed {
                        id: job.id,
                        job_type: job.job_type,
                        mime_type: media.mime_type.clone(),
                        bytes: media.len(),
                    };
                    job.status = JobStatus::Completed;
                    job.result = Some(media);
                    job.error = None;
                    event
                }
                Err(err) => {
                    let message = err.to_string();
                    error!(
                        job_id = %job.id,
                        job_type = %job.job_type,
                        code = err.code(),
                        attempts = job.attempts,
                        error = %message,
                        "Job failed"
                    );
                    job.status = JobStatus::Failed;
                    job.error = Some(message.clone());
                    JobEvent::Failed {
                        id: job.id,
                        job_type: job.job_type,
                        error: message,
                    }
                }
            };
            self.publish_stats(&jobs);
            event
        };
        self.emit(event);
    }

    /// Run a job until it succeeds, fails fatally or runs out of attempts
    async fn execute(&self, claim: &Claimed) -> Result<MediaData> {
        claim.payload.validate_for(claim.job_type)?;

        let mut attempts = 0u32;
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::QueueShutdown),
                result = self.runner.run(claim.job_type, &claim.payload) => result,
            };

            let err = match result {
                Ok(media) => return Ok(media),
                Err(err) => err,
            };

            if classify(&err) == FailureKind::Fatal {
                return Err(err);
            }

            attempts += 1;
            self.record_attempt(claim.id, attempts);

            if !self.policy.can_retry(attempts) {
                warn!(
                    job_id = %claim.id,
                    attempts,
                    "Rate limit persisted; giving up"
                );
                return Err(err);
            }

            let rotated_key = self.runner.on_rate_limited(claim.job_type, &claim.payload);
            let delay = self.policy.backoff(attempts);
            warn!(
                job_id = %claim.id,
                attempt = attempts,
                max_attempts = self.policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                rotated_key,
                error = %err,
                "Rate limited; backing off"
            );
            self.emit(JobEvent::Retrying {
                id: claim.id,
                job_type: claim.job_type,
                attempt: attempts,
                max_attempts: self.policy.max_attempts,
                delay_ms: delay.as_millis() as u64,
                rotated_key,
                error: err.to_string(),
            });

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::QueueShutdown),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

async fn run_worker(inner: Arc<Inner>, claim: Claimed, permit: OwnedSemaphorePermit) {
    let outcome = inner.execute(&claim).await;
    inner.finish(&claim, outcome);
    drop(permit);
    inner.wake.notify_one();
}

async fn run_scheduler(inner: Arc<Inner>) {
    let mut workers = JoinSet::new();

    loop {
        let mut launched = 0usize;
        while inner.has_pending() {
            let Ok(permit) = Arc::clone(&inner.permits).try_acquire_owned() else {
                break;
            };

            if launched > 0 && !inner.stagger.is_zero() {
                tokio::select! {
                    _ = inner.cancel.cancelled() => break,
                    _ = tokio::time::sleep(inner.stagger) => {}
                }
            }

            let Some(claim) = inner.claim_next() else {
                break;
            };
            workers.spawn(run_worker(Arc::clone(&inner), claim, permit));
            launched += 1;
        }

        if inner.cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = inner.cancel.cancelled() => break,
            _ = inner.wake.notified() => {}
            Some(joined) = workers.join_next(), if !workers.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Job worker ended abnormally");
                }
            }
        }
    }

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Job worker ended abnormally");
        }
    }
    debug!("Queue scheduler stopped");
}
