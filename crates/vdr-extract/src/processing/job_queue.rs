//! Named background job queues with per-job status tracking
//!
//! `LocalJobQueue` runs everything in-process: one unbounded channel per named
//! queue feeds a `QueueWorker`, and a shared map holds every job's record.
//! Enqueueing never waits on workers. Finished and failed records are swept
//! once they outlive the result TTL.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::worker::{QueueWorker, TaskHandler};
use crate::config::QueueConfig;
use crate::error::{Error, Result};

/// Longest pause between sweeps of expired job records
const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Status of a queued job
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a worker
    Queued,
    /// Running on a worker
    Started,
    /// Handler returned successfully
    Finished,
    /// Retries exhausted
    Failed,
    /// Waiting out a retry backoff
    Deferred,
    /// Status could not be determined
    Unknown,
}

impl JobStatus {
    /// Whether the job will not run again without a new enqueue
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Deferred => "deferred",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments of a chunk split job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitChunkArgs {
    pub original_key: String,
    pub doc_id: String,
    pub chunk_index: u32,
    pub start_page: u32,
    pub end_page: u32,
    pub out_key: String,
    pub meta_key: String,
}

/// Arguments of a chunk extraction job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractChunkArgs {
    pub doc_id: String,
    pub chunk_index: u32,
    pub chunk_pdf_key: String,
    pub out_jsonl_key: String,
    /// Global page number of the chunk's first page
    pub page_offset: u32,
}

/// Unit of work carried by a job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "task", content = "args", rename_all = "snake_case")]
pub enum Task {
    SplitChunk(SplitChunkArgs),
    ExtractChunk(ExtractChunkArgs),
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::SplitChunk(_) => "split_chunk",
            Task::ExtractChunk(_) => "extract_chunk",
        }
    }
}

/// Retry schedule applied after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Backoff before each retry; the last interval repeats
    pub intervals: Vec<Duration>,
}

impl RetryPolicy {
    /// Backoff before the retry following failure number `failures` (1-based),
    /// or `None` once retries are exhausted
    pub fn delay_after(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures > self.max_retries {
            return None;
        }
        let idx = (failures as usize - 1).min(self.intervals.len().saturating_sub(1));
        Some(self.intervals.get(idx).copied().unwrap_or_default())
    }
}

/// Per-job execution options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOptions {
    /// Wall-clock limit of a single attempt
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl JobOptions {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            timeout: config.job_timeout(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                intervals: config
                    .retry_intervals_secs
                    .iter()
                    .map(|s| Duration::from_secs(*s))
                    .collect(),
            },
        }
    }
}

/// Fresh opaque job id
pub fn new_job_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Dispatch surface used by the planners and coordinators
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue a task on a named queue; returns the new job id
    async fn enqueue(&self, queue: &str, task: Task, options: &JobOptions) -> Result<String> {
        let job_id = new_job_id();
        self.enqueue_as(queue, &job_id, task, options).await?;
        Ok(job_id)
    }

    /// Enqueue a task under a caller-chosen id, e.g. one already recorded
    /// in a manifest; an id already in use is an error
    async fn enqueue_as(
        &self,
        queue: &str,
        job_id: &str,
        task: Task,
        options: &JobOptions,
    ) -> Result<()>;

    /// Current status of a job; an unknown id is an error
    async fn fetch_status(&self, job_id: &str) -> Result<JobStatus>;
}

/// Tracked state of one job
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub queue: String,
    pub task: Task,
    pub status: JobStatus,
    /// Attempts started so far
    pub attempts: u32,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Message carried on a queue channel
#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: String,
    pub task: Task,
    pub options: JobOptions,
}

/// In-process job queue
pub struct LocalJobQueue {
    jobs: DashMap<String, JobRecord>,
    senders: HashMap<String, mpsc::UnboundedSender<QueuedJob>>,
    /// Receivers waiting for `start_workers`
    receivers: Mutex<HashMap<String, mpsc::UnboundedReceiver<QueuedJob>>>,
    /// How long finished and failed records stay visible
    result_ttl: Duration,
}

impl LocalJobQueue {
    /// Create a queue set with the given queue names
    pub fn new<I, S>(queue_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();
        for name in queue_names {
            let name = name.into();
            let (tx, rx) = mpsc::unbounded_channel();
            senders.insert(name.clone(), tx);
            receivers.insert(name, rx);
        }

        Self {
            jobs: DashMap::new(),
            senders,
            receivers: Mutex::new(receivers),
            result_ttl: Duration::from_secs(QueueConfig::default().result_ttl_secs),
        }
    }

    /// Queue set for the split and extract queues named in the config
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new([config.split_queue.clone(), config.extract_queue.clone()])
            .with_result_ttl(config.result_ttl())
    }

    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    /// Spawn `workers_per_queue` concurrent workers for every queue, plus
    /// the sweeper that drops expired records
    ///
    /// Each queue can only be started once; later calls start nothing.
    pub fn start_workers(
        self: &Arc<Self>,
        handler: Arc<dyn TaskHandler>,
        workers_per_queue: usize,
    ) -> Vec<JoinHandle<()>> {
        let receivers: Vec<_> = self.receivers.lock().drain().collect();
        if receivers.is_empty() {
            return Vec::new();
        }

        let mut handles: Vec<JoinHandle<()>> = receivers
            .into_iter()
            .map(|(name, receiver)| {
                let worker = QueueWorker::new(
                    name,
                    Arc::clone(self),
                    Arc::clone(&handler),
                    workers_per_queue,
                );
                tokio::spawn(worker.run(receiver))
            })
            .collect();
        handles.push(tokio::spawn(sweep_expired(
            Arc::downgrade(self),
            self.result_ttl.min(MAX_SWEEP_INTERVAL),
        )));
        handles
    }

    /// Drop finished and failed records last updated more than the result
    /// TTL ago; returns how many were removed
    pub fn prune_expired(&self) -> usize {
        let ttl = chrono::Duration::from_std(self.result_ttl).unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            return 0;
        };

        let before = self.jobs.len();
        self.jobs
            .retain(|_, record| !(record.status.is_terminal() && record.updated_at < cutoff));
        let removed = before.saturating_sub(self.jobs.len());
        if removed > 0 {
            tracing::debug!("Pruned {} expired job records", removed);
        }
        removed
    }

    /// Snapshot of a job's record
    pub fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.get(job_id).map(|r| r.clone())
    }

    pub(crate) fn mark_started(&self, job_id: &str) -> u32 {
        match self.jobs.get_mut(job_id) {
            Some(mut record) => {
                record.status = JobStatus::Started;
                record.attempts += 1;
                record.updated_at = Utc::now();
                record.attempts
            }
            None => 0,
        }
    }

    pub(crate) fn mark_finished(&self, job_id: &str, result: serde_json::Value) {
        if let Some(mut record) = self.jobs.get_mut(job_id) {
            record.status = JobStatus::Finished;
            record.result = Some(result);
            record.error = None;
            record.updated_at = Utc::now();
        }
    }

    pub(crate) fn mark_errored(&self, job_id: &str, status: JobStatus, error: String) {
        if let Some(mut record) = self.jobs.get_mut(job_id) {
            record.status = status;
            record.error = Some(error);
            record.updated_at = Utc::now();
        }
    }

    /// Put a deferred job back on its queue
    pub(crate) fn requeue(&self, queue: &str, job: QueuedJob) -> Result<()> {
        if let Some(mut record) = self.jobs.get_mut(&job.id) {
            record.status = JobStatus::Queued;
            record.updated_at = Utc::now();
        }
        self.send(queue, job)
    }

    fn send(&self, queue: &str, job: QueuedJob) -> Result<()> {
        let sender = self
            .senders
            .get(queue)
            .ok_or_else(|| Error::queue(format!("unknown queue '{}'", queue)))?;
        sender
            .send(job)
            .map_err(|e| Error::queue(format!("queue '{}' closed: {}", queue, e)))
    }

    /// Drop a queue's receiver so every later send fails
    #[cfg(test)]
    pub(crate) fn close(&self, queue: &str) {
        self.receivers.lock().remove(queue);
    }
}

/// Periodically prune expired records until the queue is dropped
async fn sweep_expired(queue: Weak<LocalJobQueue>, every: Duration) {
    let mut interval = tokio::time::interval(every.max(Duration::from_millis(10)));
    loop {
        interval.tick().await;
        let Some(queue) = queue.upgrade() else {
            break;
        };
        queue.prune_expired();
    }
}

#[async_trait]
impl JobQueue for LocalJobQueue {
    async fn enqueue_as(
        &self,
        queue: &str,
        job_id: &str,
        task: Task,
        options: &JobOptions,
    ) -> Result<()> {
        if !self.senders.contains_key(queue) {
            return Err(Error::queue(format!("unknown queue '{}'", queue)));
        }

        let now = Utc::now();
        match self.jobs.entry(job_id.to_string()) {
            Entry::Occupied(_) => {
                return Err(Error::queue(format!("job id '{}' already in use", job_id)));
            }
            Entry::Vacant(slot) => {
                slot.insert(JobRecord {
                    id: job_id.to_string(),
                    queue: queue.to_string(),
                    task: task.clone(),
                    status: JobStatus::Queued,
                    attempts: 0,
                    result: None,
                    error: None,
                    enqueued_at: now,
                    updated_at: now,
                });
            }
        }

        let job = QueuedJob {
            id: job_id.to_string(),
            task,
            options: options.clone(),
        };
        // the record stays as failed so a caller holding the id sees the outcome
        if let Err(e) = self.send(queue, job) {
            self.mark_errored(job_id, JobStatus::Failed, e.to_string());
            return Err(e);
        }

        tracing::debug!("Enqueued job {} on '{}'", job_id, queue);
        Ok(())
    }

    async fn fetch_status(&self, job_id: &str) -> Result<JobStatus> {
        self.jobs
            .get(job_id)
            .map(|r| r.status)
            .ok_or_else(|| Error::queue(format!("no such job '{}'", job_id)))
    }
}
