//! Background worker draining one named queue

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;

use super::job_queue::{JobStatus, LocalJobQueue, QueuedJob, Task};
use crate::error::{Error, Result};

/// Executes the task carried by a job
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run a task to completion; the returned value is kept as the job result
    async fn handle(&self, task: &Task) -> Result<serde_json::Value>;
}

/// Worker for one named queue
pub struct QueueWorker {
    queue_name: String,
    queue: Arc<LocalJobQueue>,
    handler: Arc<dyn TaskHandler>,
    concurrency: usize,
}

impl QueueWorker {
    pub fn new(
        queue_name: String,
        queue: Arc<LocalJobQueue>,
        handler: Arc<dyn TaskHandler>,
        concurrency: usize,
    ) -> Self {
        Self {
            queue_name,
            queue,
            handler,
            concurrency: concurrency.max(1),
        }
    }

    /// Pull jobs until the channel closes, running up to `concurrency` at once
    pub async fn run(self, mut receiver: mpsc::UnboundedReceiver<QueuedJob>) {
        tracing::info!(
            "Queue worker '{}' started with {} slots",
            self.queue_name,
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let this = Arc::new(self);

        while let Some(job) = receiver.recv().await {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let worker = Arc::clone(&this);
            tokio::spawn(async move {
                worker.process(job).await;
                drop(permit);
            });
        }

        tracing::info!("Queue worker '{}' stopped", this.queue_name);
    }

    async fn process(&self, job: QueuedJob) {
        let attempt = self.queue.mark_started(&job.id);
        tracing::info!(
            "Job {} ({}) started on '{}', attempt {}",
            job.id,
            job.task.name(),
            self.queue_name,
            attempt
        );
        let started = Instant::now();

        let outcome = match timeout(job.options.timeout, self.handler.handle(&job.task)).await {
            Ok(result) => result,
            Err(_) => Err(Error::queue(format!(
                "job timed out after {}s",
                job.options.timeout.as_secs()
            ))),
        };

        match outcome {
            Ok(result) => {
                self.queue.mark_finished(&job.id, result);
                tracing::info!(
                    "Job {} finished in {}ms",
                    job.id,
                    started.elapsed().as_millis()
                );
            }
            Err(e) => self.fail_attempt(job, attempt, e),
        }
    }

    /// Defer the job for its next backoff, or fail it for good
    fn fail_attempt(&self, job: QueuedJob, attempt: u32, error: Error) {
        let Some(delay) = job.options.retry.delay_after(attempt) else {
            tracing::error!(
                "Job {} failed permanently after {} attempts: {}",
                job.id,
                attempt,
                error
            );
            self.queue
                .mark_errored(&job.id, JobStatus::Failed, error.to_string());
            return;
        };

        tracing::warn!(
            "Job {} attempt {} failed, retrying in {}s: {}",
            job.id,
            attempt,
            delay.as_secs(),
            error
        );
        self.queue
            .mark_errored(&job.id, JobStatus::Deferred, error.to_string());

        let queue = Arc::clone(&self.queue);
        let queue_name = self.queue_name.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let job_id = job.id.clone();
            if let Err(e) = queue.requeue(&queue_name, job) {
                tracing::error!("Failed to requeue job {}: {}", job_id, e);
                queue.mark_errored(&job_id, JobStatus::Failed, e.to_string());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::{ExtractChunkArgs, JobOptions, JobQueue, RetryPolicy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Flaky {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl TaskHandler for Flaky {
        async fn handle(&self, _task: &Task) -> Result<serde_json::Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(Error::internal("boom"))
            } else {
                Ok(serde_json::json!({"ok": true}))
            }
        }
    }

    struct Sleepy;

    #[async_trait]
    impl TaskHandler for Sleepy {
        async fn handle(&self, _task: &Task) -> Result<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(serde_json::Value::Null)
        }
    }

    fn task() -> Task {
        Task::ExtractChunk(ExtractChunkArgs {
            doc_id: "a".to_string(),
            chunk_index: 1,
            chunk_pdf_key: "docs/a/chunks/chunk-0001.pdf".to_string(),
            out_jsonl_key: "docs/a/texts/chunk-0001.jsonl".to_string(),
            page_offset: 1,
        })
    }

    fn fast_options(max_retries: u32) -> JobOptions {
        JobOptions {
            timeout: Duration::from_secs(2),
            retry: RetryPolicy {
                max_retries,
                intervals: vec![Duration::ZERO],
            },
        }
    }

    async fn wait_for(queue: &LocalJobQueue, id: &str, want: JobStatus) -> JobStatus {
        let mut status = JobStatus::Unknown;
        for _ in 0..200 {
            status = queue.fetch_status(id).await.unwrap();
            if status == want {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        status
    }

    #[tokio::test]
    async fn test_success_after_retries() {
        let queue = Arc::new(LocalJobQueue::new(["q"]));
        let handler = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        });
        queue.start_workers(handler.clone(), 2);

        let id = queue.enqueue("q", task(), &fast_options(3)).await.unwrap();
        assert_eq!(wait_for(&queue, &id, JobStatus::Finished).await, JobStatus::Finished);

        let record = queue.get(&id).unwrap();
        assert_eq!(record.attempts, 3);
        assert_eq!(record.result, Some(serde_json::json!({"ok": true})));
    }

    #[tokio::test]
    async fn test_failed_once_retries_exhausted() {
        let queue = Arc::new(LocalJobQueue::new(["q"]));
        let handler = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        });
        queue.start_workers(handler.clone(), 1);

        let id = queue.enqueue("q", task(), &fast_options(2)).await.unwrap();
        assert_eq!(wait_for(&queue, &id, JobStatus::Failed).await, JobStatus::Failed);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(queue.get(&id).unwrap().error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failure() {
        let queue = Arc::new(LocalJobQueue::new(["q"]));
        queue.start_workers(Arc::new(Sleepy), 1);

        let options = JobOptions {
            timeout: Duration::from_millis(20),
            retry: RetryPolicy {
                max_retries: 0,
                intervals: vec![],
            },
        };
        let id = queue.enqueue("q", task(), &options).await.unwrap();
        assert_eq!(wait_for(&queue, &id, JobStatus::Failed).await, JobStatus::Failed);
        assert!(queue.get(&id).unwrap().error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_deferred_while_backing_off() {
        let queue = Arc::new(LocalJobQueue::new(["q"]));
        let handler = Arc::new(Flaky {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        });
        queue.start_workers(handler, 1);

        let options = JobOptions {
            timeout: Duration::from_secs(2),
            retry: RetryPolicy {
                max_retries: 1,
                intervals: vec![Duration::from_secs(60)],
            },
        };
        let id = queue.enqueue("q", task(), &options).await.unwrap();
        assert_eq!(wait_for(&queue, &id, JobStatus::Deferred).await, JobStatus::Deferred);
    }
}
