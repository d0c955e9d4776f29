//! Retry Coordinator: re-dispatches chunks whose split job failed

use std::sync::Arc;

use super::StatusAggregator;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::processing::{new_job_id, JobOptions, JobQueue, JobStatus, SplitChunkArgs, Task};
use crate::storage::ManifestStore;
use crate::types::{RetriedChunk, RetryFailedResponse};

#[derive(Clone)]
pub struct RetryCoordinator {
    manifests: ManifestStore,
    statuses: StatusAggregator,
    queue: Arc<dyn JobQueue>,
    split_queue: String,
    options: JobOptions,
}

impl RetryCoordinator {
    pub fn new(
        config: &AppConfig,
        manifests: ManifestStore,
        statuses: StatusAggregator,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            manifests,
            statuses,
            queue,
            split_queue: config.queue.split_queue.clone(),
            options: JobOptions::from_config(&config.queue),
        }
    }

    /// Re-dispatch every chunk whose job is `failed` and record the new job ids
    ///
    /// New ids are chosen up front and written to the manifest, guarded by the
    /// entity tag it was read at, before anything is enqueued. A concurrent
    /// writer turns into `Error::Conflict` with no job dispatched, and every
    /// job that is dispatched is already referenced by the manifest.
    pub async fn retry_failed(&self, doc_id: &str) -> Result<RetryFailedResponse> {
        let (mut manifest, etag) = self.manifests.require(doc_id).await?;
        let statuses = self.statuses.chunk_statuses(&manifest).await;

        let mut pending = Vec::new();
        for (chunk, status) in manifest.chunks.iter_mut().zip(statuses) {
            if status != JobStatus::Failed {
                continue;
            }

            let task = Task::SplitChunk(SplitChunkArgs {
                original_key: manifest.original.key.clone(),
                doc_id: manifest.doc_id.clone(),
                chunk_index: chunk.index,
                start_page: chunk.start_page,
                end_page: chunk.end_page,
                out_key: chunk.expected_key.clone(),
                meta_key: chunk.meta_key.clone(),
            });
            let new_job_id = new_job_id();
            tracing::info!(
                "Retrying chunk {} of {}: job {} replaces {}",
                chunk.index,
                doc_id,
                new_job_id,
                chunk.job_id
            );

            chunk.job_id = new_job_id.clone();
            pending.push((chunk.index, new_job_id, task));
        }

        if pending.is_empty() {
            return Ok(RetryFailedResponse {
                doc_id: manifest.doc_id,
                retried: Vec::new(),
            });
        }

        self.manifests.save_if_unchanged(&manifest, &etag).await?;

        // the manifest already names every job; keep going past a failed
        // dispatch so the others still run, and report the first error
        let mut retried = Vec::with_capacity(pending.len());
        let mut first_error: Option<Error> = None;
        for (index, job_id, task) in pending {
            match self
                .queue
                .enqueue_as(&self.split_queue, &job_id, task, &self.options)
                .await
            {
                Ok(()) => retried.push(RetriedChunk {
                    index,
                    new_job_id: job_id,
                }),
                Err(e) => {
                    tracing::error!(
                        "Failed to dispatch retry of chunk {} of {} as job {}: {}",
                        index,
                        doc_id,
                        job_id,
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(RetryFailedResponse {
            doc_id: manifest.doc_id,
            retried,
        })
    }
}
