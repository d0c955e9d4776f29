//! Extraction Planner: one extraction job per manifest chunk
//!
//! The returned plan is the only record of these jobs; nothing is persisted.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::Result;
use crate::processing::{ExtractChunkArgs, JobOptions, JobQueue, Task};
use crate::storage::{keys, ManifestStore};
use crate::types::{ExtractionJob, ExtractionPlanResponse};

#[derive(Clone)]
pub struct ExtractionPlanner {
    manifests: ManifestStore,
    queue: Arc<dyn JobQueue>,
    extract_queue: String,
    options: JobOptions,
}

impl ExtractionPlanner {
    pub fn new(config: &AppConfig, manifests: ManifestStore, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            manifests,
            queue,
            extract_queue: config.queue.extract_queue.clone(),
            options: JobOptions::from_config(&config.queue),
        }
    }

    pub async fn plan(&self, doc_id: &str) -> Result<ExtractionPlanResponse> {
        let (manifest, _) = self.manifests.require(doc_id).await?;

        let mut jobs = Vec::with_capacity(manifest.chunks.len());
        for chunk in &manifest.chunks {
            let out_jsonl_key = keys::chunk_text_key(&manifest.doc_id, chunk.index);
            let task = Task::ExtractChunk(ExtractChunkArgs {
                doc_id: manifest.doc_id.clone(),
                chunk_index: chunk.index,
                chunk_pdf_key: chunk.expected_key.clone(),
                out_jsonl_key: out_jsonl_key.clone(),
                page_offset: chunk.start_page,
            });
            let job_id = self
                .queue
                .enqueue(&self.extract_queue, task, &self.options)
                .await?;

            jobs.push(ExtractionJob {
                chunk_index: chunk.index,
                job_id,
                out_jsonl_key,
            });
        }

        tracing::info!("Queued {} extraction jobs for {}", jobs.len(), doc_id);
        Ok(ExtractionPlanResponse {
            doc_id: manifest.doc_id,
            total_jobs: jobs.len(),
            jobs,
        })
    }
}
