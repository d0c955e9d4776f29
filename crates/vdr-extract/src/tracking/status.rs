//! Status Aggregator and Ready-Chunks Lister

use futures::stream::{self, StreamExt};
use std::sync::Arc;

use crate::error::Result;
use crate::processing::{JobQueue, JobStatus};
use crate::storage::{keys, ManifestStore};
use crate::types::{
    Chunk, ChunkStatus, DocStatusResponse, Manifest, PageRange, ReadyChunk, ReadyChunksResponse,
    StatusCounts,
};

/// Percentage of finished chunks, rounded to 2 decimals; 0 for no chunks
pub fn progress_pct(finished: usize, total: usize) -> f64 {
    let pct = 100.0 * finished as f64 / total.max(1) as f64;
    (pct * 100.0).round() / 100.0
}

/// Merges a manifest with the live status of each chunk's job
#[derive(Clone)]
pub struct StatusAggregator {
    manifests: ManifestStore,
    queue: Arc<dyn JobQueue>,
    concurrency: usize,
}

impl StatusAggregator {
    pub fn new(manifests: ManifestStore, queue: Arc<dyn JobQueue>, concurrency: usize) -> Self {
        Self {
            manifests,
            queue,
            concurrency: concurrency.max(1),
        }
    }

    /// Live status of one job; lookup failures degrade to `Unknown`
    pub async fn job_status(&self, job_id: &str) -> JobStatus {
        match self.queue.fetch_status(job_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!("Status lookup for job {} failed: {}", job_id, e);
                JobStatus::Unknown
            }
        }
    }

    /// Statuses of every chunk, in manifest order
    pub async fn chunk_statuses(&self, manifest: &Manifest) -> Vec<JobStatus> {
        // owned ids keep the lookup futures free of borrows into the manifest
        let job_ids: Vec<String> = manifest.chunks.iter().map(|c| c.job_id.clone()).collect();
        stream::iter(job_ids)
            .map(|job_id| async move { self.job_status(&job_id).await })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Progress report for a document; `NotFound` without a manifest
    pub async fn status(&self, doc_id: &str) -> Result<DocStatusResponse> {
        let (manifest, _) = self.manifests.require(doc_id).await?;
        let statuses = self.chunk_statuses(&manifest).await;

        let mut counts = StatusCounts::default();
        let chunks: Vec<ChunkStatus> = manifest
            .chunks
            .iter()
            .zip(statuses)
            .map(|(chunk, status)| {
                counts.record(status);
                chunk_status(chunk, status)
            })
            .collect();

        let total_chunks = manifest.chunks.len();
        Ok(DocStatusResponse {
            doc_id: manifest.doc_id.clone(),
            total_chunks,
            progress_pct: progress_pct(counts.finished, total_chunks),
            counts,
            manifest_key: keys::manifest_key(&manifest.doc_id),
            chunks,
        })
    }

    /// Chunks whose job has finished, with proxy download URLs
    pub async fn ready_chunks(&self, doc_id: &str) -> Result<ReadyChunksResponse> {
        let (manifest, _) = self.manifests.require(doc_id).await?;
        let statuses = self.chunk_statuses(&manifest).await;

        let ready_chunks = manifest
            .chunks
            .iter()
            .zip(statuses)
            .filter(|(_, status)| *status == JobStatus::Finished)
            .map(|(chunk, _)| ReadyChunk {
                index: chunk.index,
                start_page: chunk.start_page,
                end_page: chunk.end_page,
                pdf_key: chunk.expected_key.clone(),
                meta_key: chunk.meta_key.clone(),
                download_pdf: keys::proxy_url(&chunk.expected_key),
                download_meta: keys::proxy_url(&chunk.meta_key),
            })
            .collect();

        Ok(ReadyChunksResponse {
            doc_id: manifest.doc_id,
            ready_chunks,
        })
    }
}

fn chunk_status(chunk: &Chunk, status: JobStatus) -> ChunkStatus {
    ChunkStatus {
        index: chunk.index,
        range: PageRange {
            start_page: chunk.start_page,
            end_page: chunk.end_page,
        },
        job_id: chunk.job_id.clone(),
        status,
        expected_key: chunk.expected_key.clone(),
        meta_key: chunk.meta_key.clone(),
    }
}
