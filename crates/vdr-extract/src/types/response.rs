//! Response bodies for the document endpoints

use serde::{Deserialize, Serialize};

use super::manifest::Chunk;
use crate::processing::JobStatus;

/// POST /docs/upload-split/async
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSplitResponse {
    /// Always "queued"
    pub status: String,
    pub doc_id: String,
    pub total_pages: u32,
    pub pages_per_chunk: u32,
    pub chunks: Vec<Chunk>,
    /// Manifest key
    pub manifest: String,
}

/// GET /docs/{doc_id}/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocStatusResponse {
    pub doc_id: String,
    pub total_chunks: usize,
    pub progress_pct: f64,
    pub counts: StatusCounts,
    pub manifest_key: String,
    pub chunks: Vec<ChunkStatus>,
}

/// Number of chunks per resolved job status
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts {
    pub queued: usize,
    pub started: usize,
    pub finished: usize,
    pub failed: usize,
    pub deferred: usize,
    pub unknown: usize,
}

impl StatusCounts {
    /// Count one more chunk with the given status
    pub fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Queued => self.queued += 1,
            JobStatus::Started => self.started += 1,
            JobStatus::Finished => self.finished += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Deferred => self.deferred += 1,
            JobStatus::Unknown => self.unknown += 1,
        }
    }
}

/// Per-chunk detail in manifest order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkStatus {
    pub index: u32,
    pub range: PageRange,
    pub job_id: String,
    pub status: JobStatus,
    pub expected_key: String,
    pub meta_key: String,
}

/// Inclusive 1-based page range
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PageRange {
    pub start_page: u32,
    pub end_page: u32,
}

/// GET /docs/{doc_id}/chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyChunksResponse {
    pub doc_id: String,
    pub ready_chunks: Vec<ReadyChunk>,
}

/// A finished chunk with proxy download URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyChunk {
    pub index: u32,
    pub start_page: u32,
    pub end_page: u32,
    pub pdf_key: String,
    pub meta_key: String,
    pub download_pdf: String,
    pub download_meta: String,
}

/// POST /docs/{doc_id}/retry-failed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryFailedResponse {
    pub doc_id: String,
    pub retried: Vec<RetriedChunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetriedChunk {
    pub index: u32,
    pub new_job_id: String,
}

/// POST /docs/extract/{doc_id}/async
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionPlanResponse {
    pub doc_id: String,
    pub jobs: Vec<ExtractionJob>,
    pub total_jobs: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionJob {
    pub chunk_index: u32,
    pub job_id: String,
    pub out_jsonl_key: String,
}
