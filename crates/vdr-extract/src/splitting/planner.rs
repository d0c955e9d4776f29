//! Chunk Planner: validates an upload, plans page ranges, dispatches split jobs
//! and records everything in a fresh manifest

use bytes::Bytes;
use std::sync::Arc;

use crate::config::{AppConfig, SplittingConfig};
use crate::error::{Error, Result};
use crate::pdf::{run_blocking, PdfEngine};
use crate::processing::{JobOptions, JobQueue, SplitChunkArgs, Task};
use crate::providers::ObjectStore;
use crate::storage::{keys, ManifestStore};
use crate::types::{
    Chunk, Manifest, ManifestStatus, OriginalInfo, UploadSplitResponse, MANIFEST_VERSION,
};

const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["application/pdf", "application/octet-stream"];

/// Greedy contiguous partition of `[1, total_pages]`
///
/// Every range spans `pages_per_chunk` pages except possibly the last.
pub fn plan_ranges(total_pages: u32, pages_per_chunk: u32) -> Vec<(u32, u32)> {
    if pages_per_chunk == 0 || total_pages == 0 {
        return Vec::new();
    }

    let mut ranges = Vec::with_capacity(total_pages.div_ceil(pages_per_chunk) as usize);
    let mut start = 1u32;
    loop {
        let end = start.saturating_add(pages_per_chunk - 1).min(total_pages);
        ranges.push((start, end));
        if end == total_pages {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// Turns an uploaded PDF into a manifest plus one split job per chunk
#[derive(Clone)]
pub struct ChunkPlanner {
    store: Arc<dyn ObjectStore>,
    queue: Arc<dyn JobQueue>,
    engine: Arc<dyn PdfEngine>,
    manifests: ManifestStore,
    split_queue: String,
    options: JobOptions,
    splitting: SplittingConfig,
    max_upload_bytes: usize,
}

impl ChunkPlanner {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn JobQueue>,
        engine: Arc<dyn PdfEngine>,
    ) -> Self {
        Self {
            manifests: ManifestStore::new(Arc::clone(&store)),
            store,
            queue,
            engine,
            split_queue: config.queue.split_queue.clone(),
            options: JobOptions::from_config(&config.queue),
            splitting: config.splitting.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }

    /// Upload size cap in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// Reject uploads over the size cap
    pub fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_upload_bytes {
            return Err(Error::PayloadTooLarge(format!(
                "upload exceeds {} bytes",
                self.max_upload_bytes
            )));
        }
        Ok(())
    }

    /// Accept only PDF or generic binary uploads
    pub fn check_content_type(content_type: Option<&str>) -> Result<()> {
        let essence = content_type
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if ACCEPTED_CONTENT_TYPES.contains(&essence.as_str()) {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "content type '{}' is not a PDF",
                content_type.unwrap_or("")
            )))
        }
    }

    /// Apply the default and bounds to a requested chunk size
    pub fn resolve_pages_per_chunk(&self, requested: Option<u32>) -> Result<u32> {
        let ppc = requested.unwrap_or(self.splitting.default_pages_per_chunk);
        if ppc == 0 || ppc > self.splitting.max_pages_per_chunk {
            return Err(Error::validation(format!(
                "pages_per_chunk must be between 1 and {}",
                self.splitting.max_pages_per_chunk
            )));
        }
        Ok(ppc)
    }

    /// Persist the upload, dispatch one split job per planned range and
    /// write the manifest last
    pub async fn upload_and_split(
        &self,
        data: Bytes,
        content_type: Option<&str>,
        pages_per_chunk: Option<u32>,
    ) -> Result<UploadSplitResponse> {
        Self::check_content_type(content_type)?;
        let pages_per_chunk = self.resolve_pages_per_chunk(pages_per_chunk)?;
        self.check_size(data.len())?;
        if data.is_empty() {
            return Err(Error::validation("uploaded file is empty"));
        }

        let total_pages = {
            let engine = Arc::clone(&self.engine);
            let data = data.clone();
            run_blocking(move || engine.page_count(&data)).await?
        };
        if total_pages == 0 {
            return Err(Error::InvalidPdf("document has no pages".to_string()));
        }

        let doc_id = keys::new_doc_id();
        let original_key = keys::original_key(&doc_id);
        let size_bytes = data.len() as u64;

        // workers may pick up a job right after enqueue, so the source goes first
        self.store
            .put(&original_key, data, "application/pdf")
            .await?;
        tracing::info!(
            "Accepted upload {} ({} bytes, {} pages, {} per chunk)",
            doc_id,
            size_bytes,
            total_pages,
            pages_per_chunk
        );

        let mut chunks = Vec::new();
        for (position, (start_page, end_page)) in
            plan_ranges(total_pages, pages_per_chunk).into_iter().enumerate()
        {
            let index = position as u32 + 1;
            let expected_key = keys::chunk_pdf_key(&doc_id, index);
            let meta_key = keys::chunk_meta_key(&doc_id, index);

            let task = Task::SplitChunk(SplitChunkArgs {
                original_key: original_key.clone(),
                doc_id: doc_id.clone(),
                chunk_index: index,
                start_page,
                end_page,
                out_key: expected_key.clone(),
                meta_key: meta_key.clone(),
            });
            let job_id = self
                .queue
                .enqueue(&self.split_queue, task, &self.options)
                .await?;
            tracing::debug!(
                "Dispatched chunk {} of {} (pages {}-{}) as job {}",
                index,
                doc_id,
                start_page,
                end_page,
                job_id
            );

            chunks.push(Chunk {
                index,
                start_page,
                end_page,
                expected_key,
                meta_key,
                job_id,
            });
        }

        let manifest = Manifest {
            doc_id: doc_id.clone(),
            original: OriginalInfo {
                key: original_key,
                size_bytes,
                total_pages,
            },
            pages_per_chunk,
            chunks,
            status: ManifestStatus::Processing,
            version: MANIFEST_VERSION.to_string(),
        };
        self.manifests.create(&manifest).await?;
        tracing::info!("Queued {} split jobs for {}", manifest.chunks.len(), doc_id);

        Ok(UploadSplitResponse {
            status: "queued".to_string(),
            doc_id: doc_id.clone(),
            total_pages,
            pages_per_chunk,
            chunks: manifest.chunks,
            manifest: keys::manifest_key(&doc_id),
        })
    }
}
