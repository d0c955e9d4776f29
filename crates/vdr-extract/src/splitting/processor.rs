//! Chunk Processor: runs one split job inside a worker

use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::pdf::{run_blocking, PdfEngine};
use crate::processing::SplitChunkArgs;
use crate::providers::ObjectStore;
use crate::types::{ChunkMetadata, ChunkOutcome};

/// Clamp a requested page range into `[1, total_pages]`, swapping inverted bounds
///
/// Returns `None` for a document without pages.
pub fn clamp_range(start: u32, end: u32, total_pages: u32) -> Option<(u32, u32)> {
    if total_pages == 0 {
        return None;
    }
    let start = start.clamp(1, total_pages);
    let end = end.clamp(1, total_pages);
    Some((start.min(end), start.max(end)))
}

/// Slices page ranges out of stored originals
#[derive(Clone)]
pub struct ChunkProcessor {
    store: Arc<dyn ObjectStore>,
    engine: Arc<dyn PdfEngine>,
}

impl ChunkProcessor {
    pub fn new(store: Arc<dyn ObjectStore>, engine: Arc<dyn PdfEngine>) -> Self {
        Self { store, engine }
    }

    /// Split one chunk and always record the outcome at `meta_key`
    ///
    /// Slicing failures become an `error` metadata record and still return
    /// `Ok`; only a failed metadata write is an error.
    pub async fn process(&self, args: &SplitChunkArgs) -> Result<ChunkMetadata> {
        let outcome = match self.split(args).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    "Chunk {} of {} failed: {}",
                    args.chunk_index,
                    args.doc_id,
                    e
                );
                ChunkOutcome::Error {
                    error: e.to_string(),
                }
            }
        };

        let metadata = ChunkMetadata {
            doc_id: args.doc_id.clone(),
            chunk_index: args.chunk_index,
            outcome,
        };
        let body = serde_json::to_vec_pretty(&metadata)?;
        self.store
            .put(&args.meta_key, Bytes::from(body), "application/json")
            .await?;

        Ok(metadata)
    }

    async fn split(&self, args: &SplitChunkArgs) -> Result<ChunkOutcome> {
        let source = self.store.get_bytes(&args.original_key).await?;

        let engine = Arc::clone(&self.engine);
        let (requested_start, requested_end) = (args.start_page, args.end_page);
        let (start_page, end_page, pdf) = run_blocking(move || {
            let total = engine.page_count(&source)?;
            let (start, end) = clamp_range(requested_start, requested_end, total)
                .ok_or_else(|| Error::Pdf("source document has no pages".to_string()))?;
            let pdf = engine.slice_pages(&source, start, end)?;
            Ok((start, end, pdf))
        })
        .await?;

        if (start_page, end_page) != (args.start_page, args.end_page) {
            tracing::warn!(
                "Chunk {} of {} clamped from {}-{} to {}-{}",
                args.chunk_index,
                args.doc_id,
                args.start_page,
                args.end_page,
                start_page,
                end_page
            );
        }

        let size_bytes = pdf.len() as u64;
        self.store
            .put(&args.out_key, Bytes::from(pdf), "application/pdf")
            .await?;
        tracing::debug!(
            "Chunk {} of {} written to {} ({} bytes)",
            args.chunk_index,
            args.doc_id,
            args.out_key,
            size_bytes
        );

        Ok(ChunkOutcome::Done {
            start_page,
            end_page,
            out_key: args.out_key.clone(),
            size_bytes,
            num_pages: end_page - start_page + 1,
            updated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{sample_pdf, LopdfEngine};
    use crate::providers::MemoryObjectStore;
    use proptest::prelude::*;

    fn args(start: u32, end: u32) -> SplitChunkArgs {
        SplitChunkArgs {
            original_key: "docs/d/original.pdf".to_string(),
            doc_id: "d".to_string(),
            chunk_index: 1,
            start_page: start,
            end_page: end,
            out_key: "docs/d/chunks/chunk-0001.pdf".to_string(),
            meta_key: "docs/d/chunks/chunk-0001.json".to_string(),
        }
    }

    async fn processor_with(pages: &[&str]) -> (Arc<MemoryObjectStore>, ChunkProcessor) {
        let store = Arc::new(MemoryObjectStore::default());
        store
            .put("docs/d/original.pdf", Bytes::from(sample_pdf(pages)), "application/pdf")
            .await
            .unwrap();
        let processor = ChunkProcessor::new(store.clone(), Arc::new(LopdfEngine::new()));
        (store, processor)
    }

    #[test]
    fn test_clamp_examples() {
        assert_eq!(clamp_range(0, 100, 10), Some((1, 10)));
        assert_eq!(clamp_range(8, 3, 10), Some((3, 8)));
        assert_eq!(clamp_range(50, 60, 10), Some((10, 10)));
        assert_eq!(clamp_range(1, 1, 0), None);
    }

    proptest! {
        #[test]
        fn prop_clamped_range_is_valid(start in 0u32..1000, end in 0u32..1000, total in 1u32..500) {
            let (s, e) = clamp_range(start, end, total).unwrap();
            prop_assert!(1 <= s && s <= e && e <= total);
            let (lo, hi) = (start.min(end), start.max(end));
            if lo >= 1 && hi <= total {
                prop_assert_eq!((s, e), (lo, hi));
            }
        }
    }

    #[tokio::test]
    async fn test_done_metadata_uses_effective_range() {
        let (store, processor) = processor_with(&["a", "b", "c", "d"]).await;

        let meta = processor.process(&args(3, 99)).await.unwrap();
        match &meta.outcome {
            ChunkOutcome::Done {
                start_page,
                end_page,
                num_pages,
                size_bytes,
                ..
            } => {
                assert_eq!((*start_page, *end_page), (3, 4));
                assert_eq!(*num_pages, 2);
                assert!(*size_bytes > 0);
            }
            ChunkOutcome::Error { error } => panic!("unexpected error: {error}"),
        }

        let chunk = store.get_bytes("docs/d/chunks/chunk-0001.pdf").await.unwrap();
        assert_eq!(LopdfEngine::new().page_count(&chunk).unwrap(), 2);

        let stored: ChunkMetadata = serde_json::from_slice(
            &store.get_bytes("docs/d/chunks/chunk-0001.json").await.unwrap(),
        )
        .unwrap();
        assert_eq!(stored, meta);
    }

    #[tokio::test]
    async fn test_missing_source_writes_error_metadata() {
        let store = Arc::new(MemoryObjectStore::default());
        let processor = ChunkProcessor::new(store.clone(), Arc::new(LopdfEngine::new()));

        let meta = processor.process(&args(1, 2)).await.unwrap();
        assert!(!meta.is_done());
        assert!(store.keys().contains(&"docs/d/chunks/chunk-0001.json".to_string()));
        assert!(!store.keys().contains(&"docs/d/chunks/chunk-0001.pdf".to_string()));
    }

    #[tokio::test]
    async fn test_corrupt_source_writes_error_metadata() {
        let store = Arc::new(MemoryObjectStore::default());
        store
            .put("docs/d/original.pdf", Bytes::from_static(b"garbage"), "application/pdf")
            .await
            .unwrap();
        let processor = ChunkProcessor::new(store.clone(), Arc::new(LopdfEngine::new()));

        let meta = processor.process(&args(1, 1)).await.unwrap();
        match meta.outcome {
            ChunkOutcome::Error { error } => assert!(error.contains("Invalid PDF")),
            ChunkOutcome::Done { .. } => panic!("expected error outcome"),
        }
    }
}
