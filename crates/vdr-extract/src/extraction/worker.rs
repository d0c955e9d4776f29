//! Extraction Worker: one chunk PDF in, one JSONL artifact out

use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;

use super::markdown::{combine_markdown, render_table};
use crate::error::Result;
use crate::pdf::{run_blocking, PdfEngine};
use crate::processing::ExtractChunkArgs;
use crate::providers::ObjectStore;
use crate::types::{
    ExtractionRecord, ExtractionSummary, PageStats, TableBlock, TextBlock, TextBlockType,
    EXTRACTION_VERSION,
};

const JSONL_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Clone)]
pub struct ExtractionWorker {
    store: Arc<dyn ObjectStore>,
    engine: Arc<dyn PdfEngine>,
}

impl ExtractionWorker {
    pub fn new(store: Arc<dyn ObjectStore>, engine: Arc<dyn PdfEngine>) -> Self {
        Self { store, engine }
    }

    /// Extract every page of a chunk, in order, into `out_jsonl_key`
    pub async fn run(&self, args: &ExtractChunkArgs) -> Result<ExtractionSummary> {
        let started = Instant::now();
        let source = self.store.get_bytes(&args.chunk_pdf_key).await?;

        let engine = Arc::clone(&self.engine);
        let job = args.clone();
        let records = run_blocking(move || extract_records(engine.as_ref(), &source, &job)).await?;

        let mut body = Vec::new();
        for record in &records {
            serde_json::to_writer(&mut body, record)?;
            body.push(b'\n');
        }
        self.store
            .put(&args.out_jsonl_key, Bytes::from(body), JSONL_CONTENT_TYPE)
            .await?;

        let summary = ExtractionSummary {
            doc_id: args.doc_id.clone(),
            chunk_index: args.chunk_index,
            pages_written: records.len(),
            out_jsonl_key: args.out_jsonl_key.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "Extracted {} pages of chunk {} of {} into {}",
            summary.pages_written,
            args.chunk_index,
            args.doc_id,
            args.out_jsonl_key
        );
        Ok(summary)
    }
}

/// Build one record per page; `page_no` is the offset plus the 0-based position
fn extract_records(
    engine: &dyn PdfEngine,
    source: &[u8],
    args: &ExtractChunkArgs,
) -> Result<Vec<ExtractionRecord>> {
    let doc = engine.open(source)?;
    let mut records = Vec::with_capacity(doc.page_count() as usize);

    for position in 0..doc.page_count() {
        let page_started = Instant::now();
        let raw = doc.extract_page(position)?;

        let text_blocks = if raw.text.is_empty() {
            Vec::new()
        } else {
            vec![TextBlock {
                block_type: TextBlockType::Paragraph,
                content: raw.text.clone(),
            }]
        };
        let tables: Vec<TableBlock> = raw.tables.iter().filter_map(render_table).collect();
        let paragraphs: Vec<String> = text_blocks.iter().map(|b| b.content.clone()).collect();
        let combined_markdown = combine_markdown(&paragraphs, &tables);

        let stats = PageStats {
            char_count: raw.text.chars().count(),
            word_count: raw.text.split_whitespace().count(),
            tables_detected: raw.tables.len(),
            extract_duration_ms: page_started.elapsed().as_millis() as u64,
        };

        records.push(ExtractionRecord {
            doc_id: args.doc_id.clone(),
            chunk_index: args.chunk_index,
            page_no: args.page_offset + position,
            extract_method: engine.name().to_string(),
            source_key: args.chunk_pdf_key.clone(),
            text_blocks,
            tables,
            combined_markdown,
            stats,
            version: EXTRACTION_VERSION.to_string(),
        });
    }

    Ok(records)
}
