//! Per-page extraction output written as JSONL

use serde::{Deserialize, Serialize};

/// Version stamped on every extraction record
pub const EXTRACTION_VERSION: &str = "1.0.0";

/// One line of a chunk's JSONL artifact, describing a single source page
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionRecord {
    pub doc_id: String,
    pub chunk_index: u32,
    /// Global page number: chunk page offset plus the 0-based page position
    pub page_no: u32,
    pub extract_method: String,
    pub source_key: String,
    pub text_blocks: Vec<TextBlock>,
    pub tables: Vec<TableBlock>,
    pub combined_markdown: String,
    pub stats: PageStats,
    pub version: String,
}

/// A run of extracted text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextBlock {
    #[serde(rename = "type")]
    pub block_type: TextBlockType,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TextBlockType {
    Paragraph,
}

/// A detected table rendered as a pipe table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableBlock {
    pub title: Option<String>,
    pub markdown: String,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Lightweight per-page statistics
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageStats {
    pub char_count: usize,
    pub word_count: usize,
    pub tables_detected: usize,
    pub extract_duration_ms: u64,
}

/// Result of one extraction job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtractionSummary {
    pub doc_id: String,
    pub chunk_index: u32,
    pub pages_written: usize,
    pub out_jsonl_key: String,
    pub duration_ms: u64,
}
