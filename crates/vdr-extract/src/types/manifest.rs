//! Manifest and chunk metadata types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version stamped on every manifest written by this service
pub const MANIFEST_VERSION: &str = "1.0.0";

/// Durable per-document record of the chunk plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub doc_id: String,
    pub original: OriginalInfo,
    pub pages_per_chunk: u32,
    pub chunks: Vec<Chunk>,
    pub status: ManifestStatus,
    pub version: String,
}

/// The uploaded source document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OriginalInfo {
    pub key: String,
    pub size_bytes: u64,
    pub total_pages: u32,
}

/// Lifecycle marker of a manifest
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ManifestStatus {
    Processing,
}

/// One contiguous page range of the source document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// 1-based position in the manifest
    pub index: u32,
    /// First page, 1-based inclusive
    pub start_page: u32,
    /// Last page, 1-based inclusive
    pub end_page: u32,
    /// Key of the chunk PDF
    pub expected_key: String,
    /// Key of the chunk metadata object
    pub meta_key: String,
    /// Job that produces this chunk; replaced on retry
    pub job_id: String,
}

/// Metadata object written by the chunk processor, keyed by `Chunk::meta_key`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub chunk_index: u32,
    #[serde(flatten)]
    pub outcome: ChunkOutcome,
}

/// Terminal result of one split job
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChunkOutcome {
    /// Chunk PDF uploaded; pages are the effective (clamped) range
    Done {
        start_page: u32,
        end_page: u32,
        out_key: String,
        size_bytes: u64,
        num_pages: u32,
        updated_at: DateTime<Utc>,
    },
    /// Slicing or upload failed
    Error { error: String },
}

impl ChunkMetadata {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Done { .. })
    }
}
