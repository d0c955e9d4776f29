//! Core types for manifests, extraction output and API responses

pub mod extraction;
pub mod manifest;
pub mod response;

pub use extraction::{
    ExtractionRecord, ExtractionSummary, PageStats, TableBlock, TextBlock, TextBlockType,
    EXTRACTION_VERSION,
};
pub use manifest::{
    Chunk, ChunkMetadata, ChunkOutcome, Manifest, ManifestStatus, OriginalInfo, MANIFEST_VERSION,
};
pub use response::{
    ChunkStatus, DocStatusResponse, ExtractionJob, ExtractionPlanResponse, PageRange,
    ReadyChunk, ReadyChunksResponse, RetriedChunk, RetryFailedResponse, StatusCounts,
    UploadSplitResponse,
};
