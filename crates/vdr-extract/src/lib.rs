//! vdr-extract: PDF chunk splitting and extraction behind a background job queue
//!
//! An uploaded PDF is stored, partitioned into page-range chunks and recorded
//! in a manifest; each chunk is sliced by a queued job. Further endpoints
//! report progress, retry failed chunks, queue per-chunk text and table
//! extraction to JSONL, and proxy stored artifacts with HTTP range support.

pub mod config;
pub mod error;
pub mod extraction;
pub mod pdf;
pub mod processing;
pub mod providers;
pub mod proxy;
pub mod server;
pub mod splitting;
pub mod storage;
pub mod tracking;
pub mod types;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use server::{state::AppState, VdrServer};
pub use types::{ChunkMetadata, ExtractionRecord, Manifest};
