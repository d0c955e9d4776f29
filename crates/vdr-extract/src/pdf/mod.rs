//! PDF engine abstraction
//!
//! Page counting, page-range slicing and per-page text/table extraction sit
//! behind `PdfEngine` so workers never depend on a concrete PDF library.
//! Engines are synchronous; async callers go through `run_blocking`.

mod lopdf_engine;
mod tables;

pub use lopdf_engine::LopdfEngine;

#[cfg(test)]
pub(crate) use lopdf_engine::{pdf_from_contents, sample_pdf};

use crate::error::{Error, Result};

/// A table as rows of optional cell strings; the first row is the header
pub type RawTable = Vec<Vec<Option<String>>>;

/// Content extracted from a single page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawPage {
    pub text: String,
    pub tables: Vec<RawTable>,
}

/// An opened document
pub trait PdfDocument: Send {
    fn page_count(&self) -> u32;

    /// Extract the page at a 0-based position
    fn extract_page(&self, position: u32) -> Result<RawPage>;
}

/// Document-processing capability used by the planners and workers
pub trait PdfEngine: Send + Sync {
    /// Identifier recorded as `extract_method` on extraction records
    fn name(&self) -> &str;

    /// Parse a document; unparseable bytes are `Error::InvalidPdf`
    fn open(&self, data: &[u8]) -> Result<Box<dyn PdfDocument>>;

    /// Produce a standalone PDF holding pages `start..=end` (1-based)
    fn slice_pages(&self, data: &[u8], start: u32, end: u32) -> Result<Vec<u8>>;

    fn page_count(&self, data: &[u8]) -> Result<u32> {
        Ok(self.open(data)?.page_count())
    }
}

/// Run CPU-bound engine work off the async runtime
pub async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::internal(format!("PDF task panicked: {}", e)))?
}
