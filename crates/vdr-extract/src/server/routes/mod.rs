//! API routes for the chunking and extraction server

pub mod docs;
pub mod extract;
pub mod files;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Multipart framing allowance on top of the upload cap
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build all document and file routes
pub fn api_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // Upload with a body limit just above the PDF cap; the handler enforces the exact cap
        .route(
            "/docs/upload-split/async",
            post(docs::upload_split)
                .layer(DefaultBodyLimit::max(max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES))),
        )
        .route("/docs/:doc_id/status", get(docs::doc_status))
        .route("/docs/:doc_id/chunks", get(docs::ready_chunks))
        .route("/docs/:doc_id/retry-failed", post(docs::retry_failed))
        .route("/docs/extract/:doc_id/async", post(extract::extract_async))
        .route("/files/proxy", get(files::proxy_file))
}
