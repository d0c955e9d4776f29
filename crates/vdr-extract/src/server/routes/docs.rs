//! Document endpoints: upload-and-split, status, ready chunks, retry

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::splitting::ChunkPlanner;
use crate::storage::keys::validate_doc_id;
use crate::types::{
    DocStatusResponse, ReadyChunksResponse, RetryFailedResponse, UploadSplitResponse,
};

/// POST /docs/upload-split/async - Store a PDF and queue one split job per chunk
///
/// Form fields: `file` (the PDF) and optional `pages_per_chunk`.
pub async fn upload_split(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadSplitResponse>> {
    let planner = state.planner();
    let mut upload: Option<(BytesMut, Option<String>)> = None;
    let mut pages_per_chunk: Option<u32> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let content_type = field.content_type().map(|s| s.to_string());
                ChunkPlanner::check_content_type(content_type.as_deref())?;

                // Stop reading as soon as the cap is crossed
                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    data.extend_from_slice(&chunk);
                    planner.check_size(data.len())?;
                }

                tracing::info!(
                    "Received upload {} ({} bytes)",
                    field.file_name().unwrap_or("<unnamed>"),
                    data.len()
                );
                upload = Some((data, content_type));
            }
            "pages_per_chunk" => {
                let text = field.text().await.map_err(multipart_error)?;
                let value = text.trim().parse::<u32>().map_err(|_| {
                    Error::validation(format!("pages_per_chunk must be an integer, got '{}'", text))
                })?;
                pages_per_chunk = Some(value);
            }
            other => {
                tracing::debug!("Ignoring form field '{}'", other);
            }
        }
    }

    let (data, content_type) =
        upload.ok_or_else(|| Error::validation("missing form field 'file'"))?;

    let response = planner
        .upload_and_split(data.freeze(), content_type.as_deref(), pages_per_chunk)
        .await?;
    Ok(Json(response))
}

/// GET /docs/:doc_id/status - Per-chunk job status and overall progress
pub async fn doc_status(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<DocStatusResponse>> {
    validate_doc_id(&doc_id)?;
    Ok(Json(state.statuses().status(&doc_id).await?))
}

/// GET /docs/:doc_id/chunks - Chunks whose split job has finished
pub async fn ready_chunks(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<ReadyChunksResponse>> {
    validate_doc_id(&doc_id)?;
    Ok(Json(state.statuses().ready_chunks(&doc_id).await?))
}

/// POST /docs/:doc_id/retry-failed - Re-dispatch chunks whose job failed
pub async fn retry_failed(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<RetryFailedResponse>> {
    validate_doc_id(&doc_id)?;
    Ok(Json(state.retries().retry_failed(&doc_id).await?))
}

fn multipart_error(e: MultipartError) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge(e.body_text())
    } else {
        Error::validation(format!("Failed to read multipart form: {}", e.body_text()))
    }
}
