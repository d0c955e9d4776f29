//! Extraction dispatch endpoint

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::Result;
use crate::server::state::AppState;
use crate::storage::keys::validate_doc_id;
use crate::types::ExtractionPlanResponse;

/// POST /docs/extract/:doc_id/async - Queue one extraction job per chunk
pub async fn extract_async(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
) -> Result<Json<ExtractionPlanResponse>> {
    validate_doc_id(&doc_id)?;
    Ok(Json(state.extraction().plan(&doc_id).await?))
}
