//! Stored-object proxy endpoint

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap},
    response::Response,
};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::proxy::ProxyRequest;
use crate::server::state::AppState;

/// Query parameters for the proxy
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    /// Storage key
    pub key: String,
    /// inline or attachment
    pub disposition: Option<String>,
    /// Download name override
    pub filename: Option<String>,
}

/// GET /files/proxy - Stream an object, honoring a single `Range`
pub async fn proxy_file(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
    headers: HeaderMap,
) -> Result<Response> {
    let range = headers
        .get(header::RANGE)
        .map(|value| {
            value
                .to_str()
                .map(str::to_string)
                .map_err(|_| Error::validation("Range header is not valid ASCII"))
        })
        .transpose()?;

    let request = ProxyRequest {
        key: query.key,
        disposition: query.disposition,
        filename: query.filename,
        range,
    };
    state.proxy().serve(&request).await
}
