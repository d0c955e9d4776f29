//! File Proxy: streams stored objects to HTTP clients with single-range support
//!
//! The body is the store's block stream handed straight to the response, so
//! at most one block is resident per request. Dropping the response body
//! (completion, disconnect, error) drops the stream and with it the read
//! handle.

mod key;
mod range;

pub use key::sanitize_key;
pub use range::{RangeRequest, RangeResolution};

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::providers::{ObjectStat, ObjectStore};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";
const CACHE_CONTROL: &str = "private, max-age=0, no-store";
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// How the client should present the file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Disposition {
    #[default]
    Inline,
    Attachment,
}

impl Disposition {
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "inline" => Ok(Self::Inline),
            "attachment" => Ok(Self::Attachment),
            other => Err(Error::validation(format!(
                "disposition must be 'inline' or 'attachment', got '{}'",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inline => "inline",
            Self::Attachment => "attachment",
        }
    }
}

/// One proxy request as received from the client
#[derive(Debug, Clone, Default)]
pub struct ProxyRequest {
    pub key: String,
    pub disposition: Option<String>,
    pub filename: Option<String>,
    pub range: Option<String>,
}

#[derive(Clone)]
pub struct FileProxy {
    store: Arc<dyn ObjectStore>,
}

impl FileProxy {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Answer a proxy request with a 200, 206 or 416 response
    ///
    /// Key, disposition and Range syntax are checked before storage is touched.
    pub async fn serve(&self, request: &ProxyRequest) -> Result<Response> {
        let key = sanitize_key(&request.key)?;
        let disposition = match request.disposition.as_deref() {
            Some(value) => Disposition::parse(value)?,
            None => Disposition::default(),
        };
        let range = request.range.as_deref().map(RangeRequest::parse).transpose()?;

        let stat = self
            .store
            .stat(&key)
            .await?
            .ok_or_else(|| Error::not_found(format!("object '{}' not found", key)))?;

        let mut headers = base_headers(&key, &stat, disposition, request.filename.as_deref())?;

        let Some(range) = range else {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(stat.size));
            let stream = self.store.get(&key, None).await?;
            tracing::debug!("Proxying {} ({} bytes)", key, stat.size);
            return Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response());
        };

        match range.resolve(stat.size) {
            RangeResolution::Unsatisfiable => {
                headers.insert(
                    header::CONTENT_RANGE,
                    header_value(&format!("bytes */{}", stat.size))?,
                );
                Ok((StatusCode::RANGE_NOT_SATISFIABLE, headers).into_response())
            }
            RangeResolution::Satisfiable(span) => {
                headers.insert(
                    header::CONTENT_RANGE,
                    header_value(&format!("bytes {}-{}/{}", span.start, span.end, stat.size))?,
                );
                headers.insert(header::CONTENT_LENGTH, HeaderValue::from(span.len()));
                let stream = self.store.get(&key, Some(span)).await?;
                tracing::debug!(
                    "Proxying {} bytes {}-{}/{}",
                    key,
                    span.start,
                    span.end,
                    stat.size
                );
                Ok((StatusCode::PARTIAL_CONTENT, headers, Body::from_stream(stream)).into_response())
            }
        }
    }
}

fn base_headers(
    key: &str,
    stat: &ObjectStat,
    disposition: Disposition,
    filename: Option<&str>,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL));
    headers.insert(header::CONTENT_TYPE, content_type(key, stat));

    let name = header_filename(filename.filter(|f| !f.is_empty()).unwrap_or_else(|| basename(key)));
    headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(&format!("{}; filename=\"{}\"", disposition.as_str(), name))?,
    );

    if !stat.etag.is_empty() {
        headers.insert(header::ETAG, header_value(&format!("\"{}\"", stat.etag))?);
    }
    if let Some(modified) = stat.last_modified {
        headers.insert(
            header::LAST_MODIFIED,
            header_value(&modified.format(HTTP_DATE_FORMAT).to_string())?,
        );
    }
    Ok(headers)
}

/// Stored type, else a guess from the key's extension, else octet-stream
fn content_type(key: &str, stat: &ObjectStat) -> HeaderValue {
    stat.content_type
        .as_deref()
        .filter(|ct| !ct.is_empty())
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .or_else(|| {
            mime_guess::from_path(key)
                .first()
                .and_then(|mime| HeaderValue::from_str(mime.essence_str()).ok())
        })
        .unwrap_or_else(|| HeaderValue::from_static(FALLBACK_CONTENT_TYPE))
}

fn basename(key: &str) -> &str {
    match key.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "file",
    }
}

/// Keep the filename inside a quoted header parameter
fn header_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect()
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::internal(format!("invalid header value '{}': {}", value, e)))
}
