//! Object store provider trait: a flat key/value blob namespace

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures_util::stream::Stream;
use futures_util::StreamExt;
use std::pin::Pin;

use crate::error::{Error, Result};

/// Boxed asynchronous byte stream returned by `ObjectStore::get`
///
/// Dropping the stream releases the underlying read handle.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Metadata about a stored object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStat {
    /// Size in bytes
    pub size: u64,
    /// Content type recorded at upload, if any
    pub content_type: Option<String>,
    /// Opaque entity tag; changes on every write
    pub etag: String,
    /// Last write time
    pub last_modified: Option<DateTime<Utc>>,
}

/// Inclusive byte span of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

#[allow(clippy::len_without_is_empty)]
impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered; never zero since `end` is inclusive
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Write precondition for compare-and-swap style updates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional write
    #[default]
    None,
    /// Write only if the stored object still carries this entity tag
    IfMatch(String),
    /// Write only if no object exists under the key
    IfNoneMatch,
}

/// Trait for object storage
///
/// Implementations:
/// - `LocalObjectStore`: Local filesystem directory as bucket
/// - `MemoryObjectStore`: Process-local map
/// - `GcsObjectStore`: Google Cloud Storage (feature `gcp`)
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object, honoring the precondition
    ///
    /// Returns the new entity tag. A failed precondition is `Error::Conflict`.
    async fn put_conditional(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        precondition: &Precondition,
    ) -> Result<String>;

    /// Stream an object, or an inclusive byte span of it
    ///
    /// A missing object is `Error::NotFound`.
    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream>;

    /// Object metadata, `None` when the object does not exist
    async fn stat(&self, key: &str) -> Result<Option<ObjectStat>>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Store an object unconditionally
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<String> {
        self.put_conditional(key, data, content_type, &Precondition::None)
            .await
    }

    /// Read a whole object into memory
    async fn get_bytes(&self, key: &str) -> Result<Bytes> {
        let mut stream = self.get(key, None).await?;
        let mut buf = BytesMut::new();
        while let Some(block) = stream.next().await {
            buf.extend_from_slice(&block?);
        }
        Ok(buf.freeze())
    }
}

/// Hex SHA-256 entity tag of an object's bytes
pub fn content_etag(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(data))
}

/// Check a precondition against the currently stored tag
pub(crate) fn check_precondition(
    key: &str,
    current: Option<&str>,
    precondition: &Precondition,
) -> Result<()> {
    match (precondition, current) {
        (Precondition::None, _) => Ok(()),
        (Precondition::IfNoneMatch, None) => Ok(()),
        (Precondition::IfNoneMatch, Some(_)) => {
            Err(Error::Conflict(format!("object '{}' already exists", key)))
        }
        (Precondition::IfMatch(expected), Some(actual)) if expected == actual => Ok(()),
        (Precondition::IfMatch(_), _) => Err(Error::Conflict(format!(
            "object '{}' changed since it was read",
            key
        ))),
    }
}
