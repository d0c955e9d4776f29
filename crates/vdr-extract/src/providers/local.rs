//! Local filesystem object store
//!
//! Objects live under `<root>/<bucket>/objects/<key>`; their content type and
//! entity tag are kept alongside under `<root>/<bucket>/attrs/<key>.json`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::Stream;
use serde::{Deserialize, Serialize};
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::object_store::{
    check_precondition, content_etag, ByteRange, ByteStream, ObjectStat, ObjectStore,
    Precondition,
};
use crate::error::{Error, Result};

/// Sidecar attributes of a stored object
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ObjectAttrs {
    content_type: String,
    etag: String,
}

/// Filesystem directory acting as a bucket
pub struct LocalObjectStore {
    objects_dir: PathBuf,
    attrs_dir: PathBuf,
    block_size: usize,
    /// Serializes writers so precondition checks and writes are atomic within the process
    write_lock: Mutex<()>,
}

impl LocalObjectStore {
    /// Open (creating if needed) the bucket directory
    pub async fn new(root: impl AsRef<Path>, bucket: &str, block_size: usize) -> Result<Self> {
        let bucket_dir = root.as_ref().join(bucket);
        let objects_dir = bucket_dir.join("objects");
        let attrs_dir = bucket_dir.join("attrs");

        fs::create_dir_all(&objects_dir).await?;
        fs::create_dir_all(&attrs_dir).await?;
        tracing::info!("Local object store ready at {}", bucket_dir.display());

        Ok(Self {
            objects_dir,
            attrs_dir,
            block_size: block_size.max(1),
            write_lock: Mutex::new(()),
        })
    }

    /// Map a key to a path, refusing anything that could leave the bucket
    fn resolve(&self, base: &Path, key: &str, suffix: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(Error::validation(format!("invalid object key '{}'", key)));
        }
        Ok(base.join(format!("{}{}", key, suffix)))
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        self.resolve(&self.objects_dir, key, "")
    }

    fn attrs_path(&self, key: &str) -> Result<PathBuf> {
        self.resolve(&self.attrs_dir, key, ".json")
    }

    async fn read_attrs(&self, key: &str) -> Result<Option<ObjectAttrs>> {
        let path = self.attrs_path(key)?;
        match fs::read(&path).await {
            Ok(raw) => match serde_json::from_slice(&raw) {
                Ok(attrs) => Ok(Some(attrs)),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable attributes for '{}': {}", key, e);
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::storage(format!("read attributes of '{}': {}", key, e))),
        }
    }

    /// Entity tag of the object currently stored, if any
    async fn current_etag(&self, key: &str) -> Result<Option<String>> {
        Ok(self.stat(key).await?.map(|s| s.etag))
    }

    /// Write via a temporary file and rename so readers never see partial objects
    async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
        let parent = path
            .parent()
            .ok_or_else(|| Error::storage(format!("no parent for {}", path.display())))?;
        fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("object");
        let tmp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(Error::storage(format!("rename into {}: {}", path.display(), e)));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put_conditional(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        precondition: &Precondition,
    ) -> Result<String> {
        let object_path = self.object_path(key)?;
        let attrs_path = self.attrs_path(key)?;

        let _guard = self.write_lock.lock().await;
        if *precondition != Precondition::None {
            let current = self.current_etag(key).await?;
            check_precondition(key, current.as_deref(), precondition)?;
        }

        let attrs = ObjectAttrs {
            content_type: content_type.to_string(),
            etag: content_etag(&data),
        };
        Self::write_atomic(&object_path, &data).await?;
        Self::write_atomic(&attrs_path, &serde_json::to_vec(&attrs)?).await?;

        tracing::debug!("Stored '{}' ({} bytes)", key, data.len());
        Ok(attrs.etag)
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream> {
        let path = self.object_path(key)?;

        let mut file = fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("object '{}'", key))
            } else {
                Error::storage(format!("open '{}': {}", key, e))
            }
        })?;

        let remaining = match range {
            Some(range) => {
                file.seek(SeekFrom::Start(range.start)).await?;
                range.len()
            }
            None => file.metadata().await?.len(),
        };

        Ok(Box::pin(read_blocks(file, remaining, self.block_size)))
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectStat>> {
        let path = self.object_path(key)?;

        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::storage(format!("stat '{}': {}", key, e))),
        };

        let last_modified = meta.modified().ok().map(DateTime::<Utc>::from);
        let attrs = self.read_attrs(key).await?;
        let etag = match &attrs {
            Some(attrs) => attrs.etag.clone(),
            None => format!(
                "{:x}-{:x}",
                last_modified.map(|t| t.timestamp()).unwrap_or_default(),
                meta.len()
            ),
        };

        Ok(Some(ObjectStat {
            size: meta.len(),
            content_type: attrs.map(|a| a.content_type),
            etag,
            last_modified,
        }))
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Stream `remaining` bytes from the file's current position, one block at a time
fn read_blocks(
    file: fs::File,
    remaining: u64,
    block_size: usize,
) -> impl Stream<Item = Result<Bytes>> + Send {
    async_stream::try_stream! {
        let mut reader = file.take(remaining);
        let mut buf = vec![0u8; block_size];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            yield Bytes::copy_from_slice(&buf[..n]);
        }
    }
}
