//! Process-local object store
//!
//! Backs the `memory` storage backend and the test suites. Counts storage
//! calls and open read streams so callers can assert on both.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::object_store::{
    check_precondition, content_etag, ByteRange, ByteStream, ObjectStat, ObjectStore,
    Precondition,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    etag: String,
    last_modified: DateTime<Utc>,
}

/// In-memory object store
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, StoredObject>>,
    block_size: usize,
    calls: AtomicUsize,
    open_readers: Arc<AtomicUsize>,
}

impl MemoryObjectStore {
    pub fn new(block_size: usize) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            block_size: block_size.max(1),
            calls: AtomicUsize::new(0),
            open_readers: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Total `get`/`stat`/`put` calls served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Read streams handed out and not yet dropped
    pub fn open_readers(&self) -> usize {
        self.open_readers.load(Ordering::SeqCst)
    }

    /// Keys currently stored, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Remove an object; returns whether it existed
    pub fn remove(&self, key: &str) -> bool {
        self.objects.write().remove(key).is_some()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new(1024 * 1024)
    }
}

/// Decrements the open-reader count when the owning stream is dropped
struct ReaderGuard(Arc<AtomicUsize>);

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_conditional(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        precondition: &Precondition,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.objects.write();

        let current = objects.get(key).map(|o| o.etag.as_str());
        check_precondition(key, current, precondition)?;

        let etag = content_etag(&data);
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
                etag: etag.clone(),
                last_modified: Utc::now(),
            },
        );
        Ok(etag)
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let data = self
            .objects
            .read()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::not_found(format!("object '{}'", key)))?;

        let data = match range {
            Some(range) => {
                let start = (range.start as usize).min(data.len());
                let end = (range.end as usize).saturating_add(1).min(data.len());
                data.slice(start..end)
            }
            None => data,
        };

        self.open_readers.fetch_add(1, Ordering::SeqCst);
        let guard = ReaderGuard(Arc::clone(&self.open_readers));
        let block_size = self.block_size;

        let stream = async_stream::stream! {
            let _guard = guard;
            let mut offset = 0;
            while offset < data.len() {
                let end = (offset + block_size).min(data.len());
                yield Ok::<Bytes, Error>(data.slice(offset..end));
                offset = end;
            }
        };

        Ok(Box::pin(stream))
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectStat>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.objects.read().get(key).map(|o| ObjectStat {
            size: o.data.len() as u64,
            content_type: Some(o.content_type.clone()),
            etag: o.etag.clone(),
            last_modified: Some(o.last_modified),
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
