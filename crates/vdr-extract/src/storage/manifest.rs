//! Manifest persistence with conditional writes

use bytes::Bytes;
use std::sync::Arc;

use super::keys;
use crate::error::{Error, Result};
use crate::providers::{ObjectStore, Precondition};
use crate::types::Manifest;

const MANIFEST_CONTENT_TYPE: &str = "application/json";

/// Reads and writes `docs/{doc_id}/manifest.json`
#[derive(Clone)]
pub struct ManifestStore {
    store: Arc<dyn ObjectStore>,
}

impl ManifestStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Load a manifest together with the entity tag it was read at
    ///
    /// Returns `None` when no manifest exists for the document.
    pub async fn load(&self, doc_id: &str) -> Result<Option<(Manifest, String)>> {
        let key = keys::manifest_key(doc_id);

        // stat first so the tag is never newer than the bytes
        let Some(stat) = self.store.stat(&key).await? else {
            return Ok(None);
        };

        let raw = match self.store.get_bytes(&key).await {
            Ok(raw) => raw,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let manifest: Manifest = serde_json::from_slice(&raw)
            .map_err(|e| Error::storage(format!("corrupt manifest for '{}': {}", doc_id, e)))?;
        Ok(Some((manifest, stat.etag)))
    }

    /// Load a manifest, mapping absence to `Error::NotFound`
    pub async fn require(&self, doc_id: &str) -> Result<(Manifest, String)> {
        self.load(doc_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("manifest for doc_id '{}'", doc_id)))
    }

    /// Write a brand-new manifest; fails with `Conflict` if one already exists
    pub async fn create(&self, manifest: &Manifest) -> Result<String> {
        self.write(manifest, Precondition::IfNoneMatch).await
    }

    /// Write back a manifest read at `etag`; fails with `Conflict` if it changed since
    pub async fn save_if_unchanged(&self, manifest: &Manifest, etag: &str) -> Result<String> {
        self.write(manifest, Precondition::IfMatch(etag.to_string()))
            .await
    }

    async fn write(&self, manifest: &Manifest, precondition: Precondition) -> Result<String> {
        let key = keys::manifest_key(&manifest.doc_id);
        let body = serde_json::to_vec_pretty(manifest)?;
        let etag = self
            .store
            .put_conditional(&key, Bytes::from(body), MANIFEST_CONTENT_TYPE, &precondition)
            .await?;
        tracing::debug!("Wrote manifest {} ({} chunks)", key, manifest.chunks.len());
        Ok(etag)
    }
}
