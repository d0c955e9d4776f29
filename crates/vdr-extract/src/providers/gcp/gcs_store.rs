//! Google Cloud Storage object store
//!
//! Object generations serve as entity tags, so conditional manifest writes map
//! onto `ifGenerationMatch`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;

use google_cloud_storage::client::{Client as GcsClient, ClientConfig};
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};
use google_cloud_storage::http::Error as GcsError;

use crate::error::{Error, Result};
use crate::providers::object_store::{
    ByteRange, ByteStream, ObjectStat, ObjectStore, Precondition,
};

/// Google Cloud Storage bucket
pub struct GcsObjectStore {
    client: GcsClient,
    bucket: String,
    block_size: usize,
}

impl GcsObjectStore {
    /// Create a client using application default credentials
    pub async fn new(bucket: String, block_size: usize) -> Result<Self> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| Error::Config(format!("Failed to create GCS client: {}", e)))?;

        tracing::info!("GCS object store ready for bucket {}", bucket);

        Ok(Self {
            client: GcsClient::new(config),
            bucket,
            block_size: block_size.max(1),
        })
    }

    fn get_request(&self, key: &str) -> GetObjectRequest {
        GetObjectRequest {
            bucket: self.bucket.clone(),
            object: key.to_string(),
            ..Default::default()
        }
    }
}

fn response_code(err: &GcsError) -> Option<u16> {
    match err {
        GcsError::Response(resp) => Some(resp.code),
        _ => None,
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    async fn put_conditional(
        &self,
        key: &str,
        data: Bytes,
        content_type: &str,
        precondition: &Precondition,
    ) -> Result<String> {
        let if_generation_match = match precondition {
            Precondition::None => None,
            // generation 0 means "no live object"
            Precondition::IfNoneMatch => Some(0),
            Precondition::IfMatch(etag) => Some(etag.parse::<i64>().map_err(|_| {
                Error::Conflict(format!("object '{}' changed since it was read", key))
            })?),
        };

        let mut media = Media::new(key.to_string());
        media.content_type = content_type.to_string().into();
        media.content_length = Some(data.len() as u64);

        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            if_generation_match,
            ..Default::default()
        };

        let object = self
            .client
            .upload_object(&request, data.to_vec(), &UploadType::Simple(media))
            .await
            .map_err(|e| match response_code(&e) {
                Some(412) => Error::Conflict(format!("precondition failed for '{}'", key)),
                _ => Error::storage(format!("Failed to upload '{}' to GCS: {}", key, e)),
            })?;

        Ok(object.generation.to_string())
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> Result<ByteStream> {
        let range = match range {
            Some(r) => Range(Some(r.start), Some(r.end)),
            None => Range::default(),
        };

        let upstream = self
            .client
            .download_streamed_object(&self.get_request(key), &range)
            .await
            .map_err(|e| match response_code(&e) {
                Some(404) => Error::not_found(format!("object '{}'", key)),
                _ => Error::storage(format!("Failed to download '{}' from GCS: {}", key, e)),
            })?;

        let block_size = self.block_size;
        let key = key.to_string();
        let stream = async_stream::try_stream! {
            futures_util::pin_mut!(upstream);
            while let Some(part) = upstream.next().await {
                let mut part: Bytes = part
                    .map_err(|e| Error::storage(format!("read '{}' from GCS: {}", key, e)))?;
                while part.len() > block_size {
                    yield part.split_to(block_size);
                }
                if !part.is_empty() {
                    yield part;
                }
            }
        };

        Ok(Box::pin(stream))
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectStat>> {
        let object = match self.client.get_object(&self.get_request(key)).await {
            Ok(object) => object,
            Err(e) if response_code(&e) == Some(404) => return Ok(None),
            Err(e) => return Err(Error::storage(format!("stat '{}' in GCS: {}", key, e))),
        };

        let last_modified = object
            .updated
            .and_then(|t| DateTime::<Utc>::from_timestamp(t.unix_timestamp(), 0));

        Ok(Some(ObjectStat {
            size: object.size.max(0) as u64,
            content_type: object.content_type,
            etag: object.generation.to_string(),
            last_modified,
        }))
    }

    fn name(&self) -> &str {
        "gcs"
    }
}
