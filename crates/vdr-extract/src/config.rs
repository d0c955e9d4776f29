//! Configuration for the chunking and extraction service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Job queue configuration
    #[serde(default)]
    pub queue: QueueConfig,
    /// Page splitting configuration
    #[serde(default)]
    pub splitting: SplittingConfig,
}

impl AppConfig {
    /// Load configuration from an optional TOML file, then apply `VDR_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(host) = std::env::var("VDR_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("VDR_PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid VDR_PORT '{}': {}", port, e)))?;
        }
        if let Ok(root) = std::env::var("VDR_STORAGE_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
        if let Ok(bucket) = std::env::var("VDR_BUCKET") {
            self.storage.bucket = bucket;
        }
        if let Ok(ttl) = std::env::var("VDR_RESULT_TTL_SECS") {
            self.queue.result_ttl_secs = ttl.parse().map_err(|e| {
                Error::Config(format!("Invalid VDR_RESULT_TTL_SECS '{}': {}", ttl, e))
            })?;
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum accepted PDF upload in bytes (default: 50MB)
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Object storage backend selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Directory on the local filesystem acting as the bucket
    #[default]
    Local,
    /// Process-local store, contents lost on restart
    Memory,
    /// Google Cloud Storage bucket (requires the `gcp` feature)
    Gcs,
}

/// Object storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend provider
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory of the local bucket
    pub root: PathBuf,
    /// Bucket name
    pub bucket: String,
    /// Largest block held in memory while streaming an object
    pub read_block_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root: PathBuf::from("./data"),
            bucket: "vdr-extract".to_string(),
            read_block_bytes: 1024 * 1024,
        }
    }
}

/// Job queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue receiving split jobs
    pub split_queue: String,
    /// Queue receiving extraction jobs
    pub extract_queue: String,
    /// Per-attempt job timeout in seconds (default: 1200 = 20 minutes)
    pub job_timeout_secs: u64,
    /// Backoff before each retry, in seconds
    pub retry_intervals_secs: Vec<u64>,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Concurrent jobs per queue (default: CPU count, max 4)
    pub workers_per_queue: Option<usize>,
    /// Seconds a finished or failed job record stays queryable (default: 1 day)
    pub result_ttl_secs: u64,
    /// Concurrent job-status lookups per status request
    pub status_concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            split_queue: "docs".to_string(),
            extract_queue: "extractions".to_string(),
            job_timeout_secs: 20 * 60,
            retry_intervals_secs: vec![10, 30, 60],
            max_retries: 3,
            workers_per_queue: None,
            result_ttl_secs: 24 * 60 * 60,
            status_concurrency: 16,
        }
    }
}

impl QueueConfig {
    /// Job timeout as a duration
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    pub fn result_ttl(&self) -> Duration {
        Duration::from_secs(self.result_ttl_secs)
    }

    /// Worker count, auto-detected from the CPU count when unset
    pub fn worker_count(&self) -> usize {
        self.workers_per_queue
            .unwrap_or_else(|| num_cpus::get().min(4))
            .max(1)
    }
}

/// Page splitting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplittingConfig {
    /// Pages per chunk when the upload does not say
    pub default_pages_per_chunk: u32,
    /// Largest accepted pages-per-chunk value
    pub max_pages_per_chunk: u32,
}

impl Default for SplittingConfig {
    fn default() -> Self {
        Self {
            default_pages_per_chunk: 25,
            max_pages_per_chunk: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.queue.job_timeout(), Duration::from_secs(1200));
        assert_eq!(config.queue.retry_intervals_secs, vec![10, 30, 60]);
        assert_eq!(config.queue.max_retries, 3);
        assert_eq!(config.queue.result_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.splitting.default_pages_per_chunk, 25);
        assert_eq!(config.storage.read_block_bytes, 1024 * 1024);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [storage]
            backend = "memory"
            root = "/tmp/vdr"
            bucket = "test-bucket"
            read_block_bytes = 4096
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.storage.bucket, "test-bucket");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.queue.split_queue, "docs");
    }

    #[test]
    fn test_queue_section_without_worker_switch() {
        let config = AppConfig::from_toml(
            r#"
            [queue]
            split_queue = "split"
            extract_queue = "extract"
            job_timeout_secs = 60
            retry_intervals_secs = [1]
            max_retries = 1
            status_concurrency = 4
            result_ttl_secs = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.queue.result_ttl(), Duration::from_secs(120));
        assert_eq!(config.queue.workers_per_queue, None);
    }

    #[test]
    fn test_invalid_toml() {
        let err = AppConfig::from_toml("[server]\nport = \"eighty\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_worker_count_never_zero() {
        let queue = QueueConfig {
            workers_per_queue: Some(0),
            ..Default::default()
        };
        assert_eq!(queue.worker_count(), 1);
    }
}
