//! Application state for the chunking and extraction server

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::{AppConfig, StorageBackend};
use crate::error::Result;
use crate::extraction::{ExtractionPlanner, ExtractionWorker};
use crate::pdf::{LopdfEngine, PdfEngine};
use crate::processing::{JobQueue, LocalJobQueue, TaskRunner};
use crate::providers::{LocalObjectStore, MemoryObjectStore, ObjectStore};
use crate::proxy::FileProxy;
use crate::splitting::{ChunkPlanner, ChunkProcessor};
use crate::storage::ManifestStore;
use crate::tracking::{RetryCoordinator, StatusAggregator};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: AppConfig,
    /// Object store (local directory, memory or GCS)
    store: Arc<dyn ObjectStore>,
    /// Job queue client
    queue: Arc<dyn JobQueue>,
    /// Upload validation, planning and split dispatch
    planner: ChunkPlanner,
    /// Status and ready-chunk reports
    statuses: StatusAggregator,
    /// Failed-chunk re-dispatch
    retries: RetryCoordinator,
    /// Extraction dispatch
    extraction: ExtractionPlanner,
    /// Range-capable object proxy
    proxy: FileProxy,
}

impl AppState {
    /// Create new application state from configuration
    ///
    /// Opens the configured object store, creates the in-process job queue and
    /// starts its worker pool. The queue lives in this process, so its
    /// workers must too.
    pub async fn new(config: AppConfig) -> Result<Self> {
        tracing::info!(
            "Initializing application state (storage: {:?})...",
            config.storage.backend
        );

        let store = open_store(&config).await?;
        tracing::info!("Object store '{}' ready", store.name());

        let queue = Arc::new(LocalJobQueue::from_config(&config.queue));
        let engine: Arc<dyn PdfEngine> = Arc::new(LopdfEngine::new());

        let handles = start_local_workers(&config, &queue, Arc::clone(&store), Arc::clone(&engine));
        tracing::info!(
            "Started {} queue tasks ({} jobs per queue, result TTL {}s)",
            handles.len(),
            config.queue.worker_count(),
            config.queue.result_ttl_secs
        );

        Ok(Self::from_parts(config, store, queue, engine))
    }

    /// Assemble state around already-built services
    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn ObjectStore>,
        queue: Arc<dyn JobQueue>,
        engine: Arc<dyn PdfEngine>,
    ) -> Self {
        let manifests = ManifestStore::new(Arc::clone(&store));
        let planner = ChunkPlanner::new(&config, Arc::clone(&store), Arc::clone(&queue), engine);
        let statuses = StatusAggregator::new(
            manifests.clone(),
            Arc::clone(&queue),
            config.queue.status_concurrency,
        );
        let retries = RetryCoordinator::new(
            &config,
            manifests.clone(),
            statuses.clone(),
            Arc::clone(&queue),
        );
        let extraction = ExtractionPlanner::new(&config, manifests, Arc::clone(&queue));
        let proxy = FileProxy::new(Arc::clone(&store));

        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                queue,
                planner,
                statuses,
                retries,
                extraction,
                proxy,
            }),
        }
    }

    /// Get configuration
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Get object store
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.inner.store
    }

    /// Get job queue
    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.inner.queue
    }

    pub fn planner(&self) -> &ChunkPlanner {
        &self.inner.planner
    }

    pub fn statuses(&self) -> &StatusAggregator {
        &self.inner.statuses
    }

    pub fn retries(&self) -> &RetryCoordinator {
        &self.inner.retries
    }

    pub fn extraction(&self) -> &ExtractionPlanner {
        &self.inner.extraction
    }

    pub fn proxy(&self) -> &FileProxy {
        &self.inner.proxy
    }
}

/// Start the worker pool of a local queue with the split and extract handlers
pub fn start_local_workers(
    config: &AppConfig,
    queue: &Arc<LocalJobQueue>,
    store: Arc<dyn ObjectStore>,
    engine: Arc<dyn PdfEngine>,
) -> Vec<JoinHandle<()>> {
    let runner = TaskRunner::new(
        ChunkProcessor::new(Arc::clone(&store), Arc::clone(&engine)),
        ExtractionWorker::new(store, engine),
    );
    queue.start_workers(Arc::new(runner), config.queue.worker_count())
}

async fn open_store(config: &AppConfig) -> Result<Arc<dyn ObjectStore>> {
    let storage = &config.storage;
    match storage.backend {
        StorageBackend::Local => {
            let store =
                LocalObjectStore::new(&storage.root, &storage.bucket, storage.read_block_bytes)
                    .await?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory object store; contents are lost on restart");
            Ok(Arc::new(MemoryObjectStore::new(storage.read_block_bytes)))
        }
        StorageBackend::Gcs => {
            #[cfg(feature = "gcp")]
            {
                let store = crate::providers::gcp::GcsObjectStore::new(
                    storage.bucket.clone(),
                    storage.read_block_bytes,
                )
                .await?;
                Ok(Arc::new(store))
            }
            #[cfg(not(feature = "gcp"))]
            {
                Err(crate::error::Error::Config(
                    "GCS storage selected but gcp feature is not enabled. \
                     Rebuild with --features gcp"
                        .to_string(),
                ))
            }
        }
    }
}
