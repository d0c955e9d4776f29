//! Dispatches queued tasks to the chunk processor and the extraction worker

use async_trait::async_trait;

use super::job_queue::Task;
use super::worker::TaskHandler;
use crate::error::Result;
use crate::extraction::ExtractionWorker;
use crate::splitting::ChunkProcessor;

/// Task handler used by the server's worker pool
pub struct TaskRunner {
    processor: ChunkProcessor,
    extractor: ExtractionWorker,
}

impl TaskRunner {
    pub fn new(processor: ChunkProcessor, extractor: ExtractionWorker) -> Self {
        Self {
            processor,
            extractor,
        }
    }
}

#[async_trait]
impl TaskHandler for TaskRunner {
    async fn handle(&self, task: &Task) -> Result<serde_json::Value> {
        match task {
            Task::SplitChunk(args) => {
                let metadata = self.processor.process(args).await?;
                Ok(serde_json::to_value(metadata)?)
            }
            Task::ExtractChunk(args) => {
                let summary = self.extractor.run(args).await?;
                Ok(serde_json::to_value(summary)?)
            }
        }
    }
}
