//! Background processing: named job queues, workers and task dispatch

mod job_queue;
mod runner;
mod worker;

pub use job_queue::{
    new_job_id, ExtractChunkArgs, JobOptions, JobQueue, JobRecord, JobStatus, LocalJobQueue,
    QueuedJob, RetryPolicy, SplitChunkArgs, Task,
};
pub use runner::TaskRunner;
pub use worker::{QueueWorker, TaskHandler};
