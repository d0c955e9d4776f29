//! Reconciles manifests with live job state: progress, ready chunks and retries

mod retry;
mod status;

pub use retry::RetryCoordinator;
pub use status::{progress_pct, StatusAggregator};
