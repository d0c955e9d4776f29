//! Per-chunk text and table extraction into JSONL

mod markdown;
mod planner;
mod worker;

pub use markdown::{combine_markdown, render_table};
pub use planner::ExtractionPlanner;
pub use worker::ExtractionWorker;
