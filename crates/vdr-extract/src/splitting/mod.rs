//! Chunk planning at upload time and chunk splitting inside workers

mod planner;
mod processor;

pub use planner::{plan_ranges, ChunkPlanner};
pub use processor::{clamp_range, ChunkProcessor};
