//! Provider abstractions for object storage
//!
//! Implementations can be switched between a local directory, process memory
//! and Google Cloud Storage through `StorageConfig::backend`.

pub mod local;
pub mod memory;
pub mod object_store;

#[cfg(feature = "gcp")]
pub mod gcp;

pub use local::LocalObjectStore;
pub use memory::MemoryObjectStore;
pub use object_store::{ByteRange, ByteStream, ObjectStat, ObjectStore, Precondition};
