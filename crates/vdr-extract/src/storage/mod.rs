//! Storage layout and manifest persistence
//!
//! Every artifact of a document lives under `docs/{doc_id}/` in the object
//! store; `keys` derives those names and `ManifestStore` owns the manifest.

pub mod keys;
mod manifest;

pub use manifest::ManifestStore;
