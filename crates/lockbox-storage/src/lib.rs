//! lockbox-storage: OpenDAL-backed persistence for encrypted payloads and wrapped keys
//!
//! The store never interprets what it holds. Payloads are opaque bytes and
//! wrapped keys are opaque text, both keyed by file id.

pub mod blobs;
pub mod operator;

pub use blobs::BlobStore;
pub use operator::{build_from_core_config, build_operator, memory_operator};
