//! OpenDAL Operator factory for lockbox storage backends

use anyhow::{Context, Result};
use opendal::Operator;
use std::path::Path;

use lockbox_core::config::{StorageBackend, StorageConfig};

/// Build an operator over the local filesystem rooted at `root`.
pub fn build_operator(root: &Path) -> Result<Operator> {
    let root = root
        .to_str()
        .with_context(|| format!("storage root is not valid UTF-8: {}", root.display()))?;

    // opendal 0.55: builders use the consuming pattern
    let builder = opendal::services::Fs::default().root(root);

    let op = Operator::new(builder)
        .context("creating OpenDAL fs operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();

    Ok(op)
}

/// Build a process-local in-memory operator (tests, ephemeral runs).
pub fn memory_operator() -> Result<Operator> {
    let op = Operator::new(opendal::services::Memory::default())
        .context("creating OpenDAL memory operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .finish();
    Ok(op)
}

/// Build an operator from lockbox-core config.
pub fn build_from_core_config(storage: &StorageConfig) -> Result<Operator> {
    match storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("using in-memory blob storage: uploads are lost on exit");
            memory_operator()
        }
        StorageBackend::Fs => {
            std::fs::create_dir_all(&storage.root).with_context(|| {
                format!("creating storage root: {}", storage.root.display())
            })?;
            build_operator(&storage.root)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_operator() {
        assert!(memory_operator().is_ok());
    }

    #[test]
    fn test_build_from_core_config_fs_creates_root() {
        let tmp = tempfile::TempDir::new().unwrap();
        let root = tmp.path().join("nested/blobs");
        let storage = StorageConfig {
            backend: StorageBackend::Fs,
            root: root.clone(),
            ..Default::default()
        };

        let result = build_from_core_config(&storage);
        assert!(result.is_ok());
        assert!(root.is_dir(), "fs backend must create its root");
    }

    #[test]
    fn test_build_from_core_config_memory() {
        let storage = StorageConfig {
            backend: StorageBackend::Memory,
            ..Default::default()
        };
        assert!(build_from_core_config(&storage).is_ok());
    }
}
