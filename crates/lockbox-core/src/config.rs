use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{LockboxError, LockboxResult};

/// Fewest random bytes behind a share link token.
pub const MIN_LINK_TOKEN_BYTES: usize = 16;

/// Top-level configuration (loaded from lockbox.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockboxConfig {
    pub crypto: CryptoConfig,
    pub storage: StorageConfig,
    pub sharing: SharingConfig,
    pub logging: LoggingConfig,
}

/// Envelope encryption tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Argon2id memory cost in KiB (default: 65536 = 64 MiB)
    pub argon2_mem_cost_kib: u32,
    /// Argon2id time cost (iterations, default: 3)
    pub argon2_time_cost: u32,
    /// Argon2id parallelism (default: 4)
    pub argon2_parallelism: u32,
    /// Plaintext bytes per encrypted chunk (default: 1 MiB)
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local, lost on exit
    Memory,
    /// Local filesystem under `root`
    Fs,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Blob backend (default: fs)
    pub backend: StorageBackend,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// JSON catalog of file records, grants and links
    pub catalog_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharingConfig {
    /// Lifetime of a new share link when none is given (default: 1 hour)
    pub default_link_ttl_secs: u64,
    /// Random bytes in a share link token (default: 32)
    pub link_token_bytes: usize,
    /// Expire a file's share links when its last grant is revoked (default: false)
    pub expire_links_on_full_revoke: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            argon2_mem_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            chunk_size: 1024 * 1024,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            root: PathBuf::from("/var/lib/lockbox/blobs"),
            catalog_path: PathBuf::from("/var/lib/lockbox/catalog.json"),
        }
    }
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            default_link_ttl_secs: 3600,
            link_token_bytes: 32,
            expire_links_on_full_revoke: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl LockboxConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> LockboxResult<Self> {
        let config: LockboxConfig =
            toml::from_str(s).map_err(|e| LockboxError::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that do not need the crypto crate. KDF cost floors are
    /// enforced where the parameters are turned into `KdfParams`.
    pub fn validate(&self) -> LockboxResult<()> {
        if self.sharing.link_token_bytes < MIN_LINK_TOKEN_BYTES {
            return Err(LockboxError::Config(format!(
                "sharing.link_token_bytes = {} is too small to be unguessable (minimum {MIN_LINK_TOKEN_BYTES})",
                self.sharing.link_token_bytes
            )));
        }
        if self.sharing.default_link_ttl_secs == 0 {
            return Err(LockboxError::Config(
                "sharing.default_link_ttl_secs must be positive".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Fs && self.storage.root.as_os_str().is_empty() {
            return Err(LockboxError::Config(
                "storage.root is required for the fs backend".into(),
            ));
        }
        match self.logging.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(LockboxError::Config(format!(
                "logging.format must be \"json\" or \"text\", got {other:?}"
            ))),
        }
    }
}
