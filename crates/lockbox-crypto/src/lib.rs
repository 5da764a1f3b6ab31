//! lockbox-crypto: per-file envelope encryption
//!
//! Every uploaded file gets a fresh content key. The file bytes are sealed
//! under that key, and the key itself is wrapped under a key derived from the
//! uploader's password. Nothing the server stores can decrypt a file alone.
//!
//! Key hierarchy:
//! ```text
//! Password + random 16-byte salt
//!   └── Derived Key (256-bit, Argon2id, never stored)
//!         └── Wrapped Content Key: salt ‖ nonce ‖ XChaCha20-Poly1305(content_key) ‖ tag
//!               └── Content Key (per-file, 256-bit random, zeroized after use)
//!                     └── Encrypted Payload: chunked XChaCha20-Poly1305, file-scoped AAD
//! ```

pub mod cipher;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keys;

pub use cipher::{
    decrypt, encrypt, encrypt_with_chunk_size, EncryptedPayload, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE,
    MIN_CHUNK_SIZE,
};
pub use envelope::{open, seal, SealParams, SealedFile};
pub use error::{CryptoError, CryptoResult};
pub use kdf::{burn_derivation, derivation_count, derive_key, DerivedKey, KdfParams};
pub use keys::{generate_content_key, generate_salt, unwrap_key, wrap_key, ContentKey, WrappedKey};

/// Size of a content key and of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the per-wrap KDF salt
pub const SALT_SIZE: usize = 16;
