//! Envelope encryption: one call that produces, or consumes, the
//! (wrapped key, payload) pair for a file.
//!
//! `seal` either returns both halves or nothing, so callers never hold a
//! payload without the key that opens it.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::cipher::{decrypt, encrypt_with_chunk_size, EncryptedPayload, DEFAULT_CHUNK_SIZE};
use crate::error::CryptoResult;
use crate::kdf::KdfParams;
use crate::keys::{generate_content_key, unwrap_key, wrap_key, WrappedKey};

/// Tunables for sealing a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealParams {
    pub kdf: KdfParams,
    pub chunk_size: usize,
}

impl Default for SealParams {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A file's encrypted content together with its wrapped content key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedFile {
    pub wrapped_key: WrappedKey,
    pub payload: EncryptedPayload,
}

/// Encrypt `plaintext` under a fresh content key and wrap that key under
/// `password`. The content key is dropped (and zeroized) before returning.
pub fn seal(
    plaintext: &[u8],
    password: &SecretString,
    params: &SealParams,
) -> CryptoResult<SealedFile> {
    let content_key = generate_content_key();
    let payload = encrypt_with_chunk_size(plaintext, &content_key, params.chunk_size)?;
    let wrapped_key = wrap_key(&content_key, password, &params.kdf)?;
    Ok(SealedFile {
        wrapped_key,
        payload,
    })
}

/// Unwrap the content key with `password` and decrypt the payload.
///
/// `kdf` must be the parameters the key was wrapped with.
pub fn open(sealed: &SealedFile, password: &SecretString, kdf: &KdfParams) -> CryptoResult<Vec<u8>> {
    let content_key = unwrap_key(&sealed.wrapped_key, password, kdf)?;
    decrypt(&sealed.payload, &content_key)
}
