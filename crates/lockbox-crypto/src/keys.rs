//! Content key generation and password-based key wrapping
//!
//! Wrapped key format (binary, 88 bytes, stored as standard base64):
//! ```text
//! [16 bytes: Argon2id salt][24 bytes: nonce][32 bytes: ciphertext][16 bytes: Poly1305 tag]
//! AAD = "lockbox-wrap-v1"
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::SecretString;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{derive_key, KdfParams};
use crate::{KEY_SIZE, NONCE_SIZE, SALT_SIZE, TAG_SIZE};

const WRAP_AAD: &[u8] = b"lockbox-wrap-v1";

/// A per-file 256-bit content key. Zeroized on drop.
///
/// Deliberately not `Clone`: a content key is owned by the single
/// encrypt or decrypt operation that creates or consumes it.
pub struct ContentKey {
    bytes: [u8; KEY_SIZE],
}

impl ContentKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for ContentKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random 256-bit content key from the OS CSPRNG.
pub fn generate_content_key() -> ContentKey {
    let mut bytes = [0u8; KEY_SIZE];
    OsRng.fill_bytes(&mut bytes);
    ContentKey::from_bytes(bytes)
}

/// Generate a fresh random KDF salt.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// A content key wrapped under a password-derived key.
///
/// Opaque and immutable once created. Meaningless without the password it
/// was wrapped with.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey {
    bytes: Vec<u8>,
}

impl WrappedKey {
    /// Exact length of a wrapped key blob.
    pub const LEN: usize = SALT_SIZE + NONCE_SIZE + KEY_SIZE + TAG_SIZE;

    /// Accept a raw blob, checking only its length.
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(CryptoError::invalid(format!(
                "wrapped key has wrong size: {} bytes (expected {})",
                bytes.len(),
                Self::LEN
            )));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The KDF salt this key was wrapped with.
    pub fn salt(&self) -> [u8; SALT_SIZE] {
        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&self.bytes[..SALT_SIZE]);
        salt
    }

    /// Text form used for persistence.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn from_base64(text: &str) -> CryptoResult<Self> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| CryptoError::invalid(format!("wrapped key is not valid base64: {e}")))?;
        Self::from_bytes(bytes)
    }
}

impl std::fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedKey")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Wrap (encrypt) a content key under a key derived from `password`.
///
/// A fresh salt and nonce are drawn for every call, so wrapping the same key
/// twice never yields the same blob.
pub fn wrap_key(
    content_key: &ContentKey,
    password: &SecretString,
    params: &KdfParams,
) -> CryptoResult<WrappedKey> {
    let salt = generate_salt();
    let derived = derive_key(password, &salt, params)?;
    let cipher = XChaCha20Poly1305::new(derived.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: content_key.as_bytes(),
                aad: WRAP_AAD,
            },
        )
        .map_err(|e| CryptoError::Encryption(format!("key wrapping failed: {e}")))?;

    let mut result = Vec::with_capacity(WrappedKey::LEN);
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    WrappedKey::from_bytes(result)
}

/// Unwrap (decrypt) a content key with the password it was wrapped under.
///
/// A wrong password and a corrupted blob are indistinguishable: both fail
/// with [`CryptoError::AuthenticationFailed`].
pub fn unwrap_key(
    wrapped: &WrappedKey,
    password: &SecretString,
    params: &KdfParams,
) -> CryptoResult<ContentKey> {
    let bytes = wrapped.as_bytes();
    if bytes.len() != WrappedKey::LEN {
        return Err(CryptoError::invalid(format!(
            "wrapped key has wrong size: {} bytes (expected {})",
            bytes.len(),
            WrappedKey::LEN
        )));
    }

    let (salt, rest) = bytes.split_at(SALT_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);

    let mut salt_arr = [0u8; SALT_SIZE];
    salt_arr.copy_from_slice(salt);
    let derived = derive_key(password, &salt_arr, params)?;
    let cipher = XChaCha20Poly1305::new(derived.as_bytes().into());

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(
                XNonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: WRAP_AAD,
                },
            )
            .map_err(|_| CryptoError::AuthenticationFailed)?,
    );

    if plaintext.len() != KEY_SIZE {
        return Err(CryptoError::AuthenticationFailed);
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    Ok(ContentKey::from_bytes(key_bytes))
}
