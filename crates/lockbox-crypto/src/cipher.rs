//! Content cipher: chunked XChaCha20-Poly1305 with file-scoped authentication
//!
//! Encrypted payload format (binary):
//! ```text
//! header = [4 bytes: "LBX1"][4 bytes: chunk_size, big-endian][16 bytes: random payload_id]
//! chunk  = [24 bytes: random nonce][N bytes: ciphertext][16 bytes: Poly1305 tag]
//! payload = header || chunk_0 || chunk_1 || ... || chunk_last
//! AAD(chunk i) = header (24 bytes) || i (8 bytes, big-endian) || final_flag (1 byte)
//! ```
//!
//! Every chunk but the last carries exactly `chunk_size` plaintext bytes.
//! Binding the header, the index and the final flag into each tag means
//! reordered, dropped, appended or spliced chunks all fail authentication.
//! [`decrypt`] verifies the whole payload before returning any plaintext.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::keys::ContentKey;
use crate::{NONCE_SIZE, TAG_SIZE};

const MAGIC: &[u8; 4] = b"LBX1";
const PAYLOAD_ID_SIZE: usize = 16;

/// Size of the payload header in bytes.
pub const HEADER_SIZE: usize = MAGIC.len() + 4 + PAYLOAD_ID_SIZE;

/// Default plaintext bytes per chunk (1 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

pub const MIN_CHUNK_SIZE: usize = 16;
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Ciphertext of one file's bytes under its content key.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    bytes: Vec<u8>,
}

impl EncryptedPayload {
    /// Wrap bytes read back from storage. Validation happens in [`decrypt`].
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Plaintext length implied by the payload's size and chunk layout.
    /// `None` if the header does not parse.
    pub fn plaintext_len(&self) -> Option<usize> {
        let header = Header::parse(&self.bytes).ok()?;
        let body = self.bytes.len() - HEADER_SIZE;
        let full = header.chunk_size + NONCE_SIZE + TAG_SIZE;
        let chunks = body.div_ceil(full).max(1);
        body.checked_sub(chunks * (NONCE_SIZE + TAG_SIZE))
    }
}

impl std::fmt::Debug for EncryptedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedPayload")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl From<Vec<u8>> for EncryptedPayload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

struct Header {
    raw: [u8; HEADER_SIZE],
    chunk_size: usize,
}

impl Header {
    fn new(chunk_size: usize) -> CryptoResult<Self> {
        check_chunk_size(chunk_size)?;
        let mut raw = [0u8; HEADER_SIZE];
        raw[..4].copy_from_slice(MAGIC);
        raw[4..8].copy_from_slice(&(chunk_size as u32).to_be_bytes());
        OsRng.fill_bytes(&mut raw[8..]);
        Ok(Self { raw, chunk_size })
    }

    fn parse(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() < HEADER_SIZE + NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::invalid(format!(
                "encrypted payload too short: {} bytes (minimum {})",
                bytes.len(),
                HEADER_SIZE + NONCE_SIZE + TAG_SIZE
            )));
        }
        if &bytes[..4] != MAGIC {
            return Err(CryptoError::invalid("encrypted payload has unknown format"));
        }
        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[4..8]);
        let chunk_size = u32::from_be_bytes(size) as usize;
        check_chunk_size(chunk_size)?;

        let mut raw = [0u8; HEADER_SIZE];
        raw.copy_from_slice(&bytes[..HEADER_SIZE]);
        Ok(Self { raw, chunk_size })
    }

    fn aad(&self, index: u64, is_final: bool) -> [u8; HEADER_SIZE + 9] {
        let mut aad = [0u8; HEADER_SIZE + 9];
        aad[..HEADER_SIZE].copy_from_slice(&self.raw);
        aad[HEADER_SIZE..HEADER_SIZE + 8].copy_from_slice(&index.to_be_bytes());
        aad[HEADER_SIZE + 8] = u8::from(is_final);
        aad
    }
}

fn check_chunk_size(chunk_size: usize) -> CryptoResult<()> {
    if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
        return Err(CryptoError::invalid(format!(
            "chunk size {chunk_size} outside {MIN_CHUNK_SIZE}..={MAX_CHUNK_SIZE}"
        )));
    }
    Ok(())
}

/// Encrypt file content under `key` using the default chunk size.
pub fn encrypt(plaintext: &[u8], key: &ContentKey) -> CryptoResult<EncryptedPayload> {
    encrypt_with_chunk_size(plaintext, key, DEFAULT_CHUNK_SIZE)
}

/// Encrypt file content under `key`, splitting it into `chunk_size` pieces.
///
/// Empty input still produces one (empty) final chunk so that the payload
/// carries a tag.
pub fn encrypt_with_chunk_size(
    plaintext: &[u8],
    key: &ContentKey,
    chunk_size: usize,
) -> CryptoResult<EncryptedPayload> {
    let header = Header::new(chunk_size)?;
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());

    let chunks: Vec<&[u8]> = if plaintext.is_empty() {
        vec![plaintext]
    } else {
        plaintext.chunks(chunk_size).collect()
    };
    let count = chunks.len();
    let last = count - 1;

    let mut out =
        Vec::with_capacity(HEADER_SIZE + plaintext.len() + count * (NONCE_SIZE + TAG_SIZE));
    out.extend_from_slice(&header.raw);

    for (index, chunk) in chunks.into_iter().enumerate() {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let aad = header.aad(index as u64, index == last);

        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce_bytes),
                Payload {
                    msg: chunk,
                    aad: &aad,
                },
            )
            .map_err(|e| CryptoError::Encryption(format!("chunk {index} encryption failed: {e}")))?;

        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
    }

    tracing::trace!(
        plaintext_len = plaintext.len(),
        chunks = count,
        "content encrypted"
    );

    Ok(EncryptedPayload::from_bytes(out))
}

/// Decrypt a payload produced by [`encrypt`].
///
/// Fails with [`CryptoError::AuthenticationFailed`] if any chunk does not
/// verify (wrong key or tampering), and with [`CryptoError::InvalidInput`]
/// if the payload is structurally malformed. No plaintext is returned unless
/// every chunk verified.
pub fn decrypt(payload: &EncryptedPayload, key: &ContentKey) -> CryptoResult<Vec<u8>> {
    let bytes = payload.as_bytes();
    let header = Header::parse(bytes)?;
    let body = &bytes[HEADER_SIZE..];
    let full = header.chunk_size + NONCE_SIZE + TAG_SIZE;

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let mut plaintext = Vec::with_capacity(body.len());
    let mut offset = 0usize;
    let mut index = 0u64;

    while offset < body.len() {
        let take = full.min(body.len() - offset);
        let is_final = offset + take == body.len();

        if take < NONCE_SIZE + TAG_SIZE {
            plaintext.zeroize();
            return Err(CryptoError::AuthenticationFailed);
        }

        let (nonce_bytes, ciphertext) = body[offset..offset + take].split_at(NONCE_SIZE);
        let aad = header.aad(index, is_final);

        match cipher.decrypt(
            XNonce::from_slice(nonce_bytes),
            Payload {
                msg: ciphertext,
                aad: &aad,
            },
        ) {
            Ok(mut chunk) => {
                plaintext.extend_from_slice(&chunk);
                chunk.zeroize();
            }
            Err(_) => {
                plaintext.zeroize();
                return Err(CryptoError::AuthenticationFailed);
            }
        }

        offset += take;
        index += 1;
    }

    Ok(plaintext)
}
