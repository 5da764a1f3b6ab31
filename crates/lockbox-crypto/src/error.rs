use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors from the envelope-encryption primitives.
///
/// A wrong password and a tampered blob both surface as
/// [`CryptoError::AuthenticationFailed`] with the same message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("encryption failed: {0}")]
    Encryption(String),
}

impl CryptoError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        CryptoError::InvalidInput(msg.into())
    }
}
