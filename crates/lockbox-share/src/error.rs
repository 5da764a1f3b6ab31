use lockbox_crypto::CryptoError;
use thiserror::Error;

pub type AccessResult<T> = Result<T, AccessError>;

/// Outcome categories of an access attempt or sharing operation.
///
/// `NotFound` and `Expired` carry no password information and may be shown
/// as-is. `Forbidden`, `AccessDenied` and `AuthenticationFailed` share one
/// public message; see [`AccessError::public_message`].
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("share link expired")]
    Expired,

    #[error("access denied")]
    AccessDenied,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AccessError {
    /// Text safe to show an end user.
    pub fn public_message(&self) -> &'static str {
        match self {
            AccessError::NotFound => "file or link not found",
            AccessError::Expired => "this share link has expired",
            AccessError::InvalidInput(_) => "invalid request",
            AccessError::Forbidden | AccessError::AccessDenied | AccessError::AuthenticationFailed => {
                "access denied"
            }
            AccessError::Storage(_) | AccessError::Internal(_) => "internal error",
        }
    }

    /// Whether this error must be reported with the generic denial.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            AccessError::Forbidden | AccessError::AccessDenied | AccessError::AuthenticationFailed
        )
    }
}

impl From<CryptoError> for AccessError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::InvalidInput(msg) => AccessError::InvalidInput(msg),
            CryptoError::AuthenticationFailed => AccessError::AuthenticationFailed,
            CryptoError::KeyDerivation(msg) | CryptoError::Encryption(msg) => {
                AccessError::Internal(msg)
            }
        }
    }
}

impl From<lockbox_core::LockboxError> for AccessError {
    fn from(e: lockbox_core::LockboxError) -> Self {
        match e {
            lockbox_core::LockboxError::InvalidInput(msg) => AccessError::InvalidInput(msg),
            other => AccessError::Storage(other.to_string()),
        }
    }
}
