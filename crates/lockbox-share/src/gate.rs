//! Access decision gate
//!
//! The one place where authorization meets cryptographic capability. The
//! functions here are pure over their inputs and safe to call concurrently.
//!
//! Authorization decides whether a decryption attempt is *permitted*. Only
//! the password decides whether it *succeeds*. Owning a file does not bypass
//! the password.

use lockbox_core::{ActorId, FileId, Permission, SharingState};
use lockbox_crypto::{
    burn_derivation, open, CryptoError, EncryptedPayload, KdfParams, SealedFile, WrappedKey,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::catalog::RecordSnapshot;
use crate::error::{AccessError, AccessResult};
use crate::record::{AccessOutcome, FileMetadata, FileRecord};

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    User(ActorId),
    Anonymous,
}

impl Actor {
    pub fn from_option(id: Option<&ActorId>) -> Self {
        match id {
            Some(id) => Actor::User(id.clone()),
            None => Actor::Anonymous,
        }
    }
}

/// What is being asked for.
#[derive(Clone, PartialEq, Eq)]
pub enum Target {
    /// Authenticated path: a file id
    File(FileId),
    /// Anonymous path: a share link token
    Link(String),
}

impl std::fmt::Debug for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::File(id) => f.debug_tuple("File").field(id).finish(),
            Target::Link(_) => f.debug_tuple("Link").field(&"[REDACTED]").finish(),
        }
    }
}

/// The capacity in which an actor was authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Owner,
    Grantee(Permission),
    LinkHolder,
}

impl Role {
    /// What the actor may do with content once decrypted.
    pub fn permission(&self) -> Permission {
        match self {
            Role::Owner => Permission::Download,
            Role::Grantee(p) => *p,
            Role::LinkHolder => Permission::View,
        }
    }
}

/// A permitted access attempt, carrying the snapshot it was decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub record: FileRecord,
    pub role: Role,
    pub sharing: SharingState,
}

impl Authorization {
    pub fn metadata(&self) -> FileMetadata {
        FileMetadata::from_record(&self.record, self.sharing)
    }
}

/// Identify the target and decide whether `actor` may attempt to read it.
///
/// - unknown id or token → `NotFound`
/// - link past its expiry or force-expired → `Expired`
/// - owner → `Owner`; actor with a grant → `Grantee`; any valid link → `LinkHolder`
/// - anyone else on the id path → `Forbidden`
pub fn authorize(
    target: &Target,
    actor: &Actor,
    snapshot: &impl RecordSnapshot,
    now: u64,
) -> AccessResult<Authorization> {
    let (record, role) = match target {
        Target::File(id) => {
            let record = snapshot.file(id).ok_or(AccessError::NotFound)?;
            let role = match actor {
                Actor::User(user) if *user == record.owner => Role::Owner,
                Actor::User(user) => match snapshot.grant(id, user) {
                    Some(grant) => Role::Grantee(grant.permission),
                    None => {
                        debug!(file_id = %id, actor = %user, "no grant for actor");
                        return Err(AccessError::Forbidden);
                    }
                },
                Actor::Anonymous => return Err(AccessError::Forbidden),
            };
            (record, role)
        }
        Target::Link(token) => {
            let link = snapshot.link(token).ok_or(AccessError::NotFound)?;
            if !link.is_active(now) {
                debug!(file_id = %link.file_id, expires_at = link.expires_at, "share link expired");
                return Err(AccessError::Expired);
            }
            let record = snapshot.file(&link.file_id).ok_or(AccessError::NotFound)?;
            (record, Role::LinkHolder)
        }
    };

    let sharing = snapshot.sharing_state(&record.id, now);
    Ok(Authorization {
        record,
        role,
        sharing,
    })
}

/// Unwrap the content key with `password` and decrypt the stored payload.
///
/// Every failure, whether a wrong password, a malformed blob or a failed tag,
/// collapses to `AccessDenied`. Failures caught before the key derivation
/// still pay for one, so a refusal costs the same whichever check tripped.
pub fn open_content(
    auth: &Authorization,
    password: &SecretString,
    wrapped_key_text: &str,
    payload: Vec<u8>,
) -> AccessResult<Vec<u8>> {
    let file_id = auth.record.id;
    let kdf = &auth.record.kdf;

    if password.expose_secret().is_empty() {
        debug!(file_id = %file_id, "empty password; denying access");
        return Err(deny_without_kdf(kdf));
    }
    if let Err(e) = kdf.check_argon2() {
        warn!(file_id = %file_id, error = %e, "record carries unusable KDF params; denying access");
        return Err(deny_without_kdf(kdf));
    }
    let wrapped_key = match WrappedKey::from_base64(wrapped_key_text) {
        Ok(wrapped) => wrapped,
        Err(e) => {
            warn!(file_id = %file_id, error = %e, "stored wrapped key unusable; denying access");
            return Err(deny_without_kdf(kdf));
        }
    };

    let sealed = SealedFile {
        wrapped_key,
        payload: EncryptedPayload::from_bytes(payload),
    };
    match open(&sealed, password, kdf) {
        Ok(bytes) => Ok(bytes),
        Err(CryptoError::AuthenticationFailed) => {
            debug!(file_id = %file_id, "content access denied");
            Err(AccessError::AccessDenied)
        }
        Err(e) => {
            warn!(file_id = %file_id, error = %e, "stored blobs unusable; denying access");
            Err(AccessError::AccessDenied)
        }
    }
}

fn deny_without_kdf(kdf: &KdfParams) -> AccessError {
    burn_derivation(kdf);
    AccessError::AccessDenied
}

/// Final error for a request that `authorize` refused.
///
/// A denial that arrives with a password runs one key derivation under `kdf`
/// first, so a stranger guessing passwords waits as long as a grantee who
/// typed the wrong one. `NotFound`, `Expired` and requests without a
/// password return straight away.
pub fn refuse(err: AccessError, password: Option<&SecretString>, kdf: &KdfParams) -> AccessError {
    if password.is_some() && err.is_denial() {
        burn_derivation(kdf);
    }
    err
}

/// The two blobs stored for a file, as read back from blob storage.
pub struct StoredBlobs {
    pub wrapped_key: String,
    pub payload: Vec<u8>,
}

impl std::fmt::Debug for StoredBlobs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredBlobs")
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

/// Finish an authorized access attempt.
///
/// Without a password the result is metadata only, and `blobs` is ignored.
/// With a password, missing blobs count as a corrupted record and deny.
pub fn evaluate(
    auth: Authorization,
    password: Option<&SecretString>,
    blobs: Option<StoredBlobs>,
) -> AccessResult<AccessOutcome> {
    let metadata = auth.metadata();
    let Some(password) = password else {
        return Ok(AccessOutcome::Metadata(metadata));
    };
    let Some(blobs) = blobs else {
        warn!(file_id = %auth.record.id, "record has no stored blobs; denying access");
        return Err(deny_without_kdf(&auth.record.kdf));
    };
    let bytes = open_content(&auth, password, &blobs.wrapped_key, blobs.payload)?;
    Ok(AccessOutcome::Content {
        metadata,
        bytes,
        permission: auth.role.permission(),
    })
}
