//! File records, share grants and share links as kept in the catalog

use lockbox_core::{ActorId, FileId, Permission, SharingState};
use lockbox_crypto::KdfParams;
use serde::{Deserialize, Serialize};

/// Caller-supplied metadata for an upload.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub name: String,
    pub content_type: String,
}

/// Catalog entry for one stored file.
///
/// Exactly one encrypted payload and one wrapped key exist in blob storage
/// for every record. Neither is held here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub owner: ActorId,
    pub name: String,
    /// Plaintext size in bytes
    pub size: u64,
    pub content_type: String,
    /// Unix timestamp of the upload
    pub uploaded_at: u64,
    /// Argon2id parameters the content key was wrapped with
    pub kdf: KdfParams,
}

/// What a caller may learn about a file without its password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub id: FileId,
    pub name: String,
    pub size: u64,
    pub content_type: String,
    pub owner: ActorId,
    pub uploaded_at: u64,
    pub sharing: SharingState,
}

impl FileMetadata {
    pub fn from_record(record: &FileRecord, sharing: SharingState) -> Self {
        Self {
            id: record.id,
            name: record.name.clone(),
            size: record.size,
            content_type: record.content_type.clone(),
            owner: record.owner.clone(),
            uploaded_at: record.uploaded_at,
            sharing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareGrant {
    pub file_id: FileId,
    pub grantee: ActorId,
    pub permission: Permission,
    pub granted_at: u64,
}

/// An unguessable token that lets anyone holding it (and the password)
/// attempt decryption until it expires.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareLink {
    pub file_id: FileId,
    pub token: String,
    pub created_at: u64,
    pub expires_at: u64,
    /// Set when the owner force-expires the link
    #[serde(default)]
    pub revoked: bool,
}

impl ShareLink {
    /// Usable while `now <= expires_at` and not force-expired.
    pub fn is_active(&self, now: u64) -> bool {
        !self.revoked && now <= self.expires_at
    }
}

impl std::fmt::Debug for ShareLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareLink")
            .field("file_id", &self.file_id)
            .field("token", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("revoked", &self.revoked)
            .finish()
    }
}

/// Result of a successful access attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessOutcome {
    /// No password was supplied: existence, size and owner only.
    Metadata(FileMetadata),
    /// Password accepted: decrypted content.
    Content {
        metadata: FileMetadata,
        bytes: Vec<u8>,
        permission: Permission,
    },
}

impl AccessOutcome {
    pub fn metadata(&self) -> &FileMetadata {
        match self {
            AccessOutcome::Metadata(m) => m,
            AccessOutcome::Content { metadata, .. } => metadata,
        }
    }

    pub fn content(&self) -> Option<&[u8]> {
        match self {
            AccessOutcome::Metadata(_) => None,
            AccessOutcome::Content { bytes, .. } => Some(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(expires_at: u64) -> ShareLink {
        ShareLink {
            file_id: FileId::generate(),
            token: "tok".into(),
            created_at: 100,
            expires_at,
            revoked: false,
        }
    }

    #[test]
    fn test_link_active_until_expiry_inclusive() {
        let l = link(200);
        assert!(l.is_active(150));
        assert!(l.is_active(200));
        assert!(!l.is_active(201));
    }

    #[test]
    fn test_revoked_link_inactive() {
        let mut l = link(200);
        l.revoked = true;
        assert!(!l.is_active(150));
    }

    #[test]
    fn test_link_debug_hides_token() {
        let mut l = link(200);
        l.token = "super-secret-token".into();
        assert!(!format!("{l:?}").contains("super-secret-token"));
    }

    #[test]
    fn test_outcome_accessors() {
        let meta = FileMetadata {
            id: FileId::generate(),
            name: "a.txt".into(),
            size: 3,
            content_type: "text/plain".into(),
            owner: ActorId::new("o@x.io"),
            uploaded_at: 1,
            sharing: SharingState::Private,
        };
        let m = AccessOutcome::Metadata(meta.clone());
        assert_eq!(m.content(), None);
        let c = AccessOutcome::Content {
            metadata: meta.clone(),
            bytes: b"abc".to_vec(),
            permission: Permission::Download,
        };
        assert_eq!(c.content(), Some(&b"abc"[..]));
        assert_eq!(c.metadata(), &meta);
    }
}
