use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::LockboxError;

/// An authenticated actor, identified by email address.
///
/// Normalised to trimmed lowercase so that `Alice@Example.com` and
/// `alice@example.com` are the same actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(email: &str) -> Self {
        Self(email.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ActorId {
    type Err = LockboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self::new(s);
        match id.0.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(id),
            _ => Err(LockboxError::InvalidInput(format!(
                "not an email address: {s:?}"
            ))),
        }
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(uuid::Uuid);

impl FileId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl FromStr for FileId {
    type Err = LockboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|e| LockboxError::InvalidInput(format!("invalid file id {s:?}: {e}")))
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// What a share grant allows the grantee to do with decrypted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Content may be shown inline but not offered as a download
    View,
    /// Content may be downloaded
    Download,
}

impl FromStr for Permission {
    type Err = LockboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(Permission::View),
            "download" => Ok(Permission::Download),
            other => Err(LockboxError::InvalidInput(format!(
                "unknown permission {other:?} (expected view or download)"
            ))),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::View => f.pad("view"),
            Permission::Download => f.pad("download"),
        }
    }
}

/// How widely a file is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharingState {
    /// Owner only
    #[default]
    Private,
    /// One or more share grants exist
    SharedWithActors,
    /// At least one unexpired share link exists (grants may exist too)
    LinkShared,
}

impl SharingState {
    pub fn from_counts(grants: usize, active_links: usize) -> Self {
        if active_links > 0 {
            SharingState::LinkShared
        } else if grants > 0 {
            SharingState::SharedWithActors
        } else {
            SharingState::Private
        }
    }
}

impl fmt::Display for SharingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharingState::Private => f.pad("private"),
            SharingState::SharedWithActors => f.pad("shared"),
            SharingState::LinkShared => f.pad("link"),
        }
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
