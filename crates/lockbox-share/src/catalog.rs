//! Metadata catalog: file records, share grants and share links.
//!
//! Held in memory and, when opened with a path, persisted as one JSON
//! document flushed atomically (write temp file, then rename). Blob contents
//! never pass through here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use lockbox_core::{ActorId, FileId, SharingState};

use crate::record::{FileRecord, ShareGrant, ShareLink};

/// Read-only view the access gate decides against.
///
/// Implementations hand out owned copies so the gate never holds a borrow
/// into shared state while cryptographic work runs.
pub trait RecordSnapshot {
    fn file(&self, id: &FileId) -> Option<FileRecord>;
    fn grant(&self, id: &FileId, grantee: &ActorId) -> Option<ShareGrant>;
    fn link(&self, token: &str) -> Option<ShareLink>;
    fn sharing_state(&self, id: &FileId, now: u64) -> SharingState;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogData {
    files: BTreeMap<FileId, FileRecord>,
    /// file → grantee → grant (unique per pair)
    grants: BTreeMap<FileId, BTreeMap<ActorId, ShareGrant>>,
    /// token → link
    links: BTreeMap<String, ShareLink>,
}

pub struct Catalog {
    path: Option<PathBuf>,
    data: CatalogData,
    dirty: bool,
}

/// Catalog contents as they were before a change, for [`Catalog::rollback`].
pub struct Checkpoint {
    data: CatalogData,
    dirty: bool,
}

/// A serialized catalog waiting to be written to disk.
///
/// Produced under whatever lock guards the catalog; `write` does the file
/// I/O and may run elsewhere.
pub struct PendingFlush {
    path: PathBuf,
    json: String,
}

impl PendingFlush {
    /// Atomic write: temp file, then rename over the catalog.
    pub fn write(self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog dir: {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, &self.json)
            .with_context(|| format!("writing catalog temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming catalog: {}", self.path.display()))?;
        Ok(())
    }
}

impl Catalog {
    /// A catalog that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: CatalogData::default(),
            dirty: false,
        }
    }

    /// Load or create a catalog at the given path.
    /// If the file doesn't exist, starts empty.
    pub fn open(path: &Path) -> Result<Self> {
        let data = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading catalog: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing catalog: {}", path.display()))?
        } else {
            CatalogData::default()
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            data,
            dirty: false,
        })
    }

    /// Flush dirty changes to disk using an atomic write (write then rename).
    pub fn flush(&mut self) -> Result<()> {
        if let Some(pending) = self.prepare_flush()? {
            pending.write()?;
            self.mark_flushed();
        }
        Ok(())
    }

    /// Serialize unsaved changes.
    ///
    /// `None` when there is nothing to write. An in-memory catalog is marked
    /// clean here; otherwise the caller writes the result and then calls
    /// [`Catalog::mark_flushed`].
    pub fn prepare_flush(&mut self) -> Result<Option<PendingFlush>> {
        if !self.dirty {
            return Ok(None);
        }
        let Some(path) = self.path.clone() else {
            self.dirty = false;
            return Ok(None);
        };
        let json = serde_json::to_string_pretty(&self.data).context("serializing catalog")?;
        Ok(Some(PendingFlush { path, json }))
    }

    pub fn mark_flushed(&mut self) {
        self.dirty = false;
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            data: self.data.clone(),
            dirty: self.dirty,
        }
    }

    /// Put back the contents captured by `checkpoint`, discarding every
    /// change made since, persisted or not.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.data = checkpoint.data;
        self.dirty = checkpoint.dirty;
    }

    pub fn len(&self) -> usize {
        self.data.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.files.is_empty()
    }

    pub fn insert_file(&mut self, record: FileRecord) {
        self.data.files.insert(record.id, record);
        self.dirty = true;
    }

    /// Remove a file and every grant and link that refers to it.
    pub fn remove_file(&mut self, id: &FileId) -> Option<FileRecord> {
        let removed = self.data.files.remove(id)?;
        self.data.grants.remove(id);
        self.data.links.retain(|_, link| link.file_id != *id);
        self.dirty = true;
        Some(removed)
    }

    pub fn files_owned_by(&self, owner: &ActorId) -> Vec<FileRecord> {
        self.data
            .files
            .values()
            .filter(|r| r.owner == *owner)
            .cloned()
            .collect()
    }

    /// Insert or replace the grant for (file, grantee).
    pub fn upsert_grant(&mut self, grant: ShareGrant) {
        self.data
            .grants
            .entry(grant.file_id)
            .or_default()
            .insert(grant.grantee.clone(), grant);
        self.dirty = true;
    }

    /// Remove the grant for (file, grantee). Returns whether one existed.
    pub fn remove_grant(&mut self, id: &FileId, grantee: &ActorId) -> bool {
        let Some(per_file) = self.data.grants.get_mut(id) else {
            return false;
        };
        let removed = per_file.remove(grantee).is_some();
        if per_file.is_empty() {
            self.data.grants.remove(id);
        }
        if removed {
            self.dirty = true;
        }
        removed
    }

    pub fn grants_for(&self, id: &FileId) -> Vec<ShareGrant> {
        self.data
            .grants
            .get(id)
            .map(|g| g.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every (record, grant) pair shared with `grantee`.
    pub fn grants_to(&self, grantee: &ActorId) -> Vec<(FileRecord, ShareGrant)> {
        self.data
            .grants
            .iter()
            .filter_map(|(id, per_file)| {
                let grant = per_file.get(grantee)?;
                let record = self.data.files.get(id)?;
                Some((record.clone(), grant.clone()))
            })
            .collect()
    }

    pub fn contains_token(&self, token: &str) -> bool {
        self.data.links.contains_key(token)
    }

    pub fn insert_link(&mut self, link: ShareLink) {
        self.data.links.insert(link.token.clone(), link);
        self.dirty = true;
    }

    /// Force-expire a link: expiry moves to `now` and it stops working.
    pub fn expire_link(&mut self, token: &str, now: u64) -> Option<ShareLink> {
        let link = self.data.links.get_mut(token)?;
        link.expires_at = link.expires_at.min(now);
        link.revoked = true;
        self.dirty = true;
        Some(link.clone())
    }

    pub fn links_for(&self, id: &FileId) -> Vec<ShareLink> {
        self.data
            .links
            .values()
            .filter(|l| l.file_id == *id)
            .cloned()
            .collect()
    }
}

impl RecordSnapshot for Catalog {
    fn file(&self, id: &FileId) -> Option<FileRecord> {
        self.data.files.get(id).cloned()
    }

    fn grant(&self, id: &FileId, grantee: &ActorId) -> Option<ShareGrant> {
        self.data.grants.get(id)?.get(grantee).cloned()
    }

    fn link(&self, token: &str) -> Option<ShareLink> {
        self.data.links.get(token).cloned()
    }

    fn sharing_state(&self, id: &FileId, now: u64) -> SharingState {
        let grants = self.data.grants.get(id).map_or(0, |g| g.len());
        let active_links = self
            .data
            .links
            .values()
            .filter(|l| l.file_id == *id && l.is_active(now))
            .count();
        SharingState::from_counts(grants, active_links)
    }
}

impl Drop for Catalog {
    fn drop(&mut self) {
        if self.dirty {
            if let Err(e) = self.flush() {
                tracing::warn!("failed to flush catalog on drop: {e}");
            }
        }
    }
}
