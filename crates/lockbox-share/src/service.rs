//! File service: the entry points that tie the access gate to blob storage
//! and the catalog.
//!
//! Key derivation, AEAD work and the catalog file write run on
//! `spawn_blocking`. The catalog lock is never held across a blob read or
//! write, only around catalog mutation and its flush. A change whose flush
//! fails is rolled back in memory before the lock is released.

use std::sync::Arc;

use anyhow::Context;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use secrecy::SecretString;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use lockbox_core::config::{LockboxConfig, MIN_LINK_TOKEN_BYTES};
use lockbox_core::{ActorId, FileId, LockboxError, LockboxResult, Permission};
use lockbox_crypto::{seal, KdfParams, SealParams, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use lockbox_storage::BlobStore;

use crate::catalog::{Catalog, RecordSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::error::{AccessError, AccessResult};
use crate::gate::{authorize, evaluate, refuse, Actor, StoredBlobs, Target};
use crate::record::{AccessOutcome, FileMetadata, FileRecord, NewFile, ShareGrant, ShareLink};

/// Service tunables, resolved from [`LockboxConfig`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub seal: SealParams,
    pub default_link_ttl_secs: u64,
    pub link_token_bytes: usize,
    /// Expire every share link of a file when its last grant is revoked
    pub expire_links_on_full_revoke: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            seal: SealParams::default(),
            default_link_ttl_secs: 3600,
            link_token_bytes: 32,
            expire_links_on_full_revoke: false,
        }
    }
}

impl ServiceSettings {
    /// Resolve settings, enforcing the KDF cost floor and chunk size range.
    pub fn from_config(config: &LockboxConfig) -> LockboxResult<Self> {
        config.validate()?;

        let kdf = KdfParams::new(
            config.crypto.argon2_mem_cost_kib,
            config.crypto.argon2_time_cost,
            config.crypto.argon2_parallelism,
        );
        kdf.validate()
            .map_err(|e| LockboxError::Config(format!("crypto: {e}")))?;

        let chunk_size = config.crypto.chunk_size;
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&chunk_size) {
            return Err(LockboxError::Config(format!(
                "crypto.chunk_size = {chunk_size} is outside {MIN_CHUNK_SIZE}..={MAX_CHUNK_SIZE}"
            )));
        }

        Ok(Self {
            seal: SealParams { kdf, chunk_size },
            default_link_ttl_secs: config.sharing.default_link_ttl_secs,
            link_token_bytes: config.sharing.link_token_bytes,
            expire_links_on_full_revoke: config.sharing.expire_links_on_full_revoke,
        })
    }
}

pub struct FileService {
    blobs: BlobStore,
    catalog: RwLock<Catalog>,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
}

impl FileService {
    /// `settings.link_token_bytes` below [`MIN_LINK_TOKEN_BYTES`] is raised
    /// to it.
    pub fn new(
        blobs: BlobStore,
        catalog: Catalog,
        clock: Arc<dyn Clock>,
        mut settings: ServiceSettings,
    ) -> Self {
        if settings.link_token_bytes < MIN_LINK_TOKEN_BYTES {
            warn!(
                configured = settings.link_token_bytes,
                minimum = MIN_LINK_TOKEN_BYTES,
                "link token length raised to the minimum"
            );
            settings.link_token_bytes = MIN_LINK_TOKEN_BYTES;
        }
        Self {
            blobs,
            catalog: RwLock::new(catalog),
            clock,
            settings,
        }
    }

    /// Build a service from configuration: storage operator, JSON catalog,
    /// system clock.
    pub fn from_config(config: &LockboxConfig) -> anyhow::Result<Self> {
        let settings = ServiceSettings::from_config(config)?;
        let op = lockbox_storage::build_from_core_config(&config.storage)?;
        let catalog = Catalog::open(&config.storage.catalog_path).with_context(|| {
            format!(
                "opening catalog: {}",
                config.storage.catalog_path.display()
            )
        })?;
        info!(
            backend = ?config.storage.backend,
            catalog = %config.storage.catalog_path.display(),
            files = catalog.len(),
            "file service ready"
        );
        Ok(Self::new(
            BlobStore::new(op),
            catalog,
            Arc::new(SystemClock),
            settings,
        ))
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Encrypt and store a new file owned by `owner`.
    ///
    /// Either the record and both blobs exist afterwards, or none of them do.
    pub async fn create_file(
        &self,
        owner: &ActorId,
        plaintext: Vec<u8>,
        password: SecretString,
        meta: NewFile,
    ) -> AccessResult<FileRecord> {
        let name = meta.name.trim().to_string();
        if name.is_empty() {
            return Err(AccessError::InvalidInput("file name is empty".into()));
        }

        let id = FileId::generate();
        let size = plaintext.len() as u64;
        let params = self.settings.seal;

        let sealed = tokio::task::spawn_blocking(move || seal(&plaintext, &password, &params))
            .await
            .map_err(|e| AccessError::Internal(format!("seal task failed: {e}")))??;

        let wrapped_key = sealed.wrapped_key.to_base64();
        if let Err(e) = self.write_blobs(&id, sealed.payload.into_bytes(), wrapped_key).await {
            self.discard_blobs(&id).await;
            return Err(AccessError::Storage(format!("{e:#}")));
        }

        let record = FileRecord {
            id,
            owner: owner.clone(),
            name,
            size,
            content_type: meta.content_type,
            uploaded_at: self.clock.now(),
            kdf: params.kdf,
        };

        let inserted = self
            .commit(|catalog| {
                catalog.insert_file(record.clone());
                Ok(())
            })
            .await;
        if let Err(e) = inserted {
            self.discard_blobs(&id).await;
            return Err(e);
        }

        info!(file_id = %id, owner = %owner, size, "file stored");
        Ok(record)
    }

    async fn write_blobs(
        &self,
        id: &FileId,
        payload: Vec<u8>,
        wrapped_key: String,
    ) -> anyhow::Result<()> {
        self.blobs.put_payload(id, payload).await?;
        self.blobs.put_wrapped_key(id, wrapped_key).await?;
        Ok(())
    }

    async fn discard_blobs(&self, id: &FileId) {
        if let Err(e) = self.blobs.delete(id).await {
            warn!(file_id = %id, "failed to remove blobs of aborted upload: {e:#}");
        }
    }

    /// Apply `change` to the catalog and persist it.
    ///
    /// The write lock is held until the catalog file is replaced. If `change`
    /// or the flush fails, the catalog goes back to what it held before.
    async fn commit<T>(
        &self,
        change: impl FnOnce(&mut Catalog) -> AccessResult<T>,
    ) -> AccessResult<T> {
        let mut catalog = self.catalog.write().await;
        let checkpoint = catalog.checkpoint();
        let result = match change(&mut *catalog) {
            Ok(value) => persist(&mut *catalog).await.map(|()| value),
            Err(e) => Err(e),
        };
        if result.is_err() {
            catalog.rollback(checkpoint);
        }
        result
    }

    /// Read a file by id (as `requester`) or by share link token.
    ///
    /// Without a password only metadata is returned. With one, the content is
    /// decrypted or the attempt fails with `AccessDenied`.
    pub async fn read_file(
        &self,
        target: Target,
        requester: Option<&ActorId>,
        password: Option<SecretString>,
    ) -> AccessResult<AccessOutcome> {
        let now = self.clock.now();
        let actor = Actor::from_option(requester);
        let decision = {
            let catalog = self.catalog.read().await;
            authorize(&target, &actor, &*catalog, now)
        };
        let auth = match decision {
            Ok(auth) => auth,
            Err(e) if password.is_some() && e.is_denial() => {
                let kdf = self.settings.seal.kdf;
                let err = tokio::task::spawn_blocking(move || refuse(e, password.as_ref(), &kdf))
                    .await
                    .map_err(|e| AccessError::Internal(format!("refusal task failed: {e}")))?;
                return Err(err);
            }
            Err(e) => return Err(e),
        };
        debug!(file_id = %auth.record.id, role = ?auth.role, "access authorized");

        let Some(password) = password else {
            return evaluate(auth, None, None);
        };

        let id = auth.record.id;
        let stored = self.load_blobs(&id).await?;
        tokio::task::spawn_blocking(move || evaluate(auth, Some(&password), stored))
            .await
            .map_err(|e| AccessError::Internal(format!("decrypt task failed: {e}")))?
    }

    async fn load_blobs(&self, id: &FileId) -> AccessResult<Option<StoredBlobs>> {
        let wrapped_key = self
            .blobs
            .get_wrapped_key(id)
            .await
            .map_err(|e| AccessError::Storage(format!("{e:#}")))?;
        let payload = self
            .blobs
            .get_payload(id)
            .await
            .map_err(|e| AccessError::Storage(format!("{e:#}")))?;
        Ok(wrapped_key
            .zip(payload)
            .map(|(wrapped_key, payload)| StoredBlobs {
                wrapped_key,
                payload,
            }))
    }

    /// Grant `grantee` access to a file, replacing any existing grant.
    pub async fn share(
        &self,
        owner: &ActorId,
        file_id: &FileId,
        grantee: &ActorId,
        permission: Permission,
    ) -> AccessResult<ShareGrant> {
        if grantee == owner {
            return Err(AccessError::InvalidInput(
                "cannot share a file with its owner".into(),
            ));
        }
        let grant = ShareGrant {
            file_id: *file_id,
            grantee: grantee.clone(),
            permission,
            granted_at: self.clock.now(),
        };

        self.commit(|catalog| {
            owned_record(catalog, owner, file_id)?;
            catalog.upsert_grant(grant.clone());
            Ok(())
        })
        .await?;

        info!(file_id = %file_id, grantee = %grantee, %permission, "file shared");
        Ok(grant)
    }

    /// Remove the grant for (file, grantee).
    ///
    /// Share links are left alone unless `expire_links_on_full_revoke` is set
    /// and this was the file's last grant.
    pub async fn revoke(
        &self,
        owner: &ActorId,
        file_id: &FileId,
        grantee: &ActorId,
    ) -> AccessResult<()> {
        let now = self.clock.now();
        let expire_links = self.settings.expire_links_on_full_revoke;
        let expired = self
            .commit(|catalog| {
                owned_record(catalog, owner, file_id)?;
                if !catalog.remove_grant(file_id, grantee) {
                    return Err(AccessError::NotFound);
                }

                let mut expired = 0usize;
                if expire_links && catalog.grants_for(file_id).is_empty() {
                    for link in catalog.links_for(file_id) {
                        if link.is_active(now) {
                            catalog.expire_link(&link.token, now);
                            expired += 1;
                        }
                    }
                }
                Ok(expired)
            })
            .await?;

        info!(file_id = %file_id, grantee = %grantee, links_expired = expired, "grant revoked");
        Ok(())
    }

    /// Create a share link valid for `ttl_secs` (or the configured default).
    pub async fn create_link(
        &self,
        owner: &ActorId,
        file_id: &FileId,
        ttl_secs: Option<u64>,
    ) -> AccessResult<ShareLink> {
        let ttl = ttl_secs.unwrap_or(self.settings.default_link_ttl_secs);
        if ttl == 0 {
            return Err(AccessError::InvalidInput(
                "link lifetime must be positive".into(),
            ));
        }
        let now = self.clock.now();
        let token_bytes = self.settings.link_token_bytes;

        let link = self
            .commit(|catalog| {
                owned_record(catalog, owner, file_id)?;
                let token = loop {
                    let candidate = generate_token(token_bytes);
                    if !catalog.contains_token(&candidate) {
                        break candidate;
                    }
                };
                let link = ShareLink {
                    file_id: *file_id,
                    token,
                    created_at: now,
                    expires_at: now.saturating_add(ttl),
                    revoked: false,
                };
                catalog.insert_link(link.clone());
                Ok(link)
            })
            .await?;

        info!(file_id = %file_id, expires_at = link.expires_at, "share link created");
        Ok(link)
    }

    /// Force-expire a share link. Only the file's owner may do this.
    pub async fn expire_link(&self, owner: &ActorId, token: &str) -> AccessResult<ShareLink> {
        let now = self.clock.now();
        let link = self
            .commit(|catalog| {
                let link = catalog.link(token).ok_or(AccessError::NotFound)?;
                owned_record(catalog, owner, &link.file_id)?;
                catalog.expire_link(token, now).ok_or(AccessError::NotFound)
            })
            .await?;

        info!(file_id = %link.file_id, "share link expired by owner");
        Ok(link)
    }

    /// Delete a file with its grants, links and blobs.
    pub async fn delete_file(&self, owner: &ActorId, file_id: &FileId) -> AccessResult<()> {
        self.commit(|catalog| {
            owned_record(catalog, owner, file_id)?;
            catalog.remove_file(file_id);
            Ok(())
        })
        .await?;
        // The record is gone, so leftover blobs are unreachable.
        if let Err(e) = self.blobs.delete(file_id).await {
            warn!(file_id = %file_id, "failed to delete blobs: {e:#}");
        }
        info!(file_id = %file_id, "file deleted");
        Ok(())
    }

    /// Files owned by `owner`, oldest first.
    pub async fn list_files(&self, owner: &ActorId) -> Vec<FileMetadata> {
        let now = self.clock.now();
        let catalog = self.catalog.read().await;
        let mut files: Vec<FileMetadata> = catalog
            .files_owned_by(owner)
            .iter()
            .map(|r| FileMetadata::from_record(r, catalog.sharing_state(&r.id, now)))
            .collect();
        files.sort_by_key(|m| m.uploaded_at);
        files
    }

    /// Files other actors have shared with `actor`, with the granted permission.
    pub async fn shared_with(&self, actor: &ActorId) -> Vec<(FileMetadata, Permission)> {
        let now = self.clock.now();
        let catalog = self.catalog.read().await;
        let mut shared: Vec<(FileMetadata, Permission)> = catalog
            .grants_to(actor)
            .into_iter()
            .map(|(record, grant)| {
                let sharing = catalog.sharing_state(&record.id, now);
                (FileMetadata::from_record(&record, sharing), grant.permission)
            })
            .collect();
        shared.sort_by_key(|(m, _)| m.uploaded_at);
        shared
    }

    /// Grants and links currently recorded for a file. Owner only.
    pub async fn shares_of(
        &self,
        owner: &ActorId,
        file_id: &FileId,
    ) -> AccessResult<(Vec<ShareGrant>, Vec<ShareLink>)> {
        let catalog = self.catalog.read().await;
        owned_record(&catalog, owner, file_id)?;
        Ok((catalog.grants_for(file_id), catalog.links_for(file_id)))
    }
}

/// Look up a record and check that `owner` owns it.
fn owned_record(catalog: &Catalog, owner: &ActorId, id: &FileId) -> AccessResult<FileRecord> {
    let record = catalog.file(id).ok_or(AccessError::NotFound)?;
    if record.owner != *owner {
        debug!(file_id = %id, actor = %owner, "non-owner attempted an owner operation");
        return Err(AccessError::Forbidden);
    }
    Ok(record)
}

/// Write out unsaved catalog changes, with the file I/O on the blocking pool.
async fn persist(catalog: &mut Catalog) -> AccessResult<()> {
    let pending = catalog
        .prepare_flush()
        .map_err(|e| AccessError::Storage(format!("{e:#}")))?;
    if let Some(pending) = pending {
        tokio::task::spawn_blocking(move || pending.write())
            .await
            .map_err(|e| AccessError::Internal(format!("catalog write task failed: {e}")))?
            .map_err(|e| AccessError::Storage(format!("{e:#}")))?;
        catalog.mark_flushed();
    }
    Ok(())
}

fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    URL_SAFE_NO_PAD.encode(buf)
}
