//! Per-file blob layout
//!
//! ```text
//! files/{file_id}/payload       encrypted payload (binary)
//! files/{file_id}/wrapped_key   wrapped content key (base64 text)
//! ```

use anyhow::{Context, Result};
use opendal::{ErrorKind, Operator};

use lockbox_core::FileId;

#[derive(Clone)]
pub struct BlobStore {
    op: Operator,
}

impl BlobStore {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    pub async fn put_payload(&self, id: &FileId, payload: Vec<u8>) -> Result<()> {
        let key = payload_key(id);
        self.op
            .write(&key, payload)
            .await
            .with_context(|| format!("writing payload: {key}"))?;
        Ok(())
    }

    pub async fn put_wrapped_key(&self, id: &FileId, wrapped_key: String) -> Result<()> {
        let key = wrapped_key_key(id);
        self.op
            .write(&key, wrapped_key.into_bytes())
            .await
            .with_context(|| format!("writing wrapped key: {key}"))?;
        Ok(())
    }

    /// Read a payload; `Ok(None)` if it does not exist.
    pub async fn get_payload(&self, id: &FileId) -> Result<Option<Vec<u8>>> {
        let key = payload_key(id);
        match self.op.read(&key).await {
            Ok(buf) => Ok(Some(buf.to_vec())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading payload: {key}")),
        }
    }

    /// Read a wrapped key; `Ok(None)` if it does not exist.
    pub async fn get_wrapped_key(&self, id: &FileId) -> Result<Option<String>> {
        let key = wrapped_key_key(id);
        match self.op.read(&key).await {
            Ok(buf) => {
                let text = String::from_utf8(buf.to_vec())
                    .with_context(|| format!("wrapped key is not UTF-8: {key}"))?;
                Ok(Some(text))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading wrapped key: {key}")),
        }
    }

    /// Delete both blobs of a file. Missing blobs are not an error.
    pub async fn delete(&self, id: &FileId) -> Result<()> {
        for key in [payload_key(id), wrapped_key_key(id)] {
            self.op
                .delete(&key)
                .await
                .with_context(|| format!("deleting blob: {key}"))?;
        }
        Ok(())
    }
}

fn payload_key(id: &FileId) -> String {
    format!("files/{id}/payload")
}

fn wrapped_key_key(id: &FileId) -> String {
    format!("files/{id}/wrapped_key")
}
