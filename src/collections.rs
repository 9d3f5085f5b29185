use crate::model::{AssetKind, AssetRecord};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;

/// Flat-file collection documents, one pretty-printed JSON array per kind
///
/// The documents double as the front end's data source, so they stay
/// human-readable and are swapped in whole via a temporary file. Writers
/// serialize on a single lock; readers see either the old or the new
/// document, never a torn one.
pub struct CollectionStore {
    data_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CollectionStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// On-disk location of one collection document
    pub fn document_path(&self, kind: AssetKind) -> PathBuf {
        self.data_dir.join(kind.collection_file())
    }

    pub async fn ensure_data_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.data_dir.display()))
    }

    /// Load a collection; a missing document is an empty collection
    pub async fn load(&self, kind: AssetKind) -> Result<Vec<AssetRecord>> {
        let path = self.document_path(kind);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        serde_json::from_slice(&bytes)
            .with_context(|| format!("Malformed collection document {}", path.display()))
    }

    pub async fn get(&self, kind: AssetKind, id: &str) -> Result<Option<AssetRecord>> {
        Ok(self.load(kind).await?.into_iter().find(|r| r.id == id))
    }

    /// Insert a new record at the front, or replace the one sharing its id
    pub async fn upsert(&self, kind: AssetKind, record: AssetRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load(kind).await?;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record,
            None => records.insert(0, record),
        }
        self.store_pretty(kind, &records).await
    }

    /// Remove a record, returning it so the caller can release its files
    pub async fn remove(&self, kind: AssetKind, id: &str) -> Result<Option<AssetRecord>> {
        let _guard = self.write_lock.lock().await;
        let mut records = self.load(kind).await?;
        let Some(pos) = records.iter().position(|r| r.id == id) else {
            return Ok(None);
        };
        let removed = records.remove(pos);
        self.store_pretty(kind, &records).await?;
        Ok(Some(removed))
    }

    /// Replace a whole document with an arbitrary serializable value
    pub async fn write_document<T: Serialize + ?Sized>(&self, kind: AssetKind, value: &T) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store_pretty(kind, value).await
    }

    /// Raw document bytes, None when the document does not exist yet
    pub async fn read_raw(&self, kind: AssetKind) -> Result<Option<Vec<u8>>> {
        let path = self.document_path(kind);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn store_pretty<T: Serialize + ?Sized>(&self, kind: AssetKind, value: &T) -> Result<()> {
        let path = self.document_path(kind);
        let json =
            serde_json::to_string_pretty(value).context("Failed to serialize collection document")?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move document into {}", path.display()))?;
        debug!(document = %path.display(), "collection document written");
        Ok(())
    }
}
