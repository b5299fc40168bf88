//! Flat-directory cache store.
//!
//! One JSON file per cache identifier. Reads treat missing, unreadable and
//! corrupt files alike as "no record"; writes go through a uniquely named
//! temporary file and a rename, so readers never observe a half-written
//! record and concurrent writers of one identifier race only on the rename.

use std::path::{Path, PathBuf};

use super::record::CacheRecord;
use crate::Error;

/// Handle to a cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::CacheWrite(format!("cannot create cache dir {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    /// Root directory of this store.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for a cache identifier.
    pub fn path_for(&self, cache_id: &str) -> PathBuf {
        self.dir.join(format!("{cache_id}.json"))
    }

    /// Load the record for `cache_id`.
    ///
    /// Returns `None` when the record is absent, unreadable or corrupt.
    pub async fn load(&self, cache_id: &str) -> Option<CacheRecord> {
        let path = self.path_for(cache_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(cache_id, error = %e, "unreadable cache record, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<CacheRecord>(&bytes) {
            Ok(record) => Some(record),
            Err(e) => {
                let err = Error::CacheCorrupt(format!("{}: {e}", path.display()));
                tracing::warn!(cache_id, error = %err, "corrupt cache record, treating as miss");
                None
            }
        }
    }

    /// Replace the record for `cache_id`.
    pub async fn save(&self, cache_id: &str, record: &CacheRecord) -> Result<(), Error> {
        let path = self.path_for(cache_id);
        let tmp = self.dir.join(format!(".{cache_id}.{}.tmp", uuid::Uuid::new_v4()));
        let json = serde_json::to_vec_pretty(record).map_err(|e| Error::CacheWrite(e.to_string()))?;

        if let Err(e) = tokio::fs::write(&tmp, &json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::CacheWrite(format!("{}: {e}", tmp.display())));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::CacheWrite(format!("{}: {e}", path.display())));
        }

        tracing::debug!(cache_id, "cache record written");
        Ok(())
    }

    /// Delete the record for `cache_id`. Deleting an absent record succeeds.
    pub async fn remove(&self, cache_id: &str) -> Result<(), Error> {
        match tokio::fs::remove_file(self.path_for(cache_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::CacheWrite(e.to_string())),
        }
    }
}
