//! Atomic JSON persistence.
//!
//! Every piece of state that must survive a restart (bundle catalog,
//! activation record, deferred state, device id) is a single JSON document.
//! Writes go to a sibling `.tmp` file, are fsynced, then renamed over the
//! target, so a crash mid-write leaves either the old or the new document.

use std::fs::{self, File};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// A JSON document stored at a fixed path.
#[derive(Debug, Clone)]
pub struct JsonFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, `None` if it was never written.
    pub fn load(&self) -> StoreResult<Option<T>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        let value = serde_json::from_str(&contents).map_err(|e| {
            StoreError::Persistence(format!(
                "deserialization of {} failed: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(Some(value))
    }

    /// Replace the document atomically.
    pub fn save(&self, value: &T) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| StoreError::Persistence(format!("serialization failed: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        sync_parent(&self.path);

        Ok(())
    }
}

// Directory fsync makes the rename durable; not every platform allows it.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}
