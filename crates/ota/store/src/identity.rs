//! Per-install device identity.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::persistence::JsonFile;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DeviceRecord {
    device_id: String,
    created_at: DateTime<Utc>,
}

/// Stable identifier used to address this install from a server.
///
/// Created on first use and never regenerated unless the file is wiped.
pub struct DeviceIdentity {
    file: JsonFile<DeviceRecord>,
    cached: Mutex<Option<String>>,
}

impl DeviceIdentity {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonFile::new(path),
            cached: Mutex::new(None),
        }
    }

    pub fn get_id(&self) -> StoreResult<String> {
        let mut cached = self.cached.lock();
        if let Some(id) = cached.as_ref() {
            return Ok(id.clone());
        }

        let id = match self.file.load()? {
            Some(record) => record.device_id,
            None => {
                let record = DeviceRecord {
                    device_id: Uuid::new_v4().to_string(),
                    created_at: Utc::now(),
                };
                self.file.save(&record)?;
                info!(device_id = %record.device_id, "Generated device identity");
                record.device_id
            }
        };
        *cached = Some(id.clone());
        Ok(id)
    }
}
