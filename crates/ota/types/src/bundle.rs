//! Bundle catalog entries and their external view

use crate::ids::BundleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lifecycle status of a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleStatus {
    /// Extracted, not yet confirmed healthy
    Pending,
    /// Transfer in progress
    Downloading,
    /// Confirmed healthy by at least one launch
    Success,
    /// Failed verification or abandoned by rollback
    Error,
}

impl BundleStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for BundleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A known bundle and where its files live
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: BundleId,
    /// Human-supplied label, fixed at creation
    pub version_label: Option<String>,
    pub status: BundleStatus,
    /// Exclusive root of the bundle's files
    pub storage: PathBuf,
    /// BLAKE3 hex digest of the source archive
    pub checksum: Option<String>,
    pub downloaded_at: DateTime<Utc>,
}

impl Bundle {
    /// The bundle shipped inside the native package.
    pub fn builtin(storage: PathBuf, native_version: impl Into<String>) -> Self {
        Self {
            id: BundleId::builtin(),
            version_label: Some(native_version.into()),
            status: BundleStatus::Success,
            storage,
            checksum: None,
            downloaded_at: DateTime::<Utc>::default(),
        }
    }

    pub fn is_builtin(&self) -> bool {
        self.id.is_builtin()
    }

    /// Version string used for update classification.
    pub fn version(&self) -> &str {
        self.version_label.as_deref().unwrap_or(self.id.as_str())
    }

    pub fn info(&self) -> VersionInfo {
        VersionInfo::from(self)
    }
}

/// The view of a bundle handed to the host shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Bundle identifier
    pub version: BundleId,
    /// Version label
    pub name: Option<String>,
    pub status: BundleStatus,
    pub checksum: Option<String>,
    pub downloaded: DateTime<Utc>,
}

impl From<&Bundle> for VersionInfo {
    fn from(bundle: &Bundle) -> Self {
        Self {
            version: bundle.id.clone(),
            name: bundle.version_label.clone(),
            status: bundle.status,
            checksum: bundle.checksum.clone(),
            downloaded: bundle.downloaded_at,
        }
    }
}
