//! Error types for ota-core.
//!
//! Health-check failures never show up here: an unconfirmed bundle is
//! corrected by the startup rollback, not reported to a caller.

use ota_store::{ExtractError, StoreError, VerifyError};
use ota_types::BundleId;
use thiserror::Error;

/// Errors surfaced to the host shell.
#[derive(Debug, Error)]
pub enum UpdaterError {
    /// Transport or storage failure while fetching an archive.
    #[error("download failed: {0}")]
    Download(String),

    /// A newer download for the same target replaced this one.
    #[error("download superseded: {0}")]
    Superseded(String),

    /// Archive could not be unpacked.
    #[error("extract failed: {0}")]
    Extract(#[source] ExtractError),

    /// Bundle failed integrity verification or is not eligible.
    #[error("invalid bundle {bundle}: {reason}")]
    InvalidBundle { bundle: BundleId, reason: String },

    #[error("bundle not found: {0}")]
    NotFound(BundleId),

    /// Delete or modification blocked by active/builtin protection.
    #[error("bundle in use: {0}")]
    InUse(BundleId),

    /// Switching requested before the startup health check ran.
    #[error("startup health check has not completed")]
    BaselinePending,

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<StoreError> for UpdaterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::InUse(id) => Self::InUse(id),
            StoreError::Extract(e) => Self::Extract(e),
            StoreError::ChecksumMismatch { expected, actual } => Self::Download(format!(
                "checksum mismatch: expected {}, got {}",
                expected, actual
            )),
            other => Self::Storage(other),
        }
    }
}

impl From<VerifyError> for UpdaterError {
    fn from(err: VerifyError) -> Self {
        let bundle = match &err {
            VerifyError::MissingEntryPoint { bundle, .. } => bundle.clone(),
            VerifyError::StorageMissing(bundle) => bundle.clone(),
        };
        Self::InvalidBundle {
            bundle,
            reason: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for UpdaterError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for updater operations.
pub type UpdaterResult<T> = Result<T, UpdaterError>;
