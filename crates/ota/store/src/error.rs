//! Error types for ota-store.

use ota_types::BundleId;
use thiserror::Error;

/// Errors raised by the bundle store and its persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No bundle with this id.
    #[error("bundle not found: {0}")]
    NotFound(BundleId),

    /// Bundle is protected (active or builtin).
    #[error("bundle in use: {0}")]
    InUse(BundleId),

    /// Archive could not be unpacked.
    #[error("extract failed: {0}")]
    Extract(#[from] ExtractError),

    /// Archive digest differs from the one announced for it.
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    /// Persisted state could not be encoded or decoded.
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while unpacking an archive.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("malformed archive: {0}")]
    Malformed(String),

    /// An entry would land outside the destination directory.
    #[error("unsafe entry path: {0}")]
    UnsafePath(String),

    #[error("archive is empty")]
    Empty,

    #[error("io error during extraction: {0}")]
    Io(#[from] std::io::Error),
}

/// Integrity verification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("bundle {bundle} has no entry point {entry_point}")]
    MissingEntryPoint {
        bundle: BundleId,
        entry_point: String,
    },

    #[error("storage for bundle {0} is missing")]
    StorageMissing(BundleId),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
