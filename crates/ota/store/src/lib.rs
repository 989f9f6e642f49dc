#![deny(unsafe_code)]
//! # ota-store
//!
//! On-disk side of the OTA updater.
//!
//! - [`BundleStore`]: catalog of downloaded bundles plus the synthesized
//!   builtin entry, one exclusive directory per bundle
//! - [`TarGzExtractor`]: archive extraction, normalized to a canonical
//!   layout before anything else reads the files
//! - [`Verifier`]: entry-point check gating activation
//! - [`DeviceIdentity`]: stable per-install identifier
//! - [`JsonFile`]: atomic JSON persistence shared by all of the above

pub mod checksum;
pub mod error;
pub mod extract;
pub mod identity;
pub mod persistence;
pub mod store;
pub mod verify;

pub use error::{ExtractError, StoreError, StoreResult, VerifyError};
pub use extract::{normalize_layout, ArchiveExtractor, TarGzExtractor, TreeStats};
pub use identity::DeviceIdentity;
pub use persistence::JsonFile;
pub use store::{BundleStore, PutOptions};
pub use verify::{Verifier, DEFAULT_ENTRY_POINT};
