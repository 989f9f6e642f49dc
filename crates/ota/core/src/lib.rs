#![deny(unsafe_code)]
//! # ota-core
//!
//! Rollback-safe activation of over-the-air web bundles.
//!
//! A downloaded bundle becomes active only after it passes verification,
//! and stays active across a restart only after the running app confirms it
//! healthy. A bundle that never confirms is presumed broken and rolled back
//! at the next cold start.
//!
//! - [`ActivationMachine`]: the activation record and its transitions
//! - [`gate`]: normal / major / ignore classification of remote versions
//! - [`DeferredController`]: delay flag for deferred application
//! - [`EventRegistry`]: fire-and-forget event delivery
//! - [`Updater`]: the facade the host shell talks to

pub mod activation;
pub mod config;
pub mod deferred;
pub mod error;
pub mod events;
pub mod fetch;
pub mod gate;
pub mod progress;
pub mod updater;

pub use activation::{ActivationMachine, ActivationSource, RollbackOutcome};
pub use config::{BuiltinConfig, LoggingConfig, StorageConfig, UpdatePolicyConfig, UpdaterConfig};
pub use deferred::{DeferredController, DeferredState, LifecycleEvent};
pub use error::{UpdaterError, UpdaterResult};
pub use events::{EventRegistry, Listener, ListenerHandle};
pub use fetch::{BundleFetcher, FetchError, LocalFileFetcher, ProgressFn};
pub use progress::ProgressTracker;
pub use updater::{CandidateOutcome, CurrentBundle, DownloadRequest, StartupReport, Updater};

pub use ota_types::{
    ActivationPhase, ActivationRecord, Bundle, BundleId, BundleStatus, DelayCondition, EventKind,
    UpdateClass, UpdaterEvent, VersionInfo,
};
