//! OTA Types - Core types for over-the-air web bundle updates
//!
//! A host application serves its UI from a *bundle* of web assets. New
//! bundles are downloaded at runtime, switched in, and watched until the
//! running app confirms it is healthy. A bundle that never confirms is
//! abandoned at the next cold start and the last known-good bundle returns.
//!
//! ## Key Concepts
//!
//! - **Bundle**: a versioned set of asset files with a lifecycle status
//! - **Builtin**: the bundle shipped inside the native package, always present
//! - **ActivationRecord**: which bundle is active and what to roll back to
//! - **UpdaterEvent**: fire-and-forget notifications for the host shell

#![deny(unsafe_code)]

pub mod bundle;
pub mod events;
pub mod ids;
pub mod record;

// Re-export main types
pub use bundle::{Bundle, BundleStatus, VersionInfo};
pub use events::{EventKind, UpdaterEvent};
pub use ids::{BundleId, BUILTIN_ID};
pub use record::{ActivationPhase, ActivationRecord, DelayCondition, UpdateClass};
