//! Activation record and the classification vocabulary around it

use crate::ids::BundleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-wide record of which bundle serves the app.
///
/// Every committed mutation bumps `revision`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationRecord {
    pub active_id: BundleId,
    /// Last bundle confirmed healthy; the rollback target
    pub previous_good_id: BundleId,
    /// Open from activation until the bundle is confirmed
    pub health_check_armed: bool,
    pub deferred_candidate_id: Option<BundleId>,
    #[serde(default)]
    pub revision: u64,
}

impl ActivationRecord {
    /// Fresh install: builtin is active and known-good.
    pub fn initial() -> Self {
        Self {
            active_id: BundleId::builtin(),
            previous_good_id: BundleId::builtin(),
            health_check_armed: false,
            deferred_candidate_id: None,
            revision: 0,
        }
    }
}

impl Default for ActivationRecord {
    fn default() -> Self {
        Self::initial()
    }
}

/// Where the activation state machine currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationPhase {
    Idle,
    Verifying,
    Armed,
    Confirmed,
    RolledBack,
}

/// Outcome of comparing a remote version with the active one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateClass {
    /// Eligible for (possibly deferred) activation
    Normal,
    /// Breaking update, held until an explicit `set`
    Major,
    /// Same version, nothing to do
    Ignore,
}

/// When a delayed candidate may be applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum DelayCondition {
    /// Next time the app goes to the background
    Background,
    /// Next cold start
    Kill,
    /// First backgrounding at or after the given instant
    Date(DateTime<Utc>),
}

impl Default for DelayCondition {
    fn default() -> Self {
        Self::Background
    }
}
