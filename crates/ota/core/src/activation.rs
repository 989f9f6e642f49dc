//! Activation state machine.
//!
//! Owns the [`ActivationRecord`]: which bundle serves the app, what to fall
//! back to, and whether the health-check window is open.
//!
//! ```text
//! Idle -> Verifying -> Armed -> Confirmed  -> Idle
//!                            \-> RolledBack -> Idle
//! ```
//!
//! Every mutation runs inside one critical section and persists the next
//! record before it replaces the in-memory one, so `active_id` changes
//! completely or not at all. Lock order is machine, then store.

use std::path::PathBuf;
use std::sync::Arc;

use ota_store::{BundleStore, JsonFile, Verifier};
use ota_types::{ActivationPhase, ActivationRecord, Bundle, BundleId, BundleStatus};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{UpdaterError, UpdaterResult};

/// Who asked for an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSource {
    /// An operator `set`; may force an errored bundle.
    Explicit,
    /// Update flow or deferred application; never picks an errored bundle.
    Automatic,
}

/// What a startup rollback did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    pub abandoned: Bundle,
    pub restored: Bundle,
}

struct MachineState {
    record: ActivationRecord,
    phase: ActivationPhase,
    /// Set once `rollback_if_unhealthy` has run this session.
    baseline_established: bool,
}

pub struct ActivationMachine {
    store: Arc<BundleStore>,
    verifier: Verifier,
    record_file: JsonFile<ActivationRecord>,
    state: Mutex<MachineState>,
}

impl ActivationMachine {
    /// Load the persisted record, repairing references to bundles that no
    /// longer exist.
    pub fn open(
        store: Arc<BundleStore>,
        verifier: Verifier,
        record_path: impl Into<PathBuf>,
    ) -> UpdaterResult<Self> {
        let record_file = JsonFile::new(record_path);
        let mut record: ActivationRecord = record_file.load()?.unwrap_or_default();

        let usable = |id: &BundleId| {
            store
                .get(id)
                .map(|b| b.is_builtin() || b.storage.is_dir())
                .unwrap_or(false)
        };
        if !usable(&record.active_id) {
            warn!(bundle = %record.active_id, "Active bundle missing from store, falling back to builtin");
            record.active_id = BundleId::builtin();
            record.health_check_armed = false;
        }
        if !usable(&record.previous_good_id) {
            record.previous_good_id = BundleId::builtin();
        }
        if let Some(deferred) = &record.deferred_candidate_id {
            if !store.contains(deferred) {
                record.deferred_candidate_id = None;
            }
        }

        let phase = if record.health_check_armed {
            ActivationPhase::Armed
        } else {
            ActivationPhase::Idle
        };
        debug!(
            active = %record.active_id,
            previous_good = %record.previous_good_id,
            armed = record.health_check_armed,
            revision = record.revision,
            "Activation record loaded"
        );

        Ok(Self {
            store,
            verifier,
            record_file,
            state: Mutex::new(MachineState {
                record,
                phase,
                baseline_established: false,
            }),
        })
    }

    pub fn record(&self) -> ActivationRecord {
        self.state.lock().record.clone()
    }

    pub fn phase(&self) -> ActivationPhase {
        self.state.lock().phase
    }

    pub fn is_baseline_established(&self) -> bool {
        self.state.lock().baseline_established
    }

    pub fn store(&self) -> &Arc<BundleStore> {
        &self.store
    }

    /// Trim downloaded bundles beyond `max_downloaded`, never touching the
    /// protected set or `keep`. Runs under the record lock so a concurrent
    /// switch cannot pick a bundle that is being removed.
    pub fn evict(&self, max_downloaded: usize, keep: &[BundleId]) -> UpdaterResult<Vec<BundleId>> {
        let state = self.state.lock();
        let mut protected = Self::protected(&state.record);
        protected.extend(keep.iter().cloned());
        Ok(self.store.evict(max_downloaded, &protected)?)
    }

    /// Switch the active bundle to `candidate` and open the health window.
    pub fn activate(&self, candidate: &BundleId, source: ActivationSource) -> UpdaterResult<Bundle> {
        let mut state = self.state.lock();
        Self::require_baseline(&state)?;
        self.activate_locked(&mut state, candidate, source)
    }

    /// Confirm the active bundle healthy. A no-op outside the health window.
    pub fn confirm_healthy(&self) -> UpdaterResult<Bundle> {
        let mut state = self.state.lock();
        Self::require_baseline(&state)?;

        let active_id = state.record.active_id.clone();
        if !state.record.health_check_armed {
            return Ok(self.store.get(&active_id)?);
        }

        let prior_status = self.store.get(&active_id)?.status;
        let bundle = self.store.set_status(&active_id, BundleStatus::Success)?;
        let mut next = state.record.clone();
        next.previous_good_id = active_id.clone();
        next.health_check_armed = false;
        if let Err(e) = self.commit(&mut state, next) {
            // Still armed: the status must not claim otherwise.
            if let Err(revert) = self.store.set_status(&active_id, prior_status) {
                error!(bundle = %active_id, error = %revert, "Failed to revert bundle status");
            }
            return Err(e);
        }
        state.phase = ActivationPhase::Confirmed;

        info!(bundle = %active_id, "Bundle confirmed healthy");
        Ok(bundle)
    }

    /// Cold-start health check.
    ///
    /// If the last activation was never confirmed, the active bundle is
    /// presumed broken: revert to the last good bundle and mark it `error`.
    /// Establishes the session baseline either way. Once established, later
    /// calls in the same session do nothing.
    pub fn rollback_if_unhealthy(&self) -> UpdaterResult<Option<RollbackOutcome>> {
        let mut state = self.state.lock();
        if state.baseline_established {
            debug!("Startup check already ran this session");
            return Ok(None);
        }

        let outcome = if state.record.health_check_armed {
            let abandoned_id = state.record.active_id.clone();
            let target = self.rollback_target(&state.record, &abandoned_id);

            let mut next = state.record.clone();
            next.active_id = target.id.clone();
            next.previous_good_id = target.id.clone();
            next.health_check_armed = false;
            if next.deferred_candidate_id.as_ref() == Some(&abandoned_id) {
                next.deferred_candidate_id = None;
            }
            self.commit(&mut state, next)?;
            state.phase = ActivationPhase::RolledBack;

            let abandoned = if abandoned_id.is_builtin() {
                self.store.builtin().clone()
            } else {
                match self.store.set_status(&abandoned_id, BundleStatus::Error) {
                    Ok(bundle) => bundle,
                    Err(e) => {
                        // The switch is committed; a stale status is recoverable.
                        error!(bundle = %abandoned_id, error = %e, "Failed to mark abandoned bundle");
                        self.store.get(&abandoned_id)?
                    }
                }
            };

            warn!(
                abandoned = %abandoned_id,
                restored = %target.id,
                "Unconfirmed bundle rolled back at startup"
            );
            Some(RollbackOutcome {
                abandoned,
                restored: target,
            })
        } else {
            None
        };

        state.baseline_established = true;
        Ok(outcome)
    }

    /// Force the builtin bundle, or the newest confirmed download.
    pub fn reset(&self, to_auto_update_bundle: bool) -> UpdaterResult<Bundle> {
        let mut state = self.state.lock();
        Self::require_baseline(&state)?;

        let target = if to_auto_update_bundle {
            self.store
                .newest_success()
                .unwrap_or_else(|| self.store.builtin().clone())
        } else {
            self.store.builtin().clone()
        };

        let mut next = state.record.clone();
        next.active_id = target.id.clone();
        next.previous_good_id = target.id.clone();
        next.health_check_armed = false;
        next.deferred_candidate_id = None;
        self.commit(&mut state, next)?;
        state.phase = ActivationPhase::Idle;

        info!(bundle = %target.id, to_auto_update_bundle, "Activation reset");
        Ok(target)
    }

    /// Active bundle and the native package's version label.
    pub fn current(&self) -> UpdaterResult<(Bundle, String)> {
        let active_id = self.state.lock().record.active_id.clone();
        let bundle = self.store.get(&active_id)?;
        Ok((bundle, self.store.builtin().version().to_string()))
    }

    /// Delete a bundle unless it is active or builtin.
    pub fn delete(&self, id: &BundleId) -> UpdaterResult<Bundle> {
        let mut state = self.state.lock();
        if id.is_builtin() || state.record.active_id == *id {
            return Err(UpdaterError::InUse(id.clone()));
        }

        let removed = self.store.delete(id)?;

        let mut next = state.record.clone();
        let mut changed = false;
        if next.previous_good_id == *id {
            next.previous_good_id = BundleId::builtin();
            changed = true;
        }
        if next.deferred_candidate_id.as_ref() == Some(id) {
            next.deferred_candidate_id = None;
            changed = true;
        }
        if changed {
            self.commit(&mut state, next)?;
        }
        Ok(removed)
    }

    /// Remember `candidate` for a later lifecycle event.
    pub fn schedule_deferred(&self, candidate: &BundleId) -> UpdaterResult<Bundle> {
        let mut state = self.state.lock();
        let bundle = self.store.get(candidate)?;
        if state.record.deferred_candidate_id.as_ref() == Some(candidate) {
            return Ok(bundle);
        }

        let mut next = state.record.clone();
        next.deferred_candidate_id = Some(candidate.clone());
        self.commit(&mut state, next)?;

        debug!(bundle = %candidate, "Candidate deferred");
        Ok(bundle)
    }

    pub fn deferred_candidate(&self) -> Option<BundleId> {
        self.state.lock().record.deferred_candidate_id.clone()
    }

    /// Activate the deferred candidate, if any.
    ///
    /// The deferred slot is cleared whether or not activation succeeds, so
    /// a broken candidate is not retried on every lifecycle event.
    pub fn apply_deferred(&self) -> UpdaterResult<Option<Bundle>> {
        let mut state = self.state.lock();
        Self::require_baseline(&state)?;

        let Some(candidate) = state.record.deferred_candidate_id.clone() else {
            return Ok(None);
        };

        match self.activate_locked(&mut state, &candidate, ActivationSource::Automatic) {
            Ok(bundle) => Ok(Some(bundle)),
            Err(e) => {
                warn!(bundle = %candidate, error = %e, "Deferred candidate rejected");
                if state.record.deferred_candidate_id.is_some() {
                    let mut next = state.record.clone();
                    next.deferred_candidate_id = None;
                    self.commit(&mut state, next)?;
                }
                Err(e)
            }
        }
    }

    fn activate_locked(
        &self,
        state: &mut MachineState,
        candidate_id: &BundleId,
        source: ActivationSource,
    ) -> UpdaterResult<Bundle> {
        let candidate = self.store.get(candidate_id)?;

        if state.record.active_id == *candidate_id {
            debug!(bundle = %candidate_id, "Candidate already active");
            if state.record.deferred_candidate_id.as_ref() == Some(candidate_id) {
                let mut next = state.record.clone();
                next.deferred_candidate_id = None;
                self.commit(state, next)?;
            }
            return Ok(candidate);
        }

        if source == ActivationSource::Automatic && candidate.status.is_error() {
            return Err(UpdaterError::InvalidBundle {
                bundle: candidate_id.clone(),
                reason: "bundle previously failed and needs an explicit set".into(),
            });
        }

        let prior_phase = state.phase;
        state.phase = ActivationPhase::Verifying;
        if !candidate.is_builtin() {
            if let Err(e) = self.verifier.verify(&candidate) {
                state.phase = prior_phase;
                return Err(e.into());
            }
        }

        let mut next = state.record.clone();
        if candidate.is_builtin() {
            // Builtin ships with the app and needs no health window.
            next.previous_good_id = candidate.id.clone();
            next.health_check_armed = false;
        } else {
            let prior_is_good = self
                .store
                .get(&state.record.active_id)
                .map(|b| b.status.is_success())
                .unwrap_or(false);
            if prior_is_good {
                next.previous_good_id = state.record.active_id.clone();
            }
            next.health_check_armed = true;
        }
        next.active_id = candidate.id.clone();
        if next.deferred_candidate_id.as_ref() == Some(candidate_id) {
            next.deferred_candidate_id = None;
        }

        if let Err(e) = self.commit(state, next) {
            state.phase = prior_phase;
            return Err(e);
        }
        state.phase = if state.record.health_check_armed {
            ActivationPhase::Armed
        } else {
            ActivationPhase::Idle
        };

        info!(
            bundle = %candidate.id,
            previous_good = %state.record.previous_good_id,
            armed = state.record.health_check_armed,
            ?source,
            "Bundle activated"
        );
        Ok(candidate)
    }

    /// Previous good bundle if it still exists and is not errored, else builtin.
    fn rollback_target(&self, record: &ActivationRecord, abandoned: &BundleId) -> Bundle {
        if record.previous_good_id != *abandoned {
            if let Ok(bundle) = self.store.get(&record.previous_good_id) {
                if bundle.is_builtin()
                    || (!bundle.status.is_error() && self.verifier.verify(&bundle).is_ok())
                {
                    return bundle;
                }
            }
        }
        self.store.builtin().clone()
    }

    /// Bundles that eviction must leave alone.
    fn protected(record: &ActivationRecord) -> Vec<BundleId> {
        let mut ids = vec![
            BundleId::builtin(),
            record.active_id.clone(),
            record.previous_good_id.clone(),
        ];
        ids.extend(record.deferred_candidate_id.clone());
        ids
    }

    fn require_baseline(state: &MachineState) -> UpdaterResult<()> {
        if state.baseline_established {
            Ok(())
        } else {
            Err(UpdaterError::BaselinePending)
        }
    }

    fn commit(&self, state: &mut MachineState, mut next: ActivationRecord) -> UpdaterResult<()> {
        next.revision = state.record.revision + 1;
        self.record_file.save(&next)?;
        state.record = next;
        Ok(())
    }
}
