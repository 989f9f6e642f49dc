//! Deferred-update controller.
//!
//! Tracks the delay flag that gates *when* a validated candidate is applied.
//! The flag is consumed by exactly one deferred application; afterwards
//! candidates activate immediately again until `delay` is called anew.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use ota_store::JsonFile;
use ota_types::DelayCondition;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::UpdaterResult;

/// Persisted delay flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredState {
    pub condition: Option<DelayCondition>,
}

/// Host lifecycle moments at which a deferred candidate may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// App moved to the background.
    Background,
    /// Cold start, after the rollback check.
    Startup,
}

pub struct DeferredController {
    file: JsonFile<DeferredState>,
    state: Mutex<DeferredState>,
}

impl DeferredController {
    pub fn open(path: impl Into<PathBuf>) -> UpdaterResult<Self> {
        let file = JsonFile::new(path);
        let state = file.load()?.unwrap_or_default();
        Ok(Self {
            file,
            state: Mutex::new(state),
        })
    }

    pub fn delay(&self, condition: DelayCondition) -> UpdaterResult<()> {
        debug!(?condition, "Update delayed");
        self.store(DeferredState {
            condition: Some(condition),
        })
    }

    /// Clear the delay flag. Returns whether one was set.
    pub fn cancel_delay(&self) -> UpdaterResult<bool> {
        let was_set = self.is_delayed();
        if was_set {
            debug!("Update delay cancelled");
            self.store(DeferredState::default())?;
        }
        Ok(was_set)
    }

    pub fn is_delayed(&self) -> bool {
        self.state.lock().condition.is_some()
    }

    pub fn condition(&self) -> Option<DelayCondition> {
        self.state.lock().condition.clone()
    }

    /// Whether a deferred candidate may be applied at `event`.
    ///
    /// Without a delay flag (a candidate scheduled via `next`), both
    /// lifecycle events qualify.
    pub fn permits(&self, event: LifecycleEvent, now: DateTime<Utc>) -> bool {
        match (&self.state.lock().condition, event) {
            (None, _) => true,
            (Some(DelayCondition::Background), LifecycleEvent::Background) => true,
            (Some(DelayCondition::Background), LifecycleEvent::Startup) => false,
            (Some(DelayCondition::Kill), LifecycleEvent::Startup) => true,
            (Some(DelayCondition::Kill), LifecycleEvent::Background) => false,
            (Some(DelayCondition::Date(at)), _) => now >= *at,
        }
    }

    /// Consume the flag after a deferred application.
    pub fn consume(&self) -> UpdaterResult<()> {
        if self.is_delayed() {
            self.store(DeferredState::default())?;
        }
        Ok(())
    }

    fn store(&self, next: DeferredState) -> UpdaterResult<()> {
        let mut state = self.state.lock();
        self.file.save(&next)?;
        *state = next;
        Ok(())
    }
}
