//! The `Updater` facade exposed to the host shell.
//!
//! Wires the store, activation machine, deferred controller, identity and
//! event registry together. The host calls [`Updater::startup`] once per
//! cold start before anything else switches bundles.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use ota_store::{BundleStore, DeviceIdentity, PutOptions, Verifier};
use ota_types::{
    Bundle, BundleId, DelayCondition, EventKind, UpdateClass, UpdaterEvent, VersionInfo,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::activation::{ActivationMachine, ActivationSource, RollbackOutcome};
use crate::config::UpdaterConfig;
use crate::deferred::{DeferredController, LifecycleEvent};
use crate::error::{UpdaterError, UpdaterResult};
use crate::events::{EventRegistry, Listener, ListenerHandle};
use crate::fetch::BundleFetcher;
use crate::gate;
use crate::progress::ProgressTracker;

const RECORD_FILE: &str = "activation.json";
const DELAY_FILE: &str = "delay.json";
const DEVICE_FILE: &str = "device.json";
const DOWNLOADS_DIR: &str = "downloads";

/// A download to perform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    /// Version label of the archive; also the supersession key when set.
    pub version: Option<String>,
    /// Expected blake3 checksum of the archive.
    pub checksum: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    fn target(&self) -> String {
        self.version.clone().unwrap_or_else(|| self.url.clone())
    }
}

/// Result of `current()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentBundle {
    pub bundle: VersionInfo,
    pub native: String,
}

/// What happened to a candidate handed to [`Updater::offer_candidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidateOutcome {
    /// Same version as the active bundle.
    Ignored,
    /// Major version differs; waiting for an explicit `set`.
    MajorHeld,
    /// A delay is in effect; applied at the next qualifying lifecycle event.
    Deferred(VersionInfo),
    /// Activated now; the health window is open.
    Activated(VersionInfo),
}

/// What `startup()` did.
#[derive(Debug, Clone, Default)]
pub struct StartupReport {
    pub rolled_back: Option<RollbackOutcome>,
    pub deferred_applied: Option<VersionInfo>,
    pub evicted: Vec<BundleId>,
}

pub struct Updater {
    config: UpdaterConfig,
    store: Arc<BundleStore>,
    machine: Arc<ActivationMachine>,
    deferred: DeferredController,
    identity: DeviceIdentity,
    events: Arc<EventRegistry>,
    fetcher: Arc<dyn BundleFetcher>,
    /// Supersession key -> ticket of the newest download for it.
    in_flight: DashMap<String, u64>,
    tickets: AtomicU64,
    dispatcher: Option<JoinHandle<()>>,
}

impl Updater {
    /// Open persisted state under `config.storage.root_dir`. Must be called
    /// inside a tokio runtime; the event dispatcher is spawned here.
    pub async fn open(config: UpdaterConfig, fetcher: Arc<dyn BundleFetcher>) -> UpdaterResult<Self> {
        let root = config.storage.root_dir.clone();
        let builtin = Bundle::builtin(config.builtin.dir.clone(), config.builtin.version.clone());
        let store = Arc::new(BundleStore::open(&root, builtin)?);
        let machine = Arc::new(ActivationMachine::open(
            store.clone(),
            Verifier::new(config.updates.entry_point.clone()),
            root.join(RECORD_FILE),
        )?);
        let deferred = DeferredController::open(root.join(DELAY_FILE))?;
        let identity = DeviceIdentity::new(root.join(DEVICE_FILE));

        let events = Arc::new(EventRegistry::new());
        let dispatcher = events.start();

        info!(
            root = %root.display(),
            fetcher = fetcher.name(),
            bundles = store.list().len(),
            "Updater opened"
        );

        Ok(Self {
            config,
            store,
            machine,
            deferred,
            identity,
            events,
            fetcher,
            in_flight: DashMap::new(),
            tickets: AtomicU64::new(0),
            dispatcher,
        })
    }

    /// Cold-start sequence: roll back an unconfirmed bundle, apply a
    /// candidate deferred until restart, then evict. Later calls in the same
    /// session report nothing and change nothing.
    #[instrument(skip(self))]
    pub fn startup(&self) -> UpdaterResult<StartupReport> {
        if self.machine.is_baseline_established() {
            debug!("Startup already ran this session");
            return Ok(StartupReport::default());
        }
        let rolled_back = self.machine.rollback_if_unhealthy()?;

        if let Some(outcome) = &rolled_back {
            self.events.emit(UpdaterEvent::UpdateFailed {
                bundle: outcome.abandoned.info(),
            });
            if self.config.updates.auto_delete_failed && !outcome.abandoned.is_builtin() {
                match self.machine.delete(&outcome.abandoned.id) {
                    Ok(_) => info!(bundle = %outcome.abandoned.id, "Deleted failed bundle"),
                    Err(e) => warn!(bundle = %outcome.abandoned.id, error = %e, "Failed to delete failed bundle"),
                }
            }
        }

        let mut deferred_applied = None;
        if self.machine.deferred_candidate().is_some()
            && self.deferred.permits(LifecycleEvent::Startup, Utc::now())
        {
            match self.apply_deferred() {
                Ok(applied) => deferred_applied = applied,
                Err(e) => warn!(error = %e, "Deferred candidate not applied at startup"),
            }
        }

        let evicted = self.evict(&[])?;
        Ok(StartupReport {
            rolled_back,
            deferred_applied,
            evicted,
        })
    }

    /// Fetch, extract and register a bundle. The new bundle is `pending`
    /// and inactive.
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn download(&self, request: DownloadRequest) -> UpdaterResult<VersionInfo> {
        let target = request.target();
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self.in_flight.insert(target.clone(), ticket) {
            debug!(target = %target, previous, "Superseding in-flight download");
        }

        let result = self.download_inner(&request, &target, ticket).await;
        self.in_flight.remove_if(&target, |_, current| *current == ticket);

        match result {
            Ok(bundle) => {
                self.events.emit(UpdaterEvent::DownloadComplete {
                    bundle: bundle.info(),
                });
                if let Err(e) = self.evict(std::slice::from_ref(&bundle.id)) {
                    warn!(error = %e, "Eviction after download failed");
                }
                Ok(bundle.info())
            }
            Err(e) => {
                warn!(target = %target, error = %e, "Download failed");
                self.events
                    .emit(UpdaterEvent::DownloadFailed { version: target });
                Err(e)
            }
        }
    }

    async fn download_inner(
        &self,
        request: &DownloadRequest,
        target: &str,
        ticket: u64,
    ) -> UpdaterResult<Bundle> {
        let downloads = self.config.storage.root_dir.join(DOWNLOADS_DIR);
        tokio::fs::create_dir_all(&downloads)
            .await
            .map_err(|e| UpdaterError::Download(e.to_string()))?;
        let archive = tempfile::Builder::new()
            .prefix("bundle-")
            .suffix(".tar.gz")
            .tempfile_in(&downloads)
            .map_err(|e| UpdaterError::Download(e.to_string()))?;
        let archive_path = archive.path().to_path_buf();

        let events = self.events.clone();
        let version = request.version.clone();
        let tracker = ProgressTracker::new(move |percent| {
            events.emit(UpdaterEvent::Download {
                percent,
                version: version.clone(),
            })
        });
        let report = |percent: u8| tracker.report(percent);

        self.fetcher
            .fetch(&request.url, &archive_path, &report)
            .await
            .map_err(|e| UpdaterError::Download(e.to_string()))?;

        if !self.is_newest(target, ticket) {
            return Err(UpdaterError::Superseded(target.to_string()));
        }

        let mut options = PutOptions::default();
        if let Some(version) = &request.version {
            options = options.with_version_label(version.clone());
        }
        if let Some(checksum) = &request.checksum {
            options = options.with_expected_checksum(checksum.clone());
        }

        let store = self.store.clone();
        let bundle = tokio::task::spawn_blocking(move || {
            let result = store.put(&archive_path, options);
            drop(archive);
            result
        })
        .await
        .map_err(|e| UpdaterError::Download(format!("extraction task failed: {}", e)))??;

        tracker.finish();
        info!(bundle = %bundle.id, version = bundle.version(), "Bundle downloaded");
        Ok(bundle)
    }

    fn is_newest(&self, target: &str, ticket: u64) -> bool {
        self.in_flight
            .get(target)
            .map_or(false, |current| *current == ticket)
    }

    /// Explicitly activate a bundle. `version_name` is informational: a
    /// mismatch with the stored label is logged, never written.
    #[instrument(skip(self))]
    pub fn set(&self, id: &BundleId, version_name: Option<&str>) -> UpdaterResult<VersionInfo> {
        let bundle = self.machine.activate(id, ActivationSource::Explicit)?;
        if let Some(name) = version_name {
            if bundle.version_label.as_deref() != Some(name) {
                warn!(
                    bundle = %id,
                    label = ?bundle.version_label,
                    requested = name,
                    "Version name does not match stored label"
                );
            }
        }
        Ok(bundle.info())
    }

    pub fn get_id(&self) -> UpdaterResult<String> {
        Ok(self.identity.get_id()?)
    }

    #[instrument(skip(self))]
    pub fn delete(&self, id: &BundleId) -> UpdaterResult<()> {
        self.machine.delete(id)?;
        Ok(())
    }

    pub fn list(&self) -> Vec<VersionInfo> {
        self.store.list().iter().map(VersionInfo::from).collect()
    }

    #[instrument(skip(self))]
    pub fn reset(&self, to_auto_update_bundle: bool) -> UpdaterResult<VersionInfo> {
        Ok(self.machine.reset(to_auto_update_bundle)?.info())
    }

    pub fn current(&self) -> UpdaterResult<CurrentBundle> {
        let (bundle, native) = self.machine.current()?;
        Ok(CurrentBundle {
            bundle: bundle.info(),
            native,
        })
    }

    /// The running app is healthy; closes the health window.
    #[instrument(skip(self))]
    pub fn notify_app_ready(&self) -> UpdaterResult<VersionInfo> {
        Ok(self.machine.confirm_healthy()?.info())
    }

    pub fn delay_update(&self, condition: DelayCondition) -> UpdaterResult<()> {
        self.deferred.delay(condition)
    }

    /// Clear the delay. A candidate already waiting is activated now.
    #[instrument(skip(self))]
    pub fn cancel_delay(&self) -> UpdaterResult<Option<VersionInfo>> {
        self.deferred.cancel_delay()?;
        if self.machine.deferred_candidate().is_none() {
            return Ok(None);
        }
        self.apply_deferred()
    }

    /// Schedule `id` for the next backgrounding without switching now.
    #[instrument(skip(self))]
    pub fn next(&self, id: &BundleId) -> UpdaterResult<VersionInfo> {
        Ok(self.machine.schedule_deferred(id)?.info())
    }

    /// Feed a downloaded candidate discovered by the host's update check
    /// through the version gate.
    #[instrument(skip(self))]
    pub fn offer_candidate(&self, remote_version: &str, id: &BundleId) -> UpdaterResult<CandidateOutcome> {
        let (active, _) = self.machine.current()?;
        let class = gate::classify(
            remote_version,
            active.version(),
            self.config.updates.breaking_update_gate,
        );

        match class {
            UpdateClass::Ignore => {
                debug!(remote = remote_version, "Candidate matches active version");
                Ok(CandidateOutcome::Ignored)
            }
            UpdateClass::Major => {
                info!(remote = remote_version, active = active.version(), "Major update held");
                self.events.emit(UpdaterEvent::MajorAvailable {
                    version: remote_version.to_string(),
                });
                Ok(CandidateOutcome::MajorHeld)
            }
            UpdateClass::Normal => {
                let candidate = self.store.get(id)?;
                self.events.emit(UpdaterEvent::UpdateAvailable {
                    version: candidate.info(),
                });
                if self.deferred.is_delayed() {
                    let bundle = self.machine.schedule_deferred(id)?;
                    Ok(CandidateOutcome::Deferred(bundle.info()))
                } else {
                    let bundle = self.machine.activate(id, ActivationSource::Automatic)?;
                    Ok(CandidateOutcome::Activated(bundle.info()))
                }
            }
        }
    }

    /// The host app moved to the background.
    #[instrument(skip(self))]
    pub fn on_background(&self) -> UpdaterResult<Option<VersionInfo>> {
        if self.machine.deferred_candidate().is_none() {
            return Ok(None);
        }
        if !self.deferred.permits(LifecycleEvent::Background, Utc::now()) {
            debug!(condition = ?self.deferred.condition(), "Deferred candidate still waiting");
            return Ok(None);
        }
        self.apply_deferred()
    }

    pub fn subscribe(&self, kind: EventKind, listener: Listener) -> ListenerHandle {
        self.events.subscribe(kind, listener)
    }

    pub fn unsubscribe(&self, handle: ListenerHandle) -> bool {
        self.events.unsubscribe(handle)
    }

    pub fn events(&self) -> &Arc<EventRegistry> {
        &self.events
    }

    pub fn machine(&self) -> &Arc<ActivationMachine> {
        &self.machine
    }

    pub fn store(&self) -> &Arc<BundleStore> {
        &self.store
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.storage.root_dir
    }

    /// Activate the deferred candidate and consume the delay flag, whether
    /// or not the candidate turned out to be usable.
    fn apply_deferred(&self) -> UpdaterResult<Option<VersionInfo>> {
        let applied = self.machine.apply_deferred();
        self.deferred.consume()?;
        let applied = applied?;
        if let Some(bundle) = &applied {
            info!(bundle = %bundle.id, "Deferred candidate applied");
        }
        Ok(applied.map(|bundle| bundle.info()))
    }

    fn evict(&self, keep: &[BundleId]) -> UpdaterResult<Vec<BundleId>> {
        match self.config.storage.max_bundles {
            0 => Ok(Vec::new()),
            max => self.machine.evict(max, keep),
        }
    }
}

impl Drop for Updater {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.abort();
        }
    }
}
