//! Shared harness for the OTA integration tests.
//!
//! A [`Harness`] owns a temporary install: a builtin bundle directory and a
//! storage root. Opening an [`Updater`] twice on the same harness simulates
//! a process restart.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use ota_core::{
    BundleFetcher, DownloadRequest, FetchError, LocalFileFetcher, ProgressFn, Updater,
    UpdaterConfig,
};
use ota_types::{EventKind, UpdaterEvent, VersionInfo};
use tokio::sync::mpsc;

pub const NATIVE_VERSION: &str = "1.0.0";

pub struct Harness {
    dir: tempfile::TempDir,
    pub config: UpdaterConfig,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let builtin = dir.path().join("public");
        std::fs::create_dir_all(&builtin).expect("builtin dir");
        std::fs::write(builtin.join("index.html"), "<html>builtin</html>").expect("builtin index");

        let mut config = UpdaterConfig::rooted(dir.path().join("data"), builtin);
        config.builtin.version = NATIVE_VERSION.to_string();
        Self { dir, config }
    }

    pub fn with_max_bundles(mut self, max: usize) -> Self {
        self.config.storage.max_bundles = max;
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Open the updater without running the startup check.
    pub async fn open(&self) -> Updater {
        self.open_with(Arc::new(LocalFileFetcher::new())).await
    }

    pub async fn open_with(&self, fetcher: Arc<dyn BundleFetcher>) -> Updater {
        Updater::open(self.config.clone(), fetcher)
            .await
            .expect("open updater")
    }

    /// Open and run the cold-start sequence, as a host does on launch.
    pub async fn boot(&self) -> Updater {
        let updater = self.open().await;
        updater.startup().expect("startup");
        updater
    }

    /// Write an archive with the given entries and return its path.
    pub fn archive(&self, name: &str, files: &[(&str, &[u8])]) -> PathBuf {
        let path = self.dir.path().join(format!("{}.tar.gz", name));
        write_tar_gz(&path, files);
        path
    }

    /// A well-formed web bundle whose content identifies `version`.
    pub fn web_archive(&self, version: &str) -> PathBuf {
        let body = format!("<html>{}</html>", version);
        self.archive(
            version,
            &[("index.html", body.as_bytes()), ("app.js", version.as_bytes())],
        )
    }

    pub fn request(&self, version: &str) -> DownloadRequest {
        DownloadRequest::new(self.web_archive(version).to_string_lossy()).with_version(version)
    }

    pub async fn download(&self, updater: &Updater, version: &str) -> VersionInfo {
        updater
            .download(self.request(version))
            .await
            .expect("download")
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Write a `.tar.gz` containing the given `(path, contents)` entries.
pub fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).expect("create archive");
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *contents)
            .expect("append entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip");
}

/// Write a `.tar.gz` with one entry whose raw name is not validated, for
/// archives that try to escape the extraction root.
pub fn write_raw_tar_gz(path: &Path, name: &str, contents: &[u8]) {
    let file = std::fs::File::create(path).expect("create archive");
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let mut header = tar::Header::new_old();
    {
        let raw = header.as_old_mut();
        raw.name[..name.len()].copy_from_slice(name.as_bytes());
    }
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_cksum();
    builder.append(&header, contents).expect("append raw entry");
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip");
}

/// Forward every event of `kind` into a channel.
pub fn collect_events(updater: &Updater, kind: EventKind) -> mpsc::UnboundedReceiver<UpdaterEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    updater.subscribe(
        kind,
        Arc::new(move |event: &UpdaterEvent| {
            let _ = tx.send(event.clone());
        }),
    );
    rx
}

/// Next event, or `None` if nothing arrives within a second.
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<UpdaterEvent>) -> Option<UpdaterEvent> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .ok()
        .flatten()
}

/// Drain whatever has arrived after giving the dispatcher a moment.
pub async fn drain_events(rx: &mut mpsc::UnboundedReceiver<UpdaterEvent>) -> Vec<UpdaterEvent> {
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Fetcher that replays a fixed progress script, optionally stalls, and
/// then copies the local file.
pub struct ScriptedFetcher {
    inner: LocalFileFetcher,
    script: Vec<u8>,
    stall: Option<(String, Duration)>,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<u8>) -> Self {
        Self {
            inner: LocalFileFetcher::new(),
            script,
            stall: None,
        }
    }

    /// Delay transfers whose URL contains `needle`.
    pub fn stalling(mut self, needle: impl Into<String>, delay: Duration) -> Self {
        self.stall = Some((needle.into(), delay));
        self
    }
}

#[async_trait]
impl BundleFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str, dest: &Path, progress: ProgressFn<'_>) -> Result<(), FetchError> {
        for p in &self.script {
            progress(*p);
        }
        if let Some((needle, delay)) = &self.stall {
            if url.contains(needle.as_str()) {
                tokio::time::sleep(*delay).await;
            }
        }
        self.inner.fetch(url, dest, &|_| {}).await
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Fetcher that always fails the transfer.
pub struct FailingFetcher;

#[async_trait]
impl BundleFetcher for FailingFetcher {
    async fn fetch(&self, url: &str, _dest: &Path, progress: ProgressFn<'_>) -> Result<(), FetchError> {
        progress(10);
        Err(FetchError::Transfer(format!("connection reset fetching {}", url)))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
