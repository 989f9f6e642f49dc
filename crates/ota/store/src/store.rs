//! Bundle store.
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/bundles.json      catalog of downloaded bundles
//! <root>/bundles/<id>/     one exclusive directory per bundle
//! <root>/staging/<id>/     extraction in progress
//! ```
//!
//! The builtin bundle is never part of the catalog file; it is synthesized
//! from configuration on every open so it can't be lost or deleted.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Utc;
use ota_types::{Bundle, BundleId, BundleStatus};
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::checksum::{digest_matches, file_digest};
use crate::error::{StoreError, StoreResult};
use crate::extract::{normalize_layout, ArchiveExtractor, TarGzExtractor, TreeStats};
use crate::persistence::JsonFile;

type Catalog = BTreeMap<BundleId, Bundle>;

/// Upper bound on id generation attempts before giving up.
const MAX_ID_ATTEMPTS: usize = 32;

/// Options for registering a new archive.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub version_label: Option<String>,
    /// Digest announced by the server; a mismatch rejects the archive
    pub expected_checksum: Option<String>,
}

impl PutOptions {
    pub fn with_version_label(mut self, label: impl Into<String>) -> Self {
        self.version_label = Some(label.into());
        self
    }

    pub fn with_expected_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }
}

/// Persistent catalog of known bundles.
pub struct BundleStore {
    root: PathBuf,
    builtin: Bundle,
    catalog: RwLock<Catalog>,
    catalog_file: JsonFile<Catalog>,
    extractor: Box<dyn ArchiveExtractor>,
}

impl BundleStore {
    /// Open (or create) the store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>, builtin: Bundle) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("bundles"))?;
        fs::create_dir_all(root.join("staging"))?;

        let catalog_file = JsonFile::new(root.join("bundles.json"));
        let mut catalog: Catalog = catalog_file.load()?.unwrap_or_default();
        catalog.remove(&BundleId::builtin());

        // Leftovers from an extraction interrupted by a crash.
        for entry in fs::read_dir(root.join("staging"))? {
            let path = entry?.path();
            debug!(path = %path.display(), "Removing stale staging directory");
            if let Err(e) = fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove staging directory");
            }
        }

        info!(root = %root.display(), bundles = catalog.len(), "Bundle store opened");

        Ok(Self {
            root,
            builtin,
            catalog: RwLock::new(catalog),
            catalog_file,
            extractor: Box::new(TarGzExtractor),
        })
    }

    pub fn with_extractor(mut self, extractor: impl ArchiveExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn builtin(&self) -> &Bundle {
        &self.builtin
    }

    /// Extract and register a new bundle from an archive on disk.
    pub fn put(&self, archive: &Path, options: PutOptions) -> StoreResult<Bundle> {
        let checksum = file_digest(archive)?;
        if let Some(expected) = options.expected_checksum.as_deref() {
            if !digest_matches(expected, &checksum) {
                return Err(StoreError::ChecksumMismatch {
                    expected: expected.to_string(),
                    actual: checksum,
                });
            }
        }

        if let Some(existing) = self.find_by_checksum(&checksum) {
            info!(bundle = %existing.id, "Archive already stored, reusing bundle");
            return Ok(existing);
        }

        let (id, staging) = self.reserve_id()?;
        if let Err(e) = self.stage(archive, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let storage = self.bundle_dir(&id);
        fs::rename(&staging, &storage)?;

        let stats = TreeStats::collect(&storage);
        let bundle = Bundle {
            id: id.clone(),
            version_label: options.version_label,
            status: BundleStatus::Pending,
            storage,
            checksum: Some(checksum),
            downloaded_at: Utc::now(),
        };

        let registered = {
            let mut catalog = self.catalog.write();
            let mut next = catalog.clone();
            next.insert(id.clone(), bundle.clone());
            self.catalog_file.save(&next).map(|()| *catalog = next)
        };
        if let Err(e) = registered {
            let _ = fs::remove_dir_all(&bundle.storage);
            return Err(e);
        }

        info!(
            bundle = %id,
            version = bundle.version(),
            files = stats.files,
            bytes = stats.bytes,
            "Bundle registered"
        );
        Ok(bundle)
    }

    pub fn get(&self, id: &BundleId) -> StoreResult<Bundle> {
        if id.is_builtin() {
            return Ok(self.builtin.clone());
        }
        self.catalog
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    pub fn contains(&self, id: &BundleId) -> bool {
        id.is_builtin() || self.catalog.read().contains_key(id)
    }

    /// All bundles, builtin first.
    pub fn list(&self) -> Vec<Bundle> {
        let catalog = self.catalog.read();
        std::iter::once(self.builtin.clone())
            .chain(catalog.values().cloned())
            .collect()
    }

    /// Newest downloaded bundle confirmed healthy.
    pub fn newest_success(&self) -> Option<Bundle> {
        self.catalog
            .read()
            .values()
            .filter(|b| b.status.is_success())
            .max_by_key(|b| b.downloaded_at)
            .cloned()
    }

    /// Update a bundle's status. The builtin bundle always stays `success`.
    pub fn set_status(&self, id: &BundleId, status: BundleStatus) -> StoreResult<Bundle> {
        if id.is_builtin() {
            if status != BundleStatus::Success {
                debug!(status = %status, "Ignoring status change on builtin bundle");
            }
            return Ok(self.builtin.clone());
        }

        let mut catalog = self.catalog.write();
        let current = catalog
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if current.status == status {
            return Ok(current.clone());
        }

        let mut next = catalog.clone();
        let bundle = next
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        bundle.status = status;
        let updated = bundle.clone();
        self.catalog_file.save(&next)?;
        *catalog = next;

        debug!(bundle = %id, status = %status, "Bundle status updated");
        Ok(updated)
    }

    /// Remove a bundle and release its storage.
    ///
    /// Only the builtin protection lives here; the active-bundle check
    /// belongs to whoever owns the activation record.
    pub fn delete(&self, id: &BundleId) -> StoreResult<Bundle> {
        if id.is_builtin() {
            return Err(StoreError::InUse(id.clone()));
        }

        let removed = {
            let mut catalog = self.catalog.write();
            if !catalog.contains_key(id) {
                return Err(StoreError::NotFound(id.clone()));
            }
            let mut next = catalog.clone();
            let removed = next.remove(id);
            self.catalog_file.save(&next)?;
            *catalog = next;
            removed
        }
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        match fs::remove_dir_all(&removed.storage) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(bundle = %id, error = %e, "Bundle unregistered but storage not released")
            }
        }

        info!(bundle = %id, "Bundle deleted");
        Ok(removed)
    }

    /// Delete the oldest downloaded bundles until at most `max_downloaded`
    /// remain. Protected ids are never evicted.
    pub fn evict(&self, max_downloaded: usize, protected: &[BundleId]) -> StoreResult<Vec<BundleId>> {
        let mut candidates: Vec<Bundle> = self.catalog.read().values().cloned().collect();
        if candidates.len() <= max_downloaded {
            return Ok(Vec::new());
        }

        let excess = candidates.len() - max_downloaded;
        candidates.retain(|b| !protected.contains(&b.id));
        candidates.sort_by_key(|b| b.downloaded_at);

        let mut evicted = Vec::new();
        for bundle in candidates.into_iter().take(excess) {
            self.delete(&bundle.id)?;
            evicted.push(bundle.id);
        }
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted old bundles");
        }
        Ok(evicted)
    }

    fn bundle_dir(&self, id: &BundleId) -> PathBuf {
        self.root.join("bundles").join(id.as_str())
    }

    fn find_by_checksum(&self, checksum: &str) -> Option<Bundle> {
        self.catalog
            .read()
            .values()
            .find(|b| {
                b.checksum.as_deref() == Some(checksum)
                    && !b.status.is_error()
                    && b.storage.is_dir()
            })
            .cloned()
    }

    /// Pick a fresh id and claim its staging directory.
    fn reserve_id(&self) -> StoreResult<(BundleId, PathBuf)> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = BundleId::generate();
            if self.contains(&id) || self.bundle_dir(&id).exists() {
                continue;
            }
            let staging = self.root.join("staging").join(id.as_str());
            match fs::create_dir(&staging) {
                Ok(()) => return Ok((id, staging)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Persistence(
            "could not allocate a unique bundle id".into(),
        ))
    }

    fn stage(&self, archive: &Path, staging: &Path) -> StoreResult<()> {
        debug!(extractor = self.extractor.name(), archive = %archive.display(), "Extracting archive");
        self.extractor.extract(archive, staging)?;
        if normalize_layout(staging)? {
            debug!(staging = %staging.display(), "Flattened wrapping folder");
        }
        Ok(())
    }
}
