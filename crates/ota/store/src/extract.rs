//! Archive extraction and layout normalization.
//!
//! Archives frequently wrap everything in one top-level folder
//! (`dist/index.html` instead of `index.html`). [`normalize_layout`] flattens
//! that shape right after extraction so every later reader sees the bundle
//! root directly.

use std::fs::{self, File};
use std::path::Path;

use flate2::read::GzDecoder;
use walkdir::WalkDir;

use crate::error::ExtractError;

/// Entries archivers leave behind that never count as bundle content.
const IGNORED_ENTRIES: &[&str] = &["__MACOSX", ".DS_Store"];

const FLATTEN_TMP: &str = ".flatten-tmp";

/// Unpacks an archive into an empty destination directory.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ExtractError>;

    /// Extractor name for logs.
    fn name(&self) -> &str;
}

/// Extractor for gzip-compressed tarballs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzExtractor;

impl ArchiveExtractor for TarGzExtractor {
    fn extract(&self, archive: &Path, dest: &Path) -> Result<(), ExtractError> {
        let file = File::open(archive)?;
        let mut archive = tar::Archive::new(GzDecoder::new(file));
        let entries = archive
            .entries()
            .map_err(|e| ExtractError::Malformed(e.to_string()))?;

        let mut count = 0usize;
        for entry in entries {
            let mut entry = entry.map_err(|e| ExtractError::Malformed(e.to_string()))?;
            let path = entry
                .path()
                .map_err(|e| ExtractError::Malformed(e.to_string()))?
                .display()
                .to_string();
            let unpacked = entry
                .unpack_in(dest)
                .map_err(|e| ExtractError::Malformed(format!("{}: {}", path, e)))?;
            if !unpacked {
                return Err(ExtractError::UnsafePath(path));
            }
            count += 1;
        }

        if count == 0 {
            return Err(ExtractError::Empty);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "tar.gz"
    }
}

/// Flatten a single wrapping folder into `root`.
///
/// Returns `true` when the layout was rewritten.
pub fn normalize_layout(root: &Path) -> Result<bool, ExtractError> {
    for ignored in IGNORED_ENTRIES {
        let path = root.join(ignored);
        if path.is_dir() {
            fs::remove_dir_all(&path)?;
        } else if path.exists() {
            fs::remove_file(&path)?;
        }
    }

    let mut entries = fs::read_dir(root)?.collect::<Result<Vec<_>, _>>()?;
    if entries.is_empty() {
        return Err(ExtractError::Empty);
    }
    if entries.len() != 1 || !entries[0].file_type()?.is_dir() {
        return Ok(false);
    }

    // Move the wrapper aside first so a child sharing its name can't collide.
    let wrapper = entries.remove(0).path();
    let staging = root.join(FLATTEN_TMP);
    fs::rename(&wrapper, &staging)?;
    for child in fs::read_dir(&staging)? {
        let child = child?;
        fs::rename(child.path(), root.join(child.file_name()))?;
    }
    fs::remove_dir(&staging)?;
    Ok(true)
}

/// File count and total size of a bundle tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub files: u64,
    pub bytes: u64,
}

impl TreeStats {
    pub fn collect(root: &Path) -> Self {
        let mut stats = Self::default();
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            if entry.file_type().is_file() {
                stats.files += 1;
                stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        stats
    }
}
