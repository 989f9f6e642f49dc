//! Archive transport seam.
//!
//! The updater does not own a transport. Anything that can place an archive
//! at a local path and report progress implements [`BundleFetcher`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unsupported url: {0}")]
    UnsupportedUrl(String),

    #[error("transfer failed: {0}")]
    Transfer(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Progress callback handed to fetchers, in percent.
pub type ProgressFn<'a> = &'a (dyn Fn(u8) + Send + Sync);

#[async_trait]
pub trait BundleFetcher: Send + Sync {
    /// Write the archive at `url` to `dest`.
    async fn fetch(&self, url: &str, dest: &Path, progress: ProgressFn<'_>) -> Result<(), FetchError>;

    /// Fetcher name for logs.
    fn name(&self) -> &str;
}

/// Copies archives from the local filesystem (`file://` URLs or plain
/// paths). Used by the CLI and tests.
#[derive(Debug, Clone)]
pub struct LocalFileFetcher {
    chunk_size: usize,
}

impl LocalFileFetcher {
    pub fn new() -> Self {
        Self {
            chunk_size: 64 * 1024,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn resolve(url: &str) -> Result<PathBuf, FetchError> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(PathBuf::from(path));
        }
        if url.contains("://") {
            return Err(FetchError::UnsupportedUrl(url.to_string()));
        }
        Ok(PathBuf::from(url))
    }
}

impl Default for LocalFileFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BundleFetcher for LocalFileFetcher {
    async fn fetch(&self, url: &str, dest: &Path, progress: ProgressFn<'_>) -> Result<(), FetchError> {
        let source = Self::resolve(url)?;
        let mut reader = File::open(&source).await.map_err(|e| {
            FetchError::Transfer(format!("cannot open {}: {}", source.display(), e))
        })?;
        let total = reader.metadata().await?.len();
        let mut writer = File::create(dest).await?;

        let mut buf = vec![0u8; self.chunk_size];
        let mut copied: u64 = 0;
        progress(0);
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            copied += n as u64;
            if total > 0 {
                progress(((copied * 100) / total).min(100) as u8);
            }
        }
        writer.flush().await?;
        writer.sync_all().await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "local-file"
    }
}
