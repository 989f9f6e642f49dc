//! Updater events
//!
//! Events are best-effort notifications. Their delivery never gates the
//! state transition that produced them.

use crate::bundle::VersionInfo;
use serde::{Deserialize, Serialize};

/// Discriminant used to subscribe to one family of events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Download,
    MajorAvailable,
    UpdateAvailable,
    DownloadComplete,
    DownloadFailed,
    UpdateFailed,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::MajorAvailable => "majorAvailable",
            Self::UpdateAvailable => "updateAvailable",
            Self::DownloadComplete => "downloadComplete",
            Self::DownloadFailed => "downloadFailed",
            Self::UpdateFailed => "updateFailed",
        }
    }
}

/// Event payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum UpdaterEvent {
    /// Download progress, 0..=100
    Download {
        percent: u8,
        version: Option<String>,
    },
    /// A breaking update is available and waits for an explicit `set`
    MajorAvailable { version: String },
    /// A normal update is ready
    UpdateAvailable { version: VersionInfo },
    DownloadComplete { bundle: VersionInfo },
    DownloadFailed { version: String },
    /// A bundle was abandoned by startup rollback
    UpdateFailed { bundle: VersionInfo },
}

impl UpdaterEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Download { .. } => EventKind::Download,
            Self::MajorAvailable { .. } => EventKind::MajorAvailable,
            Self::UpdateAvailable { .. } => EventKind::UpdateAvailable,
            Self::DownloadComplete { .. } => EventKind::DownloadComplete,
            Self::DownloadFailed { .. } => EventKind::DownloadFailed,
            Self::UpdateFailed { .. } => EventKind::UpdateFailed,
        }
    }
}
