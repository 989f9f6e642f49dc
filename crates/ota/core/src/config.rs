//! Configuration for the updater

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main updater configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Bundle storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Bundle shipped with the native package
    #[serde(default)]
    pub builtin: BuiltinConfig,

    /// Update policy
    #[serde(default)]
    pub updates: UpdatePolicyConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for downloaded bundles and persisted state
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Downloaded bundles kept before eviction; 0 keeps everything
    #[serde(default)]
    pub max_bundles: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            max_bundles: 0,
        }
    }
}

/// Builtin bundle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinConfig {
    /// Directory holding the builtin web assets
    #[serde(default = "default_builtin_dir")]
    pub dir: PathBuf,

    /// Native package version label
    #[serde(default = "default_native_version")]
    pub version: String,
}

impl Default for BuiltinConfig {
    fn default() -> Self {
        Self {
            dir: default_builtin_dir(),
            version: default_native_version(),
        }
    }
}

/// Update policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePolicyConfig {
    /// File every bundle root must contain
    #[serde(default = "default_entry_point")]
    pub entry_point: String,

    /// Hold back candidates whose major version differs
    #[serde(default = "default_true")]
    pub breaking_update_gate: bool,

    /// Delete bundles abandoned by a startup rollback
    #[serde(default)]
    pub auto_delete_failed: bool,
}

impl Default for UpdatePolicyConfig {
    fn default() -> Self {
        Self {
            entry_point: default_entry_point(),
            breaking_update_gate: true,
            auto_delete_failed: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("ota-data")
}

fn default_builtin_dir() -> PathBuf {
    PathBuf::from("public")
}

fn default_native_version() -> String {
    "0.0.0".to_string()
}

fn default_entry_point() -> String {
    ota_store::DEFAULT_ENTRY_POINT.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl UpdaterConfig {
    /// Load configuration from defaults, an optional file, then `OTA_*`
    /// environment variables (`OTA_STORAGE__MAX_BUNDLES=5`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&UpdaterConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("OTA")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Configuration rooted at `root_dir`, for embedding and tests.
    pub fn rooted(root_dir: impl Into<PathBuf>, builtin_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig {
                root_dir: root_dir.into(),
                ..Default::default()
            },
            builtin: BuiltinConfig {
                dir: builtin_dir.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
