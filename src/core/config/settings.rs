use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::downloader::ArtifactDigest;
use crate::core::error::ConfigurationError;

/// Environment variable pointing at an explicit settings file.
pub const SETTINGS_VAR: &str = "RAPIDWRIGHT_BOOTSTRAP_SETTINGS";

const SETTINGS_DIR_NAME: &str = "rapidwright-bootstrap";
const SETTINGS_FILE: &str = "settings.json";
const DEFAULT_MIN_FREE_DISK_BYTES: u64 = 512 * 1024 * 1024;

/// What to do when exit interception cannot be installed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HardeningPolicy {
    /// Log and keep the launched runtime.
    #[default]
    BestEffort,
    /// Report the bootstrap as failed.
    Required,
}

/// Persisted bootstrap preferences. Every field is optional on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BootstrapSettings {
    /// Extra JVM flags, passed in order.
    pub extra_flags: Vec<String>,
    pub hardening: HardeningPolicy,
    pub pinned_digest: Option<ArtifactDigest>,
    pub release_base: Option<String>,
    pub install_dir: Option<PathBuf>,
    /// Prebuilt jar to use instead of resolving and fetching one.
    pub artifact_path: Option<PathBuf>,
    pub https_proxy: Option<String>,
    /// 0 disables the check.
    pub min_free_disk_bytes: u64,
}

impl Default for BootstrapSettings {
    fn default() -> Self {
        Self {
            extra_flags: Vec::new(),
            hardening: HardeningPolicy::BestEffort,
            pinned_digest: None,
            release_base: None,
            install_dir: None,
            artifact_path: None,
            https_proxy: None,
            min_free_disk_bytes: DEFAULT_MIN_FREE_DISK_BYTES,
        }
    }
}

impl BootstrapSettings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigurationError::SettingsIo {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_slice(&bytes).map_err(|source| ConfigurationError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from `$RAPIDWRIGHT_BOOTSTRAP_SETTINGS`, else the per-user config dir.
    pub fn load_default() -> Result<Self, ConfigurationError> {
        match default_settings_path() {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }
}

fn default_settings_path() -> Option<PathBuf> {
    if let Some(explicit) = std::env::var_os(SETTINGS_VAR) {
        if !explicit.is_empty() {
            return Some(PathBuf::from(explicit));
        }
    }
    dirs::config_dir().map(|dir| dir.join(SETTINGS_DIR_NAME).join(SETTINGS_FILE))
}
