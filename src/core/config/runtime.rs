use std::ffi::OsString;
use std::path::PathBuf;

use crate::core::artifact::{default_install_dir, RELEASE_BASE};
use crate::core::downloader::ArtifactDigest;
use crate::core::error::ConfigurationError;
use crate::core::launch::classpath::classpath_separator;

use super::settings::{BootstrapSettings, HardeningPolicy};

/// Directory containing an unpacked toolkit tree; disables resolve/fetch.
pub const OVERRIDE_ROOT_VAR: &str = "RAPIDWRIGHT_PATH";
/// Module search path; required whenever the override root is set.
pub const CLASSPATH_VAR: &str = "CLASSPATH";
pub const JAVA_HOME_VAR: &str = "JAVA_HOME";
pub const SEARCH_PATH_VAR: &str = "PATH";
pub const HTTPS_PROXY_VAR: &str = "HTTPS_PROXY";

/// Toolkit version, pinned to this crate's own version.
pub const RAPIDWRIGHT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything the bootstrap needs, read once at the boundary.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub version: String,
    pub override_root: Option<PathBuf>,
    pub environment_classpath: Option<String>,
    pub artifact_path: Option<PathBuf>,
    pub java_home: Option<PathBuf>,
    pub search_path: Option<OsString>,
    pub extra_flags: Vec<String>,
    pub hardening: HardeningPolicy,
    pub install_dir: PathBuf,
    pub release_base: String,
    pub pinned_digest: Option<ArtifactDigest>,
    pub https_proxy: Option<String>,
    pub min_free_disk_bytes: u64,
}

/// Where the runtime's module path comes from, after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModulePathPlan {
    /// Use the caller-provided classpath verbatim; nothing is fetched.
    Override { classpath: String },
    /// Use a prebuilt jar from settings; nothing is fetched.
    Prebuilt(PathBuf),
    /// Resolve the platform jar for `version` and fetch it on a cache miss.
    Resolve { version: String },
}

impl RuntimeConfig {
    /// Defaults for `version` with no environment signals at all.
    pub fn new(version: impl Into<String>) -> Self {
        Self::from_lookup(version, &BootstrapSettings::default(), |_| None)
    }

    /// Build from the process environment.
    pub fn from_env(settings: &BootstrapSettings) -> Self {
        Self::from_lookup(RAPIDWRIGHT_VERSION, settings, |name| std::env::var_os(name))
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup<F>(version: impl Into<String>, settings: &BootstrapSettings, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        Self {
            version: version.into(),
            override_root: var(OVERRIDE_ROOT_VAR).map(PathBuf::from),
            environment_classpath: var(CLASSPATH_VAR).map(|v| v.to_string_lossy().into_owned()),
            artifact_path: settings.artifact_path.clone(),
            java_home: var(JAVA_HOME_VAR).map(PathBuf::from),
            search_path: var(SEARCH_PATH_VAR),
            extra_flags: settings.extra_flags.clone(),
            hardening: settings.hardening,
            install_dir: settings
                .install_dir
                .clone()
                .unwrap_or_else(default_install_dir),
            release_base: settings
                .release_base
                .clone()
                .unwrap_or_else(|| RELEASE_BASE.to_string()),
            pinned_digest: settings.pinned_digest.clone(),
            https_proxy: settings
                .https_proxy
                .clone()
                .or_else(|| var(HTTPS_PROXY_VAR).map(|v| v.to_string_lossy().into_owned())),
            min_free_disk_bytes: settings.min_free_disk_bytes,
        }
    }

    /// Validate the configuration as a whole and decide the module path source.
    ///
    /// The override root always wins over resolution; without its companion
    /// classpath the configuration is rejected.
    pub fn plan(&self) -> Result<ModulePathPlan, ConfigurationError> {
        if let Some(root) = &self.override_root {
            return match self.environment_classpath.as_deref().map(str::trim) {
                Some(classpath) if !classpath.is_empty() => Ok(ModulePathPlan::Override {
                    classpath: classpath.to_string(),
                }),
                _ => Err(ConfigurationError::MissingCompanion {
                    override_var: OVERRIDE_ROOT_VAR,
                    companion_var: CLASSPATH_VAR,
                    root: root.clone(),
                    suggested: suggested_classpath(root),
                }),
            };
        }

        if let Some(path) = &self.artifact_path {
            if !path.is_file() {
                return Err(ConfigurationError::MissingArtifact(path.clone()));
            }
            return Ok(ModulePathPlan::Prebuilt(path.clone()));
        }

        if self.version.trim().is_empty() {
            return Err(ConfigurationError::EmptyVersion);
        }
        Ok(ModulePathPlan::Resolve {
            version: self.version.trim().to_string(),
        })
    }
}

/// The classpath an unpacked toolkit tree expects: compiled classes plus jars.
fn suggested_classpath(root: &std::path::Path) -> String {
    let root = root.to_string_lossy();
    let root = root.trim_end_matches(['/', '\\']);
    format!(
        "{root}/bin{sep}{root}/jars/*",
        sep = classpath_separator()
    )
}
