use std::path::PathBuf;
use thiserror::Error;

/// Invalid or incomplete bootstrap configuration.
///
/// Always detected before the runtime is asked to start, never retried.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error(
        "{override_var} is set to {root:?} but {companion_var} is not; \
         please set {companion_var}={suggested}"
    )]
    MissingCompanion {
        override_var: &'static str,
        companion_var: &'static str,
        root: PathBuf,
        suggested: String,
    },

    #[error("artifact version must not be empty")]
    EmptyVersion,

    #[error("configured artifact does not exist: {0:?}")]
    MissingArtifact(PathBuf),

    #[error("settings file {path:?} is malformed: {source}")]
    Settings {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("settings file {path:?} could not be read: {source}")]
    SettingsIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid proxy {value:?}: {reason}")]
    InvalidProxy { value: String, reason: String },
}

/// Network or filesystem failure while materializing the artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("{algorithm} mismatch for {path:?}: expected {expected}, got {actual}")]
    DigestMismatch {
        algorithm: &'static str,
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("downloaded artifact {path:?} is not a readable jar: {source}")]
    CorruptArchive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("background verification task failed: {0}")]
    Task(String),

    #[error("not enough disk space at {path:?}: available={available} required={required}")]
    InsufficientSpace {
        path: PathBuf,
        available: u64,
        required: u64,
    },
}

/// The embedded runtime refused to start. A corrected retry may start it.
#[derive(Debug, Error)]
pub enum RuntimeStartError {
    #[error("module path is empty")]
    EmptyModulePath,

    #[error("module path entry does not exist: {0:?}")]
    MissingModulePathEntry(PathBuf),

    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("runtime exited during startup ({status}): {stderr}")]
    ExitedEarly { status: String, stderr: String },

    #[error("another bootstrap is already starting the runtime")]
    StartInProgress,

    #[error("runtime is already started by this host")]
    AlreadyStarted,

    #[error("failed to create the bootstrap executor: {0}")]
    Executor(#[source] std::io::Error),
}

/// The live runtime session could not be reached.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("runtime is not running")]
    NotRunning,

    #[error("failed to reach the runtime: {0}")]
    Channel(#[from] std::io::Error),
}

/// Exit-call interception could not be installed.
#[derive(Debug, Error)]
pub enum HardeningError {
    #[error("exit interception is not supported by this runtime")]
    Unsupported,

    #[error("exit interception was not installed when the runtime started")]
    NotInstalled,

    #[error("runtime reported exit interception inactive after installing it")]
    Rejected,

    #[error("runtime did not confirm exit interception within {waited:?}")]
    Unconfirmed { waited: std::time::Duration },

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Central error type for the bootstrap sequence.
/// Every public operation returns `Result<T, BootstrapError>`.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("artifact fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("runtime start failed: {0}")]
    RuntimeStart(#[from] RuntimeStartError),

    #[error("runtime hardening failed: {0}")]
    Hardening(#[from] HardeningError),

    #[error("runtime session failed: {0}")]
    Session(#[from] SessionError),
}

/// Convenience alias used throughout the crate.
pub type BootstrapResult<T> = Result<T, BootstrapError>;

// ── Serialization for embedding hosts ───────────────────
// Hosts that forward bootstrap failures over IPC need `Serialize`.
impl serde::Serialize for BootstrapError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
