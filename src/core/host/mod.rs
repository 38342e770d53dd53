// ─── Embedded Runtime Host ───
// The runtime itself is a black box; the launcher only talks to it through
// this trait so tests can substitute a recording host.

mod jshell;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{HardeningError, RuntimeStartError, SessionError};

pub use jshell::{jshell_args, JshellHost, EXIT_GUARD_CONFIRMATION, EXIT_GUARD_SNIPPET};

/// Parameters for the one and only runtime start of a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartSpec {
    pub java_home: Option<PathBuf>,
    /// Platform-separated module path (classpath).
    pub module_path: String,
    pub extra_flags: Vec<String>,
}

/// Can this runtime intercept process-exit calls?
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitInterception {
    Supported,
    Unsupported,
    Unknown,
}

#[async_trait]
pub trait RuntimeHost: Send + Sync {
    /// Start the runtime. Must only succeed once per host.
    async fn start(&self, spec: &StartSpec) -> Result<(), RuntimeStartError>;

    /// Capability query, only meaningful once the runtime is live.
    async fn exit_interception(&self) -> ExitInterception;

    /// Make exit calls issued inside the runtime raise a catchable condition
    /// instead of terminating the host process. Only returns `Ok` once the
    /// runtime has confirmed the interception is active.
    async fn install_exit_interception(&self) -> Result<(), HardeningError>;

    /// Whether the runtime started by this host is still running.
    async fn is_alive(&self) -> bool;

    /// Evaluate a snippet of code in the live runtime.
    async fn submit(&self, snippet: &str) -> Result<(), SessionError>;
}
