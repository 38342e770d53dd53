mod core;

use std::sync::{Arc, OnceLock};

use tokio::runtime::Runtime;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub use crate::core::artifact::{resolve, ArtifactDescriptor, PlatformTag, RELEASE_BASE};
pub use crate::core::config::{
    BootstrapSettings, HardeningPolicy, ModulePathPlan, RuntimeConfig, RAPIDWRIGHT_VERSION,
};
pub use crate::core::downloader::{
    ArtifactDigest, ArtifactFetcher, ArtifactSource, HttpArtifactSource,
};
pub use crate::core::error::{
    BootstrapError, BootstrapResult, ConfigurationError, FetchError, HardeningError,
    RuntimeStartError, SessionError,
};
pub use crate::core::host::{
    ExitInterception, JshellHost, RuntimeHost, StartSpec, EXIT_GUARD_CONFIRMATION, EXIT_GUARD_SNIPPET,
};
pub use crate::core::launch::{Bootstrapper, RuntimeHandle, RuntimeRegistry, RuntimeStatus};

/// Install a fmt subscriber filtered by `RUST_LOG`.
///
/// Does nothing if the embedding application already installed one.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,rapidwright_bootstrap_lib=debug")),
        )
        .try_init();
}

/// Bring up the toolkit runtime for this process, using the settings file and
/// the process environment.
///
/// Safe to call from any number of call sites; only the first successful call
/// starts anything.
pub async fn bootstrap() -> BootstrapResult<RuntimeHandle> {
    let settings = BootstrapSettings::load_default()?;
    let config = RuntimeConfig::from_env(&settings);
    info!("Bootstrapping RapidWright {}", config.version);
    Bootstrapper::from_config(&config)?.launch(&config).await
}

/// Like [`bootstrap`], with an explicit configuration.
pub async fn bootstrap_with(config: &RuntimeConfig) -> BootstrapResult<RuntimeHandle> {
    Bootstrapper::from_config(config)?.launch(config).await
}

/// The session of the runtime started in this process, once it is live.
///
/// Snippets submitted through it run in the VM that loaded the toolkit.
pub fn live_runtime() -> Option<Arc<dyn RuntimeHost>> {
    RuntimeRegistry::global().host()
}

// Owns the reactor behind the runtime session for the rest of the process.
static EXECUTOR: OnceLock<Runtime> = OnceLock::new();

fn executor() -> BootstrapResult<&'static Runtime> {
    if let Some(runtime) = EXECUTOR.get() {
        return Ok(runtime);
    }
    let runtime = Runtime::new().map_err(RuntimeStartError::Executor)?;
    Ok(EXECUTOR.get_or_init(|| runtime))
}

/// Blocking form of [`bootstrap`] for callers without an async runtime.
///
/// Must not be called from inside a tokio runtime.
pub fn bootstrap_blocking() -> BootstrapResult<RuntimeHandle> {
    executor()?.block_on(bootstrap())
}
