// ─── Bootstrapper ───
// Start-once flow: toolchain home, module path, runtime start, hardening,
// then publish the handle.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::artifact::resolve;
use crate::core::config::{HardeningPolicy, ModulePathPlan, RuntimeConfig};
use crate::core::downloader::{ArtifactFetcher, HttpArtifactSource};
use crate::core::error::{BootstrapResult, HardeningError, RuntimeStartError, SessionError};
use crate::core::host::{JshellHost, RuntimeHost, StartSpec};
use crate::core::java::ensure_java_home;

use super::classpath::{artifact_module_path, override_module_path};
use super::hardening::{enforce, harden};
use super::registry::{RuntimeHandle, RuntimeRegistry, StartClaim};

pub struct Bootstrapper {
    registry: Arc<RuntimeRegistry>,
    host: Arc<dyn RuntimeHost>,
    fetcher: ArtifactFetcher,
    host_os: String,
}

impl Bootstrapper {
    pub fn new(
        registry: Arc<RuntimeRegistry>,
        host: Arc<dyn RuntimeHost>,
        fetcher: ArtifactFetcher,
    ) -> Self {
        Self {
            registry,
            host,
            fetcher,
            host_os: std::env::consts::OS.to_string(),
        }
    }

    /// Production wiring: HTTP fetcher, process-wide registry, JShell host.
    pub fn from_config(config: &RuntimeConfig) -> BootstrapResult<Self> {
        let source = HttpArtifactSource::new(config.https_proxy.as_deref())?;
        let fetcher = ArtifactFetcher::new(Arc::new(source))
            .with_release_base(config.release_base.clone())
            .with_pinned_digest(config.pinned_digest.clone())
            .with_min_free_bytes(config.min_free_disk_bytes);
        Ok(Self::new(
            RuntimeRegistry::global(),
            Arc::new(JshellHost::new()),
            fetcher,
        ))
    }

    /// Resolve artifacts as if running on `host_os`.
    pub fn with_host_os(mut self, host_os: impl Into<String>) -> Self {
        self.host_os = host_os.into();
        self
    }

    pub fn registry(&self) -> &Arc<RuntimeRegistry> {
        &self.registry
    }

    /// Ensure the runtime is started with exit interception in place.
    ///
    /// Returns the existing handle when the runtime is already live; a live
    /// runtime is never started a second time. If the published runtime has
    /// since exited, that is reported once and the next call starts afresh.
    #[instrument(skip(self, config), fields(version = %config.version))]
    pub async fn launch(&self, config: &RuntimeConfig) -> BootstrapResult<RuntimeHandle> {
        if let Some(handle) = self.registry.live_handle() {
            return self.reuse(handle, config.hardening).await;
        }

        match self.registry.try_begin_start() {
            StartClaim::Claimed => {}
            StartClaim::AlreadyLive(handle) => {
                return self.reuse(handle, config.hardening).await;
            }
            StartClaim::InProgress => return Err(RuntimeStartError::StartInProgress.into()),
        }

        match self.start_claimed(config).await {
            Ok(handle) => Ok(handle),
            Err(err) => {
                self.registry.mark_failed();
                warn!("Runtime bootstrap failed: {}", err);
                Err(err)
            }
        }
    }

    async fn start_claimed(&self, config: &RuntimeConfig) -> BootstrapResult<RuntimeHandle> {
        let java_home = ensure_java_home(config);
        let module_path = self.module_path(config).await?;

        let spec = StartSpec {
            java_home: java_home.clone(),
            module_path: module_path.clone(),
            extra_flags: config.extra_flags.clone(),
        };
        self.host.start(&spec).await?;

        let report = harden(self.host.as_ref()).await;
        let handle = RuntimeHandle {
            id: Uuid::new_v4(),
            module_path,
            java_home,
            started_at: Utc::now(),
            exit_interception: report.capability,
            hardened: report.installed(),
        };

        // The runtime is up either way; a hardening failure under the strict
        // policy is reported after publishing so it is never started again.
        self.registry.publish(handle.clone(), Arc::clone(&self.host));
        info!("Runtime {} live (hardened: {})", handle.id, handle.hardened);
        enforce(report, config.hardening)?;
        Ok(handle)
    }

    async fn module_path(&self, config: &RuntimeConfig) -> BootstrapResult<String> {
        match config.plan()? {
            ModulePathPlan::Override { classpath } => {
                info!("Using module path from the environment");
                Ok(override_module_path(&classpath))
            }
            ModulePathPlan::Prebuilt(path) => {
                info!("Using prebuilt artifact {:?}", path);
                Ok(artifact_module_path(&path))
            }
            ModulePathPlan::Resolve { version } => {
                let descriptor = resolve(&version, &self.host_os, &config.install_dir);
                debug!("Resolved {} for {}", descriptor.file_name, descriptor.platform);
                let jar = self.fetcher.ensure(&descriptor).await?;
                Ok(artifact_module_path(&jar))
            }
        }
    }

    async fn reuse(
        &self,
        handle: RuntimeHandle,
        policy: HardeningPolicy,
    ) -> BootstrapResult<RuntimeHandle> {
        let alive = match self.registry.host() {
            Some(host) => host.is_alive().await,
            None => false,
        };
        if !alive {
            if self.registry.retire(handle.id) {
                warn!("Runtime {} has exited", handle.id);
            }
            return Err(SessionError::NotRunning.into());
        }

        if !handle.hardened && policy == HardeningPolicy::Required {
            return Err(HardeningError::NotInstalled.into());
        }
        debug!("Runtime {} already live", handle.id);
        Ok(handle)
    }
}

impl std::fmt::Debug for Bootstrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrapper")
            .field("registry", &self.registry)
            .field("release_base", &self.fetcher.release_base())
            .field("host_os", &self.host_os)
            .finish()
    }
}
