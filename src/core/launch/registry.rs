use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::host::{ExitInterception, RuntimeHost};

/// Lifecycle of the process-wide runtime.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RuntimeStatus {
    Unstarted = 0,
    Starting = 1,
    Live = 2,
    /// Last attempt failed, or the live runtime exited; a retry may claim it.
    Failed = 3,
}

impl RuntimeStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => RuntimeStatus::Starting,
            2 => RuntimeStatus::Live,
            3 => RuntimeStatus::Failed,
            _ => RuntimeStatus::Unstarted,
        }
    }
}

/// "The embedded runtime is started." Same `id` for every caller in a process.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RuntimeHandle {
    pub id: Uuid,
    pub module_path: String,
    pub java_home: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub exit_interception: ExitInterception,
    pub hardened: bool,
}

/// Result of trying to claim the right to start the runtime.
#[derive(Debug)]
pub enum StartClaim {
    Claimed,
    AlreadyLive(RuntimeHandle),
    InProgress,
}

struct Published {
    handle: RuntimeHandle,
    // Owning the host keeps the runtime alive for the rest of the process.
    host: Arc<dyn RuntimeHost>,
}

/// Start-once guard for the runtime.
pub struct RuntimeRegistry {
    status: AtomicU8,
    published: Mutex<Option<Published>>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<RuntimeRegistry>> = OnceLock::new();

impl Default for RuntimeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeRegistry {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(RuntimeStatus::Unstarted as u8),
            published: Mutex::new(None),
        }
    }

    /// The registry shared by every bootstrap in this process.
    pub fn global() -> Arc<RuntimeRegistry> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(RuntimeRegistry::new())))
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn live_handle(&self) -> Option<RuntimeHandle> {
        if self.status() != RuntimeStatus::Live {
            return None;
        }
        self.published
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|p| p.handle.clone()))
    }

    /// The host running the live runtime, for evaluating code in it.
    pub fn host(&self) -> Option<Arc<dyn RuntimeHost>> {
        if self.status() != RuntimeStatus::Live {
            return None;
        }
        self.published
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|p| Arc::clone(&p.host)))
    }

    /// `Live` -> `Failed` when the runtime behind handle `id` has exited, so a
    /// later bootstrap may start a new one. Returns whether this call retired it.
    pub fn retire(&self, id: Uuid) -> bool {
        let Ok(mut slot) = self.published.lock() else {
            return false;
        };
        if slot.as_ref().map(|p| p.handle.id) != Some(id) {
            return false;
        }
        let retired = self
            .status
            .compare_exchange(
                RuntimeStatus::Live as u8,
                RuntimeStatus::Failed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if retired {
            *slot = None;
        }
        retired
    }

    /// Move `Unstarted` or `Failed` to `Starting`.
    pub fn try_begin_start(&self) -> StartClaim {
        for from in [RuntimeStatus::Unstarted, RuntimeStatus::Failed] {
            if self
                .status
                .compare_exchange(
                    from as u8,
                    RuntimeStatus::Starting as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return StartClaim::Claimed;
            }
        }

        match self.live_handle() {
            Some(handle) => StartClaim::AlreadyLive(handle),
            None => StartClaim::InProgress,
        }
    }

    /// Record the live runtime. Only valid while `Starting`.
    pub fn publish(&self, handle: RuntimeHandle, host: Arc<dyn RuntimeHost>) -> bool {
        if self.status() != RuntimeStatus::Starting {
            return false;
        }
        if let Ok(mut slot) = self.published.lock() {
            *slot = Some(Published { handle, host });
        }
        self.status
            .compare_exchange(
                RuntimeStatus::Starting as u8,
                RuntimeStatus::Live as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// `Starting` -> `Failed`. No-op in any other state.
    pub fn mark_failed(&self) {
        let _ = self.status.compare_exchange(
            RuntimeStatus::Starting as u8,
            RuntimeStatus::Failed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Forget everything. Intended for tests that reuse a registry.
    pub fn reset(&self) {
        if let Ok(mut slot) = self.published.lock() {
            *slot = None;
        }
        self.status
            .store(RuntimeStatus::Unstarted as u8, Ordering::Release);
    }
}

impl std::fmt::Debug for RuntimeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeRegistry")
            .field("status", &self.status())
            .field("handle", &self.live_handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{HardeningError, RuntimeStartError, SessionError};
    use crate::core::host::StartSpec;
    use async_trait::async_trait;

    struct IdleHost;

    #[async_trait]
    impl RuntimeHost for IdleHost {
        async fn start(&self, _: &StartSpec) -> Result<(), RuntimeStartError> {
            Ok(())
        }
        async fn exit_interception(&self) -> ExitInterception {
            ExitInterception::Unknown
        }
        async fn install_exit_interception(&self) -> Result<(), HardeningError> {
            Ok(())
        }
        async fn is_alive(&self) -> bool {
            true
        }
        async fn submit(&self, _: &str) -> Result<(), SessionError> {
            Ok(())
        }
    }

    fn handle() -> RuntimeHandle {
        RuntimeHandle {
            id: Uuid::new_v4(),
            module_path: "/rw.jar".into(),
            java_home: None,
            started_at: Utc::now(),
            exit_interception: ExitInterception::Supported,
            hardened: true,
        }
    }

    #[test]
    fn claim_is_exclusive_until_resolved() {
        let registry = RuntimeRegistry::new();
        assert!(matches!(registry.try_begin_start(), StartClaim::Claimed));
        assert_eq!(registry.status(), RuntimeStatus::Starting);
        assert!(matches!(registry.try_begin_start(), StartClaim::InProgress));
    }

    #[test]
    fn failed_start_can_be_reclaimed() {
        let registry = RuntimeRegistry::new();
        assert!(matches!(registry.try_begin_start(), StartClaim::Claimed));
        registry.mark_failed();
        assert_eq!(registry.status(), RuntimeStatus::Failed);
        assert!(matches!(registry.try_begin_start(), StartClaim::Claimed));
    }

    #[test]
    fn published_handle_is_returned_to_later_claims() {
        let registry = RuntimeRegistry::new();
        let live = handle();
        assert!(matches!(registry.try_begin_start(), StartClaim::Claimed));
        assert!(registry.publish(live.clone(), Arc::new(IdleHost)));
        assert_eq!(registry.status(), RuntimeStatus::Live);

        match registry.try_begin_start() {
            StartClaim::AlreadyLive(h) => assert_eq!(h.id, live.id),
            other => panic!("unexpected claim: {other:?}"),
        }
        // Failure reports after going live are ignored.
        registry.mark_failed();
        assert_eq!(registry.status(), RuntimeStatus::Live);
    }

    #[test]
    fn publish_requires_a_claim() {
        let registry = RuntimeRegistry::new();
        assert!(!registry.publish(handle(), Arc::new(IdleHost)));
        assert_eq!(registry.live_handle(), None);
    }

    #[test]
    fn reset_returns_to_unstarted() {
        let registry = RuntimeRegistry::new();
        registry.try_begin_start();
        registry.publish(handle(), Arc::new(IdleHost));
        registry.reset();
        assert_eq!(registry.status(), RuntimeStatus::Unstarted);
        assert_eq!(registry.live_handle(), None);
    }

    #[test]
    fn live_host_is_reachable_only_while_live() {
        let registry = RuntimeRegistry::new();
        assert!(registry.host().is_none());
        registry.try_begin_start();
        let host: Arc<dyn RuntimeHost> = Arc::new(IdleHost);
        registry.publish(handle(), Arc::clone(&host));
        assert!(Arc::ptr_eq(&registry.host().unwrap(), &host));
    }

    #[test]
    fn retiring_an_exited_runtime_frees_the_registry() {
        let registry = RuntimeRegistry::new();
        let live = handle();
        registry.try_begin_start();
        registry.publish(live.clone(), Arc::new(IdleHost));

        assert!(!registry.retire(Uuid::new_v4()));
        assert_eq!(registry.status(), RuntimeStatus::Live);

        assert!(registry.retire(live.id));
        assert_eq!(registry.status(), RuntimeStatus::Failed);
        assert!(registry.live_handle().is_none());
        assert!(registry.host().is_none());
        assert!(matches!(registry.try_begin_start(), StartClaim::Claimed));
    }

    #[test]
    fn global_registry_is_shared() {
        assert!(Arc::ptr_eq(&RuntimeRegistry::global(), &RuntimeRegistry::global()));
    }
}
