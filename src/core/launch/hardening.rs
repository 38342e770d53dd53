// ─── Exit-Call Hardening ───
// Library code inside the runtime must not be able to terminate the host
// process. Availability depends on the runtime; what to do when it is missing
// is the caller's policy.

use tracing::{info, warn};

use crate::core::config::HardeningPolicy;
use crate::core::error::HardeningError;
use crate::core::host::{ExitInterception, RuntimeHost};

#[derive(Debug)]
pub struct HardeningReport {
    pub capability: ExitInterception,
    pub failure: Option<HardeningError>,
}

impl HardeningReport {
    pub fn installed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Query the capability and, unless the runtime reports it unsupported,
/// install exit interception. Only call once the runtime is live.
pub async fn harden(host: &dyn RuntimeHost) -> HardeningReport {
    let capability = host.exit_interception().await;
    let failure = match capability {
        ExitInterception::Unsupported => Some(HardeningError::Unsupported),
        ExitInterception::Supported | ExitInterception::Unknown => {
            host.install_exit_interception().await.err()
        }
    };

    if failure.is_none() {
        info!("Exit interception installed ({:?})", capability);
    }
    HardeningReport {
        capability,
        failure,
    }
}

/// Apply `policy` to a report: best effort only logs.
pub fn enforce(report: HardeningReport, policy: HardeningPolicy) -> Result<(), HardeningError> {
    match (report.failure, policy) {
        (None, _) => Ok(()),
        (Some(err), HardeningPolicy::BestEffort) => {
            warn!(
                "Exit interception unavailable ({:?}): {}; exit calls inside the runtime will end this process",
                report.capability, err
            );
            Ok(())
        }
        (Some(err), HardeningPolicy::Required) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{RuntimeStartError, SessionError};
    use crate::core::host::StartSpec;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CapabilityHost {
        capability: ExitInterception,
        install_fails: bool,
        installs: AtomicUsize,
    }

    impl CapabilityHost {
        fn new(capability: ExitInterception, install_fails: bool) -> Self {
            Self {
                capability,
                install_fails,
                installs: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl RuntimeHost for CapabilityHost {
        async fn start(&self, _: &StartSpec) -> Result<(), RuntimeStartError> {
            Ok(())
        }
        async fn exit_interception(&self) -> ExitInterception {
            self.capability
        }
        async fn install_exit_interception(&self) -> Result<(), HardeningError> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            if self.install_fails {
                Err(HardeningError::Rejected)
            } else {
                Ok(())
            }
        }
        async fn is_alive(&self) -> bool {
            true
        }
        async fn submit(&self, _: &str) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn supported_runtime_is_hardened() {
        let host = CapabilityHost::new(ExitInterception::Supported, false);
        let report = harden(&host).await;
        assert!(report.installed());
        assert_eq!(host.installs.load(Ordering::SeqCst), 1);
        enforce(report, HardeningPolicy::Required).unwrap();
    }

    #[tokio::test]
    async fn unknown_capability_is_still_attempted() {
        let host = CapabilityHost::new(ExitInterception::Unknown, false);
        let report = harden(&host).await;
        assert!(report.installed());
        assert_eq!(host.installs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsupported_runtime_is_skipped() {
        let host = CapabilityHost::new(ExitInterception::Unsupported, false);
        let report = harden(&host).await;
        assert!(!report.installed());
        assert_eq!(host.installs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn policy_decides_whether_failure_is_fatal() {
        let host = CapabilityHost::new(ExitInterception::Supported, true);
        enforce(harden(&host).await, HardeningPolicy::BestEffort).unwrap();
        let err = enforce(harden(&host).await, HardeningPolicy::Required).unwrap_err();
        assert!(matches!(err, HardeningError::Rejected));

        let unsupported = CapabilityHost::new(ExitInterception::Unsupported, false);
        let err = enforce(harden(&unsupported).await, HardeningPolicy::Required).unwrap_err();
        assert!(matches!(err, HardeningError::Unsupported));
    }
}
