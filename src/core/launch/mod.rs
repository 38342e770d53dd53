pub mod classpath;
pub mod hardening;
pub mod launcher;
pub mod registry;

pub use classpath::{classpath_separator, override_module_path, split_module_path};
pub use hardening::{enforce, harden, HardeningReport};
pub use launcher::Bootstrapper;
pub use registry::{RuntimeHandle, RuntimeRegistry, RuntimeStatus, StartClaim};
