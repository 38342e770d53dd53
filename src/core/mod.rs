// ─── RapidWright Bootstrap Core ───
// Brings the toolkit's JVM runtime up exactly once per process.
//
// Architecture:
//   core/
//     artifact/   - Platform jar naming + install locations
//     config/     - Settings file + environment snapshot + module path plan
//     downloader/ - Staged artifact fetch with digest/archive checks
//     http/       - Shared HTTP client (user agent, proxy)
//     java/       - JAVA_HOME discovery + version probe
//     host/       - Runtime host trait + JShell session host
//     launch/     - Module path, start-once registry, hardening, bootstrapper

pub mod artifact;
pub mod config;
pub mod downloader;
pub mod error;
pub mod host;
pub mod http;
pub mod java;
pub mod launch;
