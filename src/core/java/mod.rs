pub mod home;
pub mod probe;

pub use home::{discover_java_home, ensure_java_home, java_exe, tool_in_home};
pub use probe::{parse_major_version, probe_java, JavaVersionInfo};
