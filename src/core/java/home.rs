use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::config::{RuntimeConfig, JAVA_HOME_VAR};

pub fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// Locate `java` on `search_path` and derive the toolchain home from its
/// resolved location (`<home>/bin/java`). Symlinks such as
/// `/usr/bin/java -> /usr/lib/jvm/x/bin/java` are followed.
pub fn discover_java_home(search_path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(java_exe()))
        .find(|candidate| candidate.is_file())
        .and_then(|java| home_from_binary(&java))
}

fn home_from_binary(java: &Path) -> Option<PathBuf> {
    let resolved = std::fs::canonicalize(java).ok()?;
    let bin = resolved.parent()?;
    let home = bin.parent()?;
    debug!("Resolved {:?} -> {:?}", java, resolved);
    Some(home.to_path_buf())
}

/// Configured toolchain home, or one discovered from the search path.
///
/// A discovered home is exported as `JAVA_HOME` for the rest of the process.
/// Absence is not an error; not every host needs it.
pub fn ensure_java_home(config: &RuntimeConfig) -> Option<PathBuf> {
    if let Some(home) = &config.java_home {
        return Some(home.clone());
    }

    let discovered = config
        .search_path
        .as_deref()
        .and_then(discover_java_home)?;
    info!("{} not set, using {:?}", JAVA_HOME_VAR, discovered);
    std::env::set_var(JAVA_HOME_VAR, &discovered);
    Some(discovered)
}

/// Binary `name` inside `<home>/bin`, or the bare name for a `PATH` lookup.
pub fn tool_in_home(home: Option<&Path>, name: &str) -> PathBuf {
    let file = if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    };
    match home {
        Some(home) => home.join("bin").join(file),
        None => PathBuf::from(file),
    }
}
