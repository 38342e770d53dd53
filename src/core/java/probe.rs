use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, instrument};

/// What `java -version` reported about a toolchain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JavaVersionInfo {
    pub path: PathBuf,
    pub version: String,
    pub major: u32,
    pub is_64bit: bool,
}

#[instrument]
pub async fn probe_java(java: &Path) -> Option<JavaVersionInfo> {
    let output = Command::new(java)
        .args(["-XshowSettings:properties", "-version"])
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;

    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    debug!(
        "Probing {:?}: {}",
        java,
        combined.lines().next().unwrap_or("")
    );
    parse_probe_output(java, &combined)
}

pub fn parse_probe_output(java: &Path, output: &str) -> Option<JavaVersionInfo> {
    let version = parse_version_string(output)?;
    let major = parse_major_version(&version);
    if major == 0 {
        return None;
    }
    let lower = output.to_ascii_lowercase();
    let is_64bit = lower.contains("sun.arch.data.model = 64")
        || lower.contains("os.arch = amd64")
        || lower.contains("os.arch = x86_64")
        || lower.contains("os.arch = aarch64");

    Some(JavaVersionInfo {
        path: java.to_path_buf(),
        version,
        major,
        is_64bit,
    })
}

/// First double-quoted token, e.g. `openjdk version "17.0.9" 2023-10-17`.
fn parse_version_string(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let start = line.find('"')?;
        let end = line[start + 1..].find('"')?;
        Some(line[start + 1..start + 1 + end].to_string())
    })
}

/// `1.8.0_292` -> 8, `17.0.9` -> 17, `21` -> 21.
pub fn parse_major_version(version: &str) -> u32 {
    let mut parts = version.split(|c: char| c == '.' || c == '_' || c == '-' || c == '+');
    let first: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);

    if first == 1 {
        parts.next().and_then(|p| p.parse().ok()).unwrap_or(first)
    } else {
        first
    }
}
