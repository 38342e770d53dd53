// ─── Module Path Builder ───
// Turns a validated plan into the module path handed to the runtime.

use std::path::Path;

use tracing::debug;

/// Uses `;` on Windows, `:` on Linux/macOS.
pub fn classpath_separator() -> &'static str {
    if cfg!(target_os = "windows") {
        ";"
    } else {
        ":"
    }
}

/// Split a platform-separated module path into trimmed, non-empty entries,
/// keeping the first occurrence of duplicates.
pub fn split_module_path(raw: &str) -> Vec<String> {
    let mut entries: Vec<String> = raw
        .split(classpath_separator())
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect();
    dedup_preserving_order(&mut entries);
    entries
}

pub fn join_module_path(entries: &[String]) -> String {
    entries.join(classpath_separator())
}

/// Normalized override classpath: same entries, same order, no blanks or repeats.
pub fn override_module_path(classpath: &str) -> String {
    let entries = split_module_path(classpath);
    debug!("Override module path has {} entries", entries.len());
    join_module_path(&entries)
}

/// A single artifact jar is the whole module path.
pub fn artifact_module_path(artifact: &Path) -> String {
    safe_path_str(artifact)
}

fn dedup_preserving_order(entries: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    entries.retain(|entry| seen.insert(entry.clone()));
}

/// Path as a string, without the `\\?\` prefix Windows canonicalization adds.
pub fn safe_path_str(path: &Path) -> String {
    let text = path.to_string_lossy().to_string();
    if cfg!(windows) {
        if let Some(stripped) = text.strip_prefix(r"\\?\") {
            return stripped.to_string();
        }
    }
    text
}
