use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Fixed name prefix of the standalone toolkit jar.
pub const ARTIFACT_NAME: &str = "rapidwright";

/// Checksum listing published with every release: `<md5>  <file name>` per line.
pub const CHECKSUM_FILE_NAME: &str = "MD5SUM.TXT";

/// Platform flavour of the standalone jar.
///
/// Only two builds are published; anything that is not Windows gets the
/// Linux build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTag {
    Lin64,
    Win64,
}

impl PlatformTag {
    /// Map an OS identifier (`std::env::consts::OS`, `Windows`, `win32`, ...)
    /// to a platform tag. Unrecognized values fall back to `lin64`.
    pub fn from_os(host_os: &str) -> Self {
        if host_os.trim().to_ascii_lowercase().starts_with("win") {
            PlatformTag::Win64
        } else {
            PlatformTag::Lin64
        }
    }

    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformTag::Lin64 => "lin64",
            PlatformTag::Win64 => "win64",
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved, platform-specific artifact and where it lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub name: String,
    pub version: String,
    pub platform: PlatformTag,
    pub file_name: String,
    pub local_path: PathBuf,
}

impl ArtifactDescriptor {
    /// `<name>-<version>-standalone-<tag>.jar`
    pub fn file_name_for(name: &str, version: &str, platform: PlatformTag) -> String {
        format!("{name}-{version}-standalone-{platform}.jar")
    }

    /// Construct the release URL for this artifact under the given base.
    ///
    /// Template:
    /// `<release_base>/v<version>-beta/<file_name>`
    pub fn download_url(&self, release_base: &str) -> String {
        let base = release_base.trim_end_matches('/');
        format!("{}/v{}-beta/{}", base, self.version, self.file_name)
    }

    /// The release's checksum listing, next to the jar.
    pub fn checksum_url(&self, release_base: &str) -> String {
        let base = release_base.trim_end_matches('/');
        format!("{}/v{}-beta/{}", base, self.version, CHECKSUM_FILE_NAME)
    }
}

impl fmt::Display for ArtifactDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.file_name, self.local_path.display())
    }
}

/// Resolve the artifact for `version` on `host_os`, placed under `install_dir`.
///
/// Pure: nothing on disk is inspected.
pub fn resolve(version: &str, host_os: &str, install_dir: &Path) -> ArtifactDescriptor {
    let platform = PlatformTag::from_os(host_os);
    let file_name = ArtifactDescriptor::file_name_for(ARTIFACT_NAME, version, platform);
    let local_path = install_dir.join(&file_name);

    ArtifactDescriptor {
        name: ARTIFACT_NAME.to_string(),
        version: version.to_string(),
        platform,
        file_name,
        local_path,
    }
}
