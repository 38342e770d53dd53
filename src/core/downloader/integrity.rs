use std::fs::File;
use std::path::Path;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::error::FetchError;

/// Expected digest of an artifact, hex encoded.
///
/// Serialized as `{"sha256": "..."}` or `{"md5": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactDigest {
    Sha256(String),
    Md5(String),
}

impl ArtifactDigest {
    pub fn algorithm(&self) -> &'static str {
        match self {
            ArtifactDigest::Sha256(_) => "SHA-256",
            ArtifactDigest::Md5(_) => "MD5",
        }
    }

    pub fn expected(&self) -> &str {
        match self {
            ArtifactDigest::Sha256(hex) | ArtifactDigest::Md5(hex) => hex.trim(),
        }
    }

    pub fn compute(&self, path: &Path) -> Result<String, FetchError> {
        match self {
            ArtifactDigest::Sha256(_) => hash_file::<Sha256>(path),
            ArtifactDigest::Md5(_) => hash_file::<Md5>(path),
        }
    }

    pub fn verify(&self, path: &Path) -> Result<(), FetchError> {
        let actual = self.compute(path)?;
        if actual.eq_ignore_ascii_case(self.expected()) {
            return Ok(());
        }
        Err(FetchError::DigestMismatch {
            algorithm: self.algorithm(),
            path: path.to_path_buf(),
            expected: self.expected().to_string(),
            actual,
        })
    }
}

fn hash_file<D: Digest + std::io::Write>(path: &Path) -> Result<String, FetchError> {
    let mut file = File::open(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = D::new();
    std::io::copy(&mut file, &mut hasher).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(hex::encode(hasher.finalize()))
}

/// A jar must at least open as a zip archive; truncation loses the central
/// directory at the end of the file.
pub fn verify_jar_archive(path: &Path) -> Result<(), FetchError> {
    let file = File::open(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    zip::ZipArchive::new(file).map_err(|source| FetchError::CorruptArchive {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

pub fn ensure_min_disk_space(path: &Path, minimum_bytes: u64) -> Result<(), FetchError> {
    if minimum_bytes == 0 {
        return Ok(());
    }
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }
    match available {
        Some(bytes) if bytes < minimum_bytes => Err(FetchError::InsufficientSpace {
            path: canonical,
            available: bytes,
            required: minimum_bytes,
        }),
        _ => Ok(()),
    }
}
