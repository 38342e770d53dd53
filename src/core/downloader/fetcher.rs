use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::core::artifact::{ArtifactDescriptor, CHECKSUM_FILE_NAME, RELEASE_BASE};
use crate::core::error::FetchError;

use super::client::ArtifactSource;
use super::integrity::{ensure_min_disk_space, verify_jar_archive, ArtifactDigest};

/// Makes sure the resolved artifact exists locally, downloading it on a miss.
///
/// The file at `local_path` is the whole cache key. With a pinned digest a
/// cached file that does not match is fetched again. Without one, a fresh
/// download is checked against the release's `MD5SUM.TXT` when it is
/// published. There is no cross-process
/// lock: two processes missing at the same time both download, each into its
/// own staging file, and the last rename wins.
#[derive(Clone)]
pub struct ArtifactFetcher {
    source: Arc<dyn ArtifactSource>,
    release_base: String,
    pinned: Option<ArtifactDigest>,
    verify_archive: bool,
    published_checksums: bool,
    min_free_bytes: u64,
}

impl ArtifactFetcher {
    pub fn new(source: Arc<dyn ArtifactSource>) -> Self {
        Self {
            source,
            release_base: RELEASE_BASE.to_string(),
            pinned: None,
            verify_archive: true,
            published_checksums: true,
            min_free_bytes: 0,
        }
    }

    pub fn with_release_base(mut self, base: impl Into<String>) -> Self {
        self.release_base = base.into();
        self
    }

    pub fn with_pinned_digest(mut self, digest: Option<ArtifactDigest>) -> Self {
        self.pinned = digest;
        self
    }

    pub fn with_archive_check(mut self, enabled: bool) -> Self {
        self.verify_archive = enabled;
        self
    }

    /// Check fresh downloads against the release's checksum listing when no
    /// digest is pinned.
    pub fn with_published_checksums(mut self, enabled: bool) -> Self {
        self.published_checksums = enabled;
        self
    }

    pub fn with_min_free_bytes(mut self, bytes: u64) -> Self {
        self.min_free_bytes = bytes;
        self
    }

    pub fn release_base(&self) -> &str {
        &self.release_base
    }

    #[instrument(skip(self, descriptor), fields(artifact = %descriptor.file_name))]
    pub async fn ensure(&self, descriptor: &ArtifactDescriptor) -> Result<PathBuf, FetchError> {
        let target = &descriptor.local_path;

        if target.is_file() {
            match &self.pinned {
                None => {
                    debug!("Using cached artifact {:?}", target);
                    return Ok(target.clone());
                }
                Some(pin) => match verify_digest(pin, target).await {
                    Ok(()) => {
                        debug!("Using cached artifact {:?} ({} ok)", target, pin.algorithm());
                        return Ok(target.clone());
                    }
                    Err(FetchError::DigestMismatch { actual, .. }) => {
                        warn!(
                            "Cached artifact {:?} has {} {}, expected {}; fetching again",
                            target,
                            pin.algorithm(),
                            actual,
                            pin.expected()
                        );
                    }
                    Err(other) => return Err(other),
                },
            }
        }

        let parent = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| FetchError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        ensure_min_disk_space(parent, self.min_free_bytes)?;

        let url = descriptor.download_url(&self.release_base);
        let staging = parent.join(format!(".{}.{}.part", descriptor.file_name, Uuid::new_v4()));

        let started = Instant::now();
        info!("Downloading {} from {}", descriptor.file_name, url);
        if let Err(err) = self.download_verified(descriptor, &url, &staging).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err);
        }

        if let Err(source) = tokio::fs::rename(&staging, target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(FetchError::Io {
                path: target.clone(),
                source,
            });
        }
        info!(
            "Artifact {} ready at {:?} in {:?}",
            descriptor.file_name,
            target,
            started.elapsed()
        );
        Ok(target.clone())
    }

    async fn download_verified(
        &self,
        descriptor: &ArtifactDescriptor,
        url: &str,
        staging: &Path,
    ) -> Result<(), FetchError> {
        self.source.fetch_to(url, staging).await?;

        if let Some(pin) = &self.pinned {
            verify_digest(pin, staging).await?;
        }
        if self.verify_archive {
            let path = staging.to_path_buf();
            run_blocking(move || verify_jar_archive(&path)).await?;
        }
        if self.pinned.is_none() && self.published_checksums {
            if let Some(expected) = self.published_md5(descriptor, staging).await? {
                verify_digest(&ArtifactDigest::Md5(expected), staging).await?;
                debug!("{} matches the published MD5", descriptor.file_name);
            }
        }
        Ok(())
    }

    /// The MD5 the release lists for this artifact. A release without a
    /// listing, or a listing without the artifact, is skipped.
    async fn published_md5(
        &self,
        descriptor: &ArtifactDescriptor,
        staging: &Path,
    ) -> Result<Option<String>, FetchError> {
        let url = descriptor.checksum_url(&self.release_base);
        let listing_path =
            staging.with_file_name(format!(".{}.{}.part", CHECKSUM_FILE_NAME, Uuid::new_v4()));

        let fetched = self.source.fetch_to(&url, &listing_path).await;
        let listing = match fetched {
            Ok(_) => tokio::fs::read(&listing_path)
                .await
                .map_err(|source| FetchError::Io {
                    path: listing_path.clone(),
                    source,
                }),
            Err(err) => Err(err),
        };
        let _ = tokio::fs::remove_file(&listing_path).await;

        let listing = match listing {
            Ok(bytes) => bytes,
            Err(FetchError::DownloadFailed { status: 404, .. }) => {
                debug!("No {} published at {}", CHECKSUM_FILE_NAME, url);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let expected = md5_for(&String::from_utf8_lossy(&listing), &descriptor.file_name);
        if expected.is_none() {
            warn!(
                "{} does not list {}; skipping checksum",
                CHECKSUM_FILE_NAME, descriptor.file_name
            );
        }
        Ok(expected)
    }
}

/// Look up `file_name` in an `md5sum`-style listing.
fn md5_for(listing: &str, file_name: &str) -> Option<String> {
    listing.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let hash = parts.next()?;
        let name = parts.next()?.trim_start_matches('*');
        (name == file_name).then(|| hash.to_string())
    })
}

async fn verify_digest(digest: &ArtifactDigest, path: &Path) -> Result<(), FetchError> {
    let digest = digest.clone();
    let path = path.to_path_buf();
    run_blocking(move || digest.verify(&path)).await
}

/// Hashing and archive reads stay off the async worker threads.
async fn run_blocking<T, F>(f: F) -> Result<T, FetchError>
where
    F: FnOnce() -> Result<T, FetchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FetchError::Task(e.to_string()))?
}
