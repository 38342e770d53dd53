mod client;
mod fetcher;
mod integrity;

pub use client::{ArtifactSource, HttpArtifactSource};
pub use fetcher::ArtifactFetcher;
pub use integrity::{ensure_min_disk_space, verify_jar_archive, ArtifactDigest};
