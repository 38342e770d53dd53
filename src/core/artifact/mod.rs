mod descriptor;
mod paths;

pub use descriptor::{resolve, ArtifactDescriptor, PlatformTag, ARTIFACT_NAME, CHECKSUM_FILE_NAME};
pub use paths::{default_install_dir, RELEASE_BASE};
