use std::path::PathBuf;

/// Default release host for the standalone jars.
pub const RELEASE_BASE: &str = "https://github.com/Xilinx/RapidWright/releases/download";

/// Installation directory for downloaded jars, next to the crate sources so the
/// artifact travels with the installed package.
pub fn default_install_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("resources")
        .join("jars")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_install_dir_is_under_resources() {
        let dir = default_install_dir();
        assert!(dir.ends_with("resources/jars"));
    }
}
