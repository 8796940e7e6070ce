use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub const REGISTRY_EXTENSION: &str = "pid";
pub const CREDENTIALS_EXTENSION: &str = "creds";

/// Hex-encoded SHA-256 of a mount target.
///
/// The target is hashed exactly as the orchestrator passed it, so the mount
/// and teardown invocations agree without any shared state.
pub fn path_sum256(target: impl AsRef<Path>) -> String {
    let digest = Sha256::digest(target.as_ref().as_os_str().as_encoded_bytes());
    hex::encode(digest)
}

/// Locations of the per-target state files under one state directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPaths {
    state_dir: PathBuf,
}

impl TargetPaths {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn registry_file(&self, target: impl AsRef<Path>) -> PathBuf {
        self.file_for(target, REGISTRY_EXTENSION)
    }

    pub fn credentials_file(&self, target: impl AsRef<Path>) -> PathBuf {
        self.file_for(target, CREDENTIALS_EXTENSION)
    }

    fn file_for(&self, target: impl AsRef<Path>, extension: &str) -> PathBuf {
        self.state_dir
            .join(format!("{}.{}", path_sum256(target), extension))
    }
}
