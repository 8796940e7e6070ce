//! Lifecycle registry.
//!
//! Maps a mount target to the pid of the supervisor holding it. The entry is
//! a plain-text pid in `<state_dir>/<sha256(target)>.pid`, so a teardown
//! invocation that only knows the target can find the supervisor again.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::path_hash::TargetPaths;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no supervisor registered for {0}")]
    NotFound(PathBuf),
    #[error("registry entry {path} is corrupt: {contents:?}")]
    Corrupt { path: PathBuf, contents: String },
    #[error("registry I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RegistryError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registry {
    paths: TargetPaths,
}

impl Registry {
    pub fn new(paths: TargetPaths) -> Self {
        Self { paths }
    }

    pub fn entry_path(&self, target: impl AsRef<Path>) -> PathBuf {
        self.paths.registry_file(target)
    }

    /// Record `pid` as the supervisor for `target`, replacing any prior entry.
    pub fn register(&self, target: impl AsRef<Path>, pid: u32) -> Result<(), RegistryError> {
        let path = self.entry_path(&target);
        let dir = self.paths.state_dir();
        fs::create_dir_all(dir).map_err(|e| RegistryError::io(dir, e))?;

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| RegistryError::io(dir, e))?;
        temp.write_all(pid.to_string().as_bytes())
            .map_err(|e| RegistryError::io(&path, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| RegistryError::io(&path, e))?;
        temp.persist(&path)
            .map_err(|e| RegistryError::io(&path, e.error))?;

        tracing::debug!(mount_target = %target.as_ref().display(), pid, "registered supervisor");
        Ok(())
    }

    pub fn lookup(&self, target: impl AsRef<Path>) -> Result<u32, RegistryError> {
        let path = self.entry_path(&target);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(target.as_ref().to_path_buf()))
            }
            Err(e) => return Err(RegistryError::io(&path, e)),
        };

        contents
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or(RegistryError::Corrupt { path, contents })
    }

    /// Remove the entry for `target`. An already absent entry is not an error.
    pub fn unregister(&self, target: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = self.entry_path(&target);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(mount_target = %target.as_ref().display(), "unregistered supervisor");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::io(&path, e)),
        }
    }
}
