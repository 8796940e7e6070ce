//! The credentials artifact the mount subprocess reads.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::SecondsFormat;
use tempfile::NamedTempFile;

use common::lease::CredentialLease;

/// INI profile file at a fixed path, replaced atomically on every renewal.
///
/// The file is removed when this value is dropped, so it only exists while
/// a supervisor owns it.
#[derive(Debug)]
pub struct CredentialsFile {
    path: PathBuf,
}

impl CredentialsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Render and durably replace the file with `lease`.
    ///
    /// The temp file is created next to the target (mode 0600), synced and
    /// renamed over it, so readers see either the old or the new contents.
    pub fn write(&self, lease: &CredentialLease) -> io::Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(render(lease).as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        tracing::debug!(
            path = %self.path.display(),
            lease_id = %lease.lease_id,
            access_key = %lease.masked_access_key(),
            "credentials file written"
        );
        Ok(())
    }

    /// Remove the file. Already gone is fine.
    pub fn remove(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for CredentialsFile {
    fn drop(&mut self) {
        if let Err(e) = self.remove() {
            tracing::error!(
                path = %self.path.display(),
                "failed to remove credential file: {}",
                e
            );
        }
    }
}

fn render(lease: &CredentialLease) -> String {
    format!(
        "[default]\naws_access_key_id = {}\naws_secret_access_key = {}\nexpires_at = {}\n",
        lease.access_key,
        lease.secret_key,
        lease.expiry.to_rfc3339_opts(SecondsFormat::Secs, true),
    )
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn lease(access: &str) -> CredentialLease {
        CredentialLease {
            lease_id: "minio/keys/team/abc".into(),
            access_key: access.into(),
            secret_key: "s3cr3t".into(),
            expiry: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[test]
    fn test_write_renders_profile() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = CredentialsFile::new(dir.path().join("x.creds"));
        file.write(&lease("AKIA1")).unwrap();

        let contents = fs::read_to_string(file.path()).unwrap();
        assert_eq!(
            contents,
            "[default]\naws_access_key_id = AKIA1\naws_secret_access_key = s3cr3t\nexpires_at = 2030-01-02T03:04:05Z\n"
        );
        let mode = fs::metadata(file.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_rewrite_replaces_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = CredentialsFile::new(dir.path().join("x.creds"));
        file.write(&lease("AKIA1")).unwrap();
        file.write(&lease("AKIA2")).unwrap();

        let contents = fs::read_to_string(file.path()).unwrap();
        assert!(contents.contains("AKIA2"));
        assert!(!contents.contains("AKIA1"));
        // no temp files left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("x.creds");
        {
            let file = CredentialsFile::new(&path);
            file.write(&lease("AKIA1")).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());

        // removing a file that never existed is fine
        CredentialsFile::new(dir.path().join("never.creds"))
            .remove()
            .unwrap();
    }
}
