use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;

use berth_daemon::state::StateError;
use berth_daemon::supervisor::mount_process::{is_alive, signal};
use common::prelude::{DriverStatus, Registry, RegistryError, TargetPaths};

/// How long teardown waits for the supervisor to finish unmounting before
/// it removes the target directory.
const SUPERVISOR_EXIT_WAIT: Duration = Duration::from_secs(10);
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Args, Debug, Clone)]
pub struct Unmount {
    /// Mount target directory
    pub target: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum UnmountError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("could not load pid file for path {target}: {source}")]
    Registry {
        target: PathBuf,
        #[source]
        source: RegistryError,
    },
    #[error("error sending signal to pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("error removing target {target}: {source}")]
    RemoveTarget {
        target: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl Unmount {
    async fn stop_supervisor(&self, registry: &Registry) -> Result<(), UnmountError> {
        let pid = match registry.lookup(&self.target) {
            Ok(pid) => pid,
            Err(RegistryError::NotFound(_)) => {
                tracing::warn!(
                    mount_target = %self.target.display(),
                    "no supervisor registered, nothing to signal"
                );
                return Ok(());
            }
            Err(source) => {
                return Err(UnmountError::Registry {
                    target: self.target.clone(),
                    source,
                })
            }
        };

        tracing::info!(pid, "sending SIGTERM to supervisor");
        signal(pid, libc::SIGTERM).map_err(|source| UnmountError::Signal { pid, source })?;

        let deadline = tokio::time::Instant::now() + SUPERVISOR_EXIT_WAIT;
        while is_alive(pid) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }
        if is_alive(pid) {
            tracing::warn!(pid, "supervisor still running after {:?}", SUPERVISOR_EXIT_WAIT);
        }
        Ok(())
    }
}

fn remove_target(target: &Path) -> Result<(), UnmountError> {
    match std::fs::remove_dir(target) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(UnmountError::RemoveTarget {
            target: target.to_path_buf(),
            source: e,
        }),
        _ => Ok(()),
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Unmount {
    type Error = UnmountError;
    type Output = DriverStatus;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let registry = Registry::new(TargetPaths::new(&state.config.state_dir));

        let outcome = match self.stop_supervisor(&registry).await {
            Ok(()) => remove_target(&self.target),
            Err(e) => Err(e),
        };

        // Always drop the entry, so a repeated teardown finds nothing to do.
        if let Err(e) = registry.unregister(&self.target) {
            tracing::warn!("failed to remove registry entry: {}", e);
        }

        outcome?;
        Ok(DriverStatus::success("terminated"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::op::{Op, OpContext};

    fn ctx(state_dir: &Path) -> OpContext {
        let config_path = state_dir.join("config.toml");
        std::fs::write(&config_path, "").unwrap();
        OpContext {
            config_path: Some(config_path),
            socket_path: None,
            state_dir: Some(state_dir.to_path_buf()),
        }
    }

    #[tokio::test]
    async fn test_teardown_signals_and_unregisters() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("mnt");
        std::fs::create_dir(&target).unwrap();

        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        let registry = Registry::new(TargetPaths::new(dir.path()));
        registry.register(&target, pid).unwrap();
        assert_eq!(registry.lookup(&target).unwrap(), pid);

        // reap the child concurrently so it does not linger as a zombie
        let reaper = tokio::spawn(async move { child.wait().await });

        let op = Unmount {
            target: target.clone(),
        };
        let status = op.execute(&ctx(dir.path())).await.unwrap();
        assert!(status.is_success());

        assert!(reaper.await.unwrap().is_ok());
        assert!(!target.exists());
        assert!(matches!(
            registry.lookup(&target),
            Err(RegistryError::NotFound(_))
        ));

        // a second teardown has nothing left to do
        let status = op.execute(&ctx(dir.path())).await.unwrap();
        assert!(status.is_success());
    }

    #[tokio::test]
    async fn test_stale_entry_is_removed() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("gone");

        let registry = Registry::new(TargetPaths::new(dir.path()));
        registry.register(&target, i32::MAX as u32).unwrap();

        let status = Unmount {
            target: target.clone(),
        }
        .execute(&ctx(dir.path()))
        .await
        .unwrap();
        assert!(status.is_success());
        assert!(!registry.entry_path(&target).exists());
    }
}
