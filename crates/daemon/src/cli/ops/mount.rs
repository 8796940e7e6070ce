use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;

use berth_daemon::state::StateError;
use berth_daemon::supervisor::handshake::{launch_detached, Detached, HandshakeError};
use berth_daemon::supervisor::mount_process::signal;
use berth_daemon::supervisor::{MountSpec, MountSpecError};
use common::prelude::{DriverStatus, Registry, RegistryError, TargetPaths};

/// Mount a bucket at `target` and keep it mounted in the background.
#[derive(Args, Debug, Clone)]
pub struct Mount {
    /// Mount target directory
    pub target: PathBuf,

    /// JSON options map passed by the orchestrator
    pub options: String,

    /// Seconds to wait for the background supervisor to confirm the mount
    #[arg(long, default_value_t = 90)]
    pub handshake_timeout: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error(transparent)]
    Options(#[from] MountSpecError),
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("cannot locate own executable: {0}")]
    Executable(#[source] std::io::Error),
    #[error("failed to daemonize: {0}")]
    Handshake(#[from] HandshakeError),
    #[error("failed to record supervisor: {0}")]
    Registry(#[from] RegistryError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Mount {
    type Error = MountError;
    type Output = DriverStatus;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        // Reject bad options here, before anything is left running.
        let spec = MountSpec::from_options(&self.target, &self.options)?;
        let state = ctx.load_state()?;

        let exe = std::env::current_exe().map_err(MountError::Executable)?;
        let mut args = ctx.forwarded_args(&state);
        args.push("supervise".into());
        args.push(spec.target.clone().into_os_string());
        args.push(self.options.clone().into());

        let registry = Registry::new(TargetPaths::new(&state.config.state_dir));
        let detached = start_supervisor(
            &exe,
            &args,
            Duration::from_secs(self.handshake_timeout),
            &registry,
            &spec.target,
        )
        .await?;

        Ok(DriverStatus::success(format!(
            "Started disk mount: {}",
            detached.supervisor_pid
        )))
    }
}

/// Launch the supervisor and record it once it confirms the mount. Nothing
/// is registered for a supervisor that failed or never answered.
async fn start_supervisor(
    program: &Path,
    args: &[OsString],
    handshake_timeout: Duration,
    registry: &Registry,
    target: &Path,
) -> Result<Detached, MountError> {
    let detached = launch_detached(program, args, handshake_timeout).await?;
    tracing::info!(
        mount_target = %target.display(),
        supervisor_pid = detached.supervisor_pid,
        mount_pid = detached.mount_pid,
        "mount supervisor confirmed"
    );

    if let Err(e) = registry.register(target, detached.supervisor_pid) {
        // An unregistered supervisor could never be torn down again.
        tracing::error!("failed to register supervisor, stopping it: {}", e);
        if let Err(e) = signal(detached.supervisor_pid, libc::SIGTERM) {
            tracing::error!(pid = detached.supervisor_pid, "failed to stop supervisor: {}", e);
        }
        return Err(e.into());
    }
    Ok(detached)
}
