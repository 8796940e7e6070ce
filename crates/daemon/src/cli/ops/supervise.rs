use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use berth_daemon::process::utils::{graceful_shutdown_blocker, report_build_info};
use berth_daemon::process::{init_logging, Console, LogSettings};
use berth_daemon::state::StateError;
use berth_daemon::supervisor::handshake::{report, Handshake};
use berth_daemon::supervisor::{
    CredentialSource, MountSpec, MountSpecError, Supervisor, SupervisorConfig, SupervisorError,
};
use common::prelude::path_sum256;

/// Background half of `mount`. Started by `mount` with stdout piped back to
/// it; not meant to be run by hand.
#[derive(Args, Debug, Clone)]
pub struct Supervise {
    pub target: PathBuf,
    pub options: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SuperviseError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error(transparent)]
    Options(#[from] MountSpecError),
    #[error("failed to install signal handlers: {0}")]
    Signals(#[source] std::io::Error),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// Tell the waiting parent why we could not start, then hand the error back.
fn fail(err: SuperviseError) -> Result<String, SuperviseError> {
    tracing::error!("supervisor failed to start: {}", err);
    if let Err(e) = report(&Handshake::Failed {
        message: err.to_string(),
    }) {
        tracing::error!("failed to report failure to parent: {}", e);
    }
    Err(err)
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Supervise {
    type Error = SuperviseError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = match ctx.load_state() {
            Ok(state) => state,
            Err(e) => return fail(e.into()),
        };

        let log_settings = LogSettings::new(tracing::Level::INFO, Console::Off).with_log_dir(
            Some(state.supervisor_log_dir().to_path_buf()),
            format!("mount-{}.log", path_sum256(&self.target)),
        );
        let _guards = init_logging(&log_settings);
        report_build_info("supervisor");

        let spec = match MountSpec::from_options(&self.target, &self.options) {
            Ok(spec) => spec,
            Err(e) => return fail(e.into()),
        };

        let (signal_task, shutdown_tx, shutdown_rx) =
            match graceful_shutdown_blocker(Duration::ZERO) {
                Ok(blocker) => blocker,
                Err(e) => return fail(SuperviseError::Signals(e)),
            };

        let config = SupervisorConfig::new(&state.config.mount_binary, &state.config.state_dir);
        let source: Arc<dyn CredentialSource> = Arc::new(ctx.client(&state));
        let supervisor = Supervisor::new(spec, config, source, shutdown_rx);

        let running = match supervisor.start().await {
            Ok(running) => running,
            Err(e) => {
                shutdown_tx.send_replace(true);
                let _ = signal_task.await;
                return fail(e.into());
            }
        };

        if let Err(e) = report(&Handshake::Ready {
            pid: running.mount_pid(),
        }) {
            tracing::error!("parent went away before the handshake, shutting down: {}", e);
            shutdown_tx.send_replace(true);
        }

        let result = running.supervise().await;

        shutdown_tx.send_replace(true);
        let _ = signal_task.await;

        result?;
        Ok("terminated".to_string())
    }
}
