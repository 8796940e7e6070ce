use std::time::Duration;

use clap::Args;

use berth_daemon::broker::{BackendError, VaultConfig};
use berth_daemon::process::ProcessError;
use berth_daemon::{spawn_agent, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Agent {
    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,

    /// Secrets backend address (VAULT_ADDR wins when set)
    #[arg(long)]
    pub vault_addr: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("state error: {0}")]
    StateError(#[from] berth_daemon::state::StateError),

    #[error("backend misconfigured: {0}")]
    Backend(#[from] BackendError),

    #[error("agent failed: {0}")]
    Failed(#[from] ProcessError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Agent {
    type Error = AgentError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.load_state()?;
        let settings = &state.config.vault;

        let vault = VaultConfig::from_env(
            self.vault_addr.as_deref().or(settings.addr.as_deref()),
            settings.namespace.as_deref(),
            settings.timeout_secs.map(Duration::from_secs),
        )?;

        let config = ServiceConfig {
            socket_path: state.config.socket_path.clone(),
            vault,
            fallback_lease: Duration::from_secs(state.config.fallback_lease_secs),
            log_level: tracing::Level::INFO,
            log_dir: self.log_dir.clone().or(state.config.log_dir.clone()),
        };

        spawn_agent(&config).await?;
        Ok("agent stopped".to_string())
    }
}
