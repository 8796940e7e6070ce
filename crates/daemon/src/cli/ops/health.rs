use clap::Args;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        // 1. Check config
        lines.push("Config:".to_string());
        let state = match ctx.load_state() {
            Ok(state) => {
                lines.push(format!("  file:         {}", state.config_path.display()));
                lines.push(format!("  socket_path:  {}", state.config.socket_path.display()));
                lines.push(format!("  state_dir:    {}", state.config.state_dir.display()));
                lines.push(format!("  mount_binary: {}", state.config.mount_binary.display()));
                state
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
                return Err(HealthError::Failed(lines.join("\n")));
            }
        };

        // 2. Check broker liveness
        let client = ctx.client(&state);
        lines.push(String::new());
        lines.push(format!("Broker ({}):", client.socket_path().display()));

        match client.livez().await {
            Ok(response) => lines.push(format!("  livez:  {}", response.status.to_uppercase())),
            Err(e) if e.is_transport() => lines.push("  livez:  NOT REACHABLE".to_string()),
            Err(e) => lines.push(format!("  livez:  UNHEALTHY ({})", e)),
        }

        Ok(lines.join("\n"))
    }
}
