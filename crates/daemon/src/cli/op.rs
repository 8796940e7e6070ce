use std::error::Error;
use std::ffi::OsString;
use std::path::PathBuf;

use berth_daemon::http_server::api::client::BrokerClient;
use berth_daemon::state::{AppState, StateError};

use crate::cli::args::Args;

#[derive(Debug, Clone, Default)]
pub struct OpContext {
    /// Optional custom config path (defaults to /etc/berth/config.toml)
    pub config_path: Option<PathBuf>,
    pub socket_path: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
}

impl OpContext {
    pub fn new(args: &Args) -> Self {
        Self {
            config_path: args.config_path.clone(),
            socket_path: args.socket_path.clone(),
            state_dir: args.state_dir.clone(),
        }
    }

    /// Load the config file and apply command-line overrides on top.
    pub fn load_state(&self) -> Result<AppState, StateError> {
        let mut state = AppState::load(self.config_path.clone())?;
        if let Some(socket_path) = &self.socket_path {
            state.config.socket_path = socket_path.clone();
        }
        if let Some(state_dir) = &self.state_dir {
            state.config.state_dir = state_dir.clone();
        }
        Ok(state)
    }

    pub fn client(&self, state: &AppState) -> BrokerClient {
        BrokerClient::new(&state.config.socket_path)
    }

    /// Global flags to hand to a re-executed copy of this binary, so the
    /// child resolves exactly the same settings.
    pub fn forwarded_args(&self, state: &AppState) -> Vec<OsString> {
        let mut args = Vec::new();
        if let Some(config_path) = &self.config_path {
            args.push("--config-path".into());
            args.push(config_path.clone().into_os_string());
        }
        args.push("--socket-path".into());
        args.push(state.config.socket_path.clone().into_os_string());
        args.push("--state-dir".into());
        args.push(state.config.state_dir.clone().into_os_string());
        args
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($($(#[$meta:meta])* ($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($(#[$meta])* $variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::cli::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::cli::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::cli::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_win_over_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "socket_path = \"/run/from-file.sock\"\n").unwrap();

        let ctx = OpContext {
            config_path: Some(config_path.clone()),
            socket_path: None,
            state_dir: Some(dir.path().join("state")),
        };
        let state = ctx.load_state().unwrap();
        assert_eq!(state.config.socket_path, PathBuf::from("/run/from-file.sock"));
        assert_eq!(state.config.state_dir, dir.path().join("state"));

        let forwarded = ctx.forwarded_args(&state);
        assert_eq!(forwarded[0], OsString::from("--config-path"));
        assert_eq!(forwarded[1], config_path.into_os_string());
        assert!(forwarded.contains(&OsString::from("/run/from-file.sock")));
    }
}
