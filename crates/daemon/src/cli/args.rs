pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "berth")]
#[command(about = "Node-local credential broker and bucket mount supervisor")]
pub struct Args {
    /// Path to the config file (defaults to /etc/berth/config.toml)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Broker socket path (defaults to the config value)
    #[arg(long, short = 'a', global = true, alias = "agent-socket-path")]
    pub socket_path: Option<PathBuf>,

    /// Directory for registry entries and credentials files
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
