// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Agent, ExpandVolume, Health, Init, Mount, Supervise, Unmount, Version};

use berth_daemon::process::{init_logging, Console, LogSettings};
use common::prelude::DriverStatus;

command_enum! {
    (Agent, Agent),
    #[command(name = "expandvolume")]
    (ExpandVolume, ExpandVolume),
    (Health, Health),
    (Init, Init),
    (Mount, Mount),
    #[command(hide = true)]
    (Supervise, Supervise),
    (Unmount, Unmount),
    (Version, Version),
}

impl Command {
    /// Driver calls answer with a status envelope on stdout, even on failure.
    fn reports_driver_status(&self) -> bool {
        matches!(
            self,
            Command::ExpandVolume(_) | Command::Init(_) | Command::Mount(_) | Command::Unmount(_)
        )
    }

    /// The agent and the supervisor set up their own log sinks.
    fn manages_own_logging(&self) -> bool {
        matches!(self, Command::Agent(_) | Command::Supervise(_))
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let ctx = cli::op::OpContext::new(&args);

    // stdout is reserved for the command's result
    let guards = if args.command.manages_own_logging() {
        Vec::new()
    } else {
        init_logging(&LogSettings::new(tracing::Level::WARN, Console::Stderr))
    };

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            if args.command.reports_driver_status() {
                println!("{}", DriverStatus::failure(e.to_string()));
            } else {
                eprintln!("Error: {}", e);
            }
            1
        }
    };

    drop(guards);
    std::process::exit(code);
}
