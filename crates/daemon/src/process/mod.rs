pub mod utils;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::broker::{BackendError, Broker, VaultBackend};
use crate::http_server::{self, HttpServerError};
use crate::ServiceConfig;

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between SIGTERM and draining the broker, so in-flight issuance
/// calls from supervisors can still complete.
const AGENT_SIGTERM_GRACE: Duration = Duration::from_secs(1);

/// Where human-readable log lines go besides the optional log file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Console {
    Stdout,
    /// Used by the driver commands; their stdout carries the JSON status.
    Stderr,
    /// Used by supervisors; their stdout is the handshake pipe.
    Off,
}

#[derive(Debug, Clone)]
pub struct LogSettings {
    pub level: tracing::Level,
    pub console: Console,
    pub log_dir: Option<PathBuf>,
    /// Prefix of the daily rolling log file
    pub file_name: String,
}

impl LogSettings {
    pub fn new(level: tracing::Level, console: Console) -> Self {
        Self {
            level,
            console,
            log_dir: None,
            file_name: format!("{}.log", crate::state::APP_NAME),
        }
    }

    pub fn with_log_dir(mut self, log_dir: Option<PathBuf>, file_name: impl Into<String>) -> Self {
        self.log_dir = log_dir;
        self.file_name = file_name.into();
        self
    }
}

fn env_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Initialize logging and the panic handler.
/// Returns guards that must be kept alive for the duration of the program.
pub fn init_logging(settings: &LogSettings) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    let mut guards = Vec::new();

    let console_writer = match settings.console {
        Console::Stdout => Some(tracing_appender::non_blocking(io::stdout())),
        Console::Stderr => Some(tracing_appender::non_blocking(io::stderr())),
        Console::Off => None,
    };
    let console_layer = console_writer.map(|(writer, guard)| {
        guards.push(guard);
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(writer)
            .with_filter(env_filter(settings.level))
    });

    let file_layer = settings.log_dir.as_ref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
            return None;
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, &settings.file_name);
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(env_filter(settings.level)),
        )
    });

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    utils::register_panic_logger();

    guards
}

/// Handle for gracefully shutting down the broker agent.
pub struct ShutdownHandle {
    graceful_waiter: tokio::task::JoinHandle<()>,
    handles: Vec<tokio::task::JoinHandle<Result<(), HttpServerError>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Block until the agent shuts down (via signal or explicit shutdown).
    pub async fn wait(self) -> Result<(), ProcessError> {
        let _ = self.graceful_waiter.await;

        let results = timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(self.handles))
            .await
            .map_err(|_| {
                tracing::error!(
                    "Failed to shut down within {} seconds",
                    FINAL_SHUTDOWN_TIMEOUT.as_secs()
                );
                ProcessError::ShutdownTimeout(FINAL_SHUTDOWN_TIMEOUT)
            })?;

        for result in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e.into()),
                Err(e) => return Err(ProcessError::TaskPanicked(e.to_string())),
            }
        }
        Ok(())
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Bind the broker socket and serve it in the background.
///
/// Binding happens before returning, so a socket that cannot be claimed is
/// reported to the caller rather than logged from a task.
pub async fn start_agent(service_config: &ServiceConfig) -> Result<ShutdownHandle, ProcessError> {
    let backend = VaultBackend::new(service_config.vault.clone())?;
    let broker = Broker::new(Arc::new(backend), service_config.fallback_lease);

    let (graceful_waiter, shutdown_tx, shutdown_rx) =
        utils::graceful_shutdown_blocker(AGENT_SIGTERM_GRACE)?;

    let mut http_config = http_server::Config::new(service_config.socket_path.clone());
    http_config.log_level = service_config.log_level;
    let listener = match http_server::bind_socket(&http_config) {
        Ok(listener) => listener,
        Err(e) => {
            shutdown_tx.send_replace(true);
            let _ = graceful_waiter.await;
            return Err(e.into());
        }
    };

    let broker_handle = tokio::spawn(http_server::serve(
        listener,
        http_config,
        broker,
        shutdown_rx,
    ));

    tracing::info!(
        socket = %service_config.socket_path.display(),
        vault = %service_config.vault.address,
        "broker agent running"
    );

    Ok(ShutdownHandle {
        graceful_waiter,
        handles: vec![broker_handle],
        shutdown_tx,
    })
}

/// Runs the broker agent until a shutdown signal arrives.
pub async fn spawn_agent(service_config: &ServiceConfig) -> Result<(), ProcessError> {
    let settings = LogSettings::new(service_config.log_level, Console::Stdout)
        .with_log_dir(service_config.log_dir.clone(), "agent.log");
    let _guards = init_logging(&settings);
    utils::report_build_info("agent");

    let handle = start_agent(service_config).await.map_err(|e| {
        tracing::error!("error starting broker agent: {}", e);
        e
    })?;
    handle.wait().await
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] io::Error),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Server(#[from] HttpServerError),
    #[error("failed to shut down within {0:?}")]
    ShutdownTimeout(Duration),
    #[error("background task panicked: {0}")]
    TaskPanicked(String),
}
