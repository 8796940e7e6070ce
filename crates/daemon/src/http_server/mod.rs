use std::fs::Permissions;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use axum::Router;
use tokio::net::UnixListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse};
use tower_http::LatencyUnit;

pub mod api;
mod config;
mod handlers;
pub mod health;

pub use config::{Config, DEFAULT_SOCKET_MODE};

use crate::broker::Broker;

pub const STATUS_PREFIX: &str = "/_status";

/// Routes served on the broker socket: `/issue` plus the status probes.
pub fn router(broker: Broker, log_level: tracing::Level) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(log_level)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    Router::new()
        .nest(STATUS_PREFIX, health::router(broker.clone()))
        .merge(api::router(broker.clone()))
        .fallback(handlers::not_found_handler)
        .with_state(broker)
        .layer(trace_layer)
}

/// Bind the broker socket.
///
/// A leftover endpoint file from a previous run is removed first. After the
/// bind the file is restricted to `config.socket_mode`.
pub fn bind_socket(config: &Config) -> Result<UnixListener, HttpServerError> {
    let path = &config.socket_path;
    remove_stale_socket(path)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| HttpServerError::Bind {
                path: path.clone(),
                source,
            })?;
        }
    }

    let listener = UnixListener::bind(path).map_err(|source| HttpServerError::Bind {
        path: path.clone(),
        source,
    })?;
    std::fs::set_permissions(path, Permissions::from_mode(config.socket_mode)).map_err(
        |source| HttpServerError::Permissions {
            path: path.clone(),
            source,
        },
    )?;

    Ok(listener)
}

fn remove_stale_socket(path: &Path) -> Result<(), HttpServerError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale broker socket");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(HttpServerError::StaleSocket {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Serve an already bound listener until `shutdown_rx` flips to `true`.
///
/// The socket file is removed again once the server has drained.
pub async fn serve(
    listener: UnixListener,
    config: Config,
    broker: Broker,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<(), HttpServerError> {
    let app = router(broker, config.log_level);

    tracing::info!(socket = %config.socket_path.display(), "broker listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await;

    if let Err(e) = std::fs::remove_file(&config.socket_path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(
                socket = %config.socket_path.display(),
                "failed to remove broker socket: {}",
                e
            );
        }
    }
    tracing::info!("broker stopped");

    served.map_err(HttpServerError::ServingFailed)
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("failed to remove stale socket {path}: {source}")]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind broker socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to restrict permissions on {path}: {source}")]
    Permissions {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[source] io::Error),
}
