use std::path::PathBuf;
use std::time::Duration;

use crate::broker::VaultConfig;

/// Everything the broker agent needs to run.
#[derive(Debug, Clone)]
pub struct Config {
    // transport configuration
    /// Unix socket path the broker listens on
    pub socket_path: PathBuf,

    // backend configuration
    /// Connection settings for the secrets backend
    pub vault: VaultConfig,
    /// Lease length used when the backend hands out a non-leased secret
    pub fallback_lease: Duration,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}
