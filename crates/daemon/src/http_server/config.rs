use std::path::PathBuf;

/// Owner and group may dial the socket, nobody else.
pub const DEFAULT_SOCKET_MODE: u32 = 0o660;

#[derive(Debug, Clone)]
pub struct Config {
    // Unix socket the broker listens on
    pub socket_path: PathBuf,
    // Permission bits applied to the socket file after bind
    pub socket_mode: u32,
    // log level for http tracing
    pub log_level: tracing::Level,
}

impl Config {
    pub fn new(socket_path: PathBuf) -> Self {
        tracing::info!(
            "Creating broker transport Config: socket_path={}",
            socket_path.display()
        );
        Self {
            socket_path,
            socket_mode: DEFAULT_SOCKET_MODE,
            log_level: tracing::Level::INFO,
        }
    }
}
