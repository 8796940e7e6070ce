use std::path::{Path, PathBuf};
use std::{fs, io};

use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "berth";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/berth/config.toml";
pub const SOCKET_FILE_NAME: &str = "berth.sock";

/// Node-level settings shared by the agent and the driver commands.
///
/// Every field has a default so a node without a config file still works;
/// command-line flags override whatever is loaded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Unix socket the broker listens on and supervisors dial
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    /// Directory holding registry entries and credentials files
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Executable launched to keep a bucket mounted
    #[serde(default = "default_mount_binary")]
    pub mount_binary: PathBuf,
    /// Directory for log files; supervisors fall back to `state_dir`
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Lease length substituted when the backend reports a zero duration
    #[serde(default = "default_fallback_lease_secs")]
    pub fallback_lease_secs: u64,
    #[serde(default)]
    pub vault: VaultSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSettings {
    /// Backend address; `VAULT_ADDR` wins when set
    #[serde(default)]
    pub addr: Option<String>,
    /// Enterprise namespace; `VAULT_NAMESPACE` wins when set
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_socket_path() -> PathBuf {
    std::env::temp_dir().join(SOCKET_FILE_NAME)
}

fn default_state_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_mount_binary() -> PathBuf {
    PathBuf::from("goofys")
}

fn default_fallback_lease_secs() -> u64 {
    3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            state_dir: default_state_dir(),
            mount_binary: default_mount_binary(),
            log_dir: None,
            fallback_lease_secs: default_fallback_lease_secs(),
            vault: VaultSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path the configuration was read from (it may not exist)
    pub config_path: PathBuf,
    pub config: AppConfig,
}

impl AppState {
    /// Load configuration from `custom_path`, or from the default location.
    ///
    /// A missing default file yields the built-in defaults; a missing file
    /// that was asked for explicitly is an error.
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let explicit = custom_path.is_some();
        let config_path = custom_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let config = match fs::read_to_string(&config_path) {
            Ok(raw) => toml::from_str(&raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => AppConfig::default(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StateError::ConfigNotFound(config_path))
            }
            Err(e) => return Err(StateError::Io(e)),
        };

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Directory supervisors write their logs to.
    pub fn supervisor_log_dir(&self) -> &Path {
        self.config
            .log_dir
            .as_deref()
            .unwrap_or(self.config.state_dir.as_path())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("config file not found: {0}")]
    ConfigNotFound(PathBuf),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_explicit_missing_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppState::load(Some(dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, StateError::ConfigNotFound(_)));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
mount_binary = "/usr/local/bin/goofys"
fallback_lease_secs = 120

[vault]
addr = "http://127.0.0.1:8200"
"#,
        )
        .unwrap();

        let state = AppState::load(Some(path)).unwrap();
        assert_eq!(state.config.mount_binary, PathBuf::from("/usr/local/bin/goofys"));
        assert_eq!(state.config.fallback_lease_secs, 120);
        assert_eq!(state.config.vault.addr.as_deref(), Some("http://127.0.0.1:8200"));
        assert_eq!(state.config.socket_path, default_socket_path());
        assert_eq!(state.supervisor_log_dir(), state.config.state_dir.as_path());
    }

    #[test]
    fn test_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "fallback_lease_secs = \"soon\"").unwrap();
        assert!(matches!(
            AppState::load(Some(path)),
            Err(StateError::Toml(_))
        ));
    }
}
