// Broker side: secrets backend and the local transport in front of it
pub mod broker;
pub mod http_server;
pub mod process;
pub mod service_config;

// Mount side
pub mod supervisor;

// App state (configuration, paths)
pub mod state;

pub use process::{spawn_agent, start_agent, ShutdownHandle};
pub use service_config::Config as ServiceConfig;
pub use state::{AppConfig, AppState, StateError};
