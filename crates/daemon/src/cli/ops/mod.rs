pub mod agent;
pub mod expand_volume;
pub mod health;
pub mod init;
pub mod mount;
pub mod supervise;
pub mod unmount;
pub mod version;

pub use agent::Agent;
pub use expand_volume::ExpandVolume;
pub use health::Health;
pub use init::Init;
pub use mount::Mount;
pub use supervise::Supervise;
pub use unmount::Unmount;
pub use version::Version;
