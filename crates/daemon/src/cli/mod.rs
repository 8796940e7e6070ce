pub mod args;
pub mod op;
pub mod ops;

pub use ops::{Agent, ExpandVolume, Health, Init, Mount, Supervise, Unmount, Version};
