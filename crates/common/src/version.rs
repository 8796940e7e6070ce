use std::fmt;

use serde::Serialize;

/// Compile-time build metadata, filled in by `build.rs`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
    pub version: &'static str,
    pub repo_version: &'static str,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        build_profile: env!("BERTH_BUILD_PROFILE"),
        build_features: env!("BERTH_BUILD_FEATURES"),
        build_timestamp: env!("BERTH_BUILD_TIMESTAMP"),
        version: env!("CARGO_PKG_VERSION"),
        repo_version: env!("BERTH_REPO_VERSION"),
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "berth {} ({}, {} build, built {})",
            self.version, self.repo_version, self.build_profile, self.build_timestamp
        )
    }
}
