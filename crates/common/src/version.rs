use std::fmt;

use serde::Serialize;

/// Name reported by the `/info` endpoint of both server modes.
pub const SERVICE_NAME: &str = "crypt4gh_recryptor_service";

/// Package version, as reported by `/info`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compile-time build metadata, populated by `build.rs`.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
    pub repo_version: &'static str,
    pub version: &'static str,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({}, profile={}, features={}, built {})",
            SERVICE_NAME,
            self.version,
            self.repo_version,
            self.build_profile,
            self.build_features,
            self.build_timestamp
        )
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        build_profile: env!("BUILD_PROFILE"),
        build_features: env!("BUILD_FEATURES"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        repo_version: env!("REPO_VERSION"),
        version: VERSION,
    }
}
