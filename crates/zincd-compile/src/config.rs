//! Orchestrator configuration.
//!
//! Everything here is explicit so tests construct configurations without
//! touching the environment. The only recognized process toggle is the
//! `bloop.zinc.disabled` property, which turns incremental compilation off
//! for every request served by this process.

use std::path::PathBuf;

use tracing::debug;

/// Process property that disables incremental compilation.
pub const ZINC_DISABLED_PROPERTY: &str = "bloop.zinc.disabled";

/// Configuration shared by every compile served by one orchestrator.
#[derive(Debug, Clone)]
pub struct CompileConfig {
    /// Java home of the JVM this server runs on.
    pub server_java_home: PathBuf,
    /// Major version of the JVM this server runs on.
    pub server_jvm_major: u32,
    /// Disable incremental compilation for every request.
    pub disable_incremental: bool,
}

impl CompileConfig {
    /// Creates a configuration with incremental compilation enabled.
    #[must_use]
    pub fn new(server_java_home: impl Into<PathBuf>, server_jvm_major: u32) -> Self {
        Self {
            server_java_home: server_java_home.into(),
            server_jvm_major,
            disable_incremental: false,
        }
    }

    /// Creates a configuration, reading the incremental toggle from the
    /// process environment.
    #[must_use]
    pub fn from_env(server_java_home: impl Into<PathBuf>, server_jvm_major: u32) -> Self {
        let disable_incremental = std::env::var(ZINC_DISABLED_PROPERTY)
            .ok()
            .and_then(|value| value.trim().parse::<bool>().ok())
            .unwrap_or(false);
        if disable_incremental {
            debug!(
                property = ZINC_DISABLED_PROPERTY,
                "incremental compilation disabled for this process"
            );
        }
        Self {
            disable_incremental,
            ..Self::new(server_java_home, server_jvm_major)
        }
    }

    /// Returns the configuration with the incremental toggle overridden.
    #[must_use]
    pub fn with_incremental_disabled(mut self, disabled: bool) -> Self {
        self.disable_incremental = disabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_incremental_enabled() {
        let config = CompileConfig::new("/opt/jdk", 21);
        assert!(!config.disable_incremental);
        assert_eq!(config.server_jvm_major, 21);
    }

    #[test]
    fn toggle_override() {
        let config = CompileConfig::new("/opt/jdk", 21).with_incremental_disabled(true);
        assert!(config.disable_incremental);
    }
}
