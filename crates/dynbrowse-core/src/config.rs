//! Runtime configuration.

use std::env;

/// Settings shared by the engine's front ends.
#[derive(Debug, Clone)]
pub struct BrowseConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Maximum number of rows a scan or filter returns.
    pub default_limit: usize,
    /// Refuse item mutations.
    pub read_only: bool,
}

impl BrowseConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            default_limit: env::var("DYNBROWSE_DEFAULT_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.default_limit),
            read_only: env_bool("DYNBROWSE_READ_ONLY", defaults.read_only),
        }
    }
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_owned(),
            default_limit: 1000,
            read_only: false,
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key).map_or(default, |v| {
        matches!(v.as_str(), "1" | "true" | "yes" | "TRUE" | "YES")
    })
}
