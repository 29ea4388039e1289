//! Loader configuration, read from the environment.

use std::env;
use std::time::Duration;

/// Namespace of the host's own built-in feature set.
pub const DEFAULT_HOST_NAMESPACE: &str = "core";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Owner of host-wide settings such as the restart flag.
    pub host_namespace: String,
    /// Per-extension provisioning limit. `None` waits indefinitely.
    pub provision_timeout: Option<Duration>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            host_namespace: DEFAULT_HOST_NAMESPACE.to_string(),
            provision_timeout: None,
        }
    }
}

impl LoaderConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let host_namespace = lookup("EXTENSION_HOST_NAMESPACE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST_NAMESPACE.to_string());

        let provision_timeout = lookup("EXTENSION_PROVISION_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            host_namespace,
            provision_timeout,
        }
    }
}
