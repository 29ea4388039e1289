//! Disable coordinator.
//!
//! Disabling only flips the persisted flag and raises the host-wide
//! "restart required" setting. Handles already mounted in the running
//! process stay mounted until the next start-up.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ExtensionError;
use crate::provisioning::SettingsProvisioner;
use crate::store::RegistryStore;

/// Setting key, under the host namespace, of the restart flag.
pub const RESTART_REQUIRED_KEY: &str = "restart_required";

#[derive(Clone)]
pub struct DisableCoordinator {
    store: Arc<dyn RegistryStore>,
    settings: Arc<dyn SettingsProvisioner>,
    host_namespace: String,
}

impl DisableCoordinator {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        settings: Arc<dyn SettingsProvisioner>,
        host_namespace: impl Into<String>,
    ) -> Self {
        Self {
            store,
            settings,
            host_namespace: host_namespace.into(),
        }
    }

    /// Returns `false` when no record matched `namespace`.
    ///
    /// The two writes are not atomic: a crash in between leaves the
    /// extension disabled without the restart flag.
    pub async fn disable(&self, namespace: &str) -> Result<bool, ExtensionError> {
        let matched = self.store.set_enabled(namespace, false).await?;
        if matched == 0 {
            tracing::debug!(namespace = %namespace, "disable requested for unknown extension");
            return Ok(false);
        }

        self.settings
            .upsert(&self.host_namespace, RESTART_REQUIRED_KEY, &Value::Bool(true))
            .await?;
        tracing::info!(namespace = %namespace, "extension disabled, restart required");
        Ok(true)
    }

    pub async fn restart_required(&self) -> Result<bool, ExtensionError> {
        let flag = self
            .settings
            .find_one(&self.host_namespace, RESTART_REQUIRED_KEY)
            .await?;
        Ok(matches!(flag.map(|s| s.value), Some(Value::Bool(true))))
    }

    /// Called by the host once a fresh `load_all` has applied every change.
    pub async fn clear_restart_required(&self) -> Result<(), ExtensionError> {
        if self.restart_required().await? {
            self.settings
                .upsert(&self.host_namespace, RESTART_REQUIRED_KEY, &Value::Bool(false))
                .await?;
            tracing::debug!("restart flag cleared");
        }
        Ok(())
    }
}
