//! Administrative operations over the extension registry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::disable::DisableCoordinator;
use crate::error::ExtensionError;
use crate::record::ExtensionRecord;
use crate::store::RegistryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisableOutcome {
    pub success: bool,
}

#[derive(Clone)]
pub struct ExtensionService {
    store: Arc<dyn RegistryStore>,
    coordinator: DisableCoordinator,
}

impl ExtensionService {
    pub fn new(store: Arc<dyn RegistryStore>, coordinator: DisableCoordinator) -> Self {
        Self { store, coordinator }
    }

    pub async fn list_extensions(
        &self,
        enabled_only: bool,
    ) -> Result<Vec<ExtensionRecord>, ExtensionError> {
        self.store.list_all(enabled_only).await
    }

    pub async fn get_extension(&self, namespace: &str) -> Result<ExtensionRecord, ExtensionError> {
        self.store
            .find_by_namespace(namespace)
            .await?
            .ok_or_else(|| ExtensionError::NotFound(namespace.to_string()))
    }

    pub async fn disable_extension(&self, namespace: &str) -> Result<DisableOutcome, ExtensionError> {
        let success = self.coordinator.disable(namespace).await?;
        Ok(DisableOutcome { success })
    }

    pub async fn restart_required(&self) -> Result<bool, ExtensionError> {
        self.coordinator.restart_required().await
    }

    pub async fn clear_restart_required(&self) -> Result<(), ExtensionError> {
        self.coordinator.clear_restart_required().await
    }
}
