use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use sea_orm_migration::prelude::*;

use super::settings_index::SettingsIndexMigration;
use crate::error::ExtensionError;
use crate::migration::ExtensionMigration;

const LEGACY_TABLE: &str = "plugin_settings";
const CURRENT_TABLE: &str = "extension_settings";

/// Moves settings out of the pre-rename `plugin_settings` table, then
/// ensures the `(namespace, key)` index.
#[derive(Debug, Clone)]
pub struct LegacySettingsMigration {
    db: DatabaseConnection,
}

impl LegacySettingsMigration {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ExtensionMigration for LegacySettingsMigration {
    fn version(&self) -> &str {
        "1.1.0"
    }

    async fn up(&self) -> Result<(), ExtensionError> {
        let manager = SchemaManager::new(&self.db);

        if manager.has_table(LEGACY_TABLE).await? {
            if manager.has_table(CURRENT_TABLE).await? {
                tracing::warn!(
                    legacy = LEGACY_TABLE,
                    current = CURRENT_TABLE,
                    "both settings tables exist, leaving legacy table in place"
                );
            } else {
                manager
                    .rename_table(
                        Table::rename()
                            .table(Alias::new(LEGACY_TABLE), Alias::new(CURRENT_TABLE))
                            .to_owned(),
                    )
                    .await?;
                tracing::info!(
                    from = LEGACY_TABLE,
                    to = CURRENT_TABLE,
                    "renamed legacy settings table"
                );
            }
        }

        SettingsIndexMigration::new(self.db.clone()).up().await
    }

    // Never renames back.
    async fn down(&self) -> Result<(), ExtensionError> {
        SettingsIndexMigration::new(self.db.clone()).down().await
    }
}
