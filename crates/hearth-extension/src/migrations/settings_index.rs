use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use sea_orm_migration::SchemaManager;

use crate::error::ExtensionError;
use crate::migration::{drop_index, ensure_index, ExtensionMigration, IndexSpec};

/// One setting per `(namespace, key)`.
pub const SETTINGS_NAMESPACE_KEY_INDEX: IndexSpec = IndexSpec {
    name: "uq_extension_settings_namespace_key",
    table: "extension_settings",
    columns: &["namespace", "key"],
    unique: true,
};

/// Unique lookup index on `extension_settings(namespace, key)`.
#[derive(Debug, Clone)]
pub struct SettingsIndexMigration {
    db: DatabaseConnection,
}

impl SettingsIndexMigration {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ExtensionMigration for SettingsIndexMigration {
    fn version(&self) -> &str {
        "1.0.0"
    }

    async fn up(&self) -> Result<(), ExtensionError> {
        let manager = SchemaManager::new(&self.db);
        ensure_index(&manager, &SETTINGS_NAMESPACE_KEY_INDEX).await?;
        Ok(())
    }

    async fn down(&self) -> Result<(), ExtensionError> {
        let manager = SchemaManager::new(&self.db);
        drop_index(&manager, &SETTINGS_NAMESPACE_KEY_INDEX).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::existing_index_definition;
    use crate::test_support::sqlite_db;
    use sea_orm_migration::prelude::*;

    #[tokio::test]
    async fn test_up_twice_same_state() {
        let db = sqlite_db().await;
        let migration = SettingsIndexMigration::new(db.clone());

        migration.up().await.unwrap();
        let manager = SchemaManager::new(&db);
        let first = existing_index_definition(&manager, SETTINGS_NAMESPACE_KEY_INDEX.name)
            .await
            .unwrap();

        migration.up().await.unwrap();
        let second = existing_index_definition(&manager, SETTINGS_NAMESPACE_KEY_INDEX.name)
            .await
            .unwrap();

        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_up_skips_when_table_missing() {
        let db = sqlite_db().await;
        let manager = SchemaManager::new(&db);
        manager
            .drop_table(Table::drop().table(Alias::new("extension_settings")).to_owned())
            .await
            .unwrap();

        SettingsIndexMigration::new(db.clone()).up().await.unwrap();
        assert!(
            existing_index_definition(&manager, SETTINGS_NAMESPACE_KEY_INDEX.name)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_down_twice_tolerates_absence() {
        let db = sqlite_db().await;
        let migration = SettingsIndexMigration::new(db.clone());
        migration.up().await.unwrap();

        migration.down().await.unwrap();
        migration.down().await.unwrap();
    }

    #[tokio::test]
    async fn test_index_rejects_duplicate_setting() {
        use crate::provisioning::{DbSettings, SettingKind, SettingsProvisioner};
        use serde_json::json;

        let db = sqlite_db().await;
        SettingsIndexMigration::new(db.clone()).up().await.unwrap();

        let settings = DbSettings::new(db);
        settings
            .create("core", "auth", &json!(1), SettingKind::Number)
            .await
            .unwrap();
        let err = settings
            .create("core", "auth", &json!(2), SettingKind::Number)
            .await
            .unwrap_err();
        assert!(matches!(err, ExtensionError::Store(_)));
    }
}
