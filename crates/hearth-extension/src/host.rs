//! Wiring of the engine's components for a host process.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::LoaderConfig;
use crate::disable::DisableCoordinator;
use crate::loader::{ExtensionLoader, Provisioners};
use crate::provisioning::{DbAccessControl, DbSettings};
use crate::service::ExtensionService;
use crate::store::{DbRegistryStore, RegistryStore};

/// A loader and an admin service sharing one registry store.
pub struct ExtensionHost {
    pub loader: ExtensionLoader,
    pub service: ExtensionService,
}

impl ExtensionHost {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        provisioners: Provisioners,
        config: LoaderConfig,
    ) -> Self {
        let coordinator = DisableCoordinator::new(
            store.clone(),
            provisioners.settings.clone(),
            config.host_namespace.clone(),
        );
        let service = ExtensionService::new(store.clone(), coordinator);
        let loader = ExtensionLoader::new(store, provisioners, config);
        Self { loader, service }
    }

    /// sea-orm backed store and collaborators over one connection pool.
    pub fn with_database(db: DatabaseConnection, config: LoaderConfig) -> Self {
        let acl = Arc::new(DbAccessControl::new(db.clone()));
        let provisioners = Provisioners {
            settings: Arc::new(DbSettings::new(db.clone())),
            permissions: acl.clone(),
            roles: acl,
        };
        Self::new(Arc::new(DbRegistryStore::new(db)), provisioners, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ExtensionDescriptor;
    use crate::migrations::SettingsIndexMigration;
    use crate::record::ExtensionStatus;
    use crate::test_support::sqlite_db;
    use serde_json::json;

    #[tokio::test]
    async fn test_database_round_trip() {
        let db = sqlite_db().await;
        let host = ExtensionHost::with_database(db.clone(), LoaderConfig::default());

        let core = ExtensionDescriptor::new("core", "Core", "1.0.0")
            .setting("auth", json!({"ttl": 3600}))
            .permission("core:users.read", "Read users", ["admin"])
            .migration(SettingsIndexMigration::new(db.clone()))
            .feature(|| Ok(42_u32));

        let handles = host.loader.load_all(&[core.clone()]).await.unwrap();
        assert_eq!(*handles[0].downcast::<u32>().unwrap(), 42);

        let record = host.service.get_extension("core").await.unwrap();
        assert_eq!(record.status, ExtensionStatus::Installed);

        // Second boot: no duplicate setting, so the unique index is happy.
        let handles = host.loader.load_all(&[core]).await.unwrap();
        assert_eq!(handles.len(), 1);
        let record = host.service.get_extension("core").await.unwrap();
        assert_eq!(record.status, ExtensionStatus::Installed);

        assert!(host.service.disable_extension("core").await.unwrap().success);
        assert!(host.service.restart_required().await.unwrap());
        host.service.clear_restart_required().await.unwrap();
        assert!(!host.service.restart_required().await.unwrap());
    }
}
