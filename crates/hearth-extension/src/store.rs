//! Registry store: persisted extension records keyed by namespace.
//!
//! The loader and the disable coordinator only ever see the
//! [`RegistryStore`] trait. [`DbRegistryStore`] is the sea-orm backed
//! implementation used by the host; `memory::MemoryRegistryStore` backs
//! tests and embedded setups.

use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    SqlErr,
};
use uuid::Uuid;

use crate::error::ExtensionError;
use crate::record::{ExtensionRecord, ExtensionStatus, NewExtension};
use hearth_db::entities::extension;

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Connectivity check, run once before a load pass.
    async fn ping(&self) -> Result<(), ExtensionError>;

    async fn find_by_namespace(
        &self,
        namespace: &str,
    ) -> Result<Option<ExtensionRecord>, ExtensionError>;

    /// Return the record for `new.namespace`, creating a `pending`, enabled
    /// one if none exists. An existing record is returned unchanged.
    async fn create_if_missing(&self, new: &NewExtension)
        -> Result<ExtensionRecord, ExtensionError>;

    /// Set `installed`, clear `last_error`, stamp `installed_at`.
    async fn mark_installed(&self, namespace: &str) -> Result<(), ExtensionError>;

    /// Set `failed` and record the error text. Leaves `enabled` alone.
    async fn mark_failed(&self, namespace: &str, detail: &str) -> Result<(), ExtensionError>;

    /// Record the version whose migrations have been applied.
    async fn set_version(&self, namespace: &str, version: &str) -> Result<(), ExtensionError>;

    /// Returns the number of records matched.
    async fn set_enabled(&self, namespace: &str, enabled: bool) -> Result<u64, ExtensionError>;

    /// All records ordered by namespace, optionally only enabled ones.
    async fn list_all(&self, enabled_only: bool) -> Result<Vec<ExtensionRecord>, ExtensionError>;
}

// ─── sea-orm implementation ─────────────────────────────────────────────

/// Registry store over the `extensions` table.
#[derive(Debug, Clone)]
pub struct DbRegistryStore {
    db: DatabaseConnection,
}

impl DbRegistryStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_model(&self, namespace: &str) -> Result<Option<extension::Model>, ExtensionError> {
        Ok(extension::Entity::find()
            .filter(extension::Column::Namespace.eq(namespace))
            .one(&self.db)
            .await?)
    }

    async fn require_model(&self, namespace: &str) -> Result<extension::Model, ExtensionError> {
        self.find_model(namespace)
            .await?
            .ok_or_else(|| ExtensionError::NotFound(namespace.to_string()))
    }

    /// Insert a fresh `pending` record. A unique-key violation means another
    /// writer got there between our lookup and this insert, so the winner's
    /// record is returned instead.
    async fn insert_or_reread(&self, new: &NewExtension) -> Result<ExtensionRecord, ExtensionError> {
        let now = chrono::Utc::now().fixed_offset();
        let model = extension::ActiveModel {
            id: Set(Uuid::new_v4()),
            namespace: Set(new.namespace.clone()),
            name: Set(new.name.clone()),
            version: Set(new.version.clone()),
            author: Set(new.author.clone()),
            description: Set(new.description.clone()),
            status: Set(ExtensionStatus::Pending.as_str().to_string()),
            enabled: Set(true),
            pending_disable: Set(false),
            dependencies: Set(serde_json::to_string(&new.dependencies)?),
            last_error: Set(None),
            installed_at: Set(None),
            updated_at: Set(now),
        };

        match model.insert(&self.db).await {
            Ok(created) => {
                tracing::debug!(namespace = %new.namespace, "extension record created");
                created.try_into()
            }
            // Lost the read-then-create race: someone else inserted it.
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                tracing::debug!(
                    namespace = %new.namespace,
                    "extension record created concurrently, re-reading"
                );
                self.require_model(&new.namespace).await?.try_into()
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl RegistryStore for DbRegistryStore {
    async fn ping(&self) -> Result<(), ExtensionError> {
        self.db.ping().await?;
        Ok(())
    }

    async fn find_by_namespace(
        &self,
        namespace: &str,
    ) -> Result<Option<ExtensionRecord>, ExtensionError> {
        self.find_model(namespace)
            .await?
            .map(ExtensionRecord::try_from)
            .transpose()
    }

    async fn create_if_missing(
        &self,
        new: &NewExtension,
    ) -> Result<ExtensionRecord, ExtensionError> {
        if let Some(existing) = self.find_model(&new.namespace).await? {
            return existing.try_into();
        }
        self.insert_or_reread(new).await
    }

    async fn mark_installed(&self, namespace: &str) -> Result<(), ExtensionError> {
        let model = self.require_model(namespace).await?;

        let now = chrono::Utc::now().fixed_offset();
        let mut active: extension::ActiveModel = model.into();
        active.status = Set(ExtensionStatus::Installed.as_str().to_string());
        active.last_error = Set(None);
        active.installed_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&self.db).await?;

        Ok(())
    }

    async fn mark_failed(&self, namespace: &str, detail: &str) -> Result<(), ExtensionError> {
        let model = self.require_model(namespace).await?;

        let now = chrono::Utc::now().fixed_offset();
        let mut active: extension::ActiveModel = model.into();
        active.status = Set(ExtensionStatus::Failed.as_str().to_string());
        active.last_error = Set(Some(detail.to_string()));
        active.updated_at = Set(now);
        active.update(&self.db).await?;

        Ok(())
    }

    async fn set_version(&self, namespace: &str, version: &str) -> Result<(), ExtensionError> {
        let model = self.require_model(namespace).await?;

        let mut active: extension::ActiveModel = model.into();
        active.version = Set(version.to_string());
        active.updated_at = Set(chrono::Utc::now().fixed_offset());
        active.update(&self.db).await?;

        Ok(())
    }

    async fn set_enabled(&self, namespace: &str, enabled: bool) -> Result<u64, ExtensionError> {
        let result = extension::Entity::update_many()
            .col_expr(extension::Column::Enabled, Expr::value(enabled))
            .col_expr(
                extension::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().fixed_offset()),
            )
            .filter(extension::Column::Namespace.eq(namespace))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    async fn list_all(&self, enabled_only: bool) -> Result<Vec<ExtensionRecord>, ExtensionError> {
        let mut query = extension::Entity::find().order_by_asc(extension::Column::Namespace);
        if enabled_only {
            query = query.filter(extension::Column::Enabled.eq(true));
        }

        query
            .all(&self.db)
            .await?
            .into_iter()
            .map(ExtensionRecord::try_from)
            .collect()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────
