//! In-memory registry store and provisioning collaborators.
//!
//! Used by the engine's own tests and by hosts that embed the engine
//! without a database. Every collaborator call is appended to a shared
//! journal so callers can check which provisioning steps actually ran.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::ExtensionError;
use crate::provisioning::{
    validate_permission_name, NewRole, Permission, PermissionProvisioner, Role, RoleProvisioner,
    Setting, SettingKind, SettingsProvisioner,
};
use crate::record::{ExtensionRecord, ExtensionStatus, NewExtension};
use crate::store::RegistryStore;

/// Ordered log of collaborator calls, e.g. `settings.create core/auth`.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<RwLock<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    async fn push(&self, entry: String) {
        self.entries.write().await.push(entry);
    }

    pub async fn entries(&self) -> Vec<String> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

// ─── Registry store ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryRegistryStore {
    records: RwLock<BTreeMap<String, ExtensionRecord>>,
    unavailable: AtomicBool,
}

impl MemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a lost connection: every call fails until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Insert or replace a record as-is.
    pub async fn insert(&self, record: ExtensionRecord) {
        self.records
            .write()
            .await
            .insert(record.namespace.clone(), record);
    }

    /// Administrative status reset, outside the engine's own transitions.
    pub async fn reset_status(&self, namespace: &str, status: ExtensionStatus) -> bool {
        match self.records.write().await.get_mut(namespace) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    fn check(&self) -> Result<(), ExtensionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ExtensionError::Store(sea_orm::DbErr::Custom(
                "registry store unavailable".into(),
            )));
        }
        Ok(())
    }

    async fn update<F>(&self, namespace: &str, apply: F) -> Result<(), ExtensionError>
    where
        F: FnOnce(&mut ExtensionRecord) + Send,
    {
        self.check()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(namespace)
            .ok_or_else(|| ExtensionError::NotFound(namespace.to_string()))?;
        apply(record);
        record.updated_at = chrono::Utc::now().fixed_offset();
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for MemoryRegistryStore {
    async fn ping(&self) -> Result<(), ExtensionError> {
        self.check()
    }

    async fn find_by_namespace(
        &self,
        namespace: &str,
    ) -> Result<Option<ExtensionRecord>, ExtensionError> {
        self.check()?;
        Ok(self.records.read().await.get(namespace).cloned())
    }

    async fn create_if_missing(
        &self,
        new: &NewExtension,
    ) -> Result<ExtensionRecord, ExtensionError> {
        self.check()?;
        let mut records = self.records.write().await;
        let record = records.entry(new.namespace.clone()).or_insert_with(|| {
            ExtensionRecord::pending(new, chrono::Utc::now().fixed_offset())
        });
        Ok(record.clone())
    }

    async fn mark_installed(&self, namespace: &str) -> Result<(), ExtensionError> {
        self.update(namespace, |record| {
            record.status = ExtensionStatus::Installed;
            record.last_error = None;
            record.installed_at = Some(chrono::Utc::now().fixed_offset());
        })
        .await
    }

    async fn mark_failed(&self, namespace: &str, detail: &str) -> Result<(), ExtensionError> {
        let detail = detail.to_string();
        self.update(namespace, move |record| {
            record.status = ExtensionStatus::Failed;
            record.last_error = Some(detail);
        })
        .await
    }

    async fn set_version(&self, namespace: &str, version: &str) -> Result<(), ExtensionError> {
        let version = version.to_string();
        self.update(namespace, move |record| record.version = version)
            .await
    }

    async fn set_enabled(&self, namespace: &str, enabled: bool) -> Result<u64, ExtensionError> {
        match self
            .update(namespace, |record| record.enabled = enabled)
            .await
        {
            Ok(()) => Ok(1),
            Err(ExtensionError::NotFound(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    async fn list_all(&self, enabled_only: bool) -> Result<Vec<ExtensionRecord>, ExtensionError> {
        self.check()?;
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| !enabled_only || r.enabled)
            .cloned()
            .collect())
    }
}

// ─── Settings ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemorySettings {
    settings: RwLock<Vec<Setting>>,
    journal: Journal,
}

impl MemorySettings {
    pub fn new(journal: Journal) -> Self {
        Self {
            settings: RwLock::new(Vec::new()),
            journal,
        }
    }

    /// Every stored setting, duplicates included, in creation order.
    pub async fn all(&self) -> Vec<Setting> {
        self.settings.read().await.clone()
    }
}

#[async_trait]
impl SettingsProvisioner for MemorySettings {
    async fn create(
        &self,
        namespace: &str,
        key: &str,
        value: &Value,
        kind: SettingKind,
    ) -> Result<Setting, ExtensionError> {
        self.journal
            .push(format!("settings.create {namespace}/{key}"))
            .await;
        let setting = Setting {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: value.clone(),
            kind,
        };
        self.settings.write().await.push(setting.clone());
        Ok(setting)
    }

    async fn find_one(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Setting>, ExtensionError> {
        Ok(self
            .settings
            .read()
            .await
            .iter()
            .find(|s| s.namespace == namespace && s.key == key)
            .cloned())
    }

    async fn upsert(
        &self,
        namespace: &str,
        key: &str,
        value: &Value,
    ) -> Result<Setting, ExtensionError> {
        self.journal
            .push(format!("settings.upsert {namespace}/{key}"))
            .await;
        let mut settings = self.settings.write().await;
        let kind = SettingKind::of(value);

        if let Some(existing) = settings
            .iter_mut()
            .find(|s| s.namespace == namespace && s.key == key)
        {
            existing.value = value.clone();
            existing.kind = kind;
            return Ok(existing.clone());
        }

        let setting = Setting {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: value.clone(),
            kind,
        };
        settings.push(setting.clone());
        Ok(setting)
    }
}

// ─── Permissions & roles ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryAccessControl {
    permissions: RwLock<Vec<Permission>>,
    roles: RwLock<Vec<Role>>,
    journal: Journal,
}

impl MemoryAccessControl {
    pub fn new(journal: Journal) -> Self {
        Self {
            permissions: RwLock::new(Vec::new()),
            roles: RwLock::new(Vec::new()),
            journal,
        }
    }

    pub async fn permissions(&self) -> Vec<Permission> {
        self.permissions.read().await.clone()
    }

    pub async fn roles(&self) -> Vec<Role> {
        self.roles.read().await.clone()
    }

    /// Look up a role by name.
    pub async fn role(&self, name: &str) -> Option<Role> {
        self.roles
            .read()
            .await
            .iter()
            .find(|r| r.name == name)
            .cloned()
    }
}

#[async_trait]
impl PermissionProvisioner for MemoryAccessControl {
    async fn create_permission(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
    ) -> Result<Permission, ExtensionError> {
        self.journal
            .push(format!("permissions.create {name}"))
            .await;
        validate_permission_name(namespace, name)?;

        let mut permissions = self.permissions.write().await;
        if permissions.iter().any(|p| p.name == name) {
            return Err(ExtensionError::Validation(format!(
                "permission '{name}' already exists"
            )));
        }

        let permission = Permission {
            id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            description: Some(description.to_string()),
        };
        permissions.push(permission.clone());
        Ok(permission)
    }
}

#[async_trait]
impl RoleProvisioner for MemoryAccessControl {
    async fn find_roles(&self) -> Result<Vec<Role>, ExtensionError> {
        self.journal.push("roles.find".to_string()).await;
        Ok(self.roles.read().await.clone())
    }

    async fn assign_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), ExtensionError> {
        let mut roles = self.roles.write().await;
        let role = roles
            .iter_mut()
            .find(|r| r.id == role_id)
            .ok_or_else(|| ExtensionError::NotFound(format!("role {role_id}")))?;
        self.journal
            .push(format!("roles.assign {}", role.name))
            .await;

        for id in permission_ids {
            if !role.permissions.contains(id) {
                role.permissions.push(*id);
            }
        }
        Ok(())
    }

    async fn create_role(&self, new_role: NewRole) -> Result<Role, ExtensionError> {
        self.journal
            .push(format!("roles.create {}", new_role.name))
            .await;

        let mut roles = self.roles.write().await;
        if roles.iter().any(|r| r.name == new_role.name) {
            return Err(ExtensionError::Validation(format!(
                "role '{}' already exists",
                new_role.name
            )));
        }

        let mut permissions: Vec<Uuid> = Vec::new();
        for id in new_role.permissions {
            if !permissions.contains(&id) {
                permissions.push(id);
            }
        }

        let role = Role {
            id: Uuid::new_v4(),
            name: new_role.name,
            permissions,
        };
        roles.push(role.clone());
        Ok(role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_unavailable() {
        let store = MemoryRegistryStore::new();
        store.set_available(false);
        assert!(matches!(
            store.ping().await.unwrap_err(),
            ExtensionError::Store(_)
        ));
        store.set_available(true);
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_set_enabled_unknown() {
        let store = MemoryRegistryStore::new();
        assert_eq!(store.set_enabled("ghost", false).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_store_create_if_missing_keeps_existing() {
        let store = MemoryRegistryStore::new();
        store
            .create_if_missing(&NewExtension::new("blog", "Blog"))
            .await
            .unwrap();
        store.mark_installed("blog").await.unwrap();

        let record = store
            .create_if_missing(&NewExtension::new("blog", "Other"))
            .await
            .unwrap();
        assert_eq!(record.name, "Blog");
        assert_eq!(record.status, ExtensionStatus::Installed);
    }

    #[tokio::test]
    async fn test_memory_settings_create_is_not_upsert() {
        let settings = MemorySettings::new(Journal::new());
        settings
            .create("core", "auth", &json!(1), SettingKind::Number)
            .await
            .unwrap();
        settings
            .create("core", "auth", &json!(2), SettingKind::Number)
            .await
            .unwrap();
        assert_eq!(settings.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_memory_access_control_journal() {
        let journal = Journal::new();
        let acl = MemoryAccessControl::new(journal.clone());
        let perm = acl
            .create_permission("core", "core:users.read", "Read users")
            .await
            .unwrap();
        let role = acl
            .create_role(NewRole {
                name: "admin".into(),
                permissions: vec![perm.id],
            })
            .await
            .unwrap();
        acl.assign_permissions(role.id, &[perm.id]).await.unwrap();

        assert_eq!(
            journal.entries().await,
            vec![
                "permissions.create core:users.read",
                "roles.create admin",
                "roles.assign admin",
            ]
        );
        assert_eq!(acl.role("admin").await.unwrap().permissions, vec![perm.id]);
    }
}
