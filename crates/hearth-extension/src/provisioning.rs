//! Provisioning collaborators: settings, permissions and roles.
//!
//! The loader consumes these through traits; the host decides what backs
//! them. [`DbSettings`] and [`DbAccessControl`] are the sea-orm backed
//! implementations shipped with the engine.

use std::fmt;

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ExtensionError;
use hearth_db::entities::{extension_setting, permission, role, role_permission};

// ─── Types ──────────────────────────────────────────────────────────────

/// JSON type of a stored setting value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Null,
}

impl SettingKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::String(_) => SettingKind::String,
            Value::Number(_) => SettingKind::Number,
            Value::Bool(_) => SettingKind::Boolean,
            Value::Object(_) => SettingKind::Object,
            Value::Array(_) => SettingKind::Array,
            Value::Null => SettingKind::Null,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKind::String => "string",
            SettingKind::Number => "number",
            SettingKind::Boolean => "boolean",
            SettingKind::Object => "object",
            SettingKind::Array => "array",
            SettingKind::Null => "null",
        }
    }

    fn parse(s: &str) -> Result<Self, ExtensionError> {
        match s {
            "string" => Ok(SettingKind::String),
            "number" => Ok(SettingKind::Number),
            "boolean" => Ok(SettingKind::Boolean),
            "object" => Ok(SettingKind::Object),
            "array" => Ok(SettingKind::Array),
            "null" => Ok(SettingKind::Null),
            other => Err(ExtensionError::Validation(format!(
                "unknown setting kind '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub namespace: String,
    pub key: String,
    pub value: Value,
    pub kind: SettingKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: Uuid,
    pub namespace: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub permissions: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRole {
    pub name: String,
    pub permissions: Vec<Uuid>,
}

// ─── Traits ─────────────────────────────────────────────────────────────

#[async_trait]
pub trait SettingsProvisioner: Send + Sync {
    /// Create a setting. Not an upsert: a second create for the same
    /// `(namespace, key)` is the backing store's call to make.
    async fn create(
        &self,
        namespace: &str,
        key: &str,
        value: &Value,
        kind: SettingKind,
    ) -> Result<Setting, ExtensionError>;

    async fn find_one(&self, namespace: &str, key: &str)
        -> Result<Option<Setting>, ExtensionError>;

    async fn upsert(&self, namespace: &str, key: &str, value: &Value)
        -> Result<Setting, ExtensionError>;
}

#[async_trait]
pub trait PermissionProvisioner: Send + Sync {
    /// Create `<namespace>:<resource>.<action>`. Malformed names and names
    /// whose namespace differs from `namespace` are rejected.
    async fn create_permission(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
    ) -> Result<Permission, ExtensionError>;
}

#[async_trait]
pub trait RoleProvisioner: Send + Sync {
    async fn find_roles(&self) -> Result<Vec<Role>, ExtensionError>;

    /// Bind permissions to a role. Already bound ids are left as they are.
    async fn assign_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), ExtensionError>;

    async fn create_role(&self, role: NewRole) -> Result<Role, ExtensionError>;
}

// ─── Validation ─────────────────────────────────────────────────────────

fn is_name_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Validate a permission name against `<namespace>:<resource>.<action>`.
///
/// The resource may itself be dotted (`blog:posts.comments.delete`); the
/// action is the last dotted segment.
pub fn validate_permission_name(namespace: &str, name: &str) -> Result<(), ExtensionError> {
    let (prefix, rest) = name.split_once(':').ok_or_else(|| {
        ExtensionError::Validation(format!(
            "permission '{name}' must look like '<namespace>:<resource>.<action>'"
        ))
    })?;

    if prefix != namespace {
        return Err(ExtensionError::Validation(format!(
            "permission '{name}' belongs to namespace '{prefix}', expected '{namespace}'"
        )));
    }

    let (resource, action) = rest.rsplit_once('.').ok_or_else(|| {
        ExtensionError::Validation(format!(
            "permission '{name}' is missing an action, expected '<resource>.<action>'"
        ))
    })?;

    if !resource.split('.').all(is_name_segment) || !is_name_segment(action) {
        return Err(ExtensionError::Validation(format!(
            "permission '{name}' contains an empty or invalid segment"
        )));
    }

    Ok(())
}

// ─── sea-orm settings ───────────────────────────────────────────────────

/// Settings collaborator over the `extension_settings` table.
#[derive(Debug, Clone)]
pub struct DbSettings {
    db: DatabaseConnection,
}

impl DbSettings {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn find_model(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<extension_setting::Model>, ExtensionError> {
        Ok(extension_setting::Entity::find()
            .filter(extension_setting::Column::Namespace.eq(namespace))
            .filter(extension_setting::Column::Key.eq(key))
            .one(&self.db)
            .await?)
    }
}

fn setting_from_model(model: extension_setting::Model) -> Result<Setting, ExtensionError> {
    Ok(Setting {
        value: serde_json::from_str(&model.value)?,
        kind: SettingKind::parse(&model.kind)?,
        namespace: model.namespace,
        key: model.key,
    })
}

#[async_trait]
impl SettingsProvisioner for DbSettings {
    async fn create(
        &self,
        namespace: &str,
        key: &str,
        value: &Value,
        kind: SettingKind,
    ) -> Result<Setting, ExtensionError> {
        let now = chrono::Utc::now().fixed_offset();
        let model = extension_setting::ActiveModel {
            id: Set(Uuid::new_v4()),
            namespace: Set(namespace.to_string()),
            key: Set(key.to_string()),
            value: Set(serde_json::to_string(value)?),
            kind: Set(kind.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(&self.db).await?;
        tracing::debug!(namespace = %namespace, key = %key, kind = %kind, "setting created");
        setting_from_model(created)
    }

    async fn find_one(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Setting>, ExtensionError> {
        self.find_model(namespace, key)
            .await?
            .map(setting_from_model)
            .transpose()
    }

    async fn upsert(
        &self,
        namespace: &str,
        key: &str,
        value: &Value,
    ) -> Result<Setting, ExtensionError> {
        let existing = self.find_model(namespace, key).await?;
        let kind = SettingKind::of(value);
        let encoded = serde_json::to_string(value)?;
        let now = chrono::Utc::now().fixed_offset();

        let saved = if let Some(existing) = existing {
            let mut active: extension_setting::ActiveModel = existing.into();
            active.value = Set(encoded);
            active.kind = Set(kind.as_str().to_string());
            active.updated_at = Set(now);
            active.update(&self.db).await?
        } else {
            extension_setting::ActiveModel {
                id: Set(Uuid::new_v4()),
                namespace: Set(namespace.to_string()),
                key: Set(key.to_string()),
                value: Set(encoded),
                kind: Set(kind.as_str().to_string()),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&self.db)
            .await?
        };

        setting_from_model(saved)
    }
}

// ─── sea-orm permissions & roles ────────────────────────────────────────

/// Permission and role collaborator over the access-control tables.
#[derive(Debug, Clone)]
pub struct DbAccessControl {
    db: DatabaseConnection,
}

impl DbAccessControl {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PermissionProvisioner for DbAccessControl {
    async fn create_permission(
        &self,
        namespace: &str,
        name: &str,
        description: &str,
    ) -> Result<Permission, ExtensionError> {
        validate_permission_name(namespace, name)?;

        let created = permission::ActiveModel {
            id: Set(Uuid::new_v4()),
            namespace: Set(namespace.to_string()),
            name: Set(name.to_string()),
            description: Set(Some(description.to_string())),
            created_at: Set(chrono::Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await?;

        tracing::debug!(namespace = %namespace, permission = %name, "permission created");

        Ok(Permission {
            id: created.id,
            namespace: created.namespace,
            name: created.name,
            description: created.description,
        })
    }
}

#[async_trait]
impl RoleProvisioner for DbAccessControl {
    async fn find_roles(&self) -> Result<Vec<Role>, ExtensionError> {
        let roles = role::Entity::find()
            .order_by_asc(role::Column::Name)
            .find_with_related(role_permission::Entity)
            .all(&self.db)
            .await?;

        Ok(roles
            .into_iter()
            .map(|(role, bindings)| Role {
                id: role.id,
                name: role.name,
                permissions: bindings.into_iter().map(|b| b.permission_id).collect(),
            })
            .collect())
    }

    async fn assign_permissions(
        &self,
        role_id: Uuid,
        permission_ids: &[Uuid],
    ) -> Result<(), ExtensionError> {
        let role = role::Entity::find_by_id(role_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| ExtensionError::NotFound(format!("role {role_id}")))?;

        let bound: Vec<Uuid> = role
            .find_related(role_permission::Entity)
            .all(&self.db)
            .await?
            .into_iter()
            .map(|b| b.permission_id)
            .collect();

        let mut missing: Vec<Uuid> = Vec::new();
        for id in permission_ids {
            if !bound.contains(id) && !missing.contains(id) {
                missing.push(*id);
            }
        }

        if missing.is_empty() {
            return Ok(());
        }

        let count = missing.len();
        role_permission::Entity::insert_many(missing.into_iter().map(|permission_id| {
            role_permission::ActiveModel {
                role_id: Set(role_id),
                permission_id: Set(permission_id),
            }
        }))
        .exec_without_returning(&self.db)
        .await?;

        tracing::debug!(role = %role.name, added = count, "permissions bound to role");
        Ok(())
    }

    async fn create_role(&self, new_role: NewRole) -> Result<Role, ExtensionError> {
        let txn = self.db.begin().await?;

        let created = role::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(new_role.name.clone()),
            created_at: Set(chrono::Utc::now().fixed_offset()),
        }
        .insert(&txn)
        .await?;

        let mut permissions: Vec<Uuid> = Vec::new();
        for id in new_role.permissions {
            if !permissions.contains(&id) {
                permissions.push(id);
            }
        }

        if !permissions.is_empty() {
            role_permission::Entity::insert_many(permissions.iter().map(|permission_id| {
                role_permission::ActiveModel {
                    role_id: Set(created.id),
                    permission_id: Set(*permission_id),
                }
            }))
            .exec_without_returning(&txn)
            .await?;
        }

        txn.commit().await?;
        tracing::debug!(role = %created.name, "role created");

        Ok(Role {
            id: created.id,
            name: created.name,
            permissions,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sqlite_db;
    use serde_json::json;

    // ── Permission names ────────────────────────────────────────────

    #[test]
    fn test_validate_permission_name_valid() {
        assert!(validate_permission_name("core", "core:users.read").is_ok());
        assert!(validate_permission_name("blog", "blog:posts.comments.delete").is_ok());
        assert!(validate_permission_name("my-ext", "my-ext:audit_log.export").is_ok());
    }

    #[test]
    fn test_validate_permission_name_missing_namespace() {
        assert!(validate_permission_name("core", "users.read").is_err());
    }

    #[test]
    fn test_validate_permission_name_namespace_mismatch() {
        let err = validate_permission_name("blog", "core:users.read").unwrap_err();
        assert!(err.to_string().contains("expected 'blog'"));
    }

    #[test]
    fn test_validate_permission_name_missing_action() {
        assert!(validate_permission_name("core", "core:users").is_err());
        assert!(validate_permission_name("core", "core:users.").is_err());
    }

    #[test]
    fn test_validate_permission_name_empty_resource() {
        assert!(validate_permission_name("core", "core:.read").is_err());
        assert!(validate_permission_name("core", "core:users..read").is_err());
    }

    #[test]
    fn test_validate_permission_name_bad_characters() {
        assert!(validate_permission_name("core", "core:us ers.read").is_err());
        assert!(validate_permission_name("core", "core:users.re/ad").is_err());
    }

    // ── Setting kinds ───────────────────────────────────────────────

    #[test]
    fn test_setting_kind_of() {
        assert_eq!(SettingKind::of(&json!("x")), SettingKind::String);
        assert_eq!(SettingKind::of(&json!(3600)), SettingKind::Number);
        assert_eq!(SettingKind::of(&json!(true)), SettingKind::Boolean);
        assert_eq!(SettingKind::of(&json!({"ttl": 1})), SettingKind::Object);
        assert_eq!(SettingKind::of(&json!([1, 2])), SettingKind::Array);
        assert_eq!(SettingKind::of(&Value::Null), SettingKind::Null);
    }

    #[test]
    fn test_setting_kind_parse_rejects_unknown() {
        assert!(SettingKind::parse("float").is_err());
        assert_eq!(SettingKind::parse("object").unwrap(), SettingKind::Object);
    }

    // ── DbSettings ──────────────────────────────────────────────────

    #[tokio::test]
    async fn test_db_settings_create_and_find() {
        let settings = DbSettings::new(sqlite_db().await);
        let value = json!({"ttl": 3600});

        let created = settings
            .create("core", "auth", &value, SettingKind::Object)
            .await
            .unwrap();
        assert_eq!(created.value, value);

        let found = settings.find_one("core", "auth").await.unwrap().unwrap();
        assert_eq!(found.value, value);
        assert_eq!(found.kind, SettingKind::Object);
        assert!(settings.find_one("blog", "auth").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_db_settings_upsert_inserts_then_updates() {
        let settings = DbSettings::new(sqlite_db().await);

        settings
            .upsert("core", "restart_required", &json!(true))
            .await
            .unwrap();
        let updated = settings
            .upsert("core", "restart_required", &json!(false))
            .await
            .unwrap();
        assert_eq!(updated.value, json!(false));
        assert_eq!(updated.kind, SettingKind::Boolean);

        let found = settings
            .find_one("core", "restart_required")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.value, json!(false));
    }

    // ── DbAccessControl ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_db_create_permission_validates() {
        let acl = DbAccessControl::new(sqlite_db().await);

        let err = acl
            .create_permission("blog", "core:users.read", "Read users")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtensionError::Validation(_)));

        let perm = acl
            .create_permission("core", "core:users.read", "Read users")
            .await
            .unwrap();
        assert_eq!(perm.namespace, "core");
        assert_eq!(perm.description.as_deref(), Some("Read users"));
    }

    #[tokio::test]
    async fn test_db_create_permission_twice_fails() {
        let acl = DbAccessControl::new(sqlite_db().await);
        acl.create_permission("core", "core:users.read", "Read users")
            .await
            .unwrap();
        let err = acl
            .create_permission("core", "core:users.read", "Read users")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtensionError::Store(_)));
    }

    #[tokio::test]
    async fn test_db_create_role_prebound() {
        let acl = DbAccessControl::new(sqlite_db().await);
        let perm = acl
            .create_permission("core", "core:users.read", "Read users")
            .await
            .unwrap();

        let role = acl
            .create_role(NewRole {
                name: "admin".into(),
                permissions: vec![perm.id, perm.id],
            })
            .await
            .unwrap();
        assert_eq!(role.permissions, vec![perm.id]);

        let roles = acl.find_roles().await.unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].name, "admin");
        assert_eq!(roles[0].permissions, vec![perm.id]);
    }

    #[tokio::test]
    async fn test_db_assign_permissions_is_union() {
        let acl = DbAccessControl::new(sqlite_db().await);
        let read = acl
            .create_permission("core", "core:users.read", "Read users")
            .await
            .unwrap();
        let write = acl
            .create_permission("core", "core:users.write", "Write users")
            .await
            .unwrap();
        let role = acl
            .create_role(NewRole {
                name: "editor".into(),
                permissions: vec![read.id],
            })
            .await
            .unwrap();

        acl.assign_permissions(role.id, &[read.id, write.id])
            .await
            .unwrap();
        acl.assign_permissions(role.id, &[write.id]).await.unwrap();

        let roles = acl.find_roles().await.unwrap();
        let mut bound = roles[0].permissions.clone();
        bound.sort();
        let mut expected = vec![read.id, write.id];
        expected.sort();
        assert_eq!(bound, expected);
    }

    #[tokio::test]
    async fn test_db_assign_permissions_unknown_role() {
        let acl = DbAccessControl::new(sqlite_db().await);
        let err = acl
            .assign_permissions(Uuid::new_v4(), &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, ExtensionError::NotFound(_)));
    }
}
