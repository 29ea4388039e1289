//! Extension descriptors, supplied by the host at start-up.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ExtensionError;
use crate::migration::ExtensionMigration;
use crate::record::NewExtension;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type InitializeHook = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type FeatureFactory = Arc<dyn Fn() -> anyhow::Result<FeatureHandle> + Send + Sync>;

/// A setting created once, on first install.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultSetting {
    pub key: String,
    pub value: Value,
}

/// A permission created once, on first install, and bound to `roles`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPermission {
    pub name: String,
    pub description: String,
    pub roles: Vec<String>,
}

/// Whatever an extension's factory produced, tagged with its namespace.
///
/// The engine never looks inside; the host downcasts to its own type.
#[derive(Clone)]
pub struct FeatureHandle {
    namespace: String,
    payload: Arc<dyn Any + Send + Sync>,
}

impl FeatureHandle {
    pub fn new<T: Any + Send + Sync>(namespace: impl Into<String>, payload: T) -> Self {
        Self {
            namespace: namespace.into(),
            payload: Arc::new(payload),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.payload).downcast::<T>().ok()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }
}

impl fmt::Debug for FeatureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureHandle")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Everything the loader needs to register, provision and activate one
/// extension.
///
/// ```ignore
/// let blog = ExtensionDescriptor::new("blog", "Blog", "1.2.0")
///     .setting("posts_per_page", json!(20))
///     .permission("blog:posts.write", "Write posts", ["editor"])
///     .on_initialize(|| async { Ok(()) })
///     .feature(|| Ok(blog_router()));
/// ```
#[derive(Clone)]
pub struct ExtensionDescriptor {
    namespace: String,
    name: String,
    version: String,
    description: Option<String>,
    author: Option<String>,
    dependencies: Vec<String>,
    enabled: bool,
    default_settings: Vec<DefaultSetting>,
    default_permissions: Vec<DefaultPermission>,
    initialize: Option<InitializeHook>,
    feature: Option<FeatureFactory>,
    migrations: Vec<Arc<dyn ExtensionMigration>>,
}

impl ExtensionDescriptor {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: version.into(),
            description: None,
            author: None,
            dependencies: Vec::new(),
            enabled: true,
            default_settings: Vec::new(),
            default_permissions: Vec::new(),
            initialize: None,
            feature: None,
            migrations: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Informational only; load order is the order of the descriptor list.
    pub fn dependency(mut self, namespace: impl Into<String>) -> Self {
        self.dependencies.push(namespace.into());
        self
    }

    /// The author's declared intent. `false` keeps the extension out of
    /// the load without touching the persisted `enabled` flag.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.default_settings.push(DefaultSetting {
            key: key.into(),
            value,
        });
        self
    }

    pub fn permission<I, R>(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        roles: I,
    ) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.default_permissions.push(DefaultPermission {
            name: name.into(),
            description: description.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Hook run once, before anything else, on first install.
    pub fn on_initialize<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.initialize = Some(Arc::new(
            move || -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(hook()) },
        ));
        self
    }

    /// Factory for the value the host mounts. Called on every load.
    pub fn feature<F, T>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
        T: Any + Send + Sync,
    {
        let namespace = self.namespace.clone();
        self.feature = Some(Arc::new(move || -> anyhow::Result<FeatureHandle> {
            Ok(FeatureHandle::new(namespace.clone(), factory()?))
        }));
        self
    }

    pub fn migration(mut self, migration: impl ExtensionMigration + 'static) -> Self {
        self.migrations.push(Arc::new(migration));
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn default_settings(&self) -> &[DefaultSetting] {
        &self.default_settings
    }

    pub fn default_permissions(&self) -> &[DefaultPermission] {
        &self.default_permissions
    }

    pub fn migrations(&self) -> &[Arc<dyn ExtensionMigration>] {
        &self.migrations
    }

    /// Data for the registry record created the first time this
    /// namespace is seen.
    pub fn registration(&self) -> NewExtension {
        NewExtension {
            namespace: self.namespace.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
            author: self.author.clone(),
            description: self.description.clone(),
            dependencies: self.dependencies.clone(),
        }
    }

    pub async fn initialize(&self) -> Result<(), ExtensionError> {
        match &self.initialize {
            Some(hook) => hook().await.map_err(ExtensionError::Initialize),
            None => Ok(()),
        }
    }

    /// Without a factory the handle carries `()`.
    pub fn build_feature(&self) -> Result<FeatureHandle, ExtensionError> {
        match &self.feature {
            Some(factory) => factory().map_err(ExtensionError::Feature),
            None => Ok(FeatureHandle::new(self.namespace.clone(), ())),
        }
    }
}

impl fmt::Debug for ExtensionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionDescriptor")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("enabled", &self.enabled)
            .field("default_settings", &self.default_settings)
            .field("default_permissions", &self.default_permissions)
            .field("migrations", &self.migrations.len())
            .finish_non_exhaustive()
    }
}
