//! The host's built-in feature set, always loaded first.

use std::sync::Arc;

use axum::Router;
use hearth_extension::migrations::{LegacySettingsMigration, SettingsIndexMigration};
use hearth_extension::ExtensionDescriptor;
use sea_orm::DatabaseConnection;

use crate::api::{self, AppState};

pub const CORE_VERSION: &str = "1.1.0";

/// Descriptor of the core feature set. Its handle is the admin router.
pub fn descriptor(
    namespace: &str,
    db: &DatabaseConnection,
    state: Arc<AppState>,
) -> ExtensionDescriptor {
    ExtensionDescriptor::new(namespace, "Core", CORE_VERSION)
        .description("Extension administration")
        .permission(
            format!("{namespace}:extensions.read"),
            "List and inspect extensions",
            ["admin"],
        )
        .permission(
            format!("{namespace}:extensions.manage"),
            "Disable extensions",
            ["admin"],
        )
        .migration(SettingsIndexMigration::new(db.clone()))
        .migration(LegacySettingsMigration::new(db.clone()))
        .feature(move || Ok(api::admin_router(state.clone())))
}

/// Merge every activated handle that carries a router.
pub fn mount(handles: &[hearth_extension::FeatureHandle]) -> Router {
    handles
        .iter()
        .filter_map(|handle| {
            let router = handle.downcast::<Router>();
            if router.is_none() {
                tracing::debug!(namespace = %handle.namespace(), "handle is not a router, not mounted");
            }
            router
        })
        .fold(Router::new(), |app, router| app.merge((*router).clone()))
}
