//! Hearth extension engine.
//!
//! Discovers, registers, provisions and activates optional feature modules
//! ("extensions") inside a host application, and later disables them.
//!
//! - [`store`]: persisted extension records ([`RegistryStore`])
//! - [`provisioning`]: settings, permission and role collaborators
//! - [`migration`]: per-extension migrations and idempotent index helpers
//! - [`loader`]: the start-up pass ([`ExtensionLoader::load_all`])
//! - [`disable`]: disabling with a host-wide restart flag
//! - [`service`]: administrative operations

pub mod config;
pub mod descriptor;
pub mod disable;
pub mod error;
pub mod host;
pub mod loader;
pub mod memory;
pub mod migration;
pub mod migrations;
pub mod provisioning;
pub mod record;
pub mod service;
pub mod store;

pub use config::LoaderConfig;
pub use descriptor::{DefaultPermission, DefaultSetting, ExtensionDescriptor, FeatureHandle};
pub use disable::{DisableCoordinator, RESTART_REQUIRED_KEY};
pub use error::ExtensionError;
pub use host::ExtensionHost;
pub use loader::{ExtensionLoader, Provisioners};
pub use migration::{ExtensionMigration, IndexSpec, MigrationRunner};
pub use record::{ExtensionRecord, ExtensionStatus, NewExtension};
pub use service::{DisableOutcome, ExtensionService};
pub use store::{DbRegistryStore, RegistryStore};
