//! Migrations shipped with the host's built-in feature set.

mod legacy_settings;
mod settings_index;

pub use legacy_settings::LegacySettingsMigration;
pub use settings_index::{SettingsIndexMigration, SETTINGS_NAMESPACE_KEY_INDEX};
