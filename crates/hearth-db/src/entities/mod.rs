pub mod extension;
pub mod extension_setting;
pub mod permission;
pub mod role;
pub mod role_permission;
