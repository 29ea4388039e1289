//! Extension engine error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtensionError {
    #[error("extension not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("initialize hook failed: {0}")]
    Initialize(#[source] anyhow::Error),

    #[error("feature factory failed: {0}")]
    Feature(#[source] anyhow::Error),

    #[error("migration {version} failed: {source}")]
    Migration {
        version: String,
        #[source]
        source: Box<ExtensionError>,
    },

    #[error("provisioning timed out after {0:?}")]
    Timeout(Duration),

    #[error("database error: {0}")]
    Store(#[from] sea_orm::DbErr),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid version: {0}")]
    InvalidVersion(#[from] semver::Error),
}
