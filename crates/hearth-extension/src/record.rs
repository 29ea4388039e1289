//! Persisted extension state.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::ExtensionError;
use hearth_db::entities::extension;

/// Install state of an extension record.
///
/// A record starts `Pending`, moves to `Installed` after its one-time
/// provisioning succeeds, or to `Failed` when any provisioning step errors.
/// Only an external reset brings a record back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtensionStatus {
    Pending,
    Installed,
    Failed,
}

impl ExtensionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionStatus::Pending => "pending",
            ExtensionStatus::Installed => "installed",
            ExtensionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExtensionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExtensionStatus {
    type Err = ExtensionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExtensionStatus::Pending),
            "installed" => Ok(ExtensionStatus::Installed),
            "failed" => Ok(ExtensionStatus::Failed),
            other => Err(ExtensionError::Validation(format!(
                "unknown extension status '{other}'"
            ))),
        }
    }
}

/// The authoritative, persisted state of one extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionRecord {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub status: ExtensionStatus,
    pub enabled: bool,
    /// Reserved for deferred-disable semantics; never set by the engine.
    pub pending_disable: bool,
    /// Declared dependencies. Informational only, never enforced.
    pub dependencies: Vec<String>,
    /// Best-effort diagnostic text of the last provisioning failure.
    pub last_error: Option<String>,
    pub installed_at: Option<DateTime<FixedOffset>>,
    pub updated_at: DateTime<FixedOffset>,
}

impl ExtensionRecord {
    /// A fresh `pending`, enabled record for a namespace seen for the first time.
    pub fn pending(new: &NewExtension, now: DateTime<FixedOffset>) -> Self {
        Self {
            namespace: new.namespace.clone(),
            name: new.name.clone(),
            version: new.version.clone(),
            author: new.author.clone(),
            description: new.description.clone(),
            status: ExtensionStatus::Pending,
            enabled: true,
            pending_disable: false,
            dependencies: new.dependencies.clone(),
            last_error: None,
            installed_at: None,
            updated_at: now,
        }
    }
}

impl TryFrom<extension::Model> for ExtensionRecord {
    type Error = ExtensionError;

    fn try_from(model: extension::Model) -> Result<Self, Self::Error> {
        // A corrupt status isolates this record instead of failing every read.
        let (status, last_error) = match model.status.parse::<ExtensionStatus>() {
            Ok(status) => (status, model.last_error),
            Err(e) => {
                tracing::warn!(
                    namespace = %model.namespace,
                    raw = %model.status,
                    "unreadable extension status"
                );
                (ExtensionStatus::Failed, Some(e.to_string()))
            }
        };
        // Older rows may hold malformed JSON; the field is informational.
        let dependencies: Vec<String> =
            serde_json::from_str(&model.dependencies).unwrap_or_default();

        Ok(Self {
            namespace: model.namespace,
            name: model.name,
            version: model.version,
            author: model.author,
            description: model.description,
            status,
            enabled: model.enabled,
            pending_disable: model.pending_disable,
            dependencies,
            last_error,
            installed_at: model.installed_at,
            updated_at: model.updated_at,
        })
    }
}

/// Registration data used when a namespace is seen for the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExtension {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub author: Option<String>,
    pub description: Option<String>,
    pub dependencies: Vec<String>,
}

impl NewExtension {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version: "0.0.0".to_string(),
            author: None,
            description: None,
            dependencies: Vec::new(),
        }
    }
}
