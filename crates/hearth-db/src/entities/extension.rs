use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "extensions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub author: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    /// One of `pending`, `installed`, `failed`.
    pub status: String,
    pub enabled: bool,
    pub pending_disable: bool,
    /// JSON array of namespaces. Informational only.
    #[sea_orm(column_type = "Text")]
    pub dependencies: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub installed_at: Option<DateTimeWithTimeZone>,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
