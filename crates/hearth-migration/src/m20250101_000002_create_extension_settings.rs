use sea_orm_migration::prelude::*;

const LEGACY_TABLE: &str = "plugin_settings";

/// Migration 2: per-namespace settings written by extension provisioning.
///
/// The `(namespace, key)` lookup index is owned by the built-in feature
/// set's own migrations, not by this one. Neither is the table when a
/// pre-rename `plugin_settings` table is present: the core feature set
/// renames that one into place on its next install or upgrade.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        if manager.has_table(LEGACY_TABLE).await? {
            return Ok(());
        }

        manager
            .create_table(
                Table::create()
                    .table(ExtensionSettings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExtensionSettings::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ExtensionSettings::Namespace)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ExtensionSettings::Key).string_len(255).not_null())
                    .col(ColumnDef::new(ExtensionSettings::Value).text().not_null())
                    .col(
                        ColumnDef::new(ExtensionSettings::Kind)
                            .string_len(20)
                            .not_null()
                            .default("string"),
                    )
                    .col(
                        ColumnDef::new(ExtensionSettings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ExtensionSettings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(ExtensionSettings::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum ExtensionSettings {
    Table,
    Id,
    Namespace,
    Key,
    Value,
    Kind,
    CreatedAt,
    UpdatedAt,
}
