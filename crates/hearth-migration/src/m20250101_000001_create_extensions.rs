use sea_orm_migration::prelude::*;

/// Migration 1: the extension registry.
///
/// One row per extension namespace. `status` is one of `pending`,
/// `installed` or `failed`; `dependencies` holds a JSON array of
/// namespaces and is never enforced.
#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Extensions::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Extensions::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Extensions::Namespace)
                            .string_len(128)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Extensions::Name).string_len(255).not_null())
                    .col(ColumnDef::new(Extensions::Version).string_len(50).not_null())
                    .col(ColumnDef::new(Extensions::Author).string_len(255).null())
                    .col(ColumnDef::new(Extensions::Description).text().null())
                    .col(
                        ColumnDef::new(Extensions::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Extensions::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Extensions::PendingDisable)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Extensions::Dependencies)
                            .text()
                            .not_null()
                            .default("[]"),
                    )
                    .col(ColumnDef::new(Extensions::LastError).text().null())
                    .col(
                        ColumnDef::new(Extensions::InstalledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Extensions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_extensions_enabled")
                    .table(Extensions::Table)
                    .col(Extensions::Enabled)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Extensions::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub enum Extensions {
    Table,
    Id,
    Namespace,
    Name,
    Version,
    Author,
    Description,
    Status,
    Enabled,
    PendingDisable,
    Dependencies,
    LastError,
    InstalledAt,
    UpdatedAt,
}
