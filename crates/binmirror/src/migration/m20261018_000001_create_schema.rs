//! Initial migration creating the node tree and task tables.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        self.create_binaries(manager).await?;
        self.create_sync_tasks(manager).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncTasks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Binaries::Table).to_owned())
            .await?;
        Ok(())
    }
}

impl Migration {
    async fn create_binaries(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Binaries::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Binaries::Id).uuid().not_null().primary_key())
                    // Identity
                    .col(ColumnDef::new(Binaries::Category).string().not_null())
                    .col(ColumnDef::new(Binaries::Parent).string().not_null())
                    .col(ColumnDef::new(Binaries::Name).string().not_null())
                    // Listing metadata
                    .col(
                        ColumnDef::new(Binaries::IsDir)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Binaries::Size).big_integer().null())
                    .col(ColumnDef::new(Binaries::Date).string().not_null())
                    .col(ColumnDef::new(Binaries::SourceUrl).text().not_null())
                    .col(
                        ColumnDef::new(Binaries::IgnoreDownloadStatuses)
                            .json()
                            .not_null()
                            .default(Expr::cust("'[]'")),
                    )
                    // Tracking
                    .col(
                        ColumnDef::new(Binaries::Missing)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Binaries::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Binaries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One node per (category, parent, name)
        manager
            .create_index(
                Index::create()
                    .name("idx_binaries_category_parent_name")
                    .table(Binaries::Table)
                    .col(Binaries::Category)
                    .col(Binaries::Parent)
                    .col(Binaries::Name)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Directory listings
        manager
            .create_index(
                Index::create()
                    .name("idx_binaries_category_parent")
                    .table(Binaries::Table)
                    .col(Binaries::Category)
                    .col(Binaries::Parent)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn create_sync_tasks(&self, manager: &SchemaManager<'_>) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncTasks::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncTasks::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(SyncTasks::Category)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::State)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncTasks::Note).text().null())
                    .col(ColumnDef::new(SyncTasks::ResumeHint).json().null())
                    .col(
                        ColumnDef::new(SyncTasks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncTasks::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Worker polling: oldest pending first
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_tasks_state_updated")
                    .table(SyncTasks::Table)
                    .col(SyncTasks::State)
                    .col(SyncTasks::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Binaries {
    Table,
    Id,
    Category,
    Parent,
    Name,
    IsDir,
    Size,
    Date,
    SourceUrl,
    IgnoreDownloadStatuses,
    Missing,
    SyncedAt,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SyncTasks {
    Table,
    Id,
    Category,
    State,
    Attempts,
    Note,
    ResumeHint,
    CreatedAt,
    UpdatedAt,
    StartedAt,
    FinishedAt,
}
