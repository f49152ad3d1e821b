//! Migration: Create backups table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Backups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Backups::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Backups::Name).string().not_null().unique_key())
                    .col(ColumnDef::new(Backups::BackupType).string().not_null())
                    .col(
                        ColumnDef::new(Backups::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Backups::FilePath).string().null())
                    .col(ColumnDef::new(Backups::FileHash).string().null())
                    .col(ColumnDef::new(Backups::FileSize).big_integer().null())
                    .col(ColumnDef::new(Backups::ErrorMessage).text().null())
                    .col(
                        ColumnDef::new(Backups::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Backups::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Backups::RestoredAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Backups::CreatedBy).big_integer().null())
                    .col(
                        ColumnDef::new(Backups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_backups_expires_at")
                    .table(Backups::Table)
                    .col(Backups::ExpiresAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Backups::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
enum Backups {
    Table,
    Id,
    Name,
    #[iden = "backup_type"]
    BackupType,
    Status,
    #[iden = "file_path"]
    FilePath,
    #[iden = "file_hash"]
    FileHash,
    #[iden = "file_size"]
    FileSize,
    #[iden = "error_message"]
    ErrorMessage,
    #[iden = "expires_at"]
    ExpiresAt,
    #[iden = "completed_at"]
    CompletedAt,
    #[iden = "restored_at"]
    RestoredAt,
    #[iden = "created_by"]
    CreatedBy,
    #[iden = "created_at"]
    CreatedAt,
}
