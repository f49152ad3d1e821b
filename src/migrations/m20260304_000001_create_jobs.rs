//! Migration: Create jobs and failed_jobs tables

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Jobs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Jobs::Uuid).string().not_null().unique_key())
                    .col(ColumnDef::new(Jobs::Queue).string().not_null())
                    .col(ColumnDef::new(Jobs::JobType).string().not_null())
                    .col(ColumnDef::new(Jobs::Payload).text().not_null())
                    .col(
                        ColumnDef::new(Jobs::Priority)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(Jobs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Jobs::MaxAttempts)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(Jobs::ReservedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Jobs::AvailableAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Jobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_jobs_queue_available")
                    .table(Jobs::Table)
                    .col(Jobs::Queue)
                    .col(Jobs::AvailableAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(FailedJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FailedJobs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(FailedJobs::Uuid)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(FailedJobs::Queue).string().not_null())
                    .col(ColumnDef::new(FailedJobs::JobType).string().not_null())
                    .col(ColumnDef::new(FailedJobs::Payload).text().not_null())
                    .col(
                        ColumnDef::new(FailedJobs::Priority)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(ColumnDef::new(FailedJobs::Exception).text().not_null())
                    .col(
                        ColumnDef::new(FailedJobs::FailedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FailedJobs::Table).if_exists().to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Jobs::Table).if_exists().to_owned())
            .await
    }
}

#[derive(Iden)]
enum Jobs {
    Table,
    Id,
    Uuid,
    Queue,
    #[iden = "job_type"]
    JobType,
    Payload,
    Priority,
    Attempts,
    #[iden = "max_attempts"]
    MaxAttempts,
    #[iden = "reserved_at"]
    ReservedAt,
    #[iden = "available_at"]
    AvailableAt,
    #[iden = "created_at"]
    CreatedAt,
}

#[derive(Iden)]
#[iden = "failed_jobs"]
enum FailedJobs {
    Table,
    Id,
    Uuid,
    Queue,
    #[iden = "job_type"]
    JobType,
    Payload,
    Priority,
    Exception,
    #[iden = "failed_at"]
    FailedAt,
}
