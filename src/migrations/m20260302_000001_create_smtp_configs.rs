//! Migration: Create smtp_configs table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SmtpConfigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SmtpConfigs::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SmtpConfigs::Name)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(SmtpConfigs::Host).string().not_null())
                    .col(
                        ColumnDef::new(SmtpConfigs::Port)
                            .integer()
                            .not_null()
                            .default(587),
                    )
                    .col(
                        ColumnDef::new(SmtpConfigs::Encryption)
                            .string()
                            .not_null()
                            .default("starttls"),
                    )
                    .col(ColumnDef::new(SmtpConfigs::Username).string().null())
                    .col(ColumnDef::new(SmtpConfigs::Password).string().null())
                    .col(ColumnDef::new(SmtpConfigs::FromAddress).string().not_null())
                    .col(ColumnDef::new(SmtpConfigs::FromName).string().null())
                    .col(
                        ColumnDef::new(SmtpConfigs::TimeoutSecs)
                            .integer()
                            .not_null()
                            .default(30),
                    )
                    .col(
                        ColumnDef::new(SmtpConfigs::IsDefault)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SmtpConfigs::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SmtpConfigs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SmtpConfigs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(SmtpConfigs::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
#[iden = "smtp_configs"]
enum SmtpConfigs {
    Table,
    Id,
    Name,
    Host,
    Port,
    Encryption,
    Username,
    Password,
    #[iden = "from_address"]
    FromAddress,
    #[iden = "from_name"]
    FromName,
    #[iden = "timeout_secs"]
    TimeoutSecs,
    #[iden = "is_default"]
    IsDefault,
    #[iden = "is_active"]
    IsActive,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "updated_at"]
    UpdatedAt,
}
