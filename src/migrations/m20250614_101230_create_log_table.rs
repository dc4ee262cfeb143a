use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Log::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Log::Id)
                            .integer()
                            .auto_increment()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Log::EntityType).string().not_null())
                    .col(ColumnDef::new(Log::EntityId).string().not_null())
                    .col(ColumnDef::new(Log::Level).string().not_null())
                    .col(ColumnDef::new(Log::Message).string().not_null())
                    .col(ColumnDef::new(Log::Metadata).json())
                    .col(ColumnDef::new(Log::CreatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Log::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Log {
    Table,
    Id,
    EntityType,
    EntityId,
    Level,
    Message,
    Metadata,
    CreatedAt,
}
