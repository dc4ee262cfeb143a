use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Model::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Model::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Model::Alias).string().not_null())
                    .col(ColumnDef::new(Model::ModelId).string().not_null())
                    .col(
                        ColumnDef::new(Model::Status)
                            .string()
                            .not_null()
                            .default("stopped"),
                    )
                    .col(ColumnDef::new(Model::Endpoint).string())
                    .col(ColumnDef::new(Model::LastError).string())
                    .col(ColumnDef::new(Model::LastHeartbeat).big_integer())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Model::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Model {
    Table,
    Id,
    Alias,
    ModelId,
    Status,
    Endpoint,
    LastError,
    LastHeartbeat,
}
