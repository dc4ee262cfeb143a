use sea_orm_migration::prelude::*;

use super::m20250614_101210_create_run_table::Run;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BenchResult::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BenchResult::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BenchResult::RunId).string().not_null())
                    .col(ColumnDef::new(BenchResult::ModelId).string().not_null())
                    .col(ColumnDef::new(BenchResult::Scenario).string().not_null())
                    .col(ColumnDef::new(BenchResult::Tps).double().not_null())
                    .col(ColumnDef::new(BenchResult::Ttft).double())
                    .col(ColumnDef::new(BenchResult::Tpot).double())
                    .col(ColumnDef::new(BenchResult::GenTps).double())
                    .col(ColumnDef::new(BenchResult::LatencyP50).double().not_null())
                    .col(ColumnDef::new(BenchResult::LatencyP95).double().not_null())
                    .col(ColumnDef::new(BenchResult::LatencyP99).double().not_null())
                    .col(ColumnDef::new(BenchResult::ErrorRate).double().not_null())
                    .col(ColumnDef::new(BenchResult::TimeoutRate).double().not_null())
                    .col(ColumnDef::new(BenchResult::CpuAvg).double())
                    .col(ColumnDef::new(BenchResult::RamAvg).double())
                    .col(ColumnDef::new(BenchResult::GpuAvg).double())
                    .col(
                        ColumnDef::new(BenchResult::TotalTokens)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BenchResult::TotalIterations)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BenchResult::SuccessfulIterations)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BenchResult::RawData).json().not_null())
                    .col(
                        ColumnDef::new(BenchResult::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(BenchResult::Table, BenchResult::RunId)
                            .to(Run::Table, Run::Id),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BenchResult::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum BenchResult {
    #[sea_orm(iden = "result")]
    Table,
    Id,
    RunId,
    ModelId,
    Scenario,
    Tps,
    Ttft,
    Tpot,
    GenTps,
    LatencyP50,
    LatencyP95,
    LatencyP99,
    ErrorRate,
    TimeoutRate,
    CpuAvg,
    RamAvg,
    GpuAvg,
    TotalTokens,
    TotalIterations,
    SuccessfulIterations,
    RawData,
    CreatedAt,
}
