use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Aggregated metrics for one (run, model, scenario) pair. `raw_data` holds
/// the full per-iteration structure.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "result")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub run_id: String,
    pub model_id: String,
    pub scenario: String,
    pub tps: f64,
    pub ttft: Option<f64>,
    pub tpot: Option<f64>,
    pub gen_tps: Option<f64>,
    pub latency_p50: f64,
    pub latency_p95: f64,
    pub latency_p99: f64,
    pub error_rate: f64,
    pub timeout_rate: f64,
    pub cpu_avg: Option<f64>,
    pub ram_avg: Option<f64>,
    pub gpu_avg: Option<f64>,
    pub total_tokens: i64,
    pub total_iterations: i32,
    pub successful_iterations: i32,
    pub raw_data: Json,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::run::Entity",
        from = "Column::RunId",
        to = "super::run::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Run,
}

impl Related<super::run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Run.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
