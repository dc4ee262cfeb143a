use crate::{dao, entities::result, error::BenchError};
use anyhow::{self, bail, Context};
use sea_orm::*;

/// Persist one (run, model, scenario) result. Rejects appends to a run that
/// has already reached a terminal status.
pub async fn save(record: result::Model, db: &DatabaseConnection) -> anyhow::Result<result::Model> {
    let run = dao::run::fetch(&record.run_id, db)
        .await?
        .ok_or_else(|| BenchError::NotFound(format!("run {}", record.run_id)))?;
    if dao::run::is_terminal(&run.status) {
        bail!(
            "run {} is already {}, refusing to append result for {}/{}",
            run.id,
            run.status,
            record.model_id,
            record.scenario
        );
    }

    let id = record.id.clone();
    result::ActiveModel {
        id: ActiveValue::Set(record.id),
        run_id: ActiveValue::Set(record.run_id),
        model_id: ActiveValue::Set(record.model_id),
        scenario: ActiveValue::Set(record.scenario),
        tps: ActiveValue::Set(record.tps),
        ttft: ActiveValue::Set(record.ttft),
        tpot: ActiveValue::Set(record.tpot),
        gen_tps: ActiveValue::Set(record.gen_tps),
        latency_p50: ActiveValue::Set(record.latency_p50),
        latency_p95: ActiveValue::Set(record.latency_p95),
        latency_p99: ActiveValue::Set(record.latency_p99),
        error_rate: ActiveValue::Set(record.error_rate),
        timeout_rate: ActiveValue::Set(record.timeout_rate),
        cpu_avg: ActiveValue::Set(record.cpu_avg),
        ram_avg: ActiveValue::Set(record.ram_avg),
        gpu_avg: ActiveValue::Set(record.gpu_avg),
        total_tokens: ActiveValue::Set(record.total_tokens),
        total_iterations: ActiveValue::Set(record.total_iterations),
        successful_iterations: ActiveValue::Set(record.successful_iterations),
        raw_data: ActiveValue::Set(record.raw_data),
        created_at: ActiveValue::Set(record.created_at),
    }
    .insert(db)
    .await
    .context(format!("Error saving result {}", id))
}

/// All results for a run, in insertion order.
pub async fn fetch_by_run(
    run_id: &str,
    db: &DatabaseConnection,
) -> anyhow::Result<Vec<result::Model>> {
    result::Entity::find()
        .filter(result::Column::RunId.eq(run_id))
        .order_by_asc(result::Column::CreatedAt)
        .all(db)
        .await
        .context(format!("Error fetching results for run {}", run_id))
}

/// Every persisted result, most recent insertion first.
pub async fn fetch_all(db: &DatabaseConnection) -> anyhow::Result<Vec<result::Model>> {
    result::Entity::find()
        .order_by_desc(result::Column::CreatedAt)
        .all(db)
        .await
        .context("Error fetching results")
}
