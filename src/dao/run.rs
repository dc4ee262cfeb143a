use crate::entities::run;
use anyhow::{self, Context};
use sea_orm::*;

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";

pub fn is_terminal(status: &str) -> bool {
    status == STATUS_COMPLETED || status == STATUS_FAILED
}

pub async fn save(record: run::Model, db: &DatabaseConnection) -> anyhow::Result<run::Model> {
    let id = record.id.clone();
    run::ActiveModel {
        id: ActiveValue::Set(record.id),
        suite_name: ActiveValue::Set(record.suite_name),
        model_ids: ActiveValue::Set(record.model_ids),
        config: ActiveValue::Set(record.config),
        hardware_info: ActiveValue::Set(record.hardware_info),
        status: ActiveValue::Set(record.status),
        started_at: ActiveValue::Set(record.started_at),
        completed_at: ActiveValue::Set(record.completed_at),
    }
    .insert(db)
    .await
    .context(format!("Error saving run {}", id))
}

/// Patch status and/or completion stamp. Only the run coordinator moves a run
/// out of `running`.
pub async fn update(
    id: &str,
    status: Option<&str>,
    completed_at: Option<i64>,
    db: &DatabaseConnection,
) -> anyhow::Result<()> {
    let record = run::Entity::find_by_id(id)
        .one(db)
        .await?
        .context(format!("Error fetching run with id {}", id))?;

    let mut record = record.into_active_model();
    if let Some(status) = status {
        record.status = ActiveValue::Set(status.to_string());
    }
    if completed_at.is_some() {
        record.completed_at = ActiveValue::Set(completed_at);
    }
    record
        .update(db)
        .await
        .map(|_| ())
        .context(format!("Error updating run {}", id))
}

pub async fn fetch(id: &str, db: &DatabaseConnection) -> anyhow::Result<Option<run::Model>> {
    run::Entity::find_by_id(id)
        .one(db)
        .await
        .context(format!("Error fetching run with id {}", id))
}

pub async fn fetch_all(db: &DatabaseConnection) -> anyhow::Result<Vec<run::Model>> {
    run::Entity::find()
        .order_by_desc(run::Column::StartedAt)
        .all(db)
        .await
        .context("Error fetching runs")
}

pub async fn fetch_running(db: &DatabaseConnection) -> anyhow::Result<Vec<run::Model>> {
    run::Entity::find()
        .filter(run::Column::Status.eq(STATUS_RUNNING))
        .all(db)
        .await
        .context("Error fetching running runs")
}
