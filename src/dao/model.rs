use crate::entities::model;
use anyhow::{self, Context};
use chrono::Utc;
use sea_orm::*;

pub const STATUS_STOPPED: &str = "stopped";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_ERROR: &str = "error";

/// Register a new model descriptor. The caller supplies the id.
pub async fn save(descriptor: model::Model, db: &DatabaseConnection) -> anyhow::Result<model::Model> {
    let alias = descriptor.alias.clone();
    model::ActiveModel {
        id: ActiveValue::Set(descriptor.id),
        alias: ActiveValue::Set(descriptor.alias),
        model_id: ActiveValue::Set(descriptor.model_id),
        status: ActiveValue::Set(descriptor.status),
        endpoint: ActiveValue::Set(descriptor.endpoint),
        last_error: ActiveValue::Set(descriptor.last_error),
        last_heartbeat: ActiveValue::Set(descriptor.last_heartbeat),
    }
    .insert(db)
    .await
    .context(format!("Error saving model descriptor {}", alias))
}

pub async fn fetch(id: &str, db: &DatabaseConnection) -> anyhow::Result<Option<model::Model>> {
    model::Entity::find_by_id(id)
        .one(db)
        .await
        .context(format!("Error fetching model with id {}", id))
}

pub async fn fetch_by_alias(
    alias: &str,
    db: &DatabaseConnection,
) -> anyhow::Result<Option<model::Model>> {
    model::Entity::find()
        .filter(model::Column::Alias.eq(alias))
        .one(db)
        .await
        .context(format!("Error fetching model with alias {}", alias))
}

pub async fn fetch_all(db: &DatabaseConnection) -> anyhow::Result<Vec<model::Model>> {
    model::Entity::find()
        .order_by_asc(model::Column::Alias)
        .all(db)
        .await
        .context("Error fetching model descriptors")
}

pub async fn delete(id: &str, db: &DatabaseConnection) -> anyhow::Result<()> {
    model::Entity::delete_by_id(id)
        .exec(db)
        .await
        .map(|_| ())
        .context(format!("Error deleting model with id {}", id))
}

/// Update the descriptor's last-known backend state. Every status observation
/// stamps `last_heartbeat`.
pub async fn update_status(
    id: &str,
    status: &str,
    endpoint: Option<String>,
    error: Option<String>,
    db: &DatabaseConnection,
) -> anyhow::Result<()> {
    let descriptor = model::Entity::find_by_id(id)
        .one(db)
        .await?
        .context(format!("Error fetching model with id {}", id))?;

    let mut descriptor = descriptor.into_active_model();
    descriptor.status = ActiveValue::Set(status.to_string());
    descriptor.endpoint = ActiveValue::Set(endpoint);
    descriptor.last_error = ActiveValue::Set(error);
    descriptor.last_heartbeat = ActiveValue::Set(Some(Utc::now().timestamp_millis()));
    descriptor
        .update(db)
        .await
        .map(|_| ())
        .context(format!("Error updating status of model {}", id))
}
