use crate::entities::log;
use anyhow::{self, Context};
use chrono::Utc;
use sea_orm::*;

/// The audit log is a ring: only the most recent entries are retained.
pub const RING_CAPACITY: u64 = 1_000;

pub async fn append(
    entity_type: &str,
    entity_id: &str,
    level: &str,
    message: &str,
    metadata: Option<serde_json::Value>,
    db: &DatabaseConnection,
) -> anyhow::Result<()> {
    log::ActiveModel {
        id: ActiveValue::NotSet,
        entity_type: ActiveValue::Set(entity_type.to_string()),
        entity_id: ActiveValue::Set(entity_id.to_string()),
        level: ActiveValue::Set(level.to_string()),
        message: ActiveValue::Set(message.to_string()),
        metadata: ActiveValue::Set(metadata),
        created_at: ActiveValue::Set(Utc::now().timestamp_millis()),
    }
    .insert(db)
    .await
    .context("Error appending log entry")?;

    db.execute(Statement::from_sql_and_values(
        DbBackend::Sqlite,
        "DELETE FROM log WHERE id NOT IN (SELECT id FROM log ORDER BY id DESC LIMIT ?)",
        [RING_CAPACITY.into()],
    ))
    .await
    .context("Error trimming log ring")?;

    Ok(())
}

/// Entries for one entity, newest first.
pub async fn fetch(
    entity_type: &str,
    entity_id: &str,
    limit: u64,
    db: &DatabaseConnection,
) -> anyhow::Result<Vec<log::Model>> {
    log::Entity::find()
        .filter(
            Condition::all()
                .add(log::Column::EntityType.eq(entity_type))
                .add(log::Column::EntityId.eq(entity_id)),
        )
        .order_by_desc(log::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .context(format!(
            "Error fetching logs for {} {}",
            entity_type, entity_id
        ))
}
