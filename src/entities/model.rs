use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A configured model known to the system. `model_id` is the identifier the
/// inference backend expects and may carry a device-variant suffix.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "model")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub alias: String,
    pub model_id: String,
    pub status: String,
    pub endpoint: Option<String>,
    pub last_error: Option<String>,
    pub last_heartbeat: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
