pub mod coordinator;
pub mod dao;
pub mod entities;
pub mod error;
pub mod inference;
pub mod migrations;
pub mod orchestrator;
pub mod runner;
pub mod sampler;
pub mod server;
pub mod settings;
pub mod stats;
pub mod status;
pub mod suite;

use crate::migrations::{Migrator, MigratorTrait};
use anyhow::Context;
use sea_orm::{Database, DatabaseConnection};
use std::{fs, path::Path};

pub async fn db_connect(database_url: &str) -> anyhow::Result<DatabaseConnection> {
    let database_url = database_url.trim();

    // sqlite won't create the database file on its own
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if !Path::new(db_path).exists() {
            fs::File::create(db_path).context("unable to create sqlite database file.")?;
        }
    }

    Database::connect(database_url)
        .await
        .context(format!("Error connecting to database {}", database_url))
}

pub async fn db_migrate(db_conn: &DatabaseConnection) -> anyhow::Result<()> {
    Migrator::up(db_conn, None)
        .await
        .context("Error migrating database.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_database_connects_and_migrates() -> anyhow::Result<()> {
        let db = db_connect("sqlite::memory:").await?;
        db_migrate(&db).await?;
        Ok(())
    }
}
