pub mod m20250614_101200_create_model_table;
pub mod m20250614_101210_create_run_table;
pub mod m20250614_101220_create_result_table;
pub mod m20250614_101230_create_log_table;

pub use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250614_101200_create_model_table::Migration),
            Box::new(m20250614_101210_create_run_table::Migration),
            Box::new(m20250614_101220_create_result_table::Migration),
            Box::new(m20250614_101230_create_log_table::Migration),
        ]
    }
}
