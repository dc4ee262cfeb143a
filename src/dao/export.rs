use crate::{dao, error::BenchError};
use anyhow::{self, Context};
use chrono::Utc;
use itertools::Itertools;
use sea_orm::DatabaseConnection;
use serde_json::json;

/// Column order of the CSV export. `raw_data` is deliberately absent.
const CSV_HEADER: [&str; 20] = [
    "id",
    "run_id",
    "model_id",
    "scenario",
    "tps",
    "ttft",
    "tpot",
    "gen_tps",
    "latency_p50",
    "latency_p95",
    "latency_p99",
    "error_rate",
    "timeout_rate",
    "cpu_avg",
    "ram_avg",
    "gpu_avg",
    "total_tokens",
    "total_iterations",
    "successful_iterations",
    "created_at",
];

pub async fn export_run_json(
    run_id: &str,
    db: &DatabaseConnection,
) -> anyhow::Result<serde_json::Value> {
    let run = dao::run::fetch(run_id, db)
        .await?
        .ok_or_else(|| BenchError::NotFound(format!("run {}", run_id)))?;
    let results = dao::result::fetch_by_run(run_id, db).await?;

    Ok(json!({
        "run": run,
        "results": results,
        "exported_at": Utc::now().timestamp_millis(),
    }))
}

pub async fn export_run_csv(run_id: &str, db: &DatabaseConnection) -> anyhow::Result<String> {
    let run = dao::run::fetch(run_id, db)
        .await?
        .ok_or_else(|| BenchError::NotFound(format!("run {}", run_id)))?;
    let results = dao::result::fetch_by_run(&run.id, db)
        .await
        .context(format!("Error exporting run {} to csv", run_id))?;

    let mut out = String::new();
    out.push_str(&CSV_HEADER.iter().join(","));
    out.push('\n');

    for row in results {
        let fields = [
            escape(&row.id),
            escape(&row.run_id),
            escape(&row.model_id),
            escape(&row.scenario),
            format_f64(Some(row.tps)),
            format_f64(row.ttft),
            format_f64(row.tpot),
            format_f64(row.gen_tps),
            format_f64(Some(row.latency_p50)),
            format_f64(Some(row.latency_p95)),
            format_f64(Some(row.latency_p99)),
            format_f64(Some(row.error_rate)),
            format_f64(Some(row.timeout_rate)),
            format_f64(row.cpu_avg),
            format_f64(row.ram_avg),
            format_f64(row.gpu_avg),
            row.total_tokens.to_string(),
            row.total_iterations.to_string(),
            row.successful_iterations.to_string(),
            row.created_at.to_string(),
        ];
        out.push_str(&fields.iter().join(","));
        out.push('\n');
    }

    Ok(out)
}

fn format_f64(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.4}", v),
        None => String::new(),
    }
}

/// Fields containing a comma, quote or newline are surrounded with double
/// quotes; embedded quotes are doubled.
fn escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
