use crate::{
    error::BenchError,
    inference::{InferenceRequest, IterationMetrics},
    orchestrator::Orchestrator,
    sampler::{ResourceSample, Sampler},
    stats,
    suite::{RunConfig, Scenario},
};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::debug;

/// Per-iteration progress notification emitted to the coordinator.
#[derive(Debug, Clone)]
pub struct IterationProgress {
    pub descriptor_id: String,
    pub scenario: String,
    pub iteration: u32,
    pub total: u32,
}

pub type IterationProgressFn = Arc<dyn Fn(IterationProgress) + Send + Sync>;

/// One iteration's full record: timing plus the resource samples taken
/// around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub metrics: IterationMetrics,
    pub resources_before: ResourceSample,
    pub resources_after: ResourceSample,
}

/// Raw per-iteration payload persisted alongside the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawData {
    pub iterations: Vec<IterationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
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
}

pub struct ScenarioOutcome {
    pub aggregate: Aggregate,
    pub raw: RawData,
}

/// Execute one (model, scenario) pair: N sequential timed iterations with
/// resource samples around each. Individual iteration failures are absorbed
/// into the aggregate; only an unresolvable model fails the scenario.
pub async fn run_scenario(
    orchestrator: &Orchestrator,
    sampler: &mut Sampler,
    descriptor_id: &str,
    scenario: &Scenario,
    config: &RunConfig,
    progress: Option<&IterationProgressFn>,
) -> anyhow::Result<ScenarioOutcome> {
    let loaded = orchestrator
        .get_loaded(descriptor_id)
        .await
        .ok_or_else(|| BenchError::ModelNotReady(descriptor_id.to_string()))?;
    let client = orchestrator.get_client();

    let mut records = Vec::with_capacity(config.iterations as usize);
    for iteration in 1..=config.iterations {
        let resources_before = sampler.sample().await;

        // The model identifier on the wire is the backend-canonical id from
        // LoadedModelInfo, never the descriptor's alias.
        let metrics = client
            .infer(InferenceRequest {
                model: &loaded.id,
                prompt: &scenario.prompt,
                max_tokens: scenario.max_tokens,
                temperature: config.temperature,
                timeout: Duration::from_millis(config.timeout_ms),
                streaming: config.streaming,
            })
            .await;

        let resources_after = sampler.sample().await;

        debug!(
            "scenario {} iteration {}/{}: {:.0}ms, {} tokens, ok={}",
            scenario.name,
            iteration,
            config.iterations,
            metrics.latency_ms,
            metrics.tokens,
            metrics.succeeded()
        );

        records.push(IterationRecord {
            iteration,
            metrics,
            resources_before,
            resources_after,
        });

        if let Some(progress) = progress {
            progress(IterationProgress {
                descriptor_id: descriptor_id.to_string(),
                scenario: scenario.name.clone(),
                iteration,
                total: config.iterations,
            });
        }

        // Settle pause so the backend quiesces before the next measurement.
        if iteration < config.iterations {
            tokio::time::sleep(Duration::from_millis(config.pause_ms)).await;
        }
    }

    let aggregate = aggregate(&records);
    Ok(ScenarioOutcome {
        aggregate,
        raw: RawData { iterations: records },
    })
}

/// Derive the aggregate statistics from the per-iteration records.
pub fn aggregate(records: &[IterationRecord]) -> Aggregate {
    let total_iterations = records.len();
    let successful: Vec<&IterationRecord> =
        records.iter().filter(|r| r.metrics.succeeded()).collect();
    let timeouts = records.iter().filter(|r| r.metrics.timeout).count();
    let errors = records
        .iter()
        .filter(|r| r.metrics.error.is_some() && !r.metrics.timeout)
        .count();

    let mut latencies: Vec<f64> = successful.iter().map(|r| r.metrics.latency_ms).collect();
    latencies.sort_by(|a, b| a.total_cmp(b));

    let ttfts: Vec<f64> = successful
        .iter()
        .filter_map(|r| r.metrics.ttft_ms)
        .collect();

    let delays: Vec<f64> = successful
        .iter()
        .flat_map(|r| r.metrics.inter_token_delays_ms.iter().copied())
        .collect();

    let total_tokens: i64 = successful.iter().map(|r| r.metrics.tokens as i64).sum();
    let total_latency_s: f64 = latencies.iter().sum::<f64>() / 1000.0;
    let tps = if total_latency_s > 0.0 {
        total_tokens as f64 / total_latency_s
    } else {
        0.0
    };

    let tpot = stats::mean(&delays);
    let gen_tps = match tpot {
        Some(tpot) if tpot > 0.0 => Some(1000.0 / tpot),
        _ => None,
    };

    Aggregate {
        tps,
        ttft: stats::median(&ttfts),
        tpot,
        gen_tps,
        latency_p50: stats::percentile(&latencies, 50.0),
        latency_p95: stats::percentile(&latencies, 95.0),
        latency_p99: stats::percentile(&latencies, 99.0),
        error_rate: rate(errors, total_iterations),
        timeout_rate: rate(timeouts, total_iterations),
        cpu_avg: full_denominator_avg(records, |s| s.cpu),
        ram_avg: full_denominator_avg(records, |s| s.ram),
        gpu_avg: present_only_avg(records, |s| s.gpu),
        total_tokens,
        total_iterations: total_iterations as i32,
        successful_iterations: successful.len() as i32,
    }
}

fn rate(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    count as f64 / total as f64 * 100.0
}

/// Mean over the post-iteration samples with the full iteration count as
/// denominator. Null samples are dropped from the numerator only, which
/// biases the value downward but keeps it comparable across runs on the
/// same host.
fn full_denominator_avg(
    records: &[IterationRecord],
    pick: fn(&ResourceSample) -> Option<f64>,
) -> Option<f64> {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| pick(&r.resources_after))
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / records.len() as f64)
}

/// Mean over non-null samples only. GPU samples are absent on most hosts, so
/// counting nulls in the denominator would drown the signal.
fn present_only_avg(
    records: &[IterationRecord],
    pick: fn(&ResourceSample) -> Option<f64>,
) -> Option<f64> {
    let values: Vec<f64> = records
        .iter()
        .filter_map(|r| pick(&r.resources_after))
        .collect();
    stats::mean(&values)
}
