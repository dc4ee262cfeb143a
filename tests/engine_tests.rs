mod common;

use anyhow::Context;
use common::{canonical_id, spawn_backend, MockBackend};
use llmeter::{
    coordinator::{sweep_orphaned_runs, RunCoordinator, RunRequest},
    dao, db_connect, db_migrate,
    entities::{model, run},
    inference::{InferenceClient, InferenceRequest, TIMEOUT_SENTINEL},
    orchestrator::Orchestrator,
    runner,
    sampler::Sampler,
    status::StatusRegistry,
    suite::{RunConfig, Scenario, Suite},
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

struct Harness {
    db: DatabaseConnection,
    backend: MockBackend,
    orchestrator: Arc<Orchestrator>,
    coordinator: Arc<RunCoordinator>,
    registry: StatusRegistry,
}

async fn harness() -> anyhow::Result<Harness> {
    let db = db_connect("sqlite::memory:").await?;
    db_migrate(&db).await?;

    let backend = spawn_backend().await;
    let registry = StatusRegistry::new();
    let orchestrator = Arc::new(Orchestrator::new(&backend.url, db.clone()));
    let coordinator = Arc::new(RunCoordinator::new(
        db.clone(),
        orchestrator.clone(),
        registry.clone(),
    ));

    Ok(Harness {
        db,
        backend,
        orchestrator,
        coordinator,
        registry,
    })
}

async fn register(db: &DatabaseConnection, alias: &str) -> anyhow::Result<model::Model> {
    dao::model::save(
        model::Model {
            id: Uuid::new_v4().to_string(),
            alias: alias.to_string(),
            model_id: format!("{}-cpu:1", alias),
            status: dao::model::STATUS_STOPPED.to_string(),
            endpoint: None,
            last_error: None,
            last_heartbeat: None,
        },
        db,
    )
    .await
}

fn scenario(name: &str) -> Scenario {
    Scenario {
        name: name.to_string(),
        prompt: "Hi".to_string(),
        max_tokens: 20,
        expected_output_length: None,
    }
}

fn suite_of(names: &[&str]) -> Suite {
    Suite {
        name: "test-suite".to_string(),
        description: String::new(),
        scenarios: names.iter().map(|n| scenario(n)).collect(),
    }
}

fn fast_config(iterations: u32, streaming: bool) -> RunConfig {
    RunConfig {
        iterations,
        timeout_ms: 10_000,
        temperature: 0.7,
        streaming,
        pause_ms: 1,
    }
}

// S1: single model, single scenario, streaming, all iterations succeed.
#[tokio::test]
async fn streaming_run_produces_token_time_decomposition() -> anyhow::Result<()> {
    let h = harness().await?;
    let descriptor = register(&h.db, "tiny").await?;

    let run_id = h
        .coordinator
        .start_run(
            RunRequest {
                model_ids: vec![descriptor.id.clone()],
                suite_name: "test-suite".to_string(),
                suite: suite_of(&["greeting"]),
                config: fast_config(3, true),
            },
            None,
            false,
        )
        .await?;

    let record = dao::run::fetch(&run_id, &h.db)
        .await?
        .context("run should be persisted")?;
    assert_eq!(record.status, dao::run::STATUS_COMPLETED);
    assert!(record.completed_at.context("terminal run has completed_at")? >= record.started_at);

    let state = h.registry.get(&run_id).context("registry entry retained")?;
    assert_eq!(state.status, dao::run::STATUS_COMPLETED);
    assert_eq!(state.progress, 100);

    let results = dao::result::fetch_by_run(&run_id, &h.db).await?;
    assert_eq!(results.len(), 1);
    let result = &results[0];

    assert_eq!(result.total_iterations, 3);
    assert_eq!(result.successful_iterations, 3);
    assert_eq!(result.error_rate, 0.0);
    assert_eq!(result.timeout_rate, 0.0);
    assert_eq!(result.total_tokens, 15);

    // backend pacing: 50ms ttft, 20ms inter-token delay, 5 tokens
    let ttft = result.ttft.context("streaming run has ttft")?;
    assert!((45.0..200.0).contains(&ttft), "ttft was {}", ttft);
    let tpot = result.tpot.context("streaming run has tpot")?;
    assert!((15.0..80.0).contains(&tpot), "tpot was {}", tpot);
    let gen_tps = result.gen_tps.context("streaming run has gen_tps")?;
    assert!((gen_tps - 1000.0 / tpot).abs() < 1e-9);

    // latency ≈ 50 + 4×20 = 130ms plus transport overhead
    assert!(result.latency_p50 >= 120.0);
    assert!(result.latency_p50 <= result.latency_p95);
    assert!(result.latency_p95 <= result.latency_p99);
    assert!(result.latency_p99 < 1_000.0);
    assert!(result.tps > 0.0);
    Ok(())
}

// Invariant: the identifier on the wire is LoadedModelInfo.id, never the
// alias or the raw model_id.
#[tokio::test]
async fn inference_uses_the_backend_canonical_identifier() -> anyhow::Result<()> {
    let h = harness().await?;
    let descriptor = register(&h.db, "friendly").await?;

    h.coordinator
        .start_run(
            RunRequest {
                model_ids: vec![descriptor.id.clone()],
                suite_name: "test-suite".to_string(),
                suite: suite_of(&["greeting"]),
                config: fast_config(2, true),
            },
            None,
            false,
        )
        .await?;

    let seen = h.backend.state.inference_models.lock().unwrap().clone();
    assert!(!seen.is_empty());
    let expected = canonical_id(&descriptor.model_id);
    for model_ref in &seen {
        assert_eq!(model_ref, &expected);
        assert_ne!(model_ref, &descriptor.alias);
        assert_ne!(model_ref, &descriptor.model_id);
    }
    Ok(())
}

// S2: one healthy model, one that stays unhealthy through the reload retry.
#[tokio::test]
async fn unhealthy_model_is_skipped_and_run_still_completes() -> anyhow::Result<()> {
    let h = harness().await?;
    let healthy = register(&h.db, "healthy").await?;
    let sick = register(&h.db, "sick").await?;

    {
        let mut behavior = h.backend.state.behavior.lock().unwrap();
        behavior.ttft = Duration::from_millis(5);
        behavior.inter_token_delay = Duration::from_millis(2);
    }
    h.backend
        .state
        .unhealthy
        .lock()
        .unwrap()
        .insert(canonical_id(&sick.model_id));

    let run_id = h
        .coordinator
        .start_run(
            RunRequest {
                model_ids: vec![healthy.id.clone(), sick.id.clone()],
                suite_name: "test-suite".to_string(),
                suite: suite_of(&["s1", "s2"]),
                config: fast_config(2, true),
            },
            None,
            false,
        )
        .await?;

    let record = dao::run::fetch(&run_id, &h.db)
        .await?
        .context("run should be persisted")?;
    assert_eq!(record.status, dao::run::STATUS_COMPLETED);

    // only the healthy model produced results, one per scenario
    let results = dao::result::fetch_by_run(&run_id, &h.db).await?;
    assert_eq!(results.len(), 2);
    for result in &results {
        assert_eq!(result.model_id, healthy.id);
    }

    // skipping still drives progress to 100
    assert_eq!(h.registry.get(&run_id).unwrap().progress, 100);

    // and the skip is audited at error level
    let logs = dao::log::fetch("benchmark", &run_id, 100, &h.db).await?;
    assert!(logs
        .iter()
        .any(|entry| entry.level == "error" && entry.message.contains("sick")));
    Ok(())
}

// S3, per-iteration half: a hanging backend turns every iteration into a
// timeout and the aggregate degrades to zeroes.
#[tokio::test]
async fn hanging_backend_times_out_every_iteration() -> anyhow::Result<()> {
    let h = harness().await?;
    let descriptor = register(&h.db, "stuck").await?;
    h.backend.state.behavior.lock().unwrap().hang = true;

    h.orchestrator
        .load(&descriptor.id, &descriptor.model_id)
        .await?;

    let config = RunConfig {
        iterations: 3,
        timeout_ms: 40,
        temperature: 0.7,
        streaming: true,
        pause_ms: 1,
    };
    let mut sampler = Sampler::new();
    let outcome = runner::run_scenario(
        &h.orchestrator,
        &mut sampler,
        &descriptor.id,
        &scenario("greeting"),
        &config,
        None,
    )
    .await?;

    let agg = outcome.aggregate;
    assert_eq!(agg.timeout_rate, 100.0);
    assert_eq!(agg.error_rate, 0.0);
    assert_eq!(agg.successful_iterations, 0);
    assert_eq!(agg.total_iterations, 3);
    assert_eq!(agg.tps, 0.0);
    assert_eq!(agg.latency_p50, 0.0);
    assert_eq!(agg.latency_p95, 0.0);
    assert_eq!(agg.latency_p99, 0.0);
    assert_eq!(agg.ttft, None);
    assert_eq!(agg.tpot, None);
    assert_eq!(agg.gen_tps, None);

    for record in &outcome.raw.iterations {
        assert!(record.metrics.timeout);
        assert_eq!(record.metrics.error.as_deref(), Some(TIMEOUT_SENTINEL));
    }
    Ok(())
}

// S3, client half: the deadline cancels the request and stamps the sentinel.
#[tokio::test]
async fn inference_client_enforces_its_deadline() -> anyhow::Result<()> {
    let h = harness().await?;
    h.backend.state.behavior.lock().unwrap().hang = true;

    let client = InferenceClient::new(&h.backend.url);
    let metrics = client
        .infer(InferenceRequest {
            model: "any",
            prompt: "Hi",
            max_tokens: 10,
            temperature: 0.0,
            timeout: Duration::from_millis(1),
            streaming: true,
        })
        .await;

    assert!(metrics.timeout);
    assert_eq!(metrics.error.as_deref(), Some(TIMEOUT_SENTINEL));
    assert_eq!(metrics.tokens, 0);
    assert!(metrics.latency_ms < 5_000.0);
    Ok(())
}

// S4: non-streaming runs take the token count from reported usage and carry
// no token-time fields.
#[tokio::test]
async fn non_streaming_run_reports_usage_tokens() -> anyhow::Result<()> {
    let h = harness().await?;
    let descriptor = register(&h.db, "plain").await?;
    {
        let mut behavior = h.backend.state.behavior.lock().unwrap();
        behavior.ttft = Duration::from_millis(5);
        behavior.inter_token_delay = Duration::from_millis(1);
        behavior.completion_tokens = 42;
    }

    let run_id = h
        .coordinator
        .start_run(
            RunRequest {
                model_ids: vec![descriptor.id.clone()],
                suite_name: "test-suite".to_string(),
                suite: suite_of(&["greeting"]),
                config: fast_config(2, false),
            },
            None,
            false,
        )
        .await?;

    let results = dao::result::fetch_by_run(&run_id, &h.db).await?;
    assert_eq!(results.len(), 1);
    let result = &results[0];

    assert_eq!(result.ttft, None);
    assert_eq!(result.tpot, None);
    assert_eq!(result.gen_tps, None);
    assert_eq!(result.total_tokens, 84);
    assert_eq!(result.successful_iterations, 2);
    assert!(result.tps > 0.0);
    Ok(())
}

// S5: a background submission is observable through the registry with
// monotonically non-decreasing progress.
#[tokio::test]
async fn background_run_reports_monotonic_progress() -> anyhow::Result<()> {
    let h = harness().await?;
    let descriptor = register(&h.db, "slowish").await?;
    {
        let mut behavior = h.backend.state.behavior.lock().unwrap();
        behavior.ttft = Duration::from_millis(40);
        behavior.inter_token_delay = Duration::from_millis(5);
        behavior.tokens_per_reply = 3;
    }

    let run_id = h
        .coordinator
        .start_run(
            RunRequest {
                model_ids: vec![descriptor.id.clone()],
                suite_name: "test-suite".to_string(),
                suite: suite_of(&["s1", "s2"]),
                config: fast_config(2, true),
            },
            None,
            true,
        )
        .await?;

    // visible to observers before any durable state lands
    let initial = h.registry.get(&run_id).context("registry entry exists")?;
    assert_eq!(initial.status, dao::run::STATUS_RUNNING);

    let mut observed = vec![initial.progress];
    let final_state = loop {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = h.registry.get(&run_id).context("registry entry retained")?;
        observed.push(state.progress);
        if state.status != dao::run::STATUS_RUNNING {
            break state;
        }
        // full progress is only ever visible together with a terminal status
        assert!(state.progress < 100);
    };

    assert_eq!(final_state.status, dao::run::STATUS_COMPLETED);
    assert_eq!(*observed.last().unwrap(), 100);
    assert!(observed.windows(2).all(|w| w[0] <= w[1]));

    let results = dao::result::fetch_by_run(&run_id, &h.db).await?;
    assert_eq!(results.len(), 2);
    Ok(())
}

// S6: CSV export of a finished run.
#[tokio::test]
async fn csv_export_of_a_run_is_deterministic() -> anyhow::Result<()> {
    let h = harness().await?;
    let descriptor = register(&h.db, "csvee").await?;
    {
        let mut behavior = h.backend.state.behavior.lock().unwrap();
        behavior.ttft = Duration::from_millis(5);
        behavior.inter_token_delay = Duration::from_millis(1);
    }

    let run_id = h
        .coordinator
        .start_run(
            RunRequest {
                model_ids: vec![descriptor.id.clone()],
                suite_name: "test-suite".to_string(),
                suite: suite_of(&["greeting", "summarize"]),
                config: fast_config(1, true),
            },
            None,
            false,
        )
        .await?;

    let csv = dao::export::export_run_csv(&run_id, &h.db).await?;
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 3);

    let header = lines[0];
    for field in [
        "tps",
        "ttft",
        "tpot",
        "gen_tps",
        "latency_p50",
        "latency_p95",
        "latency_p99",
        "error_rate",
        "timeout_rate",
        "total_iterations",
        "successful_iterations",
    ] {
        assert!(header.contains(field), "header misses {}", field);
    }
    assert!(!csv.contains("raw_data"));
    Ok(())
}

// load/load is one backend load; unload of a non-loaded model is a no-op.
#[tokio::test]
async fn load_is_idempotent_and_unload_is_tolerant() -> anyhow::Result<()> {
    let h = harness().await?;
    let descriptor = register(&h.db, "idem").await?;

    let first = h
        .orchestrator
        .load(&descriptor.id, &descriptor.model_id)
        .await?;
    let second = h
        .orchestrator
        .load(&descriptor.id, &descriptor.model_id)
        .await?;
    assert_eq!(first, second);
    assert_eq!(*h.backend.state.load_calls.lock().unwrap(), 1);

    let updated = dao::model::fetch(&descriptor.id, &h.db)
        .await?
        .context("descriptor exists")?;
    assert_eq!(updated.status, dao::model::STATUS_RUNNING);

    // unload twice, second one targets an already-absent model
    h.orchestrator.unload(&descriptor.id, &first.id).await?;
    h.orchestrator.unload(&descriptor.id, &first.id).await?;
    assert!(h.orchestrator.get_loaded(&descriptor.id).await.is_none());
    Ok(())
}

#[tokio::test]
async fn failed_load_marks_descriptor_and_skips_model() -> anyhow::Result<()> {
    let h = harness().await?;
    let descriptor = register(&h.db, "refused").await?;
    h.backend
        .state
        .fail_load
        .lock()
        .unwrap()
        .insert(descriptor.model_id.clone());

    let run_id = h
        .coordinator
        .start_run(
            RunRequest {
                model_ids: vec![descriptor.id.clone()],
                suite_name: "test-suite".to_string(),
                suite: suite_of(&["greeting"]),
                config: fast_config(1, true),
            },
            None,
            false,
        )
        .await?;

    // every model failed readiness: zero result rows, run still completed
    let record = dao::run::fetch(&run_id, &h.db).await?.context("run exists")?;
    assert_eq!(record.status, dao::run::STATUS_COMPLETED);
    assert!(dao::result::fetch_by_run(&run_id, &h.db).await?.is_empty());

    let updated = dao::model::fetch(&descriptor.id, &h.db)
        .await?
        .context("descriptor exists")?;
    assert_eq!(updated.status, dao::model::STATUS_ERROR);
    assert!(updated.last_error.is_some());
    Ok(())
}

#[tokio::test]
async fn orphaned_running_runs_are_swept_to_failed() -> anyhow::Result<()> {
    let db = db_connect("sqlite::memory:").await?;
    db_migrate(&db).await?;

    dao::run::save(
        run::Model {
            id: "orphan".to_string(),
            suite_name: "general".to_string(),
            model_ids: json!([]),
            config: json!({}),
            hardware_info: json!({}),
            status: dao::run::STATUS_RUNNING.to_string(),
            started_at: 1_000,
            completed_at: None,
        },
        &db,
    )
    .await?;

    let registry = StatusRegistry::new();
    let swept = sweep_orphaned_runs(&db, &registry).await?;
    assert_eq!(swept, 1);

    let record = dao::run::fetch("orphan", &db).await?.context("run exists")?;
    assert_eq!(record.status, dao::run::STATUS_FAILED);
    assert!(record.completed_at.is_some());

    let logs = dao::log::fetch("benchmark", "orphan", 10, &db).await?;
    assert!(logs.iter().any(|entry| entry.level == "warn"));

    // a second sweep finds nothing
    assert_eq!(sweep_orphaned_runs(&db, &registry).await?, 0);
    Ok(())
}
