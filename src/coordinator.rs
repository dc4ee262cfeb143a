use crate::{
    dao::{self, run::STATUS_COMPLETED, run::STATUS_FAILED, run::STATUS_RUNNING},
    entities::{result, run},
    orchestrator::{LoadedModelInfo, Orchestrator},
    runner::{self, IterationProgress, IterationProgressFn},
    sampler::{self, Sampler},
    status::StatusRegistry,
    suite::{RunConfig, Suite},
};
use anyhow::Context;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Audit log entity type used for run-scoped entries.
pub const ENTITY_BENCHMARK: &str = "benchmark";

#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Descriptor ids, in execution order.
    pub model_ids: Vec<String>,
    pub suite_name: String,
    pub suite: Suite,
    pub config: RunConfig,
}

/// Progress notifications emitted while a run executes.
#[derive(Debug, Clone)]
pub enum RunProgress {
    Iteration(IterationProgress),
    Task {
        run_id: String,
        completed: u32,
        total: u32,
        percent: u8,
    },
}

pub type RunProgressFn = Arc<dyn Fn(RunProgress) + Send + Sync>;

/// Drives whole benchmark runs across the (model × scenario) matrix and owns
/// every status transition of a run record. Background submissions are
/// serialized through a single permit: the orchestrator's model cache and
/// the backend itself fit one run at a time.
pub struct RunCoordinator {
    db: DatabaseConnection,
    orchestrator: Arc<Orchestrator>,
    registry: StatusRegistry,
    run_slot: Semaphore,
}

impl RunCoordinator {
    pub fn new(
        db: DatabaseConnection,
        orchestrator: Arc<Orchestrator>,
        registry: StatusRegistry,
    ) -> Self {
        RunCoordinator {
            db,
            orchestrator,
            registry,
            run_slot: Semaphore::new(1),
        }
    }

    pub fn registry(&self) -> &StatusRegistry {
        &self.registry
    }

    /// Start a run. With `return_immediately` the run id is handed back at
    /// once and a background task drives the run to its terminal status;
    /// otherwise the call resolves when the run does.
    pub async fn start_run(
        self: &Arc<Self>,
        request: RunRequest,
        progress: Option<RunProgressFn>,
        return_immediately: bool,
    ) -> anyhow::Result<String> {
        request.config.validate()?;

        let run_id = Uuid::new_v4().to_string();
        self.registry.publish(&run_id, STATUS_RUNNING, 0, None);

        if return_immediately {
            let coordinator = Arc::clone(self);
            let task_run_id = run_id.clone();
            tokio::spawn(async move {
                if let Err(err) = coordinator.execute(&task_run_id, request, progress).await {
                    error!("background run {} failed: {:#}", task_run_id, err);
                }
            });
            return Ok(run_id);
        }

        self.execute(&run_id, request, progress).await?;
        Ok(run_id)
    }

    /// Run the state machine and guarantee a terminal transition: any error
    /// escaping the drive loop marks the run `failed`, lands in the status
    /// registry, and is rethrown.
    async fn execute(
        &self,
        run_id: &str,
        request: RunRequest,
        progress: Option<RunProgressFn>,
    ) -> anyhow::Result<()> {
        let _permit = self
            .run_slot
            .acquire()
            .await
            .context("run coordinator permit closed")?;

        match self.drive(run_id, &request, progress).await {
            Ok(()) => {
                info!("run {} completed", run_id);
                Ok(())
            }
            Err(err) => {
                let message = format!("{:#}", err);
                let stamp = Utc::now().timestamp_millis();
                if let Err(update_err) =
                    dao::run::update(run_id, Some(STATUS_FAILED), Some(stamp), &self.db).await
                {
                    warn!(
                        "could not mark run {} as failed: {:#}",
                        run_id, update_err
                    );
                }
                let reached = self
                    .registry
                    .get(run_id)
                    .map(|state| state.progress)
                    .unwrap_or(0);
                self.registry
                    .publish(run_id, STATUS_FAILED, reached, Some(message));
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        run_id: &str,
        request: &RunRequest,
        progress: Option<RunProgressFn>,
    ) -> anyhow::Result<()> {
        let hardware = sampler::hardware_info().await;
        dao::run::save(
            run::Model {
                id: run_id.to_string(),
                suite_name: request.suite_name.clone(),
                model_ids: serde_json::to_value(&request.model_ids)?,
                config: serde_json::to_value(&request.config)?,
                hardware_info: serde_json::to_value(&hardware)?,
                status: STATUS_RUNNING.to_string(),
                started_at: Utc::now().timestamp_millis(),
                completed_at: None,
            },
            &self.db,
        )
        .await?;

        let total_tasks = (request.model_ids.len() * request.suite.scenarios.len()) as u32;
        let mut completed_tasks = 0u32;
        let mut sampler = Sampler::new();

        let iteration_progress: Option<IterationProgressFn> = progress.clone().map(|cb| {
            Arc::new(move |p: IterationProgress| cb(RunProgress::Iteration(p)))
                as IterationProgressFn
        });

        for descriptor_id in &request.model_ids {
            let ready = self.ensure_ready(run_id, descriptor_id).await?;
            if ready.is_none() {
                // The model's scenario slots still count as attempted so the
                // run can reach 100% despite the skip.
                completed_tasks += request.suite.scenarios.len() as u32;
                self.publish_task_progress(run_id, completed_tasks, total_tasks, &progress);
                continue;
            }

            for scenario in &request.suite.scenarios {
                let outcome = runner::run_scenario(
                    &self.orchestrator,
                    &mut sampler,
                    descriptor_id,
                    scenario,
                    &request.config,
                    iteration_progress.as_ref(),
                )
                .await;

                match outcome {
                    Err(err) => {
                        dao::log::append(
                            ENTITY_BENCHMARK,
                            run_id,
                            "error",
                            &format!(
                                "scenario {} failed on model {}: {:#}",
                                scenario.name, descriptor_id, err
                            ),
                            None,
                            &self.db,
                        )
                        .await?;
                    }
                    Ok(outcome) => {
                        let result_id = Uuid::new_v4().to_string();
                        let aggregate = outcome.aggregate;
                        dao::result::save(
                            result::Model {
                                id: result_id.clone(),
                                run_id: run_id.to_string(),
                                model_id: descriptor_id.clone(),
                                scenario: scenario.name.clone(),
                                tps: aggregate.tps,
                                ttft: aggregate.ttft,
                                tpot: aggregate.tpot,
                                gen_tps: aggregate.gen_tps,
                                latency_p50: aggregate.latency_p50,
                                latency_p95: aggregate.latency_p95,
                                latency_p99: aggregate.latency_p99,
                                error_rate: aggregate.error_rate,
                                timeout_rate: aggregate.timeout_rate,
                                cpu_avg: aggregate.cpu_avg,
                                ram_avg: aggregate.ram_avg,
                                gpu_avg: aggregate.gpu_avg,
                                total_tokens: aggregate.total_tokens,
                                total_iterations: aggregate.total_iterations,
                                successful_iterations: aggregate.successful_iterations,
                                raw_data: serde_json::to_value(&outcome.raw)?,
                                created_at: Utc::now().timestamp_millis(),
                            },
                            &self.db,
                        )
                        .await?;

                        dao::log::append(
                            ENTITY_BENCHMARK,
                            run_id,
                            "info",
                            &format!(
                                "scenario {} on model {} finished",
                                scenario.name, descriptor_id
                            ),
                            Some(serde_json::json!({ "result_id": result_id })),
                            &self.db,
                        )
                        .await?;
                    }
                }

                completed_tasks += 1;
                self.publish_task_progress(run_id, completed_tasks, total_tasks, &progress);
            }
        }

        dao::run::update(
            run_id,
            Some(STATUS_COMPLETED),
            Some(Utc::now().timestamp_millis()),
            &self.db,
        )
        .await?;
        self.registry.publish(run_id, STATUS_COMPLETED, 100, None);
        Ok(())
    }

    /// Get a model ready for inference: load it if the cache has no entry,
    /// then probe its health with exactly one reload retry. Returns None to
    /// skip the model; only repository failures escape.
    async fn ensure_ready(
        &self,
        run_id: &str,
        descriptor_id: &str,
    ) -> anyhow::Result<Option<LoadedModelInfo>> {
        let Some(descriptor) = dao::model::fetch(descriptor_id, &self.db).await? else {
            dao::log::append(
                ENTITY_BENCHMARK,
                run_id,
                "error",
                &format!("model {} is not registered, skipping", descriptor_id),
                None,
                &self.db,
            )
            .await?;
            return Ok(None);
        };

        let model_ref = if descriptor.model_id.is_empty() {
            descriptor.alias.clone()
        } else {
            descriptor.model_id.clone()
        };

        let loaded = match self.orchestrator.get_loaded(descriptor_id).await {
            Some(loaded) => loaded,
            None => match self.orchestrator.load(descriptor_id, &model_ref).await {
                Ok(loaded) => loaded,
                Err(err) => {
                    dao::log::append(
                        ENTITY_BENCHMARK,
                        run_id,
                        "error",
                        &format!("load of model {} failed: {:#}", descriptor.alias, err),
                        None,
                        &self.db,
                    )
                    .await?;
                    return Ok(None);
                }
            },
        };

        let health = self.orchestrator.check_health(descriptor_id, &loaded.id).await;
        if health.healthy {
            return Ok(Some(loaded));
        }

        // The one built-in retry: reload once, then re-probe.
        warn!(
            "model {} unhealthy ({:?}), attempting reload",
            descriptor.alias, health.error
        );
        self.orchestrator.unload(descriptor_id, &loaded.id).await?;
        let reloaded = match self.orchestrator.load(descriptor_id, &model_ref).await {
            Ok(loaded) => loaded,
            Err(err) => {
                dao::log::append(
                    ENTITY_BENCHMARK,
                    run_id,
                    "error",
                    &format!("reload of model {} failed: {:#}", descriptor.alias, err),
                    None,
                    &self.db,
                )
                .await?;
                return Ok(None);
            }
        };

        let health = self.orchestrator.check_health(descriptor_id, &reloaded.id).await;
        if health.healthy {
            return Ok(Some(reloaded));
        }

        dao::log::append(
            ENTITY_BENCHMARK,
            run_id,
            "error",
            &format!(
                "model {} still unhealthy after reload, skipping: {}",
                descriptor.alias,
                health.error.unwrap_or_default()
            ),
            None,
            &self.db,
        )
        .await?;
        Ok(None)
    }

    fn publish_task_progress(
        &self,
        run_id: &str,
        completed: u32,
        total: u32,
        progress: &Option<RunProgressFn>,
    ) {
        // 100 is reserved for the terminal publish: it may only appear in
        // the registry once the completed status has been durably written.
        let percent = percent(completed, total).min(99);
        self.registry.publish(run_id, STATUS_RUNNING, percent, None);
        if let Some(cb) = progress {
            cb(RunProgress::Task {
                run_id: run_id.to_string(),
                completed,
                total,
                percent,
            });
        }
    }
}

/// Mark any `running` run with no live registry entry as failed. A restarted
/// process cannot resume a run, so leaving the record open would misreport.
pub async fn sweep_orphaned_runs(
    db: &DatabaseConnection,
    registry: &StatusRegistry,
) -> anyhow::Result<usize> {
    let mut swept = 0;
    for orphan in dao::run::fetch_running(db).await? {
        if registry.contains(&orphan.id) {
            continue;
        }
        dao::run::update(
            &orphan.id,
            Some(STATUS_FAILED),
            Some(Utc::now().timestamp_millis()),
            db,
        )
        .await?;
        dao::log::append(
            ENTITY_BENCHMARK,
            &orphan.id,
            "warn",
            "run was left in running state by a previous process, marked failed",
            None,
            db,
        )
        .await?;
        swept += 1;
    }
    Ok(swept)
}

fn percent(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    (completed as f64 / total as f64 * 100.0).round() as u8
}
