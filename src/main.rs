use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use llmeter::{
    coordinator::{self, RunCoordinator, RunProgress, RunProgressFn, RunRequest},
    dao, db_connect, db_migrate,
    entities::model,
    orchestrator::Orchestrator,
    server::{self, AppState},
    settings::{self, Settings},
    status::StatusRegistry,
    suite::{self, RunConfig},
};
use std::{fs, io::Write, path::PathBuf, sync::Arc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const EXAMPLE_SUITE: &str = r#"name = "general"
description = "Mixed short and medium prompts for a first look at a model."

[[scenarios]]
name = "greeting"
prompt = "Hi! How are you today?"
max_tokens = 50
expected_output_length = "short"

[[scenarios]]
name = "summarize"
prompt = "Summarize the plot of Romeo and Juliet in three sentences."
max_tokens = 150
expected_output_length = "medium"

[[scenarios]]
name = "code"
prompt = "Write a Python function that reverses a linked list."
max_tokens = 200
expected_output_length = "medium"
"#;

#[derive(Parser, Debug)]
#[command(version, about = "Benchmark locally hosted LLM inference endpoints", long_about = None)]
struct Args {
    /// Verbose mode (-v, --verbose)
    #[arg(short, long)]
    verbose: bool,

    /// Path to the settings file
    #[arg(short, long, default_value = settings::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a benchmark suite against one or more models
    Run {
        /// Name of the suite to execute
        #[arg(short, long)]
        suite: String,

        /// Model aliases or descriptor ids, comma separated
        #[arg(short, long, value_delimiter = ',', required = true)]
        models: Vec<String>,

        /// Repetitions per scenario
        #[arg(long)]
        iterations: Option<u32>,

        /// Per-iteration wall-clock budget in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Sampling temperature
        #[arg(long)]
        temperature: Option<f64>,

        /// Request complete responses instead of token streams
        #[arg(long)]
        no_stream: bool,

        /// Limit the run to the named scenarios, comma separated
        #[arg(long, value_delimiter = ',')]
        scenarios: Vec<String>,
    },

    /// Start the HTTP API server
    Serve {
        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write a default llmeter.toml and an example suite
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let settings = Settings::from_path(&args.config)?;
    init_tracing(&settings, args.verbose);

    match args.command {
        Commands::Run {
            suite,
            models,
            iterations,
            timeout_ms,
            temperature,
            no_stream,
            scenarios,
        } => {
            let mut config = RunConfig {
                pause_ms: settings.pause_ms(),
                ..RunConfig::default()
            };
            if let Some(iterations) = iterations {
                config.iterations = iterations;
            }
            if let Some(timeout_ms) = timeout_ms {
                config.timeout_ms = timeout_ms;
            }
            if let Some(temperature) = temperature {
                config.temperature = temperature;
            }
            config.streaming = !no_stream;
            config.validate().map_err(anyhow::Error::new)?;

            cmd_run(settings, suite, models, scenarios, config).await
        }

        Commands::Serve { port } => {
            let port = port.unwrap_or_else(|| settings.port());
            cmd_serve(settings, port).await
        }

        Commands::Init => cmd_init(&args.config),
    }
}

async fn cmd_run(
    settings: Settings,
    suite_name: String,
    model_refs: Vec<String>,
    selected_scenarios: Vec<String>,
    config: RunConfig,
) -> anyhow::Result<()> {
    let db = db_connect(&settings.database_url()).await?;
    db_migrate(&db).await?;

    let registry = StatusRegistry::new();
    let swept = coordinator::sweep_orphaned_runs(&db, &registry).await?;
    if swept > 0 {
        warn!("swept {} orphaned running run(s) to failed", swept);
    }

    print!("> connecting to backend at {}", settings.backend_url());
    std::io::stdout().flush()?;
    let orchestrator = Arc::new(Orchestrator::new(&settings.backend_url(), db.clone()));
    orchestrator.initialize().await?;
    println!("{}", "\t✓".green());

    let suite = suite::find_suite(&settings.suites_dir(), &suite_name)?
        .context(format!("suite {} not found", suite_name))?
        .select(&selected_scenarios);
    anyhow::ensure!(
        !suite.scenarios.is_empty(),
        "selection matches no scenarios in suite {}",
        suite_name
    );

    // resolve the given references to descriptors, registering on the fly
    let mut descriptor_ids = vec![];
    for reference in &model_refs {
        let descriptor = match dao::model::fetch_by_alias(reference, &db).await? {
            Some(descriptor) => descriptor,
            None => match dao::model::fetch(reference, &db).await? {
                Some(descriptor) => descriptor,
                None => {
                    println!("> registering model {}", reference.green());
                    dao::model::save(
                        model::Model {
                            id: Uuid::new_v4().to_string(),
                            alias: reference.clone(),
                            model_id: reference.clone(),
                            status: dao::model::STATUS_STOPPED.to_string(),
                            endpoint: None,
                            last_error: None,
                            last_heartbeat: None,
                        },
                        &db,
                    )
                    .await?
                }
            },
        };
        descriptor_ids.push(descriptor.id);
    }

    let coordinator = Arc::new(RunCoordinator::new(
        db.clone(),
        orchestrator.clone(),
        registry,
    ));

    let progress: RunProgressFn = Arc::new(|update| match update {
        RunProgress::Iteration(it) => {
            println!(
                "> running scenario {} - iteration {}/{}",
                it.scenario.green(),
                it.iteration,
                it.total
            );
        }
        RunProgress::Task {
            completed,
            total,
            percent,
            ..
        } => {
            println!(
                "{}",
                format!("  {}/{} pairs complete ({}%)", completed, total, percent).bright_black()
            );
        }
    });

    let request = RunRequest {
        model_ids: descriptor_ids,
        suite_name,
        suite,
        config,
    };

    let run_id = tokio::select! {
        outcome = coordinator.start_run(request, Some(progress), false) => outcome?,
        _ = tokio::signal::ctrl_c() => {
            println!();
            orchestrator.shutdown().await;
            std::process::exit(0);
        }
    };

    println!("\n{}", " Summary ".reversed().green());
    for result in dao::result::fetch_by_run(&run_id, &db).await? {
        let alias = match dao::model::fetch(&result.model_id, &db).await? {
            Some(descriptor) => descriptor.alias,
            None => result.model_id.clone(),
        };
        println!("{}:", format!("{} / {}", alias, result.scenario).green());
        println!(
            "  tps {:.2}  ttft {}  tpot {}  p50 {:.0}ms  p95 {:.0}ms  p99 {:.0}ms  errors {:.0}%  timeouts {:.0}%",
            result.tps,
            result
                .ttft
                .map(|v| format!("{:.0}ms", v))
                .unwrap_or_else(|| "--".to_string()),
            result
                .tpot
                .map(|v| format!("{:.1}ms", v))
                .unwrap_or_else(|| "--".to_string()),
            result.latency_p50,
            result.latency_p95,
            result.latency_p99,
            result.error_rate,
            result.timeout_rate,
        );
    }
    println!("run id: {}", run_id);

    orchestrator.shutdown().await;
    Ok(())
}

async fn cmd_serve(settings: Settings, port: u16) -> anyhow::Result<()> {
    let db = db_connect(&settings.database_url()).await?;
    db_migrate(&db).await?;

    let registry = StatusRegistry::new();
    let swept = coordinator::sweep_orphaned_runs(&db, &registry).await?;
    if swept > 0 {
        warn!("swept {} orphaned running run(s) to failed", swept);
    }

    let orchestrator = Arc::new(Orchestrator::new(&settings.backend_url(), db.clone()));
    match orchestrator.initialize().await {
        Ok(endpoint) => info!("inference backend ready at {}", endpoint),
        // the API still serves registry and history when the backend is down
        Err(err) => warn!("inference backend not reachable yet: {:#}", err),
    }

    let coordinator = Arc::new(RunCoordinator::new(
        db.clone(),
        orchestrator.clone(),
        registry.clone(),
    ));

    let state = AppState {
        db,
        orchestrator,
        coordinator,
        registry,
        settings: Arc::new(settings),
    };

    server::serve(state, port).await
}

fn cmd_init(config_path: &PathBuf) -> anyhow::Result<()> {
    Settings::write_default(config_path)?;
    println!("> wrote {}", config_path.display().to_string().green());

    let suites_dir = PathBuf::from(settings::DEFAULT_SUITES_DIR);
    if !suites_dir.exists() {
        fs::create_dir_all(&suites_dir)?;
        fs::write(suites_dir.join("general.toml"), EXAMPLE_SUITE)?;
        println!("> wrote {}", "suites/general.toml".green());
    }

    Ok(())
}

fn init_tracing(settings: &Settings, verbose: bool) {
    let level = settings.log_level(verbose);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}
