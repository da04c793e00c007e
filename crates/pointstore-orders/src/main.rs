//! Pointstore Worker - order saga steps and the grid worker

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pointstore_common::logging::{init_logging, LogConfig};
use pointstore_common::storage::{config::StorageConfig, Storage};
use pointstore_common::types::{BBox, DatasetLabel};
use serde_json::{Map, Value};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Level};

use pointstore_orders::{
    config::Config,
    grid::{GridExecutor, GridWorker},
    query::{catalog_predicate, PointQuery},
    saga::{
        run_step, steps::submit::{submit_order, SubmitOrderCommand}, HttpCatalogClient,
        QueueNotifier, SagaContext, SqsQueue, StepFunctionsOrchestrator, StepRequest,
    },
    state::DynamoOrderStore,
};

#[derive(Parser, Debug)]
#[command(name = "pointstore-worker")]
#[command(author, version, about = "Bathymetry data-extract order worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate an extract request and start its saga
    Submit {
        /// Request JSON file (stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Run one saga step and print its JSON output
    Step {
        /// Step JSON file (stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Poll the grid queue until interrupted
    GridWorker,

    /// Print the queries an extract request would run, without side effects
    Query {
        /// Request JSON file (stdin if omitted)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let log_config = LogConfig::new("pointstore-worker", log_level)
        .with_filter("pointstore_orders=debug,pointstore_common=info,aws_config=warn");

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            None
        },
    };

    if let Err(e) = execute(cli.command).await {
        error!(error = %format!("{:#}", e), "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn execute(command: Command) -> Result<()> {
    let config = Config::load()?;

    match command {
        Command::Submit { input } => {
            let command: SubmitOrderCommand = serde_json::from_str(&read_input(input.as_deref())?)
                .context("Invalid extract request")?;
            let arn = config
                .saga
                .state_machine_arn
                .as_deref()
                .context("STATE_MACHINE_ARN is required to submit orders")?;
            let orchestrator = StepFunctionsOrchestrator::new(arn, &config.region).await;

            let response = submit_order(&orchestrator, command).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        },

        Command::Step { input } => {
            let ctx = saga_context(&config).await?;
            let request = StepRequest::from_json(&read_input(input.as_deref())?)?;

            match run_step(&ctx, request).await {
                Ok(output) => println!("{}", output),
                Err(e) => {
                    println!("{}", e.to_failure());
                    anyhow::bail!(e);
                },
            }
        },

        Command::GridWorker => {
            let worker = grid_worker(&config).await?;
            worker.run(shutdown_signal()).await;
        },

        Command::Query { input } => {
            let command: SubmitOrderCommand = serde_json::from_str(&read_input(input.as_deref())?)
                .context("Invalid extract request")?;
            let bbox = command.validate()?;
            let query = PointQuery::new(&config.query.database, &config.query.table)?;
            println!("{}", serde_json::to_string_pretty(&render_queries(&query, &bbox, &command))?);
        },
    }

    Ok(())
}

/// Statement or catalog predicate per requested dataset
fn render_queries(query: &PointQuery, bbox: &BBox, command: &SubmitOrderCommand) -> Value {
    let mut queries = Map::new();
    for filters in &command.datasets {
        let rendered = match filters.label {
            DatasetLabel::Csb => query.render(bbox, filters),
            DatasetLabel::Multibeam => catalog_predicate(filters),
        };
        queries.insert(filters.label.to_string(), Value::from(rendered));
    }
    Value::Object(queries)
}

async fn saga_context(config: &Config) -> Result<SagaContext> {
    let store = Arc::new(DynamoOrderStore::new(&config.store.orders_table, &config.region).await);
    let objects = Arc::new(Storage::new(StorageConfig::from_env()).await?);
    let point_query = PointQuery::new(&config.query.database, &config.query.table)?;

    let mut ctx = SagaContext::new(store, objects, point_query, &config.buckets.output);

    if let Some(arn) = &config.saga.state_machine_arn {
        ctx = ctx.with_orchestrator(Arc::new(
            StepFunctionsOrchestrator::new(arn, &config.region).await,
        ));
    }
    if let Some(url) = &config.catalog.url {
        ctx = ctx.with_catalog(Arc::new(HttpCatalogClient::new(url, config.catalog.timeout())?));
    }
    if let Some(url) = &config.saga.notification_queue_url {
        let queue = Arc::new(SqsQueue::new(url, &config.region).await);
        ctx = ctx.with_notifier(Arc::new(QueueNotifier::new(queue)));
    }

    Ok(ctx)
}

async fn grid_worker(config: &Config) -> Result<GridWorker> {
    let queue_url = config
        .grid
        .queue_url
        .as_deref()
        .context("GRID_QUEUE_URL is required for the grid worker")?;
    let arn = config
        .saga
        .state_machine_arn
        .as_deref()
        .context("STATE_MACHINE_ARN is required for the grid worker")?;

    let executor = GridExecutor::new(
        &config.grid.program,
        config.grid.timeout(),
        config.grid.success_check,
    );
    info!(
        queue = %queue_url,
        program = %config.grid.program,
        success_check = ?config.grid.success_check,
        "Grid worker configured"
    );

    Ok(GridWorker::new(
        Arc::new(DynamoOrderStore::new(&config.store.orders_table, &config.region).await),
        Arc::new(Storage::new(StorageConfig::from_env()).await?),
        Arc::new(StepFunctionsOrchestrator::new(arn, &config.region).await),
        Arc::new(SqsQueue::new(queue_url, &config.region).await),
        executor,
        &config.grid.working_dir,
        &config.buckets.pickup,
        config.grid.poll_interval(),
    ))
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            Ok(input)
        },
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, finishing current task"),
        _ = terminate => info!("Received SIGTERM, finishing current task"),
    }
}
