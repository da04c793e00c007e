//! Pointstore Ingest - point file partitioning

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pointstore_common::logging::{init_logging, LogConfig};
use pointstore_common::storage::{config::StorageConfig, LocalStorage, ObjectStore, Storage};
use pointstore_common::types::S3Location;
use pointstore_ingest::{
    batch::{handle_invocation, BatchInvocation},
    config::PartitionConfig,
    partition::{H3Indexer, Partitioner},
};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};

/// Bucket name the local source file is staged under
const LOCAL_SOURCE_BUCKET: &str = "incoming";

#[derive(Parser, Debug)]
#[command(name = "pointstore-ingest")]
#[command(author, version, about = "Bathymetry point file partitioning tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one S3 Batch invocation read from stdin
    Batch,

    /// Partition a local point file into a local directory
    Partition {
        /// Point file, named YYYYMMDD_<uuid>_pointData.csv
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory; partitions land under <output>/<bucket>/<prefix>/<cell>/
        #[arg(short, long, default_value = "./data")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let log_config = LogConfig::new("pointstore-ingest", log_level);

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = init_logging(&log_config)?;

    let config = PartitionConfig::load()?;

    match cli.command {
        Command::Batch => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read stdin")?;
            let invocation: BatchInvocation =
                serde_json::from_str(&input).context("Invalid batch invocation")?;

            let storage = Storage::new(StorageConfig::from_env()).await?;
            let partitioner = Partitioner::new(Arc::new(storage), Arc::new(H3Indexer::default()), config);

            let response = handle_invocation(&partitioner, invocation).await;
            println!("{}", serde_json::to_string(&response)?);
        },
        Command::Partition { input, output } => {
            let file_name = input
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("Invalid input path {}", input.display()))?
                .to_string();

            let storage = Arc::new(LocalStorage::new(&output));
            let source = S3Location::new(LOCAL_SOURCE_BUCKET, file_name);
            storage
                .upload_file(&source, &input, Some("text/csv"))
                .await
                .with_context(|| format!("Failed to stage {}", input.display()))?;

            let partitioner = Partitioner::new(storage, Arc::new(H3Indexer::default()), config);
            let report = partitioner.process(&source).await?;

            info!(output = %output.display(), "{}", report.summary());
            println!("{}", serde_json::to_string_pretty(&report)?);
        },
    }

    Ok(())
}
