//! Configuration management

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::grid::SuccessCheck;
use crate::query::is_identifier;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default orders/datasets table.
pub const DEFAULT_ORDERS_TABLE: &str = "bathy-orders";

/// Default database holding the crowd-sourced point table.
pub const DEFAULT_ATHENA_DATABASE: &str = "dcdb";

/// Default crowd-sourced point table.
pub const DEFAULT_ATHENA_TABLE: &str = "csb";

/// Default bucket for per-dataset outputs (query results, catalog manifests).
pub const DEFAULT_OUTPUT_BUCKET: &str = "csb-order-output";

/// Default bucket for packaged artifacts handed to the requester.
pub const DEFAULT_PICKUP_BUCKET: &str = "order-pickup";

/// Default catalog request timeout in seconds.
pub const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 10;

/// Default working directory root for grid tasks.
pub const DEFAULT_GRID_WORKING_DIR: &str = "./incoming";

/// Default gridding program.
pub const DEFAULT_GRID_PROGRAM: &str = "mbgrid";

/// Default grid tool timeout in seconds (1 hour).
pub const DEFAULT_GRID_TIMEOUT_SECS: u64 = 3600;

/// Default pause between empty grid queue polls in seconds.
pub const DEFAULT_GRID_POLL_INTERVAL_SECS: u64 = 60;

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub region: String,
    pub store: StoreConfig,
    pub query: QueryConfig,
    pub buckets: BucketConfig,
    pub catalog: CatalogConfig,
    pub saga: SagaConfig,
    pub grid: GridConfig,
}

/// Order state table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub orders_table: String,
}

/// Point query target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    pub database: String,
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketConfig {
    pub output: String,
    pub pickup: String,
}

/// Multibeam catalog endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Orchestrator and notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaConfig {
    pub state_machine_arn: Option<String>,
    pub notification_queue_url: Option<String>,
}

/// Grid worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub queue_url: Option<String>,
    pub working_dir: PathBuf,
    pub program: String,
    pub timeout_secs: u64,
    pub success_check: SuccessCheck,
    pub poll_interval_secs: u64,
}

impl GridConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            region: env_string("AWS_REGION", DEFAULT_REGION),
            store: StoreConfig {
                orders_table: env_string("ORDERS_TABLE", DEFAULT_ORDERS_TABLE),
            },
            query: QueryConfig {
                database: env_string("ATHENA_DATABASE", DEFAULT_ATHENA_DATABASE),
                table: env_string("ATHENA_TABLE", DEFAULT_ATHENA_TABLE),
            },
            buckets: BucketConfig {
                output: env_string("OUTPUT_BUCKET", DEFAULT_OUTPUT_BUCKET),
                pickup: env_string("PICKUP_BUCKET", DEFAULT_PICKUP_BUCKET),
            },
            catalog: CatalogConfig {
                url: env_optional("CATALOG_URL"),
                timeout_secs: env_parse("CATALOG_TIMEOUT_SECS", DEFAULT_CATALOG_TIMEOUT_SECS)?,
            },
            saga: SagaConfig {
                state_machine_arn: env_optional("STATE_MACHINE_ARN"),
                notification_queue_url: env_optional("NOTIFICATION_QUEUE_URL"),
            },
            grid: GridConfig {
                queue_url: env_optional("GRID_QUEUE_URL"),
                working_dir: PathBuf::from(env_string("GRID_WORKING_DIR", DEFAULT_GRID_WORKING_DIR)),
                program: env_string("GRID_PROGRAM", DEFAULT_GRID_PROGRAM),
                timeout_secs: env_parse("GRID_TIMEOUT_SECS", DEFAULT_GRID_TIMEOUT_SECS)?,
                success_check: env_parse("GRID_SUCCESS_CHECK", SuccessCheck::default())?,
                poll_interval_secs: env_parse(
                    "GRID_POLL_INTERVAL_SECS",
                    DEFAULT_GRID_POLL_INTERVAL_SECS,
                )?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.store.orders_table.is_empty() {
            anyhow::bail!("ORDERS_TABLE cannot be empty");
        }

        // Names are interpolated into SQL, so only plain identifiers are allowed
        if !is_identifier(&self.query.database) {
            anyhow::bail!("ATHENA_DATABASE '{}' is not a plain identifier", self.query.database);
        }
        if !is_identifier(&self.query.table) {
            anyhow::bail!("ATHENA_TABLE '{}' is not a plain identifier", self.query.table);
        }

        if self.buckets.output.is_empty() || self.buckets.pickup.is_empty() {
            anyhow::bail!("OUTPUT_BUCKET and PICKUP_BUCKET cannot be empty");
        }

        if self.catalog.timeout_secs == 0 {
            anyhow::bail!("CATALOG_TIMEOUT_SECS must be greater than 0");
        }

        if self.grid.timeout_secs == 0 {
            anyhow::bail!("GRID_TIMEOUT_SECS must be greater than 0");
        }

        if self.grid.program.trim().is_empty() {
            anyhow::bail!("GRID_PROGRAM cannot be empty");
        }

        if self.catalog.url.is_none() {
            tracing::warn!("CATALOG_URL not set - multibeam catalog lookups will fail");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            store: StoreConfig {
                orders_table: DEFAULT_ORDERS_TABLE.to_string(),
            },
            query: QueryConfig {
                database: DEFAULT_ATHENA_DATABASE.to_string(),
                table: DEFAULT_ATHENA_TABLE.to_string(),
            },
            buckets: BucketConfig {
                output: DEFAULT_OUTPUT_BUCKET.to_string(),
                pickup: DEFAULT_PICKUP_BUCKET.to_string(),
            },
            catalog: CatalogConfig {
                url: None,
                timeout_secs: DEFAULT_CATALOG_TIMEOUT_SECS,
            },
            saga: SagaConfig {
                state_machine_arn: None,
                notification_queue_url: None,
            },
            grid: GridConfig {
                queue_url: None,
                working_dir: PathBuf::from(DEFAULT_GRID_WORKING_DIR),
                program: DEFAULT_GRID_PROGRAM.to_string(),
                timeout_secs: DEFAULT_GRID_TIMEOUT_SECS,
                success_check: SuccessCheck::default(),
                poll_interval_secs: DEFAULT_GRID_POLL_INTERVAL_SECS,
            },
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        Err(_) => Ok(default),
    }
}
