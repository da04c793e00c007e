//! Configuration management

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default bucket receiving partitioned point files.
pub const DEFAULT_OUTPUT_BUCKET: &str = "csb-data";

/// Default key prefix in front of the cell id.
pub const DEFAULT_OUTPUT_PREFIX: &str = "csv";

/// Default size below which a file is split in memory (1 MB).
pub const DEFAULT_MEMORY_THRESHOLD_BYTES: u64 = 1_000_000;

/// Default scratch directory for the incremental strategy.
pub const DEFAULT_STAGING_DIR: &str = "./staging";

/// Partitioner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionConfig {
    pub output_bucket: String,
    pub output_prefix: String,
    pub memory_threshold_bytes: u64,
    pub staging_dir: PathBuf,
}

impl PartitionConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = PartitionConfig {
            output_bucket: env_string("PARTITION_OUTPUT_BUCKET", DEFAULT_OUTPUT_BUCKET),
            output_prefix: env_string("PARTITION_OUTPUT_PREFIX", DEFAULT_OUTPUT_PREFIX),
            memory_threshold_bytes: env_parse(
                "PARTITION_MEMORY_THRESHOLD_BYTES",
                DEFAULT_MEMORY_THRESHOLD_BYTES,
            )?,
            staging_dir: PathBuf::from(env_string("PARTITION_STAGING_DIR", DEFAULT_STAGING_DIR)),
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.output_bucket.trim().is_empty() {
            anyhow::bail!("PARTITION_OUTPUT_BUCKET cannot be empty");
        }

        if self.output_prefix.is_empty()
            || self.output_prefix.starts_with('/')
            || self.output_prefix.ends_with('/')
        {
            anyhow::bail!(
                "PARTITION_OUTPUT_PREFIX '{}' must be non-empty without leading or trailing '/'",
                self.output_prefix
            );
        }

        if self.memory_threshold_bytes == 0 {
            tracing::warn!("PARTITION_MEMORY_THRESHOLD_BYTES is 0 - every file is staged to disk");
        }

        Ok(())
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            output_bucket: DEFAULT_OUTPUT_BUCKET.to_string(),
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            memory_threshold_bytes: DEFAULT_MEMORY_THRESHOLD_BYTES,
            staging_dir: PathBuf::from(DEFAULT_STAGING_DIR),
        }
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
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
