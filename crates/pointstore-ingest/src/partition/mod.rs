//! Spatial partitioning of raw point files
//!
//! A point file delivered to the archive is re-keyed into one object per H3
//! cell so the query engine can prune by location:
//!
//! ```text
//! s3://<source>/.../20190306_<uuid>_pointData.csv
//!   -> s3://<output>/<prefix>/<cell>/20190306_<uuid>_pointData.csv   (one per cell)
//! ```
//!
//! Small files are split in memory. Larger files are downloaded to a scratch
//! directory and streamed into per-cell spill files, which are uploaded once
//! the input is exhausted. Both strategies write identical objects.

use chrono::NaiveDate;
use pointstore_common::storage::ObjectStore;
use pointstore_common::types::S3Location;
use pointstore_common::ErrorKind;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

pub mod indexer;
mod split;

pub use indexer::{CellIndexer, H3Indexer, PARTITION_RESOLUTION};
pub use split::{Tally, OUTPUT_HEADER};

use crate::config::PartitionConfig;
use split::{finish, split_records};

const CSV_CONTENT_TYPE: &str = "text/csv";

/// Partitioning failure; every variant fails the whole file
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Cannot derive an entry date from '{0}', expected YYYYMMDD_<id>_pointData.csv")]
    InvalidFileName(String),

    #[error("no valid records. {invalid_count} invalid records")]
    NoValidRecords { invalid_count: u64 },

    #[error("{context}: {cause:#}")]
    Storage {
        context: String,
        cause: anyhow::Error,
    },

    #[error("Unreadable point file: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PartitionError {
    fn storage(context: impl Into<String>, cause: anyhow::Error) -> Self {
        PartitionError::Storage {
            context: context.into(),
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PartitionError::InvalidFileName(_) => ErrorKind::Validation,
            PartitionError::NoValidRecords { .. } => ErrorKind::DataQuality,
            PartitionError::Storage { .. } => ErrorKind::Dependency,
            PartitionError::Csv(_) | PartitionError::Io(_) => ErrorKind::Execution,
        }
    }
}

/// How an input file is split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    InMemory,
    Incremental,
}

impl Strategy {
    /// In memory below `threshold` bytes, incremental otherwise
    pub fn for_size(size: u64, threshold: u64) -> Self {
        if size < threshold {
            Strategy::InMemory
        } else {
            Strategy::Incremental
        }
    }
}

/// Outcome of partitioning one file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionReport {
    pub file_name: String,
    pub object_size: u64,
    pub strategy: Strategy,
    pub valid_count: u64,
    pub invalid_count: u64,
    pub partition_count: usize,
    pub outputs: Vec<S3Location>,
}

impl PartitionReport {
    /// One-line summary for batch results and logs
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} records written across {} partitions. Original object size {} bytes",
            self.valid_count, self.partition_count, self.object_size
        );
        if self.invalid_count > 0 {
            summary.push_str(&format!(" {} invalid records.", self.invalid_count));
        }
        summary
    }
}

/// `YYYYMMDD_<uuid>_pointData.csv` -> `YYYY-MM-DD`
pub fn entry_date_from_file_name(file_name: &str) -> Result<String, PartitionError> {
    let stamp = file_name.trim().split('_').next().unwrap_or_default();
    NaiveDate::parse_from_str(stamp, "%Y%m%d")
        .map(|date| date.format("%Y-%m-%d").to_string())
        .map_err(|_| PartitionError::InvalidFileName(file_name.to_string()))
}

/// Re-keys point files into per-cell objects
pub struct Partitioner {
    objects: Arc<dyn ObjectStore>,
    indexer: Arc<dyn CellIndexer>,
    config: PartitionConfig,
}

impl Partitioner {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        indexer: Arc<dyn CellIndexer>,
        config: PartitionConfig,
    ) -> Self {
        Self {
            objects,
            indexer,
            config,
        }
    }

    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    /// Partition `source`, choosing the strategy from its size
    pub async fn process(&self, source: &S3Location) -> Result<PartitionReport, PartitionError> {
        let size = self
            .objects
            .size(source)
            .await
            .map_err(|e| PartitionError::storage(format!("Failed to stat {}", source), e))?;
        let strategy = Strategy::for_size(size, self.config.memory_threshold_bytes);
        self.process_with(source, size, strategy).await
    }

    /// Partition `source` with an explicit strategy
    #[instrument(skip_all, fields(source = %source, ?strategy))]
    pub async fn process_with(
        &self,
        source: &S3Location,
        size: u64,
        strategy: Strategy,
    ) -> Result<PartitionReport, PartitionError> {
        let file_name = source.file_name().to_string();
        let entry_date = entry_date_from_file_name(&file_name)?;
        debug!(size, %entry_date, "Partitioning point file");

        let (tally, outputs) = match strategy {
            Strategy::InMemory => self.in_memory(source, &file_name, &entry_date).await?,
            Strategy::Incremental => self.incremental(source, &file_name, &entry_date).await?,
        };

        if tally.valid == 0 {
            return Err(PartitionError::NoValidRecords {
                invalid_count: tally.invalid,
            });
        }

        let report = PartitionReport {
            file_name,
            object_size: size,
            strategy,
            valid_count: tally.valid,
            invalid_count: tally.invalid,
            partition_count: outputs.len(),
            outputs,
        };
        info!(
            valid = report.valid_count,
            invalid = report.invalid_count,
            partitions = report.partition_count,
            "Point file partitioned"
        );
        Ok(report)
    }

    /// `<prefix>/<cell>/<file_name>` in the output bucket
    pub fn output_location(&self, cell: &str, file_name: &str) -> S3Location {
        S3Location::new(
            self.config.output_bucket.clone(),
            format!("{}/{}/{}", self.config.output_prefix, cell, file_name),
        )
    }

    async fn in_memory(
        &self,
        source: &S3Location,
        file_name: &str,
        entry_date: &str,
    ) -> Result<(Tally, Vec<S3Location>), PartitionError> {
        let data = self
            .objects
            .get(source)
            .await
            .map_err(|e| PartitionError::storage(format!("Failed to read {}", source), e))?;

        let split = split_records(data.as_slice(), entry_date, self.indexer.as_ref(), |_| {
            Ok(Vec::new())
        })?;

        let mut outputs = Vec::with_capacity(split.cells.len());
        for (cell, writer) in split.cells {
            let location = self.output_location(&cell, file_name);
            let body = finish(writer)?;
            debug!(output = %location, bytes = body.len(), "Writing partition");
            self.objects
                .put(&location, body, Some(CSV_CONTENT_TYPE))
                .await
                .map_err(|e| PartitionError::storage(format!("Failed to write {}", location), e))?;
            outputs.push(location);
        }
        Ok((split.tally, outputs))
    }

    async fn incremental(
        &self,
        source: &S3Location,
        file_name: &str,
        entry_date: &str,
    ) -> Result<(Tally, Vec<S3Location>), PartitionError> {
        std::fs::create_dir_all(&self.config.staging_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix("partition-")
            .tempdir_in(&self.config.staging_dir)?;

        let input = scratch.path().join("incoming").join(file_name);
        if let Some(parent) = input.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let bytes = self
            .objects
            .download_to_file(source, &input)
            .await
            .map_err(|e| PartitionError::storage(format!("Failed to download {}", source), e))?;
        debug!(bytes, path = %input.display(), "Downloaded point file");

        let spill_root = scratch.path().join("cells");
        let indexer = Arc::clone(&self.indexer);
        let date = entry_date.to_string();
        let name = file_name.to_string();
        let (tally, spilled) = tokio::task::spawn_blocking(move || {
            spill(&input, &spill_root, &name, &date, indexer.as_ref())
        })
        .await
        .map_err(|e| PartitionError::Io(std::io::Error::other(e)))??;

        let mut outputs = Vec::with_capacity(spilled.len());
        for (cell, path) in spilled {
            let location = self.output_location(&cell, file_name);
            self.objects
                .upload_file(&location, &path, Some(CSV_CONTENT_TYPE))
                .await
                .map_err(|e| PartitionError::storage(format!("Failed to write {}", location), e))?;
            outputs.push(location);
        }
        Ok((tally, outputs))
    }
}

/// Stream `input` into `<spill_root>/<cell>/<file_name>` files
fn spill(
    input: &Path,
    spill_root: &Path,
    file_name: &str,
    entry_date: &str,
    indexer: &dyn CellIndexer,
) -> Result<(Tally, Vec<(String, PathBuf)>), PartitionError> {
    let reader = BufReader::new(File::open(input)?);
    let split = split_records(reader, entry_date, indexer, |cell| {
        let dir = spill_root.join(cell);
        std::fs::create_dir_all(&dir)?;
        Ok(BufWriter::new(File::create(dir.join(file_name))?))
    })?;

    let mut spilled = Vec::with_capacity(split.cells.len());
    for (cell, writer) in split.cells {
        let mut file = finish(writer)?;
        file.flush()?;
        spilled.push((cell.clone(), spill_root.join(&cell).join(file_name)));
    }
    Ok((split.tally, spilled))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_date_from_file_name() {
        assert_eq!(
            entry_date_from_file_name("20190306_27a0f0710fc935ce44b83b6d539d2d44_pointData.csv")
                .unwrap(),
            "2019-03-06"
        );
        assert!(matches!(
            entry_date_from_file_name("pointData.csv"),
            Err(PartitionError::InvalidFileName(_))
        ));
        assert!(entry_date_from_file_name("20191306_x_pointData.csv").is_err());
    }

    #[test]
    fn test_strategy_threshold() {
        assert_eq!(Strategy::for_size(999_999, 1_000_000), Strategy::InMemory);
        assert_eq!(Strategy::for_size(1_000_000, 1_000_000), Strategy::Incremental);
    }

    #[test]
    fn test_report_summary() {
        let mut report = PartitionReport {
            file_name: "20190306_x_pointData.csv".to_string(),
            object_size: 2048,
            strategy: Strategy::InMemory,
            valid_count: 10,
            invalid_count: 0,
            partition_count: 2,
            outputs: Vec::new(),
        };
        assert_eq!(
            report.summary(),
            "10 records written across 2 partitions. Original object size 2048 bytes"
        );

        report.invalid_count = 3;
        assert!(report.summary().ends_with("2048 bytes 3 invalid records."));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            PartitionError::NoValidRecords { invalid_count: 4 }.kind(),
            ErrorKind::DataQuality
        );
        assert_eq!(
            PartitionError::InvalidFileName("x".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            PartitionError::NoValidRecords { invalid_count: 4 }.to_string(),
            "no valid records. 4 invalid records"
        );
    }
}
