//! Per-task scratch directory and input staging

use pointstore_common::storage::ObjectStore;
use pointstore_common::types::{DatasetLabel, S3Location};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

use super::{GridError, GridInputs};

/// Scratch directory for one grid task, removed on drop
#[derive(Debug)]
pub struct GridWorkspace {
    dir: TempDir,
}

impl GridWorkspace {
    /// Create `<root>/<order_id>-XXXXXX`
    pub fn create(root: &Path, order_id: &str) -> Result<Self, GridError> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", order_id))
            .tempdir_in(root)?;
        debug!(path = %dir.path().display(), "Created grid workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Download dataset outputs and prepare them as tool inputs
    ///
    /// The point CSV is converted to `<order_id>.xyz` and kept as an
    /// attachment; the multibeam manifest is used as is.
    #[instrument(skip(self, objects, outputs))]
    pub async fn stage(
        &self,
        objects: &dyn ObjectStore,
        outputs: &BTreeMap<DatasetLabel, S3Location>,
        order_id: &str,
    ) -> Result<GridInputs, GridError> {
        if outputs.is_empty() {
            return Err(GridError::NoDataFiles);
        }

        let mut inputs = GridInputs::default();
        for (label, location) in outputs {
            let local = self.file(location.file_name());
            let size = objects
                .download_to_file(location, &local)
                .await
                .map_err(|cause| GridError::Staging {
                    what: location.to_string(),
                    cause,
                })?;
            info!(dataset = %label, location = %location, size, "Staged dataset output");

            match label {
                DatasetLabel::Csb => {
                    let xyz = self.file(&format!("{}.xyz", order_id));
                    let csv = local.clone();
                    let target = xyz.clone();
                    let points = tokio::task::spawn_blocking(move || convert_csv_to_xyz(&csv, &target))
                        .await
                        .map_err(|e| GridError::Staging {
                            what: location.to_string(),
                            cause: anyhow::anyhow!("conversion task failed: {}", e),
                        })??;
                    debug!(points, xyz = %xyz.display(), "Converted point CSV");
                    inputs.data_files.insert(*label, xyz);
                    inputs.attachments.push(local);
                },
                DatasetLabel::Multibeam => {
                    inputs.data_files.insert(*label, local);
                },
            }
        }

        Ok(inputs)
    }
}

/// Write the first three columns of a point CSV as plain `lon,lat,depth`
///
/// Quotes are stripped, coordinates are rounded to 5 decimals and depth to 1.
/// Rows that do not parse are skipped. Returns the number of points written.
pub fn convert_csv_to_xyz(csv_path: &Path, xyz_path: &Path) -> Result<u64, GridError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(csv_path)
        .map_err(csv_to_io)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(xyz_path)
        .map_err(csv_to_io)?;

    let mut written = 0u64;
    let mut skipped = 0u64;
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                skipped += 1;
                debug!(error = %e, "Unreadable point row");
                continue;
            },
        };
        match parse_point(&record) {
            Some([lon, lat, depth]) => {
                writer
                    .write_record([
                        round_to(lon, 5).to_string(),
                        round_to(lat, 5).to_string(),
                        round_to(depth, 1).to_string(),
                    ])
                    .map_err(csv_to_io)?;
                written += 1;
            },
            None => skipped += 1,
        }
    }
    writer.flush()?;

    if skipped > 0 {
        warn!(skipped, written, "Skipped point rows that did not parse");
    }
    Ok(written)
}

fn parse_point(record: &csv::StringRecord) -> Option<[f64; 3]> {
    let mut values = [0.0; 3];
    for (i, value) in values.iter_mut().enumerate() {
        *value = record.get(i)?.trim().trim_matches('"').parse().ok()?;
    }
    Some(values)
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn csv_to_io(err: csv::Error) -> std::io::Error {
    std::io::Error::other(err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use pointstore_common::storage::LocalStorage;

    const POINTS_CSV: &str = "\"lon\",\"lat\",\"depth\",\"time\",\"platform_name\",\"provider\"\n\
\"-98.1234567\",\"27.4512345\",\"12.34\",\"2020-01-01\",\"Anonymous\",\"PGS\"\n\
\"not a number\",\"27.0\",\"1.0\",\"2020-01-01\",\"Anonymous\",\"PGS\"\n\
\"-97.5\",\"28.0\",\"100\",\"2020-01-02\",\"Anonymous\",\"PGS\"\n";

    #[test]
    fn test_convert_csv_to_xyz() {
        let dir = TempDir::new().unwrap();
        let csv = dir.path().join("query.csv");
        let xyz = dir.path().join("order.xyz");
        std::fs::write(&csv, POINTS_CSV).unwrap();

        let written = convert_csv_to_xyz(&csv, &xyz).unwrap();
        assert_eq!(written, 2);

        let contents = std::fs::read_to_string(&xyz).unwrap();
        assert_eq!(contents, "-98.12346,27.45123,12.3\n-97.5,28,100\n");
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.234567, 5), 1.23457);
        assert_eq!(round_to(-12.36, 1), -12.4);
    }

    #[test]
    fn test_workspace_removed_on_drop() {
        let root = TempDir::new().unwrap();
        let workspace = GridWorkspace::create(root.path(), "abc").unwrap();
        let path = workspace.path().to_path_buf();
        assert!(path.exists());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("abc-"));

        drop(workspace);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_stage_both_datasets() {
        let store_root = TempDir::new().unwrap();
        let objects = LocalStorage::new(store_root.path());
        let csv = S3Location::new("csb-order-output", "query-1.csv");
        let manifest = S3Location::new("csb-order-output", "abc_mbfiles.txt");
        objects
            .put(&csv, POINTS_CSV.as_bytes().to_vec(), None)
            .await
            .unwrap();
        objects
            .put(&manifest, b"survey/a.mb58 58\n".to_vec(), None)
            .await
            .unwrap();

        let root = TempDir::new().unwrap();
        let workspace = GridWorkspace::create(root.path(), "abc").unwrap();
        let mut outputs = BTreeMap::new();
        outputs.insert(DatasetLabel::Csb, csv);
        outputs.insert(DatasetLabel::Multibeam, manifest);

        let inputs = workspace.stage(&objects, &outputs, "abc").await.unwrap();
        assert_eq!(
            inputs.data_files.get(&DatasetLabel::Csb),
            Some(&workspace.file("abc.xyz"))
        );
        assert_eq!(
            inputs.data_files.get(&DatasetLabel::Multibeam),
            Some(&workspace.file("abc_mbfiles.txt"))
        );
        assert_eq!(inputs.attachments, vec![workspace.file("query-1.csv")]);
    }

    #[tokio::test]
    async fn test_stage_missing_object() {
        let store_root = TempDir::new().unwrap();
        let objects = LocalStorage::new(store_root.path());
        let root = TempDir::new().unwrap();
        let workspace = GridWorkspace::create(root.path(), "abc").unwrap();

        let mut outputs = BTreeMap::new();
        outputs.insert(
            DatasetLabel::Multibeam,
            S3Location::new("bucket", "missing.txt"),
        );
        let err = workspace.stage(&objects, &outputs, "abc").await.unwrap_err();
        assert!(matches!(err, GridError::Staging { .. }));
    }
}
