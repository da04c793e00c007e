//! Delivery archive

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::GridError;

/// Grid outputs the tool may leave behind
pub const GRID_EXTENSIONS: [&str; 2] = ["asc", "grd"];

/// Grid files produced for `order_id` in `dir`
pub fn grid_outputs(dir: &Path, order_id: &str) -> Vec<PathBuf> {
    GRID_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", order_id, ext)))
        .filter(|path| path.is_file())
        .collect()
}

/// Write `<order_id>.zip` with the grid files and attachments
///
/// Entries are stored under their bare file names. Missing files are
/// skipped.
pub fn package_grid(
    dir: &Path,
    order_id: &str,
    attachments: &[PathBuf],
) -> Result<PathBuf, GridError> {
    let archive_path = dir.join(format!("{}.zip", order_id));
    let mut zip = ZipWriter::new(BufWriter::new(File::create(&archive_path)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = grid_outputs(dir, order_id);
    entries.extend(attachments.iter().filter(|p| p.is_file()).cloned());

    for path in &entries {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        zip.start_file(name.as_str(), options)?;
        let mut reader = BufReader::new(File::open(path)?);
        std::io::copy(&mut reader, &mut zip)?;
        debug!(entry = %name, "Added to archive");
    }
    zip.finish()?;

    Ok(archive_path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(String::from).collect();
        names.sort();
        names
    }

    #[test]
    fn test_package_grid_and_attachments() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("abc.grd"), b"grid").unwrap();
        std::fs::write(dir.path().join("abc.datalist"), b"list").unwrap();
        let csv = dir.path().join("query-1.csv");
        std::fs::write(&csv, b"lon,lat,depth\n").unwrap();

        let archive = package_grid(dir.path(), "abc", &[csv]).unwrap();
        assert_eq!(archive, dir.path().join("abc.zip"));
        assert_eq!(entry_names(&archive), vec!["abc.grd", "query-1.csv"]);
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let archive = package_grid(dir.path(), "abc", &[dir.path().join("gone.csv")]).unwrap();
        assert!(entry_names(&archive).is_empty());
    }
}
