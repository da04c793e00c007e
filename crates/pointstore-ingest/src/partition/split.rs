//! Record re-keying shared by both strategies
//!
//! Input rows are `UNIQUE_ID,FILE_UUID,LON,LAT,DEPTH,TIME,PLATFORM_NAME,PROVIDER`.
//! The first two columns are replaced with the entry date and the cell id; the
//! rest of the row is carried over byte for byte.

use csv::{ByteRecord, ReaderBuilder, Writer, WriterBuilder};
use pointstore_common::types::{is_valid_latitude, is_valid_longitude};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use tracing::warn;

use super::{CellIndexer, PartitionError};

/// Header of every partition object
pub const OUTPUT_HEADER: [&str; 8] = [
    "ENTRY_DATE",
    "H3",
    "LON",
    "LAT",
    "DEPTH",
    "TIME",
    "PLATFORM_NAME",
    "PROVIDER",
];

const LON_FIELD: usize = 2;
const LAT_FIELD: usize = 3;

/// Record counts for one input
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub valid: u64,
    pub invalid: u64,
}

/// Records split per cell, writers still open
pub(crate) struct Split<W: Write> {
    pub tally: Tally,
    pub cells: BTreeMap<String, Writer<W>>,
}

/// Route every record of `input` to its cell's writer
///
/// `open` is called once per cell, the first time a record lands in it.
pub(crate) fn split_records<R, W, F>(
    input: R,
    entry_date: &str,
    indexer: &dyn CellIndexer,
    mut open: F,
) -> Result<Split<W>, PartitionError>
where
    R: Read,
    W: Write,
    F: FnMut(&str) -> Result<W, PartitionError>,
{
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let mut record = ByteRecord::new();
    let mut tally = Tally::default();
    let mut cells = BTreeMap::new();

    while reader.read_byte_record(&mut record)? {
        let Some(cell) = locate(&record, indexer) else {
            warn!(
                line = record.position().map(|p| p.line()),
                lon = %String::from_utf8_lossy(record.get(LON_FIELD).unwrap_or_default()),
                lat = %String::from_utf8_lossy(record.get(LAT_FIELD).unwrap_or_default()),
                "Bad coordinates"
            );
            tally.invalid += 1;
            continue;
        };

        let rekeyed = rekey(&record, entry_date, &cell);
        let writer = match cells.entry(cell) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut writer = WriterBuilder::new()
                    .flexible(true)
                    .from_writer(open(entry.key())?);
                writer.write_record(OUTPUT_HEADER)?;
                entry.insert(writer)
            },
        };
        writer.write_byte_record(&rekeyed)?;
        tally.valid += 1;
    }

    Ok(Split { tally, cells })
}

/// Flush a cell writer and hand back its sink
pub(crate) fn finish<W: Write>(writer: Writer<W>) -> Result<W, PartitionError> {
    writer
        .into_inner()
        .map_err(|e| PartitionError::Io(e.into_error()))
}

fn locate(record: &ByteRecord, indexer: &dyn CellIndexer) -> Option<String> {
    let lon = coordinate(record.get(LON_FIELD)?)?;
    let lat = coordinate(record.get(LAT_FIELD)?)?;
    if !is_valid_longitude(lon) || !is_valid_latitude(lat) {
        return None;
    }
    indexer.cell(lat, lon)
}

fn coordinate(field: &[u8]) -> Option<f64> {
    std::str::from_utf8(field).ok()?.trim().parse().ok()
}

fn rekey(record: &ByteRecord, entry_date: &str, cell: &str) -> ByteRecord {
    let mut rekeyed = ByteRecord::with_capacity(record.as_slice().len() + 32, record.len());
    rekeyed.push_field(entry_date.as_bytes());
    rekeyed.push_field(cell.as_bytes());
    for field in record.iter().skip(2) {
        rekeyed.push_field(field);
    }
    rekeyed
}
