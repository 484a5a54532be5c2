//! Structured loader
//!
//! Reads one tabular file and bulk-inserts its rows, unchanged, into the
//! raw table the mapping resolved for it. Column names come from the file
//! header and are trusted; a mismatch with the table shows up as a schema
//! error from the destination at insert time.

use crate::config::LoadMode;
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::io::Read;
use std::path::Path;
use tracing::{debug, instrument};

pub mod memory;
pub mod postgres;

pub use memory::MemoryDestination;
pub use postgres::PgDestination;

const UTF8_BOM: char = '\u{feff}';

/// Rows of one file, in file order, with the header's column order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RecordBatch {
    /// Parse a CSV file with a header row
    ///
    /// A zero-byte file gives an empty batch. Rows whose width differs from
    /// the header are a parse error.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file).map_err(|e| match e {
            IngestError::Csv(source) => IngestError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if i == 0 {
                    name.trim_start_matches(UTF8_BOM).to_string()
                } else {
                    name.to_string()
                }
            })
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { columns, rows })
    }

    /// True when there is nothing to insert (no bytes, or a header only)
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Rows re-encoded as header-less CSV, the input format of `COPY ... (FORMAT csv)`
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());

        for row in &self.rows {
            writer.write_record(row)?;
        }

        writer
            .into_inner()
            .map_err(|e| IngestError::Io(std::io::Error::other(e.to_string())))
    }
}

/// Column name as the database sees a header field
///
/// Plain identifiers fold to lower case, as PostgreSQL does for unquoted
/// names, so `Order_ID` targets `order_id`. Anything else (spaces, quotes,
/// punctuation) is kept verbatim and must match the column exactly.
pub fn column_name(header: &str) -> String {
    let mut chars = header.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if plain {
        header.to_ascii_lowercase()
    } else {
        header.to_string()
    }
}

/// Destination for raw-table inserts
///
/// One sink holds one connection for the whole run. `close` is called
/// exactly once, at the end of the run, whatever happened before it.
#[async_trait]
pub trait RawTableSink: Send {
    /// Human-readable destination, e.g. `postgres://host:5432/db`
    fn describe(&self) -> String;

    /// Insert every row of `batch` into `table` as one atomic operation
    ///
    /// Returns the number of rows written.
    async fn insert_batch(&mut self, table: &str, batch: &RecordBatch, mode: LoadMode)
        -> Result<u64>;

    async fn close(&mut self) -> Result<()>;
}

/// What loading a single file did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { rows: u64 },
    Empty,
}

/// Parse `path` and insert it into `table`
///
/// An empty file is not sent to the sink at all.
#[instrument(skip(sink), fields(destination = %sink.describe()))]
pub async fn load_file<S>(sink: &mut S, path: &Path, table: &str, mode: LoadMode) -> Result<LoadOutcome>
where
    S: RawTableSink + ?Sized,
{
    let batch = RecordBatch::read_csv(path)?;
    if batch.is_empty() {
        debug!(path = %path.display(), "No rows to load");
        return Ok(LoadOutcome::Empty);
    }

    debug!(
        columns = batch.columns.len(),
        rows = batch.len(),
        "Parsed {}",
        path.display()
    );

    let rows = sink.insert_batch(table, &batch, mode).await?;
    Ok(LoadOutcome::Loaded { rows })
}
