//! Storage backend (Arrow/Parquet)
//!
//! **Append-Only, Write-Once Design**:
//! - Every table the campaign produces is written whole, exactly once per path
//! - Partial artifacts are never updated in place; their presence is the
//!   restart checkpoint
//! - Writes go to a temporary sibling and are renamed into place, so a killed
//!   run never leaves a truncated file behind a valid-looking name
//!
//! Toyota Way Principles:
//! - Poka-Yoke: Atomic rename prevents half-written checkpoints
//! - Jidoka: Schema validated on every read

use crate::{Error, Result};
use arrow::array::{Array, Float64Array, StringArray};
use arrow::datatypes::{Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::path::{Path, PathBuf};

mod partial;

pub use partial::{batch_to_intervals, intervals_to_batch, parse_part_name, PartialStore};

/// Suffix appended to a destination path while it is being written
pub const TEMP_SUFFIX: &str = "tmp";

/// In-memory columnar table backed by Parquet files
#[derive(Debug)]
pub struct ParquetTable {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl ParquetTable {
    /// Create an empty table with a fixed schema
    #[must_use]
    pub const fn new(schema: SchemaRef) -> Self {
        Self {
            schema,
            batches: Vec::new(),
        }
    }

    /// Load a Parquet file, validating it against `expected`
    ///
    /// # Errors
    /// Returns [`Error::ArtifactRead`] if the file cannot be opened, parsed, or
    /// its columns differ from `expected`
    pub fn load_parquet<P: AsRef<Path>>(path: P, expected: SchemaRef) -> Result<Self> {
        let path = path.as_ref();
        let mut table = Self::new(expected);
        for batch in read_parquet(path)? {
            table
                .append_batch(batch)
                .map_err(|e| Error::artifact_read(path, e))?;
        }
        Ok(table)
    }

    /// Total row count across batches
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Append a batch (the only supported write operation)
    ///
    /// Empty batches are accepted and dropped.
    ///
    /// # Errors
    ///
    /// Returns error if batch columns don't match the table schema
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        check_columns(&batch.schema(), &self.schema)?;
        if batch.num_rows() > 0 {
            // Rebind to the table schema so nullability/metadata drift from
            // the file footer does not leak into downstream concatenation.
            let batch = RecordBatch::try_new(self.schema.clone(), batch.columns().to_vec())?;
            self.batches.push(batch);
        }
        Ok(())
    }

    /// Append every batch of another table
    ///
    /// # Errors
    ///
    /// Returns error if schemas differ
    pub fn extend(&mut self, other: Self) -> Result<()> {
        for batch in other.batches {
            self.append_batch(batch)?;
        }
        Ok(())
    }

    /// Concatenate all batches into one
    ///
    /// # Errors
    ///
    /// Returns error if Arrow concatenation fails
    pub fn concat(&self) -> Result<RecordBatch> {
        if self.batches.is_empty() {
            return Ok(RecordBatch::new_empty(self.schema.clone()));
        }
        Ok(arrow::compute::concat_batches(&self.schema, &self.batches)?)
    }
}

/// Read every record batch of a Parquet file
///
/// # Errors
/// Returns [`Error::ArtifactRead`] if the file cannot be read or parsed
pub fn read_parquet<P: AsRef<Path>>(path: P) -> Result<Vec<RecordBatch>> {
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::artifact_read(path, format!("failed to open Parquet file: {e}")))?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| Error::artifact_read(path, format!("failed to parse Parquet file: {e}")))?;

    let reader = builder
        .build()
        .map_err(|e| Error::artifact_read(path, format!("failed to create Parquet reader: {e}")))?;

    let mut batches = Vec::new();
    for batch in reader {
        let batch = batch
            .map_err(|e| Error::artifact_read(path, format!("failed to read record batch: {e}")))?;
        batches.push(batch);
    }
    Ok(batches)
}

/// Write `batches` to `path` via a temporary sibling and an atomic rename
///
/// A zero-batch write produces a valid, schema-only file.
///
/// # Errors
/// Returns [`Error::ArtifactWrite`] on any IO/Parquet failure
pub fn write_parquet<P: AsRef<Path>>(
    path: P,
    schema: &SchemaRef,
    batches: &[RecordBatch],
) -> Result<()> {
    use parquet::arrow::ArrowWriter;

    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::artifact_write(path, e))?;
    }

    let tmp = temp_path(path);
    let file = File::create(&tmp).map_err(|e| Error::artifact_write(&tmp, e))?;
    {
        let mut writer = ArrowWriter::try_new(&file, schema.clone(), None)
            .map_err(|e| Error::artifact_write(&tmp, e))?;
        for batch in batches {
            writer
                .write(batch)
                .map_err(|e| Error::artifact_write(&tmp, e))?;
        }
        writer.close().map_err(|e| Error::artifact_write(&tmp, e))?;
    }
    file.sync_all().map_err(|e| Error::artifact_write(&tmp, e))?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| Error::artifact_write(path, e))?;
    tracing::debug!(path = %path.display(), batches = batches.len(), "parquet written");
    Ok(())
}

/// Write a JSON document atomically (pretty-printed)
///
/// # Errors
/// Returns [`Error::ArtifactWrite`] on serialization or IO failure
pub fn write_json<P: AsRef<Path>, T: serde::Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::artifact_write(path, e))?;
    }
    let text = serde_json::to_string_pretty(value).map_err(|e| Error::artifact_write(path, e))?;
    let tmp = temp_path(path);
    std::fs::write(&tmp, text).map_err(|e| Error::artifact_write(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| Error::artifact_write(path, e))?;
    Ok(())
}

/// Temporary sibling used while `path` is being written
#[must_use]
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

/// Borrow a non-null Utf8 column by name
///
/// # Errors
/// Returns [`Error::Other`] if the column is missing, ill-typed, or has nulls
pub fn utf8_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    let array = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| Error::Other(format!("missing Utf8 column '{name}'")))?;
    if array.null_count() > 0 {
        return Err(Error::Other(format!("column '{name}' contains nulls")));
    }
    Ok(array)
}

/// Borrow a non-null Float64 column by name
///
/// # Errors
/// Returns [`Error::Other`] if the column is missing, ill-typed, or has nulls
pub fn f64_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float64Array> {
    let array = batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
        .ok_or_else(|| Error::Other(format!("missing Float64 column '{name}'")))?;
    if array.null_count() > 0 {
        return Err(Error::Other(format!("column '{name}' contains nulls")));
    }
    Ok(array)
}

/// Verify column names and types match, ignoring schema metadata
///
/// # Errors
/// Returns [`Error::Other`] describing the first mismatch
pub fn check_columns(actual: &Schema, expected: &Schema) -> Result<()> {
    let names = |s: &Schema| -> Vec<String> {
        s.fields()
            .iter()
            .map(|f| format!("{}:{}", f.name(), f.data_type()))
            .collect()
    };
    let (actual_cols, expected_cols) = (names(actual), names(expected));
    if actual_cols != expected_cols {
        return Err(Error::Other(format!(
            "Schema mismatch: expected {expected_cols:?}, got {actual_cols:?}"
        )));
    }
    Ok(())
}
