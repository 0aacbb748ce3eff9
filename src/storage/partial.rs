//! Partial artifact store
//!
//! One Parquet file per chunk, named after the chunk's design offsets:
//!
//! ```text
//! <parts_dir>/part_{start}_{end}.parquet   # rows: sample_id, objective_value, target, lower, upper
//! ```
//!
//! A file at that path means the chunk is complete. Files are written once
//! and only ever read afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray};

use super::{f64_column, utf8_column, write_parquet, ParquetTable};
use crate::schema::{partial_schema, LOWER, OBJECTIVE_VALUE, SAMPLE_ID, TARGET, UPPER};
use crate::worker::IntervalResult;
use crate::{Error, Result};

const PART_PREFIX: &str = "part_";
const PART_EXTENSION: &str = "parquet";

/// Directory of per-chunk partial artifacts.
#[derive(Debug, Clone)]
pub struct PartialStore {
    dir: PathBuf,
}

impl PartialStore {
    /// Store rooted at `dir` (created lazily on first write).
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic artifact path of chunk `[start, end)`.
    #[must_use]
    pub fn chunk_path(&self, start: usize, end: usize) -> PathBuf {
        self.dir
            .join(format!("{PART_PREFIX}{start}_{end}.{PART_EXTENSION}"))
    }

    /// Whether the artifact of chunk `[start, end)` exists.
    #[must_use]
    pub fn contains(&self, start: usize, end: usize) -> bool {
        self.chunk_path(start, end).is_file()
    }

    /// Write the artifact of chunk `[start, end)`.
    ///
    /// `rows` may be empty; the file is still written and marks the chunk done.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactWrite`] on any failure.
    pub fn write(&self, start: usize, end: usize, rows: &[IntervalResult]) -> Result<PathBuf> {
        let path = self.chunk_path(start, end);
        let batch = intervals_to_batch(rows).map_err(|e| Error::artifact_write(&path, e))?;
        write_parquet(&path, &partial_schema(), &[batch])?;
        Ok(path)
    }

    /// All artifacts, ordered by `(start, end)`.
    ///
    /// Temporary files and unrelated names are ignored. A missing directory
    /// holds no artifacts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactRead`] if the directory cannot be listed.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let entries =
            std::fs::read_dir(&self.dir).map_err(|e| Error::artifact_read(&self.dir, e))?;

        let mut parts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::artifact_read(&self.dir, e))?;
            let path = entry.path();
            if let Some(range) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_part_name)
            {
                if path.is_file() {
                    parts.push((range, path));
                }
            }
        }
        parts.sort_by_key(|(range, _)| *range);
        Ok(parts.into_iter().map(|(_, path)| path).collect())
    }

    /// Load every artifact into one table, in `(start, end)` order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactRead`] if any artifact is unreadable or has
    /// the wrong schema.
    pub fn load_all(&self) -> Result<ParquetTable> {
        let mut table = ParquetTable::new(partial_schema());
        for path in self.list()? {
            let part = ParquetTable::load_parquet(&path, partial_schema())?;
            tracing::debug!(path = %path.display(), rows = part.num_rows(), "loaded partial artifact");
            table.extend(part)?;
        }
        Ok(table)
    }

    /// Read one artifact back into interval results.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactRead`] on IO or schema failure.
    pub fn read(path: &Path) -> Result<Vec<IntervalResult>> {
        let batch = ParquetTable::load_parquet(path, partial_schema())?.concat()?;
        batch_to_intervals(&batch).map_err(|e| Error::artifact_read(path, e))
    }
}

/// Parse `part_{start}_{end}.parquet` into `(start, end)`.
#[must_use]
pub fn parse_part_name(name: &str) -> Option<(usize, usize)> {
    let stem = name
        .strip_prefix(PART_PREFIX)?
        .strip_suffix(PART_EXTENSION)?
        .strip_suffix('.')?;
    let (start, end) = stem.split_once('_')?;
    let range = (start.parse().ok()?, end.parse().ok()?);
    (range.0 < range.1).then_some(range)
}

/// Interval rows as a partial-artifact record batch.
///
/// # Errors
///
/// Returns error if Arrow rejects the columns.
pub fn intervals_to_batch(rows: &[IntervalResult]) -> Result<RecordBatch> {
    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.sample_id.as_str()),
        )),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.objective_value),
        )),
        Arc::new(StringArray::from_iter_values(
            rows.iter().map(|r| r.target.as_str()),
        )),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.lower))),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.upper))),
    ];
    Ok(RecordBatch::try_new(partial_schema(), columns)?)
}

/// Partial-artifact record batch back into interval rows.
///
/// # Errors
///
/// Returns error if a required column is missing, ill-typed, or null.
pub fn batch_to_intervals(batch: &RecordBatch) -> Result<Vec<IntervalResult>> {
    let ids = utf8_column(batch, SAMPLE_ID)?;
    let objectives = f64_column(batch, OBJECTIVE_VALUE)?;
    let targets = utf8_column(batch, TARGET)?;
    let lowers = f64_column(batch, LOWER)?;
    let uppers = f64_column(batch, UPPER)?;

    Ok((0..batch.num_rows())
        .map(|row| IntervalResult {
            sample_id: ids.value(row).to_string(),
            objective_value: objectives.value(row),
            target: targets.value(row).to_string(),
            lower: lowers.value(row),
            upper: uppers.value(row),
        })
        .collect())
}
