//! Failure records and the failure collector
//!
//! A sample that cannot be evaluated becomes exactly one [`FailureRecord`].
//! The [`FailureCollector`] keeps those records across chunks and across
//! restarts, at most one per `sample_id`, ordered by design position, and
//! persists them to a single failure log after every processed chunk.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::design::Design;
use crate::schema::{failure_schema, ERROR_KIND, ERROR_MESSAGE, SAMPLE_ID};
use crate::storage::{self, ParquetTable};
use crate::{Error, Result};

/// Classification of a per-sample failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Base evaluation finished with a non-optimal status
    #[serde(rename = "SimulatorInfeasibleError")]
    SimulatorInfeasible,
    /// Bad or missing parameter mapping in the simulator
    #[serde(rename = "SimulatorConfigError")]
    SimulatorConfig,
    /// Any failure while computing a target interval
    #[serde(rename = "TargetEvaluationError")]
    TargetEvaluation,
    /// Base evaluation failed for a reason other than configuration
    #[serde(rename = "SimulatorError")]
    Simulator,
}

impl FailureKind {
    /// Name written to the failure log.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SimulatorInfeasible => "SimulatorInfeasibleError",
            Self::SimulatorConfig => "SimulatorConfigError",
            Self::TargetEvaluation => "TargetEvaluationError",
            Self::Simulator => "SimulatorError",
        }
    }

    /// Parse a logged name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        [
            Self::SimulatorInfeasible,
            Self::SimulatorConfig,
            Self::TargetEvaluation,
            Self::Simulator,
        ]
        .into_iter()
        .find(|k| k.as_str() == name)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Failed sample
    pub sample_id: String,
    /// Classification
    pub error_kind: FailureKind,
    /// Human-readable cause
    pub error_message: String,
}

impl FailureRecord {
    /// Create a failure record.
    #[must_use]
    pub fn new(
        sample_id: impl Into<String>,
        error_kind: FailureKind,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            sample_id: sample_id.into(),
            error_kind,
            error_message: error_message.into(),
        }
    }
}

/// Accumulates failure records, at most one per sample, in design order.
#[derive(Debug)]
pub struct FailureCollector {
    path: PathBuf,
    positions: FxHashMap<String, usize>,
    records: BTreeMap<usize, FailureRecord>,
}

impl FailureCollector {
    /// Empty collector that persists to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, design: &Design) -> Self {
        Self {
            path: path.into(),
            positions: design
                .position_index()
                .into_iter()
                .map(|(id, pos)| (id.to_string(), pos))
                .collect(),
            records: BTreeMap::new(),
        }
    }

    /// Collector seeded with the failure log of an earlier invocation.
    ///
    /// Records for samples no longer in the design are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactRead`] if an existing log is unreadable.
    pub fn resume(path: impl Into<PathBuf>, design: &Design) -> Result<Self> {
        let mut collector = Self::new(path, design);
        if collector.path.exists() {
            let previous = read_failure_log(&collector.path)?;
            let loaded = previous.len();
            for record in previous {
                collector.insert(record);
            }
            tracing::info!(
                path = %collector.path.display(),
                loaded,
                kept = collector.len(),
                "resumed failure log"
            );
        }
        Ok(collector)
    }

    fn insert(&mut self, record: FailureRecord) {
        if let Some(&pos) = self.positions.get(&record.sample_id) {
            self.records.insert(pos, record);
        }
    }

    /// Replace the recorded outcome of one chunk.
    ///
    /// Earlier records for every sample in `chunk_sample_ids` are dropped
    /// before `failures` are added, so a sample that now succeeds loses its
    /// stale record and a repeated failure is never logged twice.
    pub fn record_chunk<'a>(
        &mut self,
        chunk_sample_ids: impl IntoIterator<Item = &'a str>,
        failures: Vec<FailureRecord>,
    ) {
        for id in chunk_sample_ids {
            if let Some(pos) = self.positions.get(id) {
                self.records.remove(pos);
            }
        }
        for record in failures {
            self.insert(record);
        }
    }

    /// Number of failed samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no sample has failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in design order.
    pub fn records(&self) -> impl Iterator<Item = &FailureRecord> {
        self.records.values()
    }

    /// Log path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Failure log as a record batch.
    ///
    /// # Errors
    ///
    /// Returns error if Arrow rejects the columns.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let ids: ArrayRef = Arc::new(StringArray::from_iter_values(
            self.records().map(|r| r.sample_id.as_str()),
        ));
        let kinds: ArrayRef = Arc::new(StringArray::from_iter_values(
            self.records().map(|r| r.error_kind.as_str()),
        ));
        let messages: ArrayRef = Arc::new(StringArray::from_iter_values(
            self.records().map(|r| r.error_message.as_str()),
        ));
        Ok(RecordBatch::try_new(failure_schema(), vec![ids, kinds, messages])?)
    }

    /// Rewrite the whole log atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactWrite`] on IO failure (fatal for the run).
    pub fn persist(&self) -> Result<()> {
        let batch = self.to_record_batch()?;
        storage::write_parquet(&self.path, &failure_schema(), &[batch])
    }
}

/// Read a failure log written by [`FailureCollector::persist`].
///
/// # Errors
///
/// Returns [`Error::ArtifactRead`] if the file is unreadable, has the wrong
/// schema, or holds an unknown error kind.
pub fn read_failure_log<P: AsRef<Path>>(path: P) -> Result<Vec<FailureRecord>> {
    let path = path.as_ref();
    let table = ParquetTable::load_parquet(path, failure_schema())?;
    let batch = table.concat()?;

    let ids = storage::utf8_column(&batch, SAMPLE_ID).map_err(|e| Error::artifact_read(path, e))?;
    let kinds =
        storage::utf8_column(&batch, ERROR_KIND).map_err(|e| Error::artifact_read(path, e))?;
    let messages =
        storage::utf8_column(&batch, ERROR_MESSAGE).map_err(|e| Error::artifact_read(path, e))?;

    (0..batch.num_rows())
        .map(|row| {
            let kind = FailureKind::parse(kinds.value(row)).ok_or_else(|| {
                Error::artifact_read(path, format!("unknown error_kind '{}'", kinds.value(row)))
            })?;
            Ok(FailureRecord::new(ids.value(row), kind, messages.value(row)))
        })
        .collect()
}
