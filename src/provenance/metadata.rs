//! Run metadata - what an invocation was asked to do

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RunMode;
use crate::schema::FeatureStat;
use crate::storage;
use crate::Result;

/// Written at the start of every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    timestamp_utc: DateTime<Utc>,
    crate_version: String,
    mode: RunMode,
    n_samples: usize,
    n_fields: usize,
    n_targets: usize,
    chunk_size: usize,
    n_chunks: usize,
    parallelism: usize,
    simulator_threads: usize,
    fraction_of_optimum: f64,
    stats: Vec<FeatureStat>,
    config: serde_json::Value,
}

impl RunMetadata {
    /// Create a builder; the timestamp is taken at [`RunMetadataBuilder::build`].
    #[must_use]
    pub fn builder(mode: RunMode) -> RunMetadataBuilder {
        RunMetadataBuilder::new(mode)
    }

    /// Invocation start.
    #[must_use]
    pub const fn timestamp_utc(&self) -> DateTime<Utc> {
        self.timestamp_utc
    }

    /// Version of this crate that produced the record.
    #[must_use]
    pub fn crate_version(&self) -> &str {
        &self.crate_version
    }

    /// Entry point.
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        self.mode
    }

    /// Design rows.
    #[must_use]
    pub const fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Target count.
    #[must_use]
    pub const fn n_targets(&self) -> usize {
        self.n_targets
    }

    /// Planned chunks.
    #[must_use]
    pub const fn n_chunks(&self) -> usize {
        self.n_chunks
    }

    /// Echo of the campaign configuration.
    #[must_use]
    pub const fn config(&self) -> &serde_json::Value {
        &self.config
    }

    /// Write as pretty JSON, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ArtifactWrite`] on IO failure.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        storage::write_json(path, self)
    }

    /// Read a record written by [`RunMetadata::write`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ArtifactRead`] if the file is missing or malformed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|e| crate::Error::artifact_read(path, e))?;
        serde_json::from_str(&text).map_err(|e| crate::Error::artifact_read(path, e))
    }
}

/// Builder for [`RunMetadata`].
#[derive(Debug)]
pub struct RunMetadataBuilder {
    mode: RunMode,
    n_samples: usize,
    n_fields: usize,
    n_targets: usize,
    chunk_size: usize,
    n_chunks: usize,
    parallelism: usize,
    simulator_threads: usize,
    fraction_of_optimum: f64,
    stats: Vec<FeatureStat>,
    config: serde_json::Value,
}

impl RunMetadataBuilder {
    /// Create a builder with zeroed counts.
    #[must_use]
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            n_samples: 0,
            n_fields: 0,
            n_targets: 0,
            chunk_size: 0,
            n_chunks: 0,
            parallelism: 1,
            simulator_threads: 1,
            fraction_of_optimum: crate::worker::DEFAULT_FRACTION_OF_OPTIMUM,
            stats: FeatureStat::DEFAULT.to_vec(),
            config: serde_json::Value::Null,
        }
    }

    /// Design row count.
    #[must_use]
    pub fn samples(mut self, n_samples: usize) -> Self {
        self.n_samples = n_samples;
        self
    }

    /// Design field count.
    #[must_use]
    pub fn fields(mut self, n_fields: usize) -> Self {
        self.n_fields = n_fields;
        self
    }

    /// Target count.
    #[must_use]
    pub fn targets(mut self, n_targets: usize) -> Self {
        self.n_targets = n_targets;
        self
    }

    /// Chunk size and resulting chunk count.
    #[must_use]
    pub fn chunking(mut self, chunk_size: usize, n_chunks: usize) -> Self {
        self.chunk_size = chunk_size;
        self.n_chunks = n_chunks;
        self
    }

    /// Worker and simulator thread limits.
    #[must_use]
    pub fn limits(mut self, parallelism: usize, simulator_threads: usize) -> Self {
        self.parallelism = parallelism;
        self.simulator_threads = simulator_threads;
        self
    }

    /// Near-optimality threshold.
    #[must_use]
    pub fn fraction_of_optimum(mut self, fraction: f64) -> Self {
        self.fraction_of_optimum = fraction;
        self
    }

    /// Derived stats of the feature table.
    #[must_use]
    pub fn stats(mut self, stats: &[FeatureStat]) -> Self {
        self.stats = stats.to_vec();
        self
    }

    /// Configuration echo.
    #[must_use]
    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Build the record, stamped with the current UTC time.
    #[must_use]
    pub fn build(self) -> RunMetadata {
        RunMetadata {
            timestamp_utc: Utc::now(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            mode: self.mode,
            n_samples: self.n_samples,
            n_fields: self.n_fields,
            n_targets: self.n_targets,
            chunk_size: self.chunk_size,
            n_chunks: self.n_chunks,
            parallelism: self.parallelism,
            simulator_threads: self.simulator_threads,
            fraction_of_optimum: self.fraction_of_optimum,
            stats: self.stats,
            config: self.config,
        }
    }
}
