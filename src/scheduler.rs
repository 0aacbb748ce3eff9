//! Chunk scheduler: restartable, chunked fan-out over the worker pool
//!
//! ```text
//! design ──> ChunkPlan ──> chunk 0 ──Completed──> skip
//!                      ├─> chunk 1 ──Pending──> pool.map_ordered(worker) ──> FailureCollector::persist
//!                      │                                               └──> part_{s}_{e}.parquet
//!                      └─> ...
//! ```
//!
//! Chunks run one at a time in design order. Within a chunk, samples fan out
//! over the bounded pool and are re-associated by design position before the
//! chunk's artifact is written.
//!
//! Toyota Way Principles:
//! - Jidoka: A sample failure stops at the worker, an artifact write failure
//!   stops the line
//! - Poka-Yoke: Chunk status is derived in one place, from artifact presence

use std::path::PathBuf;

use serde::Serialize;

use crate::design::{Design, Sample};
use crate::failure::FailureCollector;
use crate::runtime::{RuntimeLimits, WorkerPool};
use crate::simulator::{Simulator, SimulatorConfig};
use crate::storage::PartialStore;
use crate::targets::TargetList;
use crate::worker::{Worker, DEFAULT_FRACTION_OF_OPTIMUM};
use crate::{Error, Result};

/// Default number of samples per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Contiguous `[start, end)` slice of the design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the plan
    pub index: usize,
    /// First design offset (inclusive)
    pub start: usize,
    /// Last design offset (exclusive)
    pub end: usize,
}

impl Chunk {
    /// Sample count.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the chunk holds no samples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The chunk's samples.
    #[must_use]
    pub fn samples<'d>(&self, design: &'d Design) -> &'d [Sample] {
        &design.samples()[self.start..self.end]
    }
}

/// Partition of `len` samples into chunks of `chunk_size` (last may be smaller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    chunks: Vec<Chunk>,
}

impl ChunkPlan {
    /// Build the plan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `chunk_size == 0`.
    pub fn new(len: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".to_string()));
        }
        let chunks = (0..len)
            .step_by(chunk_size)
            .enumerate()
            .map(|(index, start)| Chunk {
                index,
                start,
                end: (start + chunk_size).min(len),
            })
            .collect();
        Ok(Self { chunks })
    }

    /// Chunks in design order.
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether there is nothing to schedule.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Whether a chunk still needs work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// No artifact yet
    Pending,
    /// Artifact present; skipped without being read
    Completed,
}

/// What one scheduler invocation did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleReport {
    /// Chunks in the plan
    pub chunks_total: usize,
    /// Chunks evaluated by this invocation
    pub chunks_processed: usize,
    /// Chunks skipped because their artifact already existed
    pub chunks_skipped: usize,
    /// Samples that produced intervals in this invocation
    pub samples_succeeded: usize,
    /// Samples that produced a failure record in this invocation
    pub samples_failed: usize,
    /// Artifacts written by this invocation
    pub artifacts: Vec<PathBuf>,
}

/// Drives chunks through the worker pool and into the artifact store.
pub struct ChunkScheduler<S: Simulator> {
    simulator: S,
    pool: WorkerPool,
    store: PartialStore,
    chunk_size: usize,
    fraction_of_optimum: f64,
}

impl<S: Simulator> ChunkScheduler<S> {
    /// Build the scheduler and its pool.
    ///
    /// `limits` are handed to the simulator exactly once, here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `chunk_size == 0`, or an error if
    /// the pool cannot start.
    pub fn new(
        mut simulator: S,
        limits: RuntimeLimits,
        store: PartialStore,
        chunk_size: usize,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".to_string()));
        }
        simulator.apply_runtime_limits(&limits);
        let pool = WorkerPool::new(limits)?;
        Ok(Self {
            simulator,
            pool,
            store,
            chunk_size,
            fraction_of_optimum: DEFAULT_FRACTION_OF_OPTIMUM,
        })
    }

    /// Override the near-optimality threshold passed to target evaluation.
    #[must_use]
    pub fn with_fraction_of_optimum(mut self, fraction_of_optimum: f64) -> Self {
        self.fraction_of_optimum = fraction_of_optimum;
        self
    }

    /// The simulator driven by this scheduler.
    #[must_use]
    pub const fn simulator(&self) -> &S {
        &self.simulator
    }

    /// Artifact store.
    #[must_use]
    pub const fn store(&self) -> &PartialStore {
        &self.store
    }

    /// Plan for `design`.
    ///
    /// # Errors
    ///
    /// Never fails for a scheduler built by [`ChunkScheduler::new`].
    pub fn plan(&self, design: &Design) -> Result<ChunkPlan> {
        ChunkPlan::new(design.len(), self.chunk_size)
    }

    /// Status of `chunk`, from artifact presence alone.
    #[must_use]
    pub fn status(&self, chunk: &Chunk) -> ChunkStatus {
        if self.store.contains(chunk.start, chunk.end) {
            ChunkStatus::Completed
        } else {
            ChunkStatus::Pending
        }
    }

    /// Process every pending chunk of `design`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactWrite`] if a partial artifact or the failure
    /// log cannot be written. Per-sample failures are never errors.
    ///
    /// A chunk's failures are persisted before its artifact, so an
    /// interrupted chunk is recomputed rather than silently losing records.
    pub fn run(
        &self,
        design: &Design,
        targets: &TargetList,
        config: &SimulatorConfig,
        collector: &mut FailureCollector,
    ) -> Result<ScheduleReport> {
        let plan = self.plan(design)?;
        let worker = Worker::new(
            &self.simulator,
            config,
            design.fields(),
            targets,
            self.fraction_of_optimum,
        );
        let mut report = ScheduleReport {
            chunks_total: plan.len(),
            ..ScheduleReport::default()
        };

        tracing::info!(
            samples = design.len(),
            chunks = plan.len(),
            chunk_size = self.chunk_size,
            parallelism = self.pool.limits().parallelism(),
            "scheduling campaign"
        );

        for chunk in plan.chunks() {
            let span = tracing::info_span!(
                "chunk",
                index = chunk.index,
                start = chunk.start,
                end = chunk.end
            );
            let _guard = span.enter();

            if self.status(chunk) == ChunkStatus::Completed {
                tracing::info!("artifact present, skipping chunk");
                report.chunks_skipped += 1;
                continue;
            }

            let samples = chunk.samples(design);
            let outcomes = self.pool.map_ordered(samples, |sample| worker.evaluate(sample));

            let mut rows = Vec::with_capacity(samples.len() * targets.len());
            let mut failures = Vec::new();
            for outcome in outcomes {
                match outcome {
                    Ok(success) => rows.extend(success.intervals),
                    Err(failure) => {
                        tracing::warn!(
                            sample_id = %failure.sample_id,
                            kind = %failure.error_kind,
                            message = %failure.error_message,
                            "sample failed"
                        );
                        failures.push(failure);
                    }
                }
            }
            let failed = failures.len();
            let succeeded = samples.len() - failed;

            // The log goes first: a chunk must never be Completed while its
            // failures are missing from disk.
            collector.record_chunk(samples.iter().map(Sample::sample_id), failures);
            collector.persist()?;
            let path = self.store.write(chunk.start, chunk.end, &rows)?;

            tracing::info!(
                succeeded,
                failed,
                rows = rows.len(),
                path = %path.display(),
                "chunk completed"
            );
            report.chunks_processed += 1;
            report.samples_succeeded += succeeded;
            report.samples_failed += failed;
            report.artifacts.push(path);
        }

        Ok(report)
    }
}
