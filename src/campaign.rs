//! Campaign: one output directory, three entry points
//!
//! ```text
//! run      design.parquet ─> scheduler (skips Completed chunks) ─> aggregate ─> summary
//! collect  aggregate existing parts/ only (merge-only)
//! design   design.parquet only
//! ```
//!
//! Every entry point writes `run_metadata.json` first and `run_summary.json`
//! last. Rerunning `run` on a finished output directory recomputes nothing
//! and rewrites byte-identical tables.

use std::path::PathBuf;

use crate::aggregate::{Aggregation, Aggregator};
use crate::config::{CampaignConfig, CampaignPaths};
use crate::design::Design;
use crate::failure::{read_failure_log, FailureCollector};
use crate::provenance::{RunMetadata, RunMode, RunSummary};
use crate::schema::FeatureSchema;
use crate::scheduler::{ChunkPlan, ChunkScheduler};
use crate::simulator::Simulator;
use crate::storage::PartialStore;
use crate::targets::TargetList;
use crate::{Error, Result};

/// A configured campaign with its resolved design and targets.
#[derive(Debug, Clone)]
pub struct Campaign {
    config: CampaignConfig,
    design: Design,
    targets: TargetList,
    paths: CampaignPaths,
}

impl Campaign {
    /// Resolve the design and targets of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`], [`Error::InvalidDesign`] or
    /// [`Error::ArtifactRead`] if an input cannot be resolved, and
    /// [`Error::InvalidConfig`] if design fields collide with feature columns.
    pub fn new(config: CampaignConfig) -> Result<Self> {
        config.validate()?;
        let design = config.load_design()?;
        let targets = config.load_targets()?;
        FeatureSchema::new(design.fields(), &targets, &config.stats)?;
        let paths = config.paths();
        Ok(Self {
            config,
            design,
            targets,
            paths,
        })
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &CampaignConfig {
        &self.config
    }

    /// Resolved design.
    #[must_use]
    pub const fn design(&self) -> &Design {
        &self.design
    }

    /// Resolved targets.
    #[must_use]
    pub const fn targets(&self) -> &TargetList {
        &self.targets
    }

    /// Output layout.
    #[must_use]
    pub const fn paths(&self) -> &CampaignPaths {
        &self.paths
    }

    /// Write `design.parquet` and return its path.
    ///
    /// An existing design table must match the resolved design: chunk offsets
    /// of earlier artifacts refer to it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] if the output directory already holds
    /// a different design, or [`Error::ArtifactWrite`] on IO failure.
    pub fn write_design(&self) -> Result<PathBuf> {
        let path = self.paths.design();
        if path.exists() {
            let existing = Design::load_parquet(&path)?;
            if existing != self.design {
                return Err(Error::InvalidDesign(format!(
                    "{} holds a different design than the configured one; \
                     use a fresh outdir or restore the original config",
                    path.display()
                )));
            }
        }
        self.design.write_parquet(&path)?;
        tracing::info!(
            path = %path.display(),
            samples = self.design.len(),
            fields = self.design.fields().len(),
            "design written"
        );
        Ok(path)
    }

    fn metadata(&self, mode: RunMode) -> Result<RunMetadata> {
        let n_chunks = ChunkPlan::new(self.design.len(), self.config.chunk_size)?.len();
        Ok(RunMetadata::builder(mode)
            .samples(self.design.len())
            .fields(self.design.fields().len())
            .targets(self.targets.len())
            .chunking(self.config.chunk_size, n_chunks)
            .limits(self.config.parallelism, self.config.simulator_threads)
            .fraction_of_optimum(self.config.fraction_of_optimum)
            .stats(&self.config.stats)
            .config(serde_json::to_value(&self.config)?)
            .build())
    }

    fn start(&self, mode: RunMode) -> Result<RunSummary> {
        let summary = RunSummary::new(mode);
        self.metadata(mode)?.write(self.paths.metadata())?;
        Ok(summary)
    }

    fn finish(&self, mut summary: RunSummary) -> Result<RunSummary> {
        summary.complete();
        summary.write(self.paths.summary())?;
        Ok(summary)
    }

    fn aggregate(&self) -> Result<Aggregation> {
        let aggregator = Aggregator::new(&self.design, &self.targets, &self.config.stats)?;
        let aggregation = aggregator.collect(&PartialStore::new(self.paths.parts_dir()))?;
        aggregation.write(&self.paths.features(), &self.paths.intervals_long())?;

        if aggregation.samples_with_results == 0 {
            tracing::warn!(
                samples = self.design.len(),
                "no sample produced results; every derived column is null"
            );
        } else if aggregation.samples_without_results() > 0 {
            tracing::info!(
                missing = aggregation.samples_without_results(),
                "samples without results kept as null rows"
            );
        }
        Ok(aggregation)
    }

    /// Write the design only.
    ///
    /// # Errors
    ///
    /// See [`Campaign::write_design`].
    pub fn design_only(&self) -> Result<RunSummary> {
        let summary = self.start(RunMode::Design)?;
        self.write_design()?;
        self.finish(summary)
    }

    /// Run the full campaign: schedule every pending chunk, then aggregate.
    ///
    /// # Errors
    ///
    /// Returns an error only for run-fatal conditions (unwritable artifacts,
    /// a mismatching design, aggregation invariants). Sample failures end up
    /// in the failure log.
    pub fn run<S: Simulator>(&self, simulator: S) -> Result<RunSummary> {
        let mut summary = self.start(RunMode::Run)?;
        self.write_design()?;

        let mut collector = FailureCollector::resume(self.paths.failure_log(), &self.design)?;
        let scheduler = ChunkScheduler::new(
            simulator,
            self.config.runtime_limits()?,
            PartialStore::new(self.paths.parts_dir()),
            self.config.chunk_size,
        )?
        .with_fraction_of_optimum(self.config.fraction_of_optimum);

        let report = scheduler.run(
            &self.design,
            &self.targets,
            &self.config.simulator.config,
            &mut collector,
        )?;
        // An invocation that skipped every chunk still leaves a log behind.
        collector.persist()?;

        tracing::info!(
            processed = report.chunks_processed,
            skipped = report.chunks_skipped,
            failed_total = collector.len(),
            "scheduling finished"
        );
        summary.record_schedule(report);
        summary.record_failures(collector.len());

        let aggregation = self.aggregate()?;
        summary.record_features(aggregation.features.num_rows(), aggregation.samples_with_results);
        self.finish(summary)
    }

    /// Aggregate the artifacts already on disk without evaluating anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactRead`] for unreadable artifacts and the
    /// aggregation errors of [`Aggregator::aggregate`].
    pub fn collect(&self) -> Result<RunSummary> {
        let mut summary = self.start(RunMode::Collect)?;
        if self.paths.design().exists() {
            self.write_design()?;
        }

        let failure_log = self.paths.failure_log();
        if failure_log.exists() {
            summary.record_failures(read_failure_log(&failure_log)?.len());
        }

        let aggregation = self.aggregate()?;
        summary.record_features(aggregation.features.num_rows(), aggregation.samples_with_results);
        self.finish(summary)
    }
}
