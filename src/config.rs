//! Campaign configuration and output layout
//!
//! A campaign is described by one YAML (`.yaml`/`.yml`) or JSON (`.json`)
//! file:
//!
//! ```yaml
//! outdir: runs/acetate_sweep
//! design:
//!   generate:
//!     n: 200
//!     seed: 42
//!     fields:
//!       - { name: acetate_mM, min: 0.0, max: 200.0 }
//!       - { name: atpm, min: 0.0, max: 25.0 }
//!   limit: 50                # optional
//! targets: [ATPM, BIOMASS]   # or { path: targets.json }
//! simulator:
//!   command: ./simulate.py
//!   args: [--model, core.xml]
//!   config: { medium: minimal }
//! chunk_size: 50
//! parallelism: 8
//! simulator_threads: 1
//! fraction_of_optimum: 0.95
//! stats: [width, mid]
//! ```
//!
//! Input paths (design table, targets file) are resolved against the config
//! file's directory. `outdir` is taken as given.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::design::{Design, DesignSpec};
use crate::runtime::RuntimeLimits;
use crate::scheduler::DEFAULT_CHUNK_SIZE;
use crate::schema::FeatureStat;
use crate::simulator::{CommandSimulator, SimulatorConfig};
use crate::targets::TargetList;
use crate::worker::DEFAULT_FRACTION_OF_OPTIMUM;
use crate::{Error, Result};

/// Default worker count
pub const DEFAULT_PARALLELISM: usize = 8;

/// Default simulator-internal thread cap
pub const DEFAULT_SIMULATOR_THREADS: usize = 1;

const fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

const fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

const fn default_simulator_threads() -> usize {
    DEFAULT_SIMULATOR_THREADS
}

const fn default_fraction_of_optimum() -> f64 {
    DEFAULT_FRACTION_OF_OPTIMUM
}

fn default_stats() -> Vec<FeatureStat> {
    FeatureStat::DEFAULT.to_vec()
}

/// Where the design comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesignOrigin {
    /// Latin hypercube sampling
    Generate(DesignSpec),
    /// Pre-built Parquet design table
    Table {
        /// Table path
        path: PathBuf,
    },
}

/// Design section: origin plus optional subsetting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSource {
    /// Origin of the full design
    #[serde(flatten)]
    pub origin: DesignOrigin,
    /// Keep only the first `limit` samples
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Keep only these sample ids (design order is preserved)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_ids: Option<Vec<String>>,
}

/// Targets section: inline names or a JSON array file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetsSource {
    /// Inline list
    Inline(Vec<String>),
    /// JSON array of names
    File {
        /// File path
        path: PathBuf,
    },
}

/// External simulator command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatorSection {
    /// Program to spawn for every evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Fixed arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Opaque configuration forwarded with every request
    #[serde(default)]
    pub config: SimulatorConfig,
}

/// Complete campaign configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    /// Output directory
    pub outdir: PathBuf,
    /// Design section
    pub design: DesignSource,
    /// Targets section
    pub targets: TargetsSource,
    /// Simulator section
    #[serde(default)]
    pub simulator: SimulatorSection,
    /// Samples per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Concurrent workers
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Simulator-internal thread cap
    #[serde(default = "default_simulator_threads")]
    pub simulator_threads: usize,
    /// Near-optimality threshold for target intervals
    #[serde(default = "default_fraction_of_optimum")]
    pub fraction_of_optimum: f64,
    /// Derived stats per target
    #[serde(default = "default_stats")]
    pub stats: Vec<FeatureStat>,
}

impl CampaignConfig {
    /// Load and validate a config file, choosing the parser by extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for unreadable files, unsupported
    /// extensions, parse failures, or out-of-range values.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let mut config = match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&text)?,
            Some("json") => Self::from_json_str(&text)?,
            other => {
                return Err(Error::InvalidConfig(format!(
                    "unsupported config extension {other:?} for {} (expected .yaml, .yml or .json)",
                    path.display()
                )))
            }
        };

        if let Some(base) = path.parent() {
            config.resolve_inputs(base);
        }
        tracing::debug!(path = %path.display(), "loaded campaign config");
        Ok(config)
    }

    /// Parse and validate YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] on parse or validation failure.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("YAML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] on parse or validation failure.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Error::InvalidConfig(format!("JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_inputs(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let DesignOrigin::Table { path } = &mut self.design.origin {
            resolve(path);
        }
        if let TargetsSource::File { path } = &mut self.targets {
            resolve(path);
        }
    }

    /// Check every numeric range and the stat list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] or [`Error::InvalidDesign`] naming the
    /// first offending value.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".to_string()));
        }
        RuntimeLimits::new(self.parallelism, self.simulator_threads)?;
        if !(self.fraction_of_optimum > 0.0 && self.fraction_of_optimum <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "fraction_of_optimum must be in (0, 1], got {}",
                self.fraction_of_optimum
            )));
        }
        if self.stats.is_empty() {
            return Err(Error::InvalidConfig("stats must not be empty".to_string()));
        }
        let mut seen = FxHashSet::default();
        if let Some(dup) = self.stats.iter().find(|s| !seen.insert(**s)) {
            return Err(Error::InvalidConfig(format!(
                "stat '{}' listed twice",
                dup.prefix()
            )));
        }
        if self.design.limit == Some(0) {
            return Err(Error::InvalidConfig("design.limit must be > 0".to_string()));
        }
        if self
            .design
            .sample_ids
            .as_ref()
            .is_some_and(Vec::is_empty)
        {
            return Err(Error::InvalidConfig(
                "design.sample_ids must not be empty".to_string(),
            ));
        }
        if let DesignOrigin::Generate(spec) = &self.design.origin {
            spec.validate()?;
        }
        if let TargetsSource::Inline(names) = &self.targets {
            TargetList::new(names.clone())?;
        }
        Ok(())
    }

    /// Apply command-line overrides, then re-validate.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if an override is out of range.
    pub fn apply(&mut self, overrides: &ConfigOverrides) -> Result<()> {
        if let Some(outdir) = &overrides.outdir {
            self.outdir.clone_from(outdir);
        }
        if let Some(chunk_size) = overrides.chunk_size {
            self.chunk_size = chunk_size;
        }
        if let Some(parallelism) = overrides.parallelism {
            self.parallelism = parallelism;
        }
        if let Some(fraction) = overrides.fraction_of_optimum {
            self.fraction_of_optimum = fraction;
        }
        self.validate()
    }

    /// Build the design, applying `sample_ids` then `limit`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] or [`Error::ArtifactRead`].
    pub fn load_design(&self) -> Result<Design> {
        let mut design = match &self.design.origin {
            DesignOrigin::Generate(spec) => Design::latin_hypercube(spec)?,
            DesignOrigin::Table { path } => Design::load_parquet(path)?,
        };
        if let Some(ids) = &self.design.sample_ids {
            design = design.select(ids)?;
        }
        if let Some(limit) = self.design.limit {
            design = design.limit(limit)?;
        }
        Ok(design)
    }

    /// Resolve the target list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an empty, blank or repeated
    /// target, or an unreadable targets file.
    pub fn load_targets(&self) -> Result<TargetList> {
        match &self.targets {
            TargetsSource::Inline(names) => TargetList::new(names.clone()),
            TargetsSource::File { path } => TargetList::load_json(path),
        }
    }

    /// Thread limits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if a limit is zero.
    pub fn runtime_limits(&self) -> Result<RuntimeLimits> {
        RuntimeLimits::new(self.parallelism, self.simulator_threads)
    }

    /// Command simulator from the `simulator` section.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if no command is configured.
    pub fn command_simulator(&self) -> Result<CommandSimulator> {
        let command = self
            .simulator
            .command
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::InvalidConfig("simulator.command is required".to_string()))?;
        Ok(CommandSimulator::new(command, self.simulator.args.clone()))
    }

    /// Output layout under `outdir`.
    #[must_use]
    pub fn paths(&self) -> CampaignPaths {
        CampaignPaths::new(&self.outdir)
    }
}

/// Command-line overrides of a loaded config.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// Replaces `outdir`
    pub outdir: Option<PathBuf>,
    /// Replaces `chunk_size`
    pub chunk_size: Option<usize>,
    /// Replaces `parallelism`
    pub parallelism: Option<usize>,
    /// Replaces `fraction_of_optimum`
    pub fraction_of_optimum: Option<f64>,
}

/// Every output path of a campaign, derived from its output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignPaths {
    root: PathBuf,
}

impl CampaignPaths {
    /// Layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Output directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `design.parquet`
    #[must_use]
    pub fn design(&self) -> PathBuf {
        self.root.join("design.parquet")
    }

    /// `parts/`
    #[must_use]
    pub fn parts_dir(&self) -> PathBuf {
        self.root.join("parts")
    }

    /// `failed_samples.parquet`
    #[must_use]
    pub fn failure_log(&self) -> PathBuf {
        self.root.join("failed_samples.parquet")
    }

    /// `run_metadata.json`
    #[must_use]
    pub fn metadata(&self) -> PathBuf {
        self.root.join("run_metadata.json")
    }

    /// `features.parquet`
    #[must_use]
    pub fn features(&self) -> PathBuf {
        self.root.join("features.parquet")
    }

    /// `intervals_long.parquet`
    #[must_use]
    pub fn intervals_long(&self) -> PathBuf {
        self.root.join("intervals_long.parquet")
    }

    /// `run_summary.json`
    #[must_use]
    pub fn summary(&self) -> PathBuf {
        self.root.join("run_summary.json")
    }
}
