//! # Trueno-Sweep: Restartable Parameter-Sweep Campaigns
//!
//! **Version**: 0.1.0
//!
//! Trueno-Sweep runs a parameter-sweep campaign against an expensive, external,
//! possibly-failing simulator and folds thousands of small per-sample results
//! into one wide feature table keyed by sample identity.
//!
//! ## Pipeline
//!
//! ```text
//! Sampler ──> Chunk Scheduler ──> Worker x parallelism ──> parts/part_{s}_{e}.parquet
//!                   │                     │
//!                   │                     └──> Failure Collector ──> failed_samples.parquet
//!                   └──> Aggregator (pivot + left join onto design) ──> features.parquet
//! ```
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: One bad sample never stops the line; a broken checkpoint does
//! - **Poka-Yoke**: Atomic artifact writes, so a checkpoint is either whole or absent
//! - **Heijunka**: Bounded worker pool plus simulator thread caps
//! - **Genchi Genbutsu**: Output is a pure function of design and artifacts
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trueno_sweep::campaign::Campaign;
//! use trueno_sweep::config::CampaignConfig;
//!
//! let config = CampaignConfig::load("campaign.yaml")?;
//! let campaign = Campaign::new(config)?;
//! let simulator = campaign.config().command_simulator()?;
//!
//! let summary = campaign.run(simulator)?;
//! println!("{} feature rows", summary.feature_rows());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod aggregate;
pub mod campaign;
pub mod config;
pub mod design;
pub mod error;
pub mod failure;
pub mod provenance;
pub mod runtime;
pub mod scheduler;
pub mod schema;
pub mod simulator;
pub mod storage;
pub mod targets;
pub mod worker;

pub use error::{Error, Result};
