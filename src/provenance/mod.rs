//! Run provenance records
//!
//! Two JSON documents sit next to the artifacts of a campaign:
//!
//! ```text
//! run_metadata.json   written when an invocation starts (config echo, sizes)
//! run_summary.json    written when it finishes (chunks, failures, coverage)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use trueno_sweep::provenance::{RunMetadata, RunMode, RunSummary};
//!
//! let metadata = RunMetadata::builder(RunMode::Run)
//!     .samples(5)
//!     .targets(1)
//!     .chunking(2, 3)
//!     .build();
//! assert_eq!(metadata.n_chunks(), 3);
//!
//! let mut summary = RunSummary::new(RunMode::Run);
//! summary.complete();
//! assert!(summary.finished_at().is_some());
//! ```

mod metadata;
mod summary;

use serde::{Deserialize, Serialize};

pub use metadata::{RunMetadata, RunMetadataBuilder};
pub use summary::RunSummary;

/// Which entry point produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Full campaign: schedule, then aggregate
    Run,
    /// Aggregate existing artifacts only
    Collect,
    /// Write the design table only
    Design,
}
