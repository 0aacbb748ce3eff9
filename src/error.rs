//! Error types for Trueno-Sweep
//!
//! Only run-fatal conditions live here. Per-sample simulator problems never
//! become an [`Error`]; the worker turns them into
//! [`FailureRecord`](crate::failure::FailureRecord) data instead.
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Trueno-Sweep error types
#[derive(Error, Debug)]
pub enum Error {
    /// Sampling parameters or a pre-built design table are unusable
    #[error("Invalid design: {0}")]
    InvalidDesign(String),

    /// Campaign configuration is out of range or unreadable
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Writing an artifact failed (fatal: would break the restart invariant)
    #[error("Artifact write failed: {}: {message}", path.display())]
    ArtifactWrite {
        /// Destination path
        path: PathBuf,
        /// Underlying cause
        message: String,
    },

    /// Reading an artifact failed or it has an unexpected schema
    #[error("Artifact read failed: {}: {message}", path.display())]
    ArtifactRead {
        /// Source path
        path: PathBuf,
        /// Underlying cause
        message: String,
    },

    /// The same `(sample_id, target)` pair was found more than once
    #[error("Duplicate result for (sample_id={sample_id}, target={target})\nThis indicates a restart bug or a corrupted partial artifact.")]
    DuplicateSample {
        /// Offending sample
        sample_id: String,
        /// Offending target
        target: String,
    },

    /// A partial artifact row references a sample or target unknown to the run
    #[error("Unexpected row (sample_id={sample_id}, target={target}): not part of this run's design/targets")]
    UnexpectedRow {
        /// Sample id found in the artifact
        sample_id: String,
        /// Target found in the artifact
        target: String,
    },

    /// Rows of one sample disagree on its objective value
    #[error("Inconsistent objective for sample_id={sample_id}: {first} vs {found} (target={target})\nThis indicates a corrupted partial artifact.")]
    InconsistentObjective {
        /// Offending sample
        sample_id: String,
        /// Target of the disagreeing row
        target: String,
        /// Objective seen first
        first: f64,
        /// Objective of the disagreeing row
        found: f64,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an [`Error::ArtifactWrite`] from any displayable cause.
    pub fn artifact_write(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        Self::ArtifactWrite {
            path: path.into(),
            message: cause.to_string(),
        }
    }

    /// Build an [`Error::ArtifactRead`] from any displayable cause.
    pub fn artifact_read(path: impl Into<PathBuf>, cause: impl std::fmt::Display) -> Self {
        Self::ArtifactRead {
            path: path.into(),
            message: cause.to_string(),
        }
    }
}
