//! Simulator adapter boundary
//!
//! The simulator is an opaque, deterministic, potentially-failing external
//! collaborator. This crate never inspects how it computes anything; it only
//! relies on the two calls of the [`Simulator`] trait:
//!
//! ```text
//! evaluate(input, config)                          -> (status, objective_value)
//! evaluate_target_interval(input, config, target,
//!                          fraction_of_optimum,
//!                          optimum)                -> (lower, upper)
//! ```
//!
//! Errors raised here are typed ([`SimulatorError`]) and are converted to
//! failure records by the [`worker`](crate::worker); they never reach the
//! scheduler.

mod command;

pub use command::CommandSimulator;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::RuntimeLimits;

/// Opaque simulator configuration blob (environment/medium parameters).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimulatorConfig(pub serde_json::Value);

impl SimulatorConfig {
    /// Wrap a JSON value.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Underlying JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Simulator input built from one sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulatorInput {
    /// Identity of the sample being evaluated
    pub sample_id: String,
    /// Parameter values keyed by design field name
    pub parameters: BTreeMap<String, f64>,
}

/// Outcome status of a base evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SolveStatus {
    /// Optimal solution found
    Optimal,
    /// Problem is infeasible
    Infeasible,
    /// Objective is unbounded
    Unbounded,
    /// Any other solver status
    Other(String),
}

impl SolveStatus {
    /// Whether the base evaluation can be used for target intervals.
    #[must_use]
    pub const fn is_optimal(&self) -> bool {
        matches!(self, Self::Optimal)
    }
}

impl From<String> for SolveStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "optimal" => Self::Optimal,
            "infeasible" => Self::Infeasible,
            "unbounded" => Self::Unbounded,
            _ => Self::Other(s),
        }
    }
}

impl From<SolveStatus> for String {
    fn from(status: SolveStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimal => f.write_str("optimal"),
            Self::Infeasible => f.write_str("infeasible"),
            Self::Unbounded => f.write_str("unbounded"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Result of the base evaluation of one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseEvaluation {
    /// Solver status
    pub status: SolveStatus,
    /// Objective value (meaningful only when optimal)
    pub objective_value: f64,
}

impl BaseEvaluation {
    /// Optimal evaluation with the given objective.
    #[must_use]
    pub const fn optimal(objective_value: f64) -> Self {
        Self {
            status: SolveStatus::Optimal,
            objective_value,
        }
    }
}

/// Feasible interval of one target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
}

/// Typed simulator failure.
#[derive(Error, Debug)]
pub enum SimulatorError {
    /// Bad or missing parameter/reaction mapping in the simulator config
    #[error("simulator config error: {0}")]
    Config(String),

    /// The simulator failed while computing
    #[error("simulator evaluation error: {0}")]
    Evaluation(String),

    /// The simulator could not be reached
    #[error("simulator IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The simulator answered with something unparseable
    #[error("simulator protocol error: {0}")]
    Protocol(String),
}

/// Opaque deterministic evaluator of one parameter vector.
///
/// Implementations must be safe to call concurrently from many worker threads
/// and must not rely on state shared between calls for correctness.
pub trait Simulator: Send + Sync {
    /// Apply process-wide runtime limits.
    ///
    /// Called exactly once, when the worker pool is constructed and before any
    /// evaluation. The default ignores the limits.
    fn apply_runtime_limits(&mut self, _limits: &RuntimeLimits) {}

    /// Base evaluation of a sample.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError`] if the evaluation cannot be performed.
    fn evaluate(
        &self,
        input: &SimulatorInput,
        config: &SimulatorConfig,
    ) -> Result<BaseEvaluation, SimulatorError>;

    /// Feasible interval of `target` while keeping the objective within
    /// `fraction_of_optimum` of `optimum`.
    ///
    /// # Errors
    ///
    /// Returns [`SimulatorError`] if the interval cannot be computed.
    fn evaluate_target_interval(
        &self,
        input: &SimulatorInput,
        config: &SimulatorConfig,
        target: &str,
        fraction_of_optimum: f64,
        optimum: f64,
    ) -> Result<Interval, SimulatorError>;
}
