//! Worker: evaluates one sample against the simulator
//!
//! ```text
//! Sample ──> evaluate() ──optimal──> evaluate_target_interval() x targets ──> SampleSuccess
//!               │                              │ (any error)
//!               └─not optimal / error──────────┴──> FailureRecord
//! ```
//!
//! Every simulator problem, panics included, stops at this boundary and comes
//! out as a [`FailureRecord`]. A sample either yields one interval per target
//! or a single failure, never a partial set of targets.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::design::Sample;
use crate::failure::{FailureKind, FailureRecord};
use crate::simulator::{Simulator, SimulatorConfig, SimulatorError, SimulatorInput};
use crate::targets::TargetList;

/// Default near-optimality threshold for target intervals
pub const DEFAULT_FRACTION_OF_OPTIMUM: f64 = 0.95;

/// Interval of one (sample, target) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalResult {
    /// Sample identity
    pub sample_id: String,
    /// Sample-scoped objective, repeated on every target row
    pub objective_value: f64,
    /// Target name
    pub target: String,
    /// Lower bound
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
}

impl IntervalResult {
    /// `upper - lower`
    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }

    /// `(upper + lower) / 2`
    #[must_use]
    pub fn mid(&self) -> f64 {
        (self.upper + self.lower) / 2.0
    }
}

/// Successful evaluation of one sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSuccess {
    /// Sample identity
    pub sample_id: String,
    /// Objective of the base evaluation
    pub objective_value: f64,
    /// One interval per target, in target order
    pub intervals: Vec<IntervalResult>,
}

/// Outcome of one sample.
pub type SampleOutcome = std::result::Result<SampleSuccess, FailureRecord>;

/// Evaluates samples with a shared, read-only simulator setup.
pub struct Worker<'a, S: Simulator> {
    simulator: &'a S,
    config: &'a SimulatorConfig,
    fields: &'a [String],
    targets: &'a TargetList,
    fraction_of_optimum: f64,
}

impl<'a, S: Simulator> Worker<'a, S> {
    /// Create a worker.
    #[must_use]
    pub const fn new(
        simulator: &'a S,
        config: &'a SimulatorConfig,
        fields: &'a [String],
        targets: &'a TargetList,
        fraction_of_optimum: f64,
    ) -> Self {
        Self {
            simulator,
            config,
            fields,
            targets,
            fraction_of_optimum,
        }
    }

    /// Evaluate one sample.
    #[must_use]
    pub fn evaluate(&self, sample: &Sample) -> SampleOutcome {
        let input = SimulatorInput {
            sample_id: sample.sample_id().to_string(),
            parameters: sample.parameters(self.fields),
        };
        let fail = |kind: FailureKind, message: String| {
            FailureRecord::new(sample.sample_id(), kind, message)
        };

        let base = guarded(|| self.simulator.evaluate(&input, self.config))
            .map_err(|err| match err {
                SimulatorError::Config(msg) => fail(FailureKind::SimulatorConfig, msg),
                other => fail(FailureKind::Simulator, other.to_string()),
            })?;

        if !base.status.is_optimal() {
            return Err(fail(
                FailureKind::SimulatorInfeasible,
                format!("base evaluation status={}", base.status),
            ));
        }
        if !base.objective_value.is_finite() {
            return Err(fail(
                FailureKind::SimulatorInfeasible,
                format!("non-finite objective value {}", base.objective_value),
            ));
        }

        let mut intervals = Vec::with_capacity(self.targets.len());
        for target in self.targets.iter() {
            let interval = guarded(|| {
                self.simulator.evaluate_target_interval(
                    &input,
                    self.config,
                    target,
                    self.fraction_of_optimum,
                    base.objective_value,
                )
            })
            .map_err(|err| {
                fail(
                    FailureKind::TargetEvaluation,
                    format!("target '{target}': {err}"),
                )
            })?;

            if !interval.lower.is_finite() || !interval.upper.is_finite() {
                return Err(fail(
                    FailureKind::TargetEvaluation,
                    format!(
                        "target '{target}': non-finite interval ({}, {})",
                        interval.lower, interval.upper
                    ),
                ));
            }

            intervals.push(IntervalResult {
                sample_id: sample.sample_id().to_string(),
                objective_value: base.objective_value,
                target: target.to_string(),
                lower: interval.lower,
                upper: interval.upper,
            });
        }

        Ok(SampleSuccess {
            sample_id: sample.sample_id().to_string(),
            objective_value: base.objective_value,
            intervals,
        })
    }
}

/// Run a simulator call, turning a panic into an evaluation error.
fn guarded<T>(
    call: impl FnOnce() -> Result<T, SimulatorError>,
) -> Result<T, SimulatorError> {
    catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Err(SimulatorError::Evaluation(format!("simulator panicked: {message}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Design;
    use crate::simulator::{BaseEvaluation, Interval, SolveStatus};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Objective = first parameter; interval = [-objective * f, objective * f].
    #[derive(Default)]
    struct LinearSim {
        fail_target: Option<&'static str>,
        base_status: Option<SolveStatus>,
        config_error: bool,
        panic_on_target: bool,
        target_calls: AtomicUsize,
    }

    impl Simulator for LinearSim {
        fn evaluate(
            &self,
            input: &SimulatorInput,
            _config: &SimulatorConfig,
        ) -> Result<BaseEvaluation, SimulatorError> {
            if self.config_error {
                return Err(SimulatorError::Config("ATPM not in model".to_string()));
            }
            let objective = input.parameters.values().next().copied().unwrap_or(0.0);
            Ok(BaseEvaluation {
                status: self.base_status.clone().unwrap_or(SolveStatus::Optimal),
                objective_value: objective,
            })
        }

        fn evaluate_target_interval(
            &self,
            _input: &SimulatorInput,
            _config: &SimulatorConfig,
            target: &str,
            fraction_of_optimum: f64,
            optimum: f64,
        ) -> Result<Interval, SimulatorError> {
            self.target_calls.fetch_add(1, Ordering::SeqCst);
            if self.panic_on_target {
                panic!("solver crashed on {target}");
            }
            if self.fail_target == Some(target) {
                return Err(SimulatorError::Evaluation("FVA failed".to_string()));
            }
            Ok(Interval {
                lower: -optimum * fraction_of_optimum,
                upper: optimum * fraction_of_optimum,
            })
        }
    }

    fn fixture() -> (Design, TargetList) {
        let design = Design::from_rows(
            vec!["x".to_string()],
            vec![("S_00000".to_string(), vec![2.0])],
        )
        .unwrap();
        let targets =
            TargetList::new(vec!["T1".to_string(), "T2".to_string(), "T3".to_string()]).unwrap();
        (design, targets)
    }

    fn run(sim: &LinearSim) -> SampleOutcome {
        let (design, targets) = fixture();
        let config = SimulatorConfig::default();
        let worker = Worker::new(sim, &config, design.fields(), &targets, 0.5);
        worker.evaluate(&design.samples()[0])
    }

    #[test]
    fn test_success_one_interval_per_target() {
        let success = run(&LinearSim::default()).unwrap();
        assert_eq!(success.intervals.len(), 3);
        assert!((success.objective_value - 2.0).abs() < f64::EPSILON);
        let first = &success.intervals[0];
        assert_eq!(first.target, "T1");
        assert!((first.lower + 1.0).abs() < f64::EPSILON);
        assert!((first.width() - 2.0).abs() < f64::EPSILON);
        assert!(first.mid().abs() < f64::EPSILON);
    }

    #[test]
    fn test_infeasible_base_skips_targets() {
        let sim = LinearSim {
            base_status: Some(SolveStatus::Infeasible),
            ..LinearSim::default()
        };
        let failure = run(&sim).unwrap_err();
        assert_eq!(failure.error_kind, FailureKind::SimulatorInfeasible);
        assert!(failure.error_message.contains("infeasible"));
        assert_eq!(sim.target_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_config_error_classified() {
        let sim = LinearSim {
            config_error: true,
            ..LinearSim::default()
        };
        let failure = run(&sim).unwrap_err();
        assert_eq!(failure.error_kind, FailureKind::SimulatorConfig);
        assert_eq!(failure.sample_id, "S_00000");
    }

    #[test]
    fn test_target_failure_discards_partial_targets() {
        let sim = LinearSim {
            fail_target: Some("T2"),
            ..LinearSim::default()
        };
        let failure = run(&sim).unwrap_err();
        assert_eq!(failure.error_kind, FailureKind::TargetEvaluation);
        assert!(failure.error_message.contains("T2"));
        // T3 is never attempted once T2 fails.
        assert_eq!(sim.target_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_panic_becomes_failure() {
        let sim = LinearSim {
            panic_on_target: true,
            ..LinearSim::default()
        };
        let failure = run(&sim).unwrap_err();
        assert_eq!(failure.error_kind, FailureKind::TargetEvaluation);
        assert!(failure.error_message.contains("panicked"));
    }
}
