//! External-process simulator adapter.
//!
//! Every call spawns the configured command once, writes one JSON request to
//! its stdin and reads one JSON response from its stdout. Heavy simulator work
//! therefore runs in its own OS process, one per busy worker thread.
//!
//! Requests:
//!
//! ```json
//! {"op": "evaluate", "sample_id": "S_00003", "parameters": {"atpm": 8.1}, "config": {}}
//! {"op": "target_interval", "sample_id": "S_00003", "parameters": {"atpm": 8.1},
//!  "config": {}, "target": "EX_ac_e", "fraction_of_optimum": 0.95, "objective_value": 0.71}
//! ```
//!
//! Responses are `{"status": "optimal", "objective_value": 0.71}`,
//! `{"lower": -3.2, "upper": 0.0}`, or
//! `{"error": {"kind": "config" | "evaluation", "message": "..."}}`.

use std::io::Write;
use std::process::{Command, Stdio};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{
    BaseEvaluation, Interval, Simulator, SimulatorConfig, SimulatorError, SimulatorInput,
};
use crate::runtime::RuntimeLimits;

/// Max bytes of child stderr carried into an error message
const STDERR_TAIL_BYTES: usize = 2048;

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request<'a> {
    Evaluate {
        #[serde(flatten)]
        input: &'a SimulatorInput,
        config: &'a SimulatorConfig,
    },
    TargetInterval {
        #[serde(flatten)]
        input: &'a SimulatorInput,
        config: &'a SimulatorConfig,
        target: &'a str,
        fraction_of_optimum: f64,
        objective_value: f64,
    },
}

#[derive(Deserialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

/// Simulator backed by an external command speaking JSON over stdio.
#[derive(Debug, Clone)]
pub struct CommandSimulator {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl CommandSimulator {
    /// Create an adapter for `program args...`.
    #[must_use]
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    /// Program invoked for every call.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Environment variables set on every child process.
    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    fn call<R: DeserializeOwned>(&self, request: &Request<'_>) -> Result<R, SimulatorError> {
        let payload = serde_json::to_vec(request)
            .map_err(|e| SimulatorError::Protocol(format!("failed to encode request: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading stdin is reported through its
            // exit status below, not as a pipe error.
            match stdin.write_all(&payload) {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                other => other?,
            }
        }

        let output = child.wait_with_output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if let Ok(ErrorResponse { error }) = serde_json::from_str::<ErrorResponse>(&stdout) {
            return Err(match error.kind.as_str() {
                "config" => SimulatorError::Config(error.message),
                _ => SimulatorError::Evaluation(error.message),
            });
        }

        if !output.status.success() {
            return Err(SimulatorError::Evaluation(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        serde_json::from_str(&stdout).map_err(|e| {
            SimulatorError::Protocol(format!("unparseable response from '{}': {e}", self.program))
        })
    }
}

impl Simulator for CommandSimulator {
    fn apply_runtime_limits(&mut self, limits: &RuntimeLimits) {
        self.env = limits
            .thread_env()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
    }

    fn evaluate(
        &self,
        input: &SimulatorInput,
        config: &SimulatorConfig,
    ) -> Result<BaseEvaluation, SimulatorError> {
        self.call(&Request::Evaluate { input, config })
    }

    fn evaluate_target_interval(
        &self,
        input: &SimulatorInput,
        config: &SimulatorConfig,
        target: &str,
        fraction_of_optimum: f64,
        optimum: f64,
    ) -> Result<Interval, SimulatorError> {
        self.call(&Request::TargetInterval {
            input,
            config,
            target,
            fraction_of_optimum,
            objective_value: optimum,
        })
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn input() -> SimulatorInput {
        SimulatorInput {
            sample_id: "S_00001".to_string(),
            parameters: BTreeMap::from([("atpm".to_string(), 8.0)]),
        }
    }

    #[test]
    fn test_request_encoding() {
        let input = input();
        let config = SimulatorConfig::new(serde_json::json!({"medium": "base"}));
        let json = serde_json::to_value(Request::TargetInterval {
            input: &input,
            config: &config,
            target: "EX_ac_e",
            fraction_of_optimum: 0.95,
            objective_value: 0.5,
        })
        .unwrap();

        assert_eq!(json["op"], "target_interval");
        assert_eq!(json["sample_id"], "S_00001");
        assert_eq!(json["parameters"]["atpm"], 8.0);
        assert_eq!(json["config"]["medium"], "base");
        assert_eq!(json["target"], "EX_ac_e");
    }

    #[test]
    fn test_runtime_limits_become_child_env() {
        let mut sim = CommandSimulator::new("true", vec![]);
        sim.apply_runtime_limits(&RuntimeLimits::new(4, 1).unwrap());
        assert!(sim
            .env()
            .iter()
            .any(|(k, v)| k == "OMP_NUM_THREADS" && v == "1"));
    }

    #[test]
    fn test_missing_program_is_io_error() {
        let sim = CommandSimulator::new("/nonexistent/trueno-sweep-simulator", vec![]);
        let err = sim
            .evaluate(&input(), &SimulatorConfig::default())
            .unwrap_err();
        assert!(matches!(err, SimulatorError::Io(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_simulator_roundtrip() {
        let sim = CommandSimulator::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"cat >/dev/null; echo '{"status": "optimal", "objective_value": 0.42}'"#
                    .to_string(),
            ],
        );
        let eval = sim.evaluate(&input(), &SimulatorConfig::default()).unwrap();
        assert!(eval.status.is_optimal());
        assert!((eval.objective_value - 0.42).abs() < f64::EPSILON);
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_simulator_config_error() {
        let sim = CommandSimulator::new(
            "sh",
            vec![
                "-c".to_string(),
                r#"cat >/dev/null; echo '{"error": {"kind": "config", "message": "no ATPM"}}'; exit 3"#
                    .to_string(),
            ],
        );
        let err = sim
            .evaluate_target_interval(&input(), &SimulatorConfig::default(), "ATPM", 0.95, 1.0)
            .unwrap_err();
        assert!(matches!(err, SimulatorError::Config(ref m) if m == "no ATPM"));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_simulator_nonzero_exit() {
        let sim = CommandSimulator::new(
            "sh",
            vec!["-c".to_string(), "echo boom >&2; exit 1".to_string()],
        );
        let err = sim.evaluate(&input(), &SimulatorConfig::default()).unwrap_err();
        assert!(matches!(err, SimulatorError::Evaluation(ref m) if m.contains("boom")));
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = "x".repeat(STDERR_TAIL_BYTES * 2);
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with("..."));
        assert_eq!(tail.len(), STDERR_TAIL_BYTES + 3);
    }
}
