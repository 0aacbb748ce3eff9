//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow::array::{Float64Array, RecordBatch, StringArray};
use trueno_sweep::config::{
    CampaignConfig, DesignOrigin, DesignSource, SimulatorSection, TargetsSource,
};
use trueno_sweep::design::{DesignSpec, FieldBounds};
use trueno_sweep::schema::FeatureStat;
use trueno_sweep::simulator::{
    BaseEvaluation, Interval, Simulator, SimulatorConfig, SimulatorError, SimulatorInput,
    SolveStatus,
};
use trueno_sweep::storage::read_parquet;

/// Deterministic simulator.
///
/// objective = 1 + sum(parameters); interval of target `i` is
/// `[objective * f - i, objective * f + i + 1]`.
#[derive(Default)]
pub struct ScriptedSimulator {
    infeasible: BTreeSet<String>,
    fail_all: bool,
    base_calls: Arc<AtomicUsize>,
}

impl ScriptedSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Base evaluation of `sample_id` ends infeasible.
    pub fn infeasible(mut self, sample_id: &str) -> Self {
        self.infeasible.insert(sample_id.to_string());
        self
    }

    /// Every base evaluation ends infeasible.
    pub fn fail_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Counter of base evaluations; stays readable after the simulator is
    /// moved into a campaign.
    pub fn call_counter(&self) -> CallCounter {
        CallCounter(Arc::clone(&self.base_calls))
    }
}

impl Simulator for ScriptedSimulator {
    fn evaluate(
        &self,
        input: &SimulatorInput,
        _config: &SimulatorConfig,
    ) -> Result<BaseEvaluation, SimulatorError> {
        self.base_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all || self.infeasible.contains(&input.sample_id) {
            return Ok(BaseEvaluation {
                status: SolveStatus::Infeasible,
                objective_value: f64::NAN,
            });
        }
        Ok(BaseEvaluation::optimal(
            1.0 + input.parameters.values().sum::<f64>(),
        ))
    }

    #[allow(clippy::cast_precision_loss)]
    fn evaluate_target_interval(
        &self,
        _input: &SimulatorInput,
        _config: &SimulatorConfig,
        target: &str,
        fraction_of_optimum: f64,
        optimum: f64,
    ) -> Result<Interval, SimulatorError> {
        let i = target.trim_start_matches('T').parse::<usize>().unwrap_or(0) as f64;
        let centre = optimum * fraction_of_optimum;
        Ok(Interval {
            lower: centre - i,
            upper: centre + i + 1.0,
        })
    }
}

/// Shared view of a simulator's base-evaluation count.
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fresh, empty directory unique to this test process.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "trueno_sweep_it_{}_{name}",
        std::process::id()
    ));
    std::fs::remove_dir_all(&dir).ok();
    dir
}

/// Two-field generated campaign with targets `T1..=T{n_targets}`.
pub fn campaign_config(
    outdir: &Path,
    n: usize,
    chunk_size: usize,
    parallelism: usize,
    n_targets: usize,
) -> CampaignConfig {
    CampaignConfig {
        outdir: outdir.to_path_buf(),
        design: DesignSource {
            origin: DesignOrigin::Generate(DesignSpec::new(
                n,
                42,
                vec![
                    FieldBounds::new("acetate_mM", 0.0, 200.0),
                    FieldBounds::new("atpm", 0.0, 25.0),
                ],
            )),
            limit: None,
            sample_ids: None,
        },
        targets: TargetsSource::Inline((1..=n_targets).map(|i| format!("T{i}")).collect()),
        simulator: SimulatorSection::default(),
        chunk_size,
        parallelism,
        simulator_threads: 1,
        fraction_of_optimum: 0.95,
        stats: FeatureStat::DEFAULT.to_vec(),
    }
}

/// Whole Parquet file as one batch.
pub fn read_table(path: &Path) -> RecordBatch {
    let batches = read_parquet(path).unwrap();
    let schema = batches
        .first()
        .map(RecordBatch::schema)
        .expect("table has at least one batch");
    arrow::compute::concat_batches(&schema, &batches).unwrap()
}

pub fn f64_col<'a>(batch: &'a RecordBatch, name: &str) -> &'a Float64Array {
    batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("missing column {name}"))
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap()
}

pub fn str_col<'a>(batch: &'a RecordBatch, name: &str) -> &'a StringArray {
    batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("missing column {name}"))
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap()
}

pub fn bytes(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}
