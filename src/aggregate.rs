//! Aggregator: partial artifacts to the wide feature table
//!
//! ```text
//! part_*.parquet ──concat──> long (sample_id, objective_value, target, lower, upper)
//!                               │
//!                               ├──+ width, mid ──> intervals_long.parquet
//!                               │
//!                               └──pivot──> [design position x target] cells
//!                                              │
//!                   design ──left join─────────┴──> features.parquet (one row per sample)
//! ```
//!
//! The output schema comes from [`FeatureSchema`] before any artifact is
//! read, so columns never depend on which targets happened to succeed.
//!
//! Toyota Way Principles:
//! - Jidoka: Duplicate or foreign rows stop the aggregation
//! - Genchi Genbutsu: Output is a pure function of artifacts and design,
//!   independent of the order chunks were processed in

use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, RecordBatch, StringArray};

use crate::design::Design;
use crate::schema::{long_schema, FeatureSchema, FeatureStat, LOWER, OBJECTIVE_VALUE, SAMPLE_ID, TARGET, UPPER};
use crate::storage::{self, PartialStore};
use crate::targets::TargetList;
use crate::{Error, Result};

/// Output of one aggregation.
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Wide table: one row per design sample, in design order
    pub features: RecordBatch,
    /// Concatenated long table with `width` and `mid`
    pub long: RecordBatch,
    /// Samples with at least one interval
    pub samples_with_results: usize,
}

impl Aggregation {
    /// Samples whose derived columns are all null.
    #[must_use]
    pub fn samples_without_results(&self) -> usize {
        self.features.num_rows() - self.samples_with_results
    }

    /// Write both tables atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactWrite`] on IO failure.
    pub fn write(&self, features_path: &Path, long_path: &Path) -> Result<()> {
        storage::write_parquet(
            features_path,
            &self.features.schema(),
            std::slice::from_ref(&self.features),
        )?;
        storage::write_parquet(long_path, &self.long.schema(), std::slice::from_ref(&self.long))?;
        tracing::info!(
            features = %features_path.display(),
            long = %long_path.display(),
            rows = self.features.num_rows(),
            "feature tables written"
        );
        Ok(())
    }
}

/// Folds partial artifacts into the feature table of one design.
pub struct Aggregator<'a> {
    design: &'a Design,
    targets: &'a TargetList,
    schema: FeatureSchema,
}

impl<'a> Aggregator<'a> {
    /// Aggregator for `design` x `targets`, deriving `stats` per target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the feature columns would collide.
    pub fn new(design: &'a Design, targets: &'a TargetList, stats: &[FeatureStat]) -> Result<Self> {
        Ok(Self {
            design,
            targets,
            schema: FeatureSchema::new(design.fields(), targets, stats)?,
        })
    }

    /// Schema of the feature table.
    #[must_use]
    pub const fn feature_schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Aggregate every artifact in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactRead`] for unreadable artifacts, and the
    /// errors of [`Aggregator::aggregate`].
    pub fn collect(&self, store: &PartialStore) -> Result<Aggregation> {
        let artifacts = store.list()?.len();
        let long = store.load_all()?.concat()?;
        tracing::info!(
            artifacts,
            rows = long.num_rows(),
            dir = %store.dir().display(),
            "concatenated partial artifacts"
        );
        self.aggregate(&long)
    }

    /// Pivot a long batch (partial-artifact schema) and join it onto the design.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateSample`] if a `(sample_id, target)` pair repeats
    /// - [`Error::UnexpectedRow`] if a row names a sample outside the design
    ///   or a target outside the target list
    /// - [`Error::InconsistentObjective`] if rows of one sample disagree on
    ///   its objective value
    pub fn aggregate(&self, long: &RecordBatch) -> Result<Aggregation> {
        let ids = storage::utf8_column(long, SAMPLE_ID)?;
        let objectives = storage::f64_column(long, OBJECTIVE_VALUE)?;
        let targets = storage::utf8_column(long, TARGET)?;
        let lowers = storage::f64_column(long, LOWER)?;
        let uppers = storage::f64_column(long, UPPER)?;

        let positions = self.design.position_index();
        let target_index = self.targets.index();
        let n_targets = self.targets.len();

        // Cell (pos, t) lives at pos * n_targets + t.
        let mut cells: Vec<Option<(f64, f64)>> = vec![None; self.design.len() * n_targets];
        let mut objective: Vec<Option<f64>> = vec![None; self.design.len()];

        for row in 0..long.num_rows() {
            let (sample_id, target) = (ids.value(row), targets.value(row));
            let (Some(&pos), Some(&t)) = (positions.get(sample_id), target_index.get(target))
            else {
                return Err(Error::UnexpectedRow {
                    sample_id: sample_id.to_string(),
                    target: target.to_string(),
                });
            };

            let cell = &mut cells[pos * n_targets + t];
            if cell.is_some() {
                return Err(Error::DuplicateSample {
                    sample_id: sample_id.to_string(),
                    target: target.to_string(),
                });
            }
            *cell = Some((lowers.value(row), uppers.value(row)));

            let value = objectives.value(row);
            match objective[pos] {
                None => objective[pos] = Some(value),
                Some(first) if first.to_bits() != value.to_bits() => {
                    return Err(Error::InconsistentObjective {
                        sample_id: sample_id.to_string(),
                        target: target.to_string(),
                        first,
                        found: value,
                    });
                }
                Some(_) => {}
            }
        }

        let samples_with_results = objective.iter().filter(|o| o.is_some()).count();
        let features = self.build_features(&cells, objective)?;
        let long = with_width_mid(long)?;

        tracing::debug!(
            samples = self.design.len(),
            samples_with_results,
            columns = features.num_columns(),
            "pivoted long table"
        );
        Ok(Aggregation {
            features,
            long,
            samples_with_results,
        })
    }

    fn build_features(
        &self,
        cells: &[Option<(f64, f64)>],
        objective: Vec<Option<f64>>,
    ) -> Result<RecordBatch> {
        let samples = self.design.samples();
        let n_targets = self.targets.len();

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.schema.schema().fields().len());
        columns.push(Arc::new(StringArray::from_iter_values(
            samples.iter().map(|s| s.sample_id()),
        )));
        for j in 0..self.design.fields().len() {
            columns.push(Arc::new(Float64Array::from_iter_values(
                samples.iter().map(|s| s.values()[j]),
            )));
        }
        columns.push(Arc::new(Float64Array::from(objective)));
        for column in self.schema.stat_columns() {
            let values: Float64Array = (0..samples.len())
                .map(|pos| {
                    cells[pos * n_targets + column.target_index]
                        .map(|(lower, upper)| column.stat.compute(lower, upper))
                })
                .collect();
            columns.push(Arc::new(values));
        }

        Ok(RecordBatch::try_new(self.schema.schema(), columns)?)
    }
}

/// Append `width` and `mid` to a partial-schema batch.
fn with_width_mid(long: &RecordBatch) -> Result<RecordBatch> {
    let lowers = storage::f64_column(long, LOWER)?.values();
    let uppers = storage::f64_column(long, UPPER)?.values();
    let derive = |stat: FeatureStat| -> ArrayRef {
        Arc::new(Float64Array::from_iter_values(
            lowers
                .iter()
                .zip(uppers.iter())
                .map(|(&lower, &upper)| stat.compute(lower, upper)),
        ))
    };

    let mut columns = long.columns().to_vec();
    columns.push(derive(FeatureStat::Width));
    columns.push(derive(FeatureStat::Mid));
    Ok(RecordBatch::try_new(long_schema(), columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::intervals_to_batch;
    use crate::worker::IntervalResult;
    use arrow::array::Array;

    fn design() -> Design {
        Design::from_rows(
            vec!["x".to_string()],
            vec![
                ("S_00000".to_string(), vec![0.5]),
                ("S_00001".to_string(), vec![1.5]),
                ("S_00002".to_string(), vec![2.5]),
            ],
        )
        .unwrap()
    }

    fn targets() -> TargetList {
        TargetList::new(vec!["ATPM".to_string(), "BIOMASS".to_string()]).unwrap()
    }

    fn row(sample: &str, target: &str, lower: f64, upper: f64) -> IntervalResult {
        IntervalResult {
            sample_id: sample.to_string(),
            objective_value: 10.0,
            target: target.to_string(),
            lower,
            upper,
        }
    }

    fn f64_at(batch: &RecordBatch, name: &str) -> Float64Array {
        batch
            .column_by_name(name)
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap()
            .clone()
    }

    #[test]
    fn test_pivot_left_joins_every_design_row() {
        let design = design();
        let targets = targets();
        let aggregator = Aggregator::new(&design, &targets, &FeatureStat::DEFAULT).unwrap();
        let long = intervals_to_batch(&[
            row("S_00002", "ATPM", 1.0, 3.0),
            row("S_00002", "BIOMASS", -1.0, 1.0),
            row("S_00000", "ATPM", 0.0, 4.0),
            row("S_00000", "BIOMASS", 2.0, 2.0),
        ])
        .unwrap();

        let out = aggregator.aggregate(&long).unwrap();
        assert_eq!(out.features.num_rows(), 3);
        assert_eq!(out.samples_with_results, 2);
        assert_eq!(out.samples_without_results(), 1);
        assert_eq!(
            aggregator.feature_schema().column_names(),
            vec![
                "sample_id",
                "x",
                "objective_value",
                "width__ATPM",
                "width__BIOMASS",
                "mid__ATPM",
                "mid__BIOMASS"
            ]
        );

        let width = f64_at(&out.features, "width__ATPM");
        assert!((width.value(0) - 4.0).abs() < f64::EPSILON);
        assert!(width.is_null(1));
        assert!((width.value(2) - 2.0).abs() < f64::EPSILON);

        let objective = f64_at(&out.features, "objective_value");
        assert!(objective.is_null(1));
        assert!((objective.value(0) - 10.0).abs() < f64::EPSILON);

        let x = f64_at(&out.features, "x");
        assert!((x.value(1) - 1.5).abs() < f64::EPSILON);

        assert_eq!(out.long.num_rows(), 4);
        assert_eq!(out.long.schema(), long_schema());
    }

    #[test]
    fn test_row_order_does_not_change_output() {
        let design = design();
        let targets = targets();
        let aggregator = Aggregator::new(&design, &targets, &FeatureStat::DEFAULT).unwrap();
        let rows = vec![
            row("S_00000", "ATPM", 0.0, 1.0),
            row("S_00001", "ATPM", 0.0, 2.0),
            row("S_00001", "BIOMASS", 0.0, 3.0),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();

        let a = aggregator.aggregate(&intervals_to_batch(&rows).unwrap()).unwrap();
        let b = aggregator
            .aggregate(&intervals_to_batch(&reversed).unwrap())
            .unwrap();
        assert_eq!(a.features, b.features);
    }

    #[test]
    fn test_duplicate_pair_rejected() {
        let design = design();
        let targets = targets();
        let aggregator = Aggregator::new(&design, &targets, &FeatureStat::DEFAULT).unwrap();
        let long = intervals_to_batch(&[
            row("S_00001", "ATPM", 0.0, 1.0),
            row("S_00001", "ATPM", 0.0, 1.0),
        ])
        .unwrap();

        let err = aggregator.aggregate(&long).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateSample { ref sample_id, ref target } if sample_id == "S_00001" && target == "ATPM"
        ));
    }

    #[test]
    fn test_disagreeing_objective_rejected() {
        let design = design();
        let targets = targets();
        let aggregator = Aggregator::new(&design, &targets, &FeatureStat::DEFAULT).unwrap();
        let mut biomass = row("S_00002", "BIOMASS", 0.0, 1.0);
        biomass.objective_value = 11.0;
        let long = intervals_to_batch(&[row("S_00002", "ATPM", 0.0, 1.0), biomass]).unwrap();

        let err = aggregator.aggregate(&long).unwrap_err();
        assert!(
            matches!(err, Error::InconsistentObjective { ref sample_id, .. } if sample_id == "S_00002"),
            "{err}"
        );
    }

    #[test]
    fn test_unknown_target_or_sample_rejected() {
        let design = design();
        let targets = targets();
        let aggregator = Aggregator::new(&design, &targets, &FeatureStat::DEFAULT).unwrap();

        let foreign_target = intervals_to_batch(&[row("S_00000", "PGK", 0.0, 1.0)]).unwrap();
        assert!(matches!(
            aggregator.aggregate(&foreign_target),
            Err(Error::UnexpectedRow { .. })
        ));

        let foreign_sample = intervals_to_batch(&[row("S_09999", "ATPM", 0.0, 1.0)]).unwrap();
        assert!(matches!(
            aggregator.aggregate(&foreign_sample),
            Err(Error::UnexpectedRow { .. })
        ));
    }

    #[test]
    fn test_no_results_yields_all_null_rows() {
        let design = design();
        let targets = targets();
        let stats = [FeatureStat::SignChange];
        let aggregator = Aggregator::new(&design, &targets, &stats).unwrap();

        let out = aggregator.aggregate(&intervals_to_batch(&[]).unwrap()).unwrap();
        assert_eq!(out.features.num_rows(), 3);
        assert_eq!(out.samples_with_results, 0);
        assert_eq!(f64_at(&out.features, "signchange__ATPM").null_count(), 3);
    }
}
