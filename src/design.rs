//! Sampler: reproducible parameter designs
//!
//! A design is the ordered table of samples evaluated by a campaign. It is
//! generated by Latin hypercube sampling (every field's projection has exactly
//! one point per stratum) or loaded from a pre-built Parquet table.
//!
//! Reproducibility is what makes restarts safe: chunk `[start, end)` must
//! refer to the same samples in every invocation, so the same
//! `(n, seed, bounds)` always produce the same design.
//!
//! ## Usage
//!
//! ```rust
//! use trueno_sweep::design::{Design, DesignSpec, FieldBounds};
//!
//! let spec = DesignSpec::new(
//!     4,
//!     42,
//!     vec![
//!         FieldBounds::new("acetate_mM", 0.0, 200.0),
//!         FieldBounds::new("atpm", 0.0, 25.0),
//!     ],
//! );
//! let design = Design::latin_hypercube(&spec)?;
//!
//! assert_eq!(design.len(), 4);
//! assert_eq!(design.samples()[0].sample_id(), "S_00000");
//! # Ok::<(), trueno_sweep::Error>(())
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, RecordBatch, StringArray};
use arrow::datatypes::DataType;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::schema::{design_schema, OBJECTIVE_VALUE, SAMPLE_ID};
use crate::storage;
use crate::{Error, Result};

/// Declared range of one design field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldBounds {
    /// Field (column) name
    pub name: String,
    /// Inclusive lower bound
    pub min: f64,
    /// Inclusive upper bound
    pub max: f64,
}

impl FieldBounds {
    /// Create field bounds.
    #[must_use]
    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
        }
    }
}

/// Inputs of the sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSpec {
    /// Number of samples
    pub n: usize,
    /// RNG seed
    pub seed: u64,
    /// Ordered field bounds
    pub fields: Vec<FieldBounds>,
}

impl DesignSpec {
    /// Create a design spec.
    #[must_use]
    pub const fn new(n: usize, seed: u64, fields: Vec<FieldBounds>) -> Self {
        Self { n, seed, fields }
    }

    /// Validate sampling parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] if `n == 0`, the field set is empty,
    /// a field name is blank or repeated, or a bound is inverted/non-finite.
    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(Error::InvalidDesign("n must be positive".to_string()));
        }
        if self.fields.is_empty() {
            return Err(Error::InvalidDesign("field set is empty".to_string()));
        }
        let names: Vec<String> = self.fields.iter().map(|f| f.name.clone()).collect();
        validate_field_names(&names)?;
        for f in &self.fields {
            if !f.min.is_finite() || !f.max.is_finite() {
                return Err(Error::InvalidDesign(format!(
                    "field '{}' has non-finite bounds ({}, {})",
                    f.name, f.min, f.max
                )));
            }
            if f.min > f.max {
                return Err(Error::InvalidDesign(format!(
                    "field '{}' has inverted bounds: min={} > max={}",
                    f.name, f.min, f.max
                )));
            }
        }
        Ok(())
    }
}

/// One parameter vector and its identity. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    sample_id: String,
    values: Vec<f64>,
}

impl Sample {
    /// Sample identifier.
    #[must_use]
    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    /// Parameter values, in design field order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Parameters keyed by field name.
    #[must_use]
    pub fn parameters(&self, fields: &[String]) -> BTreeMap<String, f64> {
        fields
            .iter()
            .cloned()
            .zip(self.values.iter().copied())
            .collect()
    }
}

/// Canonical sample id for row `index`.
#[must_use]
pub fn sample_id_for(index: usize) -> String {
    format!("S_{index:05}")
}

/// Ordered table of samples sharing one set of named fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Design {
    fields: Vec<String>,
    samples: Vec<Sample>,
}

impl Design {
    /// Build a design from explicit rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] if there are no rows or fields, a row
    /// has the wrong arity or a non-finite value, or a sample id repeats.
    pub fn from_rows(fields: Vec<String>, rows: Vec<(String, Vec<f64>)>) -> Result<Self> {
        if fields.is_empty() {
            return Err(Error::InvalidDesign("field set is empty".to_string()));
        }
        validate_field_names(&fields)?;
        if rows.is_empty() {
            return Err(Error::InvalidDesign("design has no rows".to_string()));
        }

        let mut seen = FxHashSet::default();
        let mut samples = Vec::with_capacity(rows.len());
        for (sample_id, values) in rows {
            if sample_id.trim().is_empty() {
                return Err(Error::InvalidDesign("blank sample_id".to_string()));
            }
            if values.len() != fields.len() {
                return Err(Error::InvalidDesign(format!(
                    "sample '{sample_id}' has {} values, expected {}",
                    values.len(),
                    fields.len()
                )));
            }
            if values.iter().any(|v| !v.is_finite()) {
                return Err(Error::InvalidDesign(format!(
                    "sample '{sample_id}' has a non-finite value"
                )));
            }
            if !seen.insert(sample_id.clone()) {
                return Err(Error::InvalidDesign(format!(
                    "duplicate sample_id '{sample_id}'"
                )));
            }
            samples.push(Sample { sample_id, values });
        }
        Ok(Self { fields, samples })
    }

    /// Latin hypercube design.
    ///
    /// For each field (in declared order) a seeded permutation assigns every
    /// row its own stratum of `[0, 1)`, jittered uniformly inside the stratum
    /// and scaled to `[min, max]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] if `spec` fails validation.
    #[allow(clippy::cast_precision_loss)]
    pub fn latin_hypercube(spec: &DesignSpec) -> Result<Self> {
        spec.validate()?;

        let n = spec.n;
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(spec.fields.len());
        for bounds in &spec.fields {
            let mut strata: Vec<usize> = (0..n).collect();
            strata.shuffle(&mut rng);
            let span = bounds.max - bounds.min;
            let column = strata
                .iter()
                .map(|&stratum| {
                    let u = (stratum as f64 + rng.gen::<f64>()) / n as f64;
                    (u.mul_add(span, bounds.min)).clamp(bounds.min, bounds.max)
                })
                .collect();
            columns.push(column);
        }

        let samples = (0..n)
            .map(|row| Sample {
                sample_id: sample_id_for(row),
                values: columns.iter().map(|col| col[row]).collect(),
            })
            .collect();

        Ok(Self {
            fields: spec.fields.iter().map(|f| f.name.clone()).collect(),
            samples,
        })
    }

    /// Field names in order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Samples in design order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the design has no samples (never true for a validated design).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Map from sample id to design position.
    #[must_use]
    pub fn position_index(&self) -> FxHashMap<&str, usize> {
        self.samples
            .iter()
            .enumerate()
            .map(|(i, s)| (s.sample_id.as_str(), i))
            .collect()
    }

    /// Keep only the first `n` samples.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] if `n == 0`.
    pub fn limit(mut self, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidDesign("limit must be positive".to_string()));
        }
        self.samples.truncate(n);
        Ok(self)
    }

    /// Keep only the listed sample ids, preserving design order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] if any requested id is not in the design.
    pub fn select(mut self, sample_ids: &[String]) -> Result<Self> {
        let missing: Vec<&str> = {
            let index = self.position_index();
            sample_ids
                .iter()
                .map(String::as_str)
                .filter(|id| !index.contains_key(id))
                .collect()
        };
        if !missing.is_empty() {
            return Err(Error::InvalidDesign(format!(
                "sample ids not found in design: {}",
                missing.join(", ")
            )));
        }
        let wanted: FxHashSet<&str> = sample_ids.iter().map(String::as_str).collect();
        self.samples
            .retain(|s| wanted.contains(s.sample_id.as_str()));
        Ok(self)
    }

    /// Design as an Arrow record batch (`sample_id` + one column per field).
    ///
    /// # Errors
    ///
    /// Returns error if Arrow rejects the columns.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.fields.len() + 1);
        columns.push(Arc::new(StringArray::from_iter_values(
            self.samples.iter().map(|s| s.sample_id.as_str()),
        )));
        for col in 0..self.fields.len() {
            columns.push(Arc::new(Float64Array::from_iter_values(
                self.samples.iter().map(|s| s.values[col]),
            )));
        }
        Ok(RecordBatch::try_new(design_schema(&self.fields), columns)?)
    }

    /// Persist the design table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactWrite`] on IO failure.
    pub fn write_parquet<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let batch = self.to_record_batch()?;
        storage::write_parquet(path, &batch.schema(), &[batch])
    }

    /// Load a pre-built design table.
    ///
    /// Every column other than `sample_id` is a design field and must be
    /// non-null `Float64`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArtifactRead`] if the file cannot be read and
    /// [`Error::InvalidDesign`] if its contents are not a valid design.
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let batches = storage::read_parquet(path)?;
        let Some(first) = batches.first() else {
            return Err(Error::InvalidDesign(format!(
                "design table {} has no rows",
                path.display()
            )));
        };
        let schema = first.schema();
        let batch = arrow::compute::concat_batches(&schema, &batches)?;
        Self::from_record_batch(&batch)
    }

    /// Parse a design from a record batch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] on missing/ill-typed columns or nulls.
    pub fn from_record_batch(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let ids = batch
            .column_by_name(SAMPLE_ID)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| {
                Error::InvalidDesign(format!("design table needs a Utf8 '{SAMPLE_ID}' column"))
            })?;
        if ids.null_count() > 0 {
            return Err(Error::InvalidDesign("null sample_id in design".to_string()));
        }

        let mut fields = Vec::new();
        let mut value_columns: Vec<&Float64Array> = Vec::new();
        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            if field.name() == SAMPLE_ID {
                continue;
            }
            if field.data_type() != &DataType::Float64 {
                return Err(Error::InvalidDesign(format!(
                    "design field '{}' must be Float64, got {}",
                    field.name(),
                    field.data_type()
                )));
            }
            let values = column
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| {
                    Error::Other(format!("failed to downcast '{}' to Float64Array", field.name()))
                })?;
            if values.null_count() > 0 {
                return Err(Error::InvalidDesign(format!(
                    "design field '{}' contains nulls",
                    field.name()
                )));
            }
            fields.push(field.name().clone());
            value_columns.push(values);
        }

        let rows = (0..batch.num_rows())
            .map(|row| {
                (
                    ids.value(row).to_string(),
                    value_columns.iter().map(|c| c.value(row)).collect(),
                )
            })
            .collect();
        Self::from_rows(fields, rows)
    }
}

fn validate_field_names(names: &[String]) -> Result<()> {
    let mut seen = FxHashSet::default();
    for name in names {
        if name.trim().is_empty() {
            return Err(Error::InvalidDesign("blank field name".to_string()));
        }
        if name == SAMPLE_ID || name == OBJECTIVE_VALUE {
            return Err(Error::InvalidDesign(format!(
                "'{name}' is reserved and cannot be a field name"
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(Error::InvalidDesign(format!("duplicate field '{name}'")));
        }
    }
    Ok(())
}
