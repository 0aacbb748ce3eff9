//! Arrow schemas for every table the campaign reads or writes
//!
//! The wide feature schema is computed from the design fields and the fixed
//! target list alone, so it is known before any partial artifact is opened.
//!
//! ```text
//! sample_id | <field>... | objective_value | <stat>__<target>...
//! ```

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use serde::{Deserialize, Serialize};
use rustc_hash::FxHashSet;
use std::sync::Arc;

use crate::targets::TargetList;
use crate::{Error, Result};

/// Sample identity column, shared by every table
pub const SAMPLE_ID: &str = "sample_id";
/// Sample-scoped objective value column
pub const OBJECTIVE_VALUE: &str = "objective_value";
/// Target name column (long form)
pub const TARGET: &str = "target";
/// Interval lower bound column
pub const LOWER: &str = "lower";
/// Interval upper bound column
pub const UPPER: &str = "upper";
/// Failure classification column
pub const ERROR_KIND: &str = "error_kind";
/// Failure message column
pub const ERROR_MESSAGE: &str = "error_message";

/// Separator between stat prefix and target name in wide columns
pub const COLUMN_SEPARATOR: &str = "__";

/// Per-target statistic derived from an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureStat {
    /// `upper - lower`
    Width,
    /// `(upper + lower) / 2`
    Mid,
    /// `|upper - lower|`
    AbsWidth,
    /// `1.0` when the interval strictly straddles zero, else `0.0`
    SignChange,
}

impl FeatureStat {
    /// Default stats of the feature table.
    pub const DEFAULT: [Self; 2] = [Self::Width, Self::Mid];

    /// Column prefix used in `<stat>__<target>`.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Width => "width",
            Self::Mid => "mid",
            Self::AbsWidth => "abswidth",
            Self::SignChange => "signchange",
        }
    }

    /// Compute the statistic for one interval.
    #[must_use]
    pub fn compute(self, lower: f64, upper: f64) -> f64 {
        match self {
            Self::Width => upper - lower,
            Self::Mid => (upper + lower) / 2.0,
            Self::AbsWidth => (upper - lower).abs(),
            Self::SignChange => {
                if lower < 0.0 && upper > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// Wide column name for this stat and `target`.
    #[must_use]
    pub fn column_name(self, target: &str) -> String {
        format!("{}{COLUMN_SEPARATOR}{target}", self.prefix())
    }
}

/// Schema of a partial artifact: one row per (sample, target).
#[must_use]
pub fn partial_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(SAMPLE_ID, DataType::Utf8, false),
        Field::new(OBJECTIVE_VALUE, DataType::Float64, false),
        Field::new(TARGET, DataType::Utf8, false),
        Field::new(LOWER, DataType::Float64, false),
        Field::new(UPPER, DataType::Float64, false),
    ]))
}

/// Schema of the concatenated long table (partial schema plus width/mid).
#[must_use]
pub fn long_schema() -> SchemaRef {
    let mut fields: Vec<Field> = partial_schema()
        .fields()
        .iter()
        .map(|f| f.as_ref().clone())
        .collect();
    fields.push(Field::new(FeatureStat::Width.prefix(), DataType::Float64, false));
    fields.push(Field::new(FeatureStat::Mid.prefix(), DataType::Float64, false));
    Arc::new(Schema::new(fields))
}

/// Schema of the failure log.
#[must_use]
pub fn failure_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new(SAMPLE_ID, DataType::Utf8, false),
        Field::new(ERROR_KIND, DataType::Utf8, false),
        Field::new(ERROR_MESSAGE, DataType::Utf8, false),
    ]))
}

/// Schema of a design table.
#[must_use]
pub fn design_schema(fields: &[String]) -> SchemaRef {
    let mut columns = Vec::with_capacity(fields.len() + 1);
    columns.push(Field::new(SAMPLE_ID, DataType::Utf8, false));
    columns.extend(
        fields
            .iter()
            .map(|name| Field::new(name.as_str(), DataType::Float64, false)),
    );
    Arc::new(Schema::new(columns))
}

/// One derived column of the wide table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatColumn {
    /// Statistic computed into this column
    pub stat: FeatureStat,
    /// Position of the target in the target list
    pub target_index: usize,
    /// Column name (`<stat>__<target>`)
    pub name: String,
}

/// Explicit schema builder for the wide feature table.
///
/// Enumerates `<stat>__<target>` columns from the known target list before
/// any data is read.
#[derive(Debug, Clone)]
pub struct FeatureSchema {
    fields: Vec<String>,
    stat_columns: Vec<StatColumn>,
    schema: SchemaRef,
}

impl FeatureSchema {
    /// Build the wide schema.
    ///
    /// Stat columns are ordered stat-major: every target for the first stat,
    /// then every target for the next.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if two output columns would share a
    /// name, e.g. a design field called `width__T1` next to target `T1`, or
    /// a stat listed twice.
    pub fn new(fields: &[String], targets: &TargetList, stats: &[FeatureStat]) -> Result<Self> {
        let stat_columns: Vec<StatColumn> = stats
            .iter()
            .flat_map(|&stat| {
                targets
                    .iter()
                    .enumerate()
                    .map(move |(target_index, target)| StatColumn {
                        stat,
                        target_index,
                        name: stat.column_name(target),
                    })
            })
            .collect();

        let mut columns = Vec::with_capacity(fields.len() + stat_columns.len() + 2);
        columns.push(Field::new(SAMPLE_ID, DataType::Utf8, false));
        columns.extend(
            fields
                .iter()
                .map(|name| Field::new(name.as_str(), DataType::Float64, false)),
        );
        // Failed samples have no objective and no intervals.
        columns.push(Field::new(OBJECTIVE_VALUE, DataType::Float64, true));
        columns.extend(
            stat_columns
                .iter()
                .map(|c| Field::new(c.name.as_str(), DataType::Float64, true)),
        );

        let mut seen = FxHashSet::default();
        if let Some(clash) = columns.iter().find(|f| !seen.insert(f.name().as_str())) {
            return Err(Error::InvalidConfig(format!(
                "feature column '{}' would appear twice; rename the design field \
                 or drop the repeated stat",
                clash.name()
            )));
        }

        Ok(Self {
            fields: fields.to_vec(),
            stat_columns,
            schema: Arc::new(Schema::new(columns)),
        })
    }

    /// Arrow schema of the feature table.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Design field names carried into the feature table.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Derived stat columns in output order.
    #[must_use]
    pub fn stat_columns(&self) -> &[StatColumn] {
        &self.stat_columns
    }

    /// All column names in output order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.schema.fields().iter().map(|f| f.name().clone()).collect()
    }
}
