//! Reference / training datasets
//!
//! A [`Dataset`] is a dense, fully-populated feature matrix together with the
//! [`FeatureSchema`] inferred from it and an optional target column. It is
//! treated as read-only once built.

mod loader;
mod source;

pub use loader::{frame_columns, parse_wrapped_whitespace, DataLoader, DatasetFormat, RawColumn};
pub use source::{DatasetSource, DatasetSpec};

use crate::error::{InsightError, Result};
use crate::model::ClassLabels;
use crate::schema::{FeatureKind, FeatureSchema, FeatureSpec};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Target column split off a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    /// Numeric target, or class index when `labels` is set
    pub values: Array1<f64>,
    pub labels: Option<ClassLabels>,
}

/// Per-column summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Rectangular numeric table with a stable schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    schema: FeatureSchema,
    features: Array2<f64>,
    target: Option<Target>,
}

impl Dataset {
    /// Build a dataset from an already-encoded matrix
    pub fn new(schema: FeatureSchema, features: Array2<f64>, target: Option<Target>) -> Result<Self> {
        if features.ncols() != schema.len() {
            return Err(InsightError::ShapeError {
                expected: format!("{} columns", schema.len()),
                actual: format!("{} columns", features.ncols()),
            });
        }
        if let Some(t) = &target {
            if t.values.len() != features.nrows() {
                return Err(InsightError::ShapeError {
                    expected: format!("target length = {}", features.nrows()),
                    actual: format!("target length = {}", t.values.len()),
                });
            }
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(InsightError::DataFetch(
                "dataset contains non-finite values".to_string(),
            ));
        }
        Ok(Self { schema, features, target })
    }

    /// Build a dataset from named raw columns, inferring the schema.
    ///
    /// Numeric columns become bounded numeric features; text columns become
    /// categorical features with sorted categories. The target column, if
    /// named, is split off.
    pub fn from_columns(columns: Vec<(String, RawColumn)>, target: Option<&str>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
        if n_rows == 0 {
            return Err(InsightError::DataFetch("dataset has no rows".to_string()));
        }
        if let Some((name, _)) = columns.iter().find(|(_, c)| c.len() != n_rows) {
            return Err(InsightError::DataFetch(format!(
                "column '{}' length differs from {} rows",
                name, n_rows
            )));
        }

        let mut specs = Vec::new();
        let mut encoded_columns: Vec<Vec<f64>> = Vec::new();
        let mut target_out = None;

        for (name, column) in columns {
            if Some(name.as_str()) == target {
                target_out = Some(Self::build_target(name, column)?);
                continue;
            }
            match column {
                RawColumn::Numeric(values) => {
                    specs.push(FeatureSpec::numeric_from_values(name, &values));
                    encoded_columns.push(values);
                }
                RawColumn::Text(values) => {
                    let mut categories: Vec<String> = values.clone();
                    categories.sort();
                    categories.dedup();
                    let codes = values
                        .iter()
                        .map(|v| categories.iter().position(|c| c == v).unwrap_or(0) as f64)
                        .collect();
                    specs.push(FeatureSpec::categorical(name, categories));
                    encoded_columns.push(codes);
                }
            }
        }

        if let Some(t) = target {
            if target_out.is_none() {
                return Err(InsightError::DataFetch(format!("target column '{}' not found", t)));
            }
        }

        let mut features = Array2::zeros((n_rows, encoded_columns.len()));
        for (j, col) in encoded_columns.iter().enumerate() {
            for (i, &v) in col.iter().enumerate() {
                features[[i, j]] = v;
            }
        }

        let schema = FeatureSchema::new(specs)
            .map_err(|e| InsightError::DataFetch(format!("unusable reference data: {}", e)))?;
        Self::new(schema, features, target_out)
    }

    fn build_target(name: String, column: RawColumn) -> Result<Target> {
        match column {
            RawColumn::Numeric(values) => Ok(Target {
                name,
                values: Array1::from_vec(values),
                labels: None,
            }),
            RawColumn::Text(values) => {
                let mut names = values.clone();
                names.sort();
                names.dedup();
                let labels = ClassLabels::new(names)?;
                let codes = values
                    .iter()
                    .map(|v| labels.index_of(v).unwrap_or(0) as f64)
                    .collect();
                Ok(Target {
                    name,
                    values: Array1::from_vec(codes),
                    labels: Some(labels),
                })
            }
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Attach feature descriptions to the schema
    pub fn with_descriptions(mut self, descriptions: &HashMap<String, String>) -> Self {
        self.schema = self.schema.with_descriptions(descriptions);
        self
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.schema.names()
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.features.row(i)
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.schema.index_of(name).map(|j| self.features.column(j))
    }

    /// Row subset, preserving order
    pub fn select_rows(&self, indices: &[usize]) -> Result<Self> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.n_rows()) {
            return Err(InsightError::InvalidParameter {
                name: "indices".to_string(),
                value: bad.to_string(),
                reason: format!("dataset has {} rows", self.n_rows()),
            });
        }
        let features = self.features.select(Axis(0), indices);
        let target = self.target.as_ref().map(|t| Target {
            name: t.name.clone(),
            values: t.values.select(Axis(0), indices),
            labels: t.labels.clone(),
        });
        Self::new(self.schema.clone(), features, target)
    }

    /// Deterministic evenly-strided subsample of at most `max_rows` rows
    pub fn strided(&self, max_rows: usize) -> Result<Self> {
        if max_rows == 0 || max_rows >= self.n_rows() {
            return Ok(self.clone());
        }
        let step = self.n_rows() as f64 / max_rows as f64;
        let indices: Vec<usize> = (0..max_rows).map(|k| (k as f64 * step) as usize).collect();
        self.select_rows(&indices)
    }

    /// Min / max / mean of every feature column
    pub fn describe(&self) -> Vec<ColumnSummary> {
        self.schema
            .iter()
            .enumerate()
            .map(|(j, spec)| {
                let col = self.features.column(j);
                let min = col.iter().copied().fold(f64::INFINITY, f64::min);
                let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let mean = col.mean().unwrap_or(0.0);
                let kind = match &spec.kind {
                    FeatureKind::Numeric { .. } => "numeric".to_string(),
                    FeatureKind::Categorical { categories } => {
                        format!("categorical ({})", categories.len())
                    }
                };
                ColumnSummary {
                    name: spec.name.clone(),
                    kind,
                    min,
                    max,
                    mean,
                }
            })
            .collect()
    }

    /// SHA-256 over schema and contents, used as a cache identity
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.schema.fingerprint().as_bytes());
        hasher.update((self.n_rows() as u64).to_le_bytes());
        for v in self.features.iter() {
            hasher.update(v.to_le_bytes());
        }
        if let Some(t) = &self.target {
            hasher.update(t.name.as_bytes());
            for v in t.values.iter() {
                hasher.update(v.to_le_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}
