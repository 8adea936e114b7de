//! Attribution results

use crate::error::{InsightError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How attributions were computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributionMethod {
    /// Exact path-dependent TreeSHAP
    TreeShap,
    /// Monte Carlo permutation sampling against a background set
    PermutationSampling,
}

impl fmt::Display for AttributionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributionMethod::TreeShap => write!(f, "tree_shap"),
            AttributionMethod::PermutationSampling => write!(f, "permutation_sampling"),
        }
    }
}

/// Feature contribution to a prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature_index: usize,
    pub feature_name: String,
    /// Encoded feature value for this observation
    pub feature_value: f64,
    /// Contribution to prediction (SHAP value)
    pub contribution: f64,
}

/// Attributions of a single observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalExplanation {
    pub instance_index: usize,
    /// Base value (expected prediction)
    pub base_value: f64,
    /// Base value plus contributions
    pub prediction: f64,
    pub contributions: Vec<FeatureContribution>,
}

impl LocalExplanation {
    pub fn sum_contributions(&self) -> f64 {
        self.contributions.iter().map(|c| c.contribution).sum()
    }

    /// Contributions by absolute value, descending
    pub fn sorted_contributions(&self) -> Vec<&FeatureContribution> {
        let mut sorted: Vec<&FeatureContribution> = self.contributions.iter().collect();
        sorted.sort_by(|a, b| {
            b.contribution
                .abs()
                .partial_cmp(&a.contribution.abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        sorted
    }

    pub fn top_k_contributors(&self, k: usize) -> Vec<&FeatureContribution> {
        self.sorted_contributions().into_iter().take(k).collect()
    }
}

/// Per-observation, per-feature attributions for one model output.
///
/// `values[[i, j]]` is the contribution of feature `j` to observation `i`;
/// `base_values[i] + values.row(i).sum()` reconstructs the raw model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionSet {
    feature_names: Vec<String>,
    output_name: String,
    values: Array2<f64>,
    feature_values: Array2<f64>,
    base_values: Array1<f64>,
    method: AttributionMethod,
}

impl AttributionSet {
    pub fn new(
        feature_names: Vec<String>,
        output_name: impl Into<String>,
        values: Array2<f64>,
        feature_values: Array2<f64>,
        base_values: Array1<f64>,
        method: AttributionMethod,
    ) -> Result<Self> {
        if values.ncols() != feature_names.len() || values.dim() != feature_values.dim() {
            return Err(InsightError::ShapeError {
                expected: format!("(n, {}) values and feature values", feature_names.len()),
                actual: format!("{:?} and {:?}", values.dim(), feature_values.dim()),
            });
        }
        if base_values.len() != values.nrows() {
            return Err(InsightError::ShapeError {
                expected: format!("{} base values", values.nrows()),
                actual: format!("{} base values", base_values.len()),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(InsightError::Explanation(
                "attribution produced non-finite values".to_string(),
            ));
        }
        Ok(Self {
            feature_names,
            output_name: output_name.into(),
            values,
            feature_values,
            base_values,
            method,
        })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Model output these attributions explain (target or class label)
    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn feature_values(&self) -> ArrayView2<'_, f64> {
        self.feature_values.view()
    }

    pub fn base_values(&self) -> ArrayView1<'_, f64> {
        self.base_values.view()
    }

    pub fn method(&self) -> AttributionMethod {
        self.method
    }

    pub fn n_observations(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    /// Attributions of one feature across all observations
    pub fn get(&self, feature: &str) -> Option<ArrayView1<'_, f64>> {
        self.feature_names
            .iter()
            .position(|n| n == feature)
            .map(|j| self.values.column(j))
    }

    /// Mean |attribution| per feature, in schema order
    pub fn mean_abs(&self) -> Vec<(String, f64)> {
        let means = self
            .values
            .mapv(f64::abs)
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.n_features()));
        self.feature_names.iter().cloned().zip(means).collect()
    }

    /// Features by mean |attribution|, most important first; ties keep
    /// schema order
    pub fn ranking(&self) -> Vec<(String, f64)> {
        let mut ranked = self.mean_abs();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    /// Base value plus attributions for observation `i`
    pub fn reconstruct(&self, i: usize) -> Option<f64> {
        (i < self.n_observations()).then(|| self.base_values[i] + self.values.row(i).sum())
    }

    pub fn explanation(&self, i: usize) -> Option<LocalExplanation> {
        let prediction = self.reconstruct(i)?;
        let contributions = self
            .feature_names
            .iter()
            .enumerate()
            .map(|(j, name)| FeatureContribution {
                feature_index: j,
                feature_name: name.clone(),
                feature_value: self.feature_values[[i, j]],
                contribution: self.values[[i, j]],
            })
            .collect();
        Some(LocalExplanation {
            instance_index: i,
            base_value: self.base_values[i],
            prediction,
            contributions,
        })
    }
}
