//! Model explainability module
//!
//! Computes per-observation feature attributions (SHAP values) of a
//! [`FittedModel`] over a reference dataset:
//! - Exact TreeSHAP for decision trees and random forests
//! - Permutation-sampling SHAP for models exposing only a prediction function
//!
//! The method is picked from the model's structure, never by the caller.

mod attribution;
mod sampling;
mod tree_shap;

pub use attribution::{AttributionMethod, AttributionSet, FeatureContribution, LocalExplanation};
pub use sampling::{SampledAttribution, SamplingExplainer};
pub use tree_shap::TreeExplainer;

use crate::dataset::Dataset;
use crate::error::{InsightError, Result};
use crate::model::{FittedModel, ModelStructure};
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Controls how much work an explanation run does
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Explain at most this many reference rows (evenly strided); 0 means all
    pub max_reference_rows: usize,
    /// Permutations per observation for sampling-based attribution
    pub n_permutations: usize,
    /// Background rows drawn from the reference data for sampling; 0 means all
    pub background_rows: usize,
    pub seed: u64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            max_reference_rows: 0,
            n_permutations: 10,
            background_rows: 100,
            seed: 42,
        }
    }
}

impl ExplainConfig {
    pub fn with_max_reference_rows(mut self, rows: usize) -> Self {
        self.max_reference_rows = rows;
        self
    }

    pub fn with_n_permutations(mut self, n: usize) -> Self {
        self.n_permutations = n;
        self
    }

    pub fn with_background_rows(mut self, rows: usize) -> Self {
        self.background_rows = rows;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Structure-aware attribution for one fitted model
pub struct Explainer<'a> {
    model: &'a FittedModel,
    config: ExplainConfig,
}

impl<'a> Explainer<'a> {
    pub fn for_model(model: &'a FittedModel, config: ExplainConfig) -> Self {
        Self { model, config }
    }

    pub fn method(&self) -> AttributionMethod {
        match self.model.estimator().structure() {
            ModelStructure::Trees(_) => AttributionMethod::TreeShap,
            ModelStructure::Opaque => AttributionMethod::PermutationSampling,
        }
    }

    pub fn config(&self) -> &ExplainConfig {
        &self.config
    }

    /// One [`AttributionSet`] per model output over the reference rows
    pub fn explain(&self, reference: &Dataset) -> Result<Vec<AttributionSet>> {
        let start = Instant::now();
        self.model.schema().ensure_compatible(reference.schema())?;

        let data = reference.strided(self.config.max_reference_rows)?;
        let x = data.features();
        let output_names = self.model.output_names();
        debug!(
            method = %self.method(),
            rows = x.nrows(),
            features = x.ncols(),
            "explaining reference data"
        );

        let (values, base_values) = match self.model.estimator().structure() {
            ModelStructure::Trees(trees) => {
                let explainer = TreeExplainer::new(trees)?;
                let values = explainer.shap_values(x)?;
                let bases = (0..explainer.n_outputs())
                    .map(|o| explainer.base_values(o, x.nrows()))
                    .collect::<Vec<_>>();
                (values, bases)
            }
            ModelStructure::Opaque => {
                let background = reference.strided(self.config.background_rows)?;
                let model = self.model;
                let explainer = SamplingExplainer::new(
                    |rows: ArrayView2<'_, f64>| model.predict_matrix(rows),
                    background.features().to_owned(),
                )?
                .with_n_permutations(self.config.n_permutations)
                .with_seed(self.config.seed);
                Self::regroup(explainer.explain_batch(x)?, x.nrows(), x.ncols())
            }
        };

        if values.len() != output_names.len() {
            return Err(InsightError::Explanation(format!(
                "explainer produced {} outputs for {} model outputs",
                values.len(),
                output_names.len()
            )));
        }

        let method = self.method();
        let sets = values
            .into_iter()
            .zip(base_values)
            .zip(output_names)
            .map(|((v, b), name)| {
                AttributionSet::new(
                    data.feature_names(),
                    name,
                    v,
                    data.features().to_owned(),
                    b,
                    method,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            method = %method,
            rows = data.n_rows(),
            outputs = sets.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "attributions computed"
        );
        Ok(sets)
    }

    /// Per-observation `(features x outputs)` results into per-output
    /// `(observations x features)` matrices
    fn regroup(
        results: Vec<SampledAttribution>,
        n_rows: usize,
        n_features: usize,
    ) -> (Vec<Array2<f64>>, Vec<Array1<f64>>) {
        let n_outputs = results.first().map_or(0, |r| r.base_value.len());
        let mut values = vec![Array2::<f64>::zeros((n_rows, n_features)); n_outputs];
        let mut bases = vec![Array1::<f64>::zeros(n_rows); n_outputs];
        for (i, r) in results.iter().enumerate() {
            for o in 0..n_outputs {
                values[o].row_mut(i).assign(&r.values.column(o));
                bases[o][i] = r.base_value[o];
            }
        }
        (values, bases)
    }
}
