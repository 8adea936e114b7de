//! Fitted models and their metadata
//!
//! A [`FittedModel`] bundles the estimator with everything needed to use it
//! safely: the [`FeatureSchema`] it was trained on and, for classifiers, the
//! [`ClassLabels`] its outputs refer to. It is immutable once built.

mod store;

pub use store::{FileModelStore, ModelArtifact, ModelStore};

use crate::error::{InsightError, Result};
use crate::schema::FeatureSchema;
use crate::training::{DecisionTree, LogisticRegression, RandomForest, TaskType};
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Ordered class names a classifier was fitted with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassLabels {
    labels: Vec<String>,
}

impl ClassLabels {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(InsightError::InvalidParameter {
                name: "labels".to_string(),
                value: "[]".to_string(),
                reason: "at least one class label is required".to_string(),
            });
        }
        let mut sorted = labels.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != labels.len() {
            return Err(InsightError::InvalidParameter {
                name: "labels".to_string(),
                value: labels.join(","),
                reason: "class labels must be unique".to_string(),
            });
        }
        Ok(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }
}

/// Descriptive metadata stored with a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub model_type: String,
    pub task: TaskType,
    pub target_name: String,
    pub trained_at: DateTime<Utc>,
    pub n_training_rows: usize,
    #[serde(default)]
    pub hyperparameters: BTreeMap<String, String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl ModelMetadata {
    pub fn new(name: impl Into<String>, model_type: impl Into<String>, task: TaskType) -> Self {
        Self {
            name: name.into(),
            model_type: model_type.into(),
            task,
            target_name: "target".to_string(),
            trained_at: Utc::now(),
            n_training_rows: 0,
            hyperparameters: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_name = target.into();
        self
    }

    pub fn with_hyperparameter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.hyperparameters.insert(key.into(), value.to_string());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}

/// The fitted predictor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Estimator {
    RandomForest(RandomForest),
    DecisionTree(DecisionTree),
    LogisticRegression(LogisticRegression),
}

/// Internal structure visible to explainers
pub enum ModelStructure<'a> {
    /// Ensemble of axis-aligned trees whose outputs are averaged
    Trees(Vec<&'a DecisionTree>),
    /// Only the prediction function is usable
    Opaque,
}

impl Estimator {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Estimator::RandomForest(_) => "random_forest",
            Estimator::DecisionTree(_) => "decision_tree",
            Estimator::LogisticRegression(_) => "logistic_regression",
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Estimator::RandomForest(m) => m.n_features(),
            Estimator::DecisionTree(m) => m.n_features(),
            Estimator::LogisticRegression(m) => m.n_features(),
        }
    }

    pub fn n_outputs(&self) -> usize {
        match self {
            Estimator::RandomForest(m) => m.n_outputs(),
            Estimator::DecisionTree(m) => m.n_outputs(),
            Estimator::LogisticRegression(m) => m.n_classes(),
        }
    }

    pub fn is_classification(&self) -> bool {
        match self {
            Estimator::RandomForest(m) => m.is_classification(),
            Estimator::DecisionTree(m) => m.is_classification(),
            Estimator::LogisticRegression(_) => true,
        }
    }

    /// Raw outputs: regression value or class probabilities
    pub fn predict_raw(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        match self {
            Estimator::RandomForest(m) => m.predict_raw(x),
            Estimator::DecisionTree(m) => m.predict_raw(x),
            Estimator::LogisticRegression(m) => m.predict_proba(x),
        }
    }

    pub fn structure(&self) -> ModelStructure<'_> {
        match self {
            Estimator::RandomForest(m) => ModelStructure::Trees(m.trees().iter().collect()),
            Estimator::DecisionTree(m) => ModelStructure::Trees(vec![m]),
            Estimator::LogisticRegression(_) => ModelStructure::Opaque,
        }
    }
}

/// Pre-trained, immutable predictor coupled with its input schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FittedModel {
    metadata: ModelMetadata,
    schema: FeatureSchema,
    labels: Option<ClassLabels>,
    estimator: Estimator,
    fingerprint: String,
}

impl FittedModel {
    /// Couple an estimator with its schema, checking that they agree
    pub fn new(
        metadata: ModelMetadata,
        schema: FeatureSchema,
        labels: Option<ClassLabels>,
        estimator: Estimator,
    ) -> Result<Self> {
        if estimator.n_features() != schema.len() {
            return Err(InsightError::SchemaMismatch(format!(
                "estimator was fitted on {} features, schema has {}",
                estimator.n_features(),
                schema.len()
            )));
        }

        match (estimator.is_classification(), &labels) {
            (true, Some(l)) if l.len() == estimator.n_outputs() => {}
            (true, Some(l)) => {
                return Err(InsightError::SchemaMismatch(format!(
                    "classifier has {} classes but {} labels were supplied",
                    estimator.n_outputs(),
                    l.len()
                )));
            }
            (true, None) => {
                return Err(InsightError::SchemaMismatch(
                    "classifier requires class labels".to_string(),
                ));
            }
            (false, Some(_)) => {
                return Err(InsightError::SchemaMismatch(
                    "regressor cannot carry class labels".to_string(),
                ));
            }
            (false, None) => {}
        }

        let fingerprint = Self::compute_fingerprint(&schema, &labels, &estimator)?;
        Ok(Self {
            metadata,
            schema,
            labels,
            estimator,
            fingerprint,
        })
    }

    fn compute_fingerprint(
        schema: &FeatureSchema,
        labels: &Option<ClassLabels>,
        estimator: &Estimator,
    ) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(schema.fingerprint().as_bytes());
        hasher.update(bincode::serialize(labels)?);
        hasher.update(bincode::serialize(estimator)?);
        Ok(format!("{:x}", hasher.finalize()))
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn labels(&self) -> Option<&ClassLabels> {
        self.labels.as_ref()
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn task(&self) -> TaskType {
        if self.estimator.is_classification() {
            TaskType::Classification
        } else {
            TaskType::Regression
        }
    }

    /// Identity of this model for cache keys
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Names of the raw outputs: the target for regression, class labels
    /// for classification
    pub fn output_names(&self) -> Vec<String> {
        match &self.labels {
            Some(labels) => labels.as_slice().to_vec(),
            None => vec![self.metadata.target_name.clone()],
        }
    }

    /// Raw outputs for an encoded matrix in schema order
    pub fn predict_matrix(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.schema.len() {
            return Err(InsightError::SchemaMismatch(format!(
                "model expects {} features, got {}",
                self.schema.len(),
                x.ncols()
            )));
        }
        self.estimator.predict_raw(x)
    }
}
