//! Training engine implementation

use super::decision_tree::DecisionTree;
use super::linear_models::LogisticRegression;
use super::random_forest::RandomForest;
use super::{ModelType, TaskType, TrainingConfig};
use crate::dataset::Dataset;
use crate::error::{InsightError, Result};
use crate::model::{ClassLabels, Estimator, FittedModel, ModelMetadata};
use ndarray::{Array1, ArrayView1, ArrayView2};
use std::time::Instant;
use tracing::{debug, info};

/// Fits a [`FittedModel`] from a [`Dataset`] with a target column
pub struct TrainEngine {
    config: TrainingConfig,
}

impl TrainEngine {
    /// Create a new training engine
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train on every row of `dataset`
    pub fn fit(&self, dataset: &Dataset) -> Result<FittedModel> {
        let start = Instant::now();
        let target = dataset
            .target()
            .ok_or_else(|| InsightError::Training("dataset has no target column".to_string()))?;

        let (y, labels) = match self.config.task_type {
            TaskType::Regression => {
                if target.labels.is_some() {
                    return Err(InsightError::Training(format!(
                        "target '{}' is categorical; use a classification task",
                        target.name
                    )));
                }
                (target.values.clone(), None)
            }
            TaskType::Classification => match &target.labels {
                Some(labels) => (target.values.clone(), Some(labels.clone())),
                None => {
                    let (codes, labels) = Self::encode_numeric_classes(target.values.view())?;
                    (codes, Some(labels))
                }
            },
        };

        if let Some(labels) = &labels {
            if labels.len() < 2 {
                return Err(InsightError::Training(format!(
                    "target '{}' has a single class",
                    target.name
                )));
            }
        }

        let x = dataset.features();
        debug!(
            model = %self.config.model_type,
            rows = x.nrows(),
            features = x.ncols(),
            "fitting estimator"
        );
        let estimator = self.fit_estimator(x, y.view(), labels.as_ref())?;
        let metric = Self::training_metric(&estimator, x, y.view())?;

        let metric_name = match self.config.task_type {
            TaskType::Regression => "train_r2",
            TaskType::Classification => "train_accuracy",
        };
        let mut metadata =
            ModelMetadata::new(&self.config.model_name, estimator.kind_name(), self.config.task_type)
                .with_target(&target.name)
                .with_metric(metric_name, metric);
        metadata.n_training_rows = dataset.n_rows();
        metadata = self.record_hyperparameters(metadata);

        let model = FittedModel::new(metadata, dataset.schema().clone(), labels, estimator)?;

        info!(
            model = %self.config.model_type,
            task = %self.config.task_type,
            rows = dataset.n_rows(),
            metric = metric_name,
            value = metric,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model trained"
        );
        Ok(model)
    }

    /// Map distinct numeric target values to class indices in ascending order
    fn encode_numeric_classes(values: ArrayView1<'_, f64>) -> Result<(Array1<f64>, ClassLabels)> {
        let mut distinct: Vec<f64> = values.to_vec();
        distinct.sort_by(|a, b| a.total_cmp(b));
        distinct.dedup();

        let names = distinct
            .iter()
            .map(|v| {
                if v.fract() == 0.0 {
                    format!("{}", *v as i64)
                } else {
                    format!("{}", v)
                }
            })
            .collect();
        let labels = ClassLabels::new(names)?;
        let codes = values
            .iter()
            .map(|v| distinct.iter().position(|d| d == v).unwrap_or(0) as f64)
            .collect();
        Ok((codes, labels))
    }

    fn fit_estimator(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        labels: Option<&ClassLabels>,
    ) -> Result<Estimator> {
        let cfg = &self.config;
        let classification = cfg.task_type == TaskType::Classification;
        let seed = cfg.random_state.unwrap_or(42);

        match cfg.model_type {
            ModelType::RandomForest => {
                let mut rf = if classification {
                    RandomForest::new_classifier(cfg.n_estimators)
                } else {
                    RandomForest::new_regressor(cfg.n_estimators)
                };
                if let Some(d) = cfg.max_depth {
                    rf = rf.with_max_depth(d);
                }
                rf = rf
                    .with_min_samples_split(cfg.min_samples_split)
                    .with_min_samples_leaf(cfg.min_samples_leaf)
                    .with_random_state(seed);
                rf.fit(x, y)?;
                Ok(Estimator::RandomForest(rf))
            }
            ModelType::DecisionTree => {
                let mut tree = match labels {
                    Some(l) => DecisionTree::new_classifier().with_n_classes(l.len()),
                    None => DecisionTree::new_regressor(),
                };
                if let Some(d) = cfg.max_depth {
                    tree = tree.with_max_depth(d);
                }
                tree = tree
                    .with_min_samples_split(cfg.min_samples_split)
                    .with_min_samples_leaf(cfg.min_samples_leaf)
                    .with_random_state(seed);
                tree.fit(x, y)?;
                Ok(Estimator::DecisionTree(tree))
            }
            ModelType::LogisticRegression => {
                if !classification {
                    return Err(InsightError::InvalidParameter {
                        name: "model_type".to_string(),
                        value: cfg.model_type.to_string(),
                        reason: "logistic regression only supports classification".to_string(),
                    });
                }
                let mut lr = LogisticRegression::new()
                    .with_alpha(cfg.reg_lambda)
                    .with_learning_rate(cfg.learning_rate)
                    .with_max_iter(cfg.max_iter);
                lr.fit(x, y)?;
                Ok(Estimator::LogisticRegression(lr))
            }
        }
    }

    /// R² for regressors, accuracy for classifiers, on the training rows
    fn training_metric(
        estimator: &Estimator,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<f64> {
        let raw = estimator.predict_raw(x)?;
        if estimator.is_classification() {
            let correct = raw
                .rows()
                .into_iter()
                .zip(y.iter())
                .filter(|(row, actual)| super::decision_tree::argmax(row.view()) as f64 == **actual)
                .count();
            return Ok(correct as f64 / y.len().max(1) as f64);
        }

        let mean = y.mean().unwrap_or(0.0);
        let ss_tot: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
        let ss_res: f64 = raw
            .column(0)
            .iter()
            .zip(y.iter())
            .map(|(p, a)| (a - p).powi(2))
            .sum();
        Ok(if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 })
    }

    fn record_hyperparameters(&self, metadata: ModelMetadata) -> ModelMetadata {
        let cfg = &self.config;
        let metadata = metadata
            .with_hyperparameter("random_state", cfg.random_state.unwrap_or(42));
        match cfg.model_type {
            ModelType::RandomForest | ModelType::DecisionTree => {
                let metadata = metadata
                    .with_hyperparameter(
                        "max_depth",
                        cfg.max_depth.map_or("none".to_string(), |d| d.to_string()),
                    )
                    .with_hyperparameter("min_samples_leaf", cfg.min_samples_leaf)
                    .with_hyperparameter("min_samples_split", cfg.min_samples_split);
                if cfg.model_type == ModelType::RandomForest {
                    metadata.with_hyperparameter("n_estimators", cfg.n_estimators)
                } else {
                    metadata
                }
            }
            ModelType::LogisticRegression => metadata
                .with_hyperparameter("learning_rate", cfg.learning_rate)
                .with_hyperparameter("max_iter", cfg.max_iter)
                .with_hyperparameter("reg_lambda", cfg.reg_lambda),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::RawColumn;

    fn regression_data() -> Dataset {
        let x: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 * v + 1.0).collect();
        Dataset::from_columns(
            vec![
                ("x".to_string(), RawColumn::Numeric(x)),
                ("y".to_string(), RawColumn::Numeric(y)),
            ],
            Some("y"),
        )
        .unwrap()
    }

    fn classification_data() -> Dataset {
        let x: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let y: Vec<String> = x
            .iter()
            .map(|&v| if v < 15.0 { "low" } else { "high" }.to_string())
            .collect();
        Dataset::from_columns(
            vec![
                ("x".to_string(), RawColumn::Numeric(x)),
                ("band".to_string(), RawColumn::Text(y)),
            ],
            Some("band"),
        )
        .unwrap()
    }

    #[test]
    fn test_train_forest_regressor() {
        let config = TrainingConfig::default().with_n_estimators(10);
        let model = TrainEngine::new(config).fit(&regression_data()).unwrap();
        assert_eq!(model.task(), TaskType::Regression);
        assert!(model.metadata().metrics["train_r2"] > 0.9);
        assert_eq!(model.metadata().n_training_rows, 40);
    }

    #[test]
    fn test_train_tree_classifier_with_text_target() {
        let config = TrainingConfig::new(TaskType::Classification, ModelType::DecisionTree);
        let model = TrainEngine::new(config).fit(&classification_data()).unwrap();
        let labels = model.labels().unwrap();
        assert_eq!(labels.as_slice(), &["high".to_string(), "low".to_string()]);
        assert_eq!(model.metadata().metrics["train_accuracy"], 1.0);
    }

    #[test]
    fn test_numeric_classes_become_labels() {
        let config = TrainingConfig::new(TaskType::Classification, ModelType::LogisticRegression);
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&v| if v < 10.0 { 0.0 } else { 1.0 }).collect();
        let data = Dataset::from_columns(
            vec![
                ("x".to_string(), RawColumn::Numeric(x)),
                ("y".to_string(), RawColumn::Numeric(y)),
            ],
            Some("y"),
        )
        .unwrap();
        let model = TrainEngine::new(config).fit(&data).unwrap();
        assert_eq!(model.output_names(), vec!["0", "1"]);
    }

    #[test]
    fn test_logistic_rejects_regression() {
        let config = TrainingConfig::new(TaskType::Regression, ModelType::LogisticRegression);
        assert!(TrainEngine::new(config).fit(&regression_data()).is_err());
    }

    #[test]
    fn test_missing_target() {
        let data = Dataset::from_columns(
            vec![("x".to_string(), RawColumn::Numeric(vec![1.0, 2.0]))],
            None,
        )
        .unwrap();
        let err = TrainEngine::new(TrainingConfig::default()).fit(&data).unwrap_err();
        assert!(matches!(err, InsightError::Training(_)));
    }
}
