//! Training configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of ML task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Scalar regression
    Regression,
    /// Single-label classification (binary or multi-class)
    Classification,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Regression => write!(f, "regression"),
            TaskType::Classification => write!(f, "classification"),
        }
    }
}

/// Type of model to train
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Decision Tree
    DecisionTree,
    /// Random Forest
    RandomForest,
    /// Multinomial logistic regression
    LogisticRegression,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::DecisionTree => write!(f, "decision_tree"),
            ModelType::RandomForest => write!(f, "random_forest"),
            ModelType::LogisticRegression => write!(f, "logistic_regression"),
        }
    }
}

impl std::str::FromStr for ModelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "decision_tree" | "tree" => Ok(ModelType::DecisionTree),
            "random_forest" | "forest" => Ok(ModelType::RandomForest),
            "logistic" | "logistic_regression" => Ok(ModelType::LogisticRegression),
            other => Err(format!("unknown model type '{}'", other)),
        }
    }
}

/// Configuration for model training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Type of ML task
    pub task_type: TaskType,

    /// Model type to train
    pub model_type: ModelType,

    /// Name given to the fitted model
    pub model_name: String,

    /// Random seed for reproducibility
    pub random_state: Option<u64>,

    // Tree-specific parameters
    /// Maximum depth of trees
    pub max_depth: Option<usize>,

    /// Minimum samples to split a node
    pub min_samples_split: usize,

    /// Minimum samples per leaf
    pub min_samples_leaf: usize,

    /// Number of trees (for ensemble methods)
    pub n_estimators: usize,

    // Linear-model parameters
    /// Learning rate (gradient descent)
    pub learning_rate: f64,

    /// Maximum optimizer iterations
    pub max_iter: usize,

    /// L2 regularization
    pub reg_lambda: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            task_type: TaskType::Regression,
            model_type: ModelType::RandomForest,
            model_name: "model".to_string(),
            random_state: Some(42),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            n_estimators: 100,
            learning_rate: 0.5,
            max_iter: 1000,
            reg_lambda: 0.01,
        }
    }
}

impl TrainingConfig {
    /// Create a new configuration
    pub fn new(task_type: TaskType, model_type: ModelType) -> Self {
        Self {
            task_type,
            model_type,
            ..Default::default()
        }
    }

    /// Builder method to set model name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = name.into();
        self
    }

    /// Builder method to set number of estimators
    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n;
        self
    }

    /// Builder method to set max depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Builder method to set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Builder method to set optimizer iterations
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainingConfig::default();
        assert_eq!(config.n_estimators, 100);
        assert_eq!(config.model_type, ModelType::RandomForest);
        assert_eq!(config.random_state, Some(42));
    }

    #[test]
    fn test_builder() {
        let config = TrainingConfig::new(TaskType::Classification, ModelType::DecisionTree)
            .with_max_depth(4)
            .with_name("penguins");
        assert_eq!(config.max_depth, Some(4));
        assert_eq!(config.model_name, "penguins");
    }

    #[test]
    fn test_model_type_from_str() {
        assert_eq!("forest".parse::<ModelType>().unwrap(), ModelType::RandomForest);
        assert!("svm".parse::<ModelType>().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrainingConfig = serde_json::from_str(r#"{"n_estimators": 10}"#).unwrap();
        assert_eq!(config.n_estimators, 10);
        assert_eq!(config.min_samples_leaf, 1);
    }
}
