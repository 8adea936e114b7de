//! Model training module
//!
//! Provides the estimators the dashboard can serve:
//! - Decision trees and Random Forests (classification and regression)
//! - Multinomial logistic regression

mod config;
mod engine;
pub mod decision_tree;
pub mod linear_models;
pub mod random_forest;

pub use config::{ModelType, TaskType, TrainingConfig};
pub use decision_tree::{Criterion, DecisionTree, TreeNode};
pub use engine::TrainEngine;
pub use linear_models::LogisticRegression;
pub use random_forest::{MaxFeatures, RandomForest};
