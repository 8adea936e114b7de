//! Inference module
//!
//! Applies a [`FittedModel`](crate::model::FittedModel) to validated
//! [`FeatureRecord`](crate::schema::FeatureRecord)s:
//! - Schema compatibility checks before any scoring
//! - Regression values and classification label + probability vectors
//! - Parallel batch scoring via rayon for large uploads

mod config;
mod engine;

pub use config::InferenceConfig;
pub use engine::InferenceEngine;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Model output for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prediction {
    Regression {
        value: f64,
    },
    Classification {
        label: String,
        class_index: usize,
        /// `(label, probability)` in the model's label order
        probabilities: Vec<(String, f64)>,
    },
}

impl Prediction {
    /// Regression value, or the probability of the predicted class
    pub fn score(&self) -> f64 {
        match self {
            Prediction::Regression { value } => *value,
            Prediction::Classification {
                class_index,
                probabilities,
                ..
            } => probabilities.get(*class_index).map_or(0.0, |(_, p)| *p),
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Prediction::Classification { label, .. } => Some(label),
            Prediction::Regression { .. } => None,
        }
    }

    pub fn probability_of(&self, class: &str) -> Option<f64> {
        match self {
            Prediction::Classification { probabilities, .. } => probabilities
                .iter()
                .find(|(l, _)| l == class)
                .map(|(_, p)| *p),
            Prediction::Regression { .. } => None,
        }
    }

    /// Raw output vector (1 value, or one probability per class)
    pub fn raw(&self) -> Vec<f64> {
        match self {
            Prediction::Regression { value } => vec![*value],
            Prediction::Classification { probabilities, .. } => {
                probabilities.iter().map(|(_, p)| *p).collect()
            }
        }
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Regression { value } => write!(f, "{:.4}", value),
            Prediction::Classification {
                label,
                probabilities,
                class_index,
            } => {
                let p = probabilities.get(*class_index).map_or(0.0, |(_, p)| *p);
                write!(f, "{} (p={:.3})", label, p)
            }
        }
    }
}
