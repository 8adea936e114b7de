//! Inference configuration

use serde::{Deserialize, Serialize};

/// Configuration for model inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Rows per batch; larger inputs are split and scored in parallel
    pub batch_size: usize,

    /// Tolerance when checking that class probabilities sum to one
    pub probability_tolerance: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            probability_tolerance: 1e-6,
        }
    }
}

impl InferenceConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}
