//! Insight Pipeline - tabular predictions with SHAP explanations
//!
//! This crate implements the input -> prediction -> explanation loop behind a
//! model dashboard:
//! - Feature input assembly from bounded controls or uploaded files
//! - Inference with schema checks and classifier probability vectors
//! - Structure-aware SHAP attribution (exact TreeSHAP, permutation sampling)
//! - Static SVG summary plots
//!
//! # Modules
//!
//! ## Data
//! - [`schema`] - Feature schema and validated records
//! - [`dataset`] - Reference datasets from files or URLs
//!
//! ## Pipeline stages
//! - [`assembler`] - Feature input assembler
//! - [`inference`] - Inference invoker
//! - [`explainability`] - SHAP attribution
//! - [`visualization`] - Summary plots
//! - [`pipeline`] - `run_pipeline` and the host-owned session
//!
//! ## Models
//! - [`training`] - Decision trees, random forests, logistic regression
//! - [`model`] - Fitted models and the model store
//!
//! ## Infrastructure
//! - [`cache`] - Explicit memoization with an invalidation generation
//! - [`config`] - Dashboard configuration
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data
pub mod schema;
pub mod dataset;

// Models
pub mod training;
pub mod model;

// Pipeline stages
pub mod assembler;
pub mod inference;
pub mod explainability;
pub mod visualization;
pub mod pipeline;

// Infrastructure
pub mod cache;
pub mod config;

// Services
pub mod cli;

pub use error::{InsightError, Result};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::assembler::{ControlPanel, ControlValues, FeatureAssembler, UploadParser};
    pub use crate::config::DashboardConfig;
    pub use crate::dataset::{DataLoader, Dataset, DatasetSource, DatasetSpec};
    pub use crate::error::{InsightError, Result};
    pub use crate::explainability::{AttributionSet, ExplainConfig, Explainer};
    pub use crate::inference::{InferenceEngine, Prediction};
    pub use crate::model::{FileModelStore, FittedModel, ModelStore};
    pub use crate::pipeline::{run_pipeline, DashboardSession, InputSource, PipelineOptions, PipelineOutput};
    pub use crate::schema::{FeatureRecord, FeatureSchema, FeatureSpec, FeatureValue};
    pub use crate::training::{ModelType, TaskType, TrainEngine, TrainingConfig};
    pub use crate::visualization::{PlotArtifact, SummaryPlot};
}
