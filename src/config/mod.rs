//! Dashboard configuration
//!
//! Loaded from an optional JSON file, then overridden from the environment:
//! - `INSIGHT_DATA_URL` dataset location (URL or path)
//! - `INSIGHT_MODELS_DIR` model store directory
//! - `INSIGHT_OUTPUT_DIR` where plots are written
//! - `INSIGHT_SEED` seed for training and sampling attribution

use crate::dataset::{DatasetFormat, DatasetSource, DatasetSpec};
use crate::error::{InsightError, Result};
use crate::explainability::ExplainConfig;
use crate::training::{ModelType, TaskType, TrainingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_DATA_URL: &str = "INSIGHT_DATA_URL";
pub const ENV_MODELS_DIR: &str = "INSIGHT_MODELS_DIR";
pub const ENV_OUTPUT_DIR: &str = "INSIGHT_OUTPUT_DIR";
pub const ENV_SEED: &str = "INSIGHT_SEED";

/// Where the model lives and how to get one if it is not stored yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub store_dir: PathBuf,
    pub model_id: String,
    /// Fit a model at startup when the store has none under `model_id`
    pub train_if_missing: bool,
    pub training: TrainingConfig,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./models"),
            model_id: "boston_rf".to_string(),
            train_if_missing: true,
            training: TrainingConfig::new(TaskType::Regression, ModelType::RandomForest)
                .with_name("boston_rf"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub write_plots: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./output"),
            write_plots: true,
        }
    }
}

/// Attribution cache owned by the dashboard host; off unless enabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_entries: 8,
            ttl_secs: None,
        }
    }
}

/// Complete dashboard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub dataset: DatasetSpec,
    pub model: ModelConfig,
    pub explain: ExplainConfig,
    pub output: OutputConfig,
    pub cache: CacheConfig,
}

impl DashboardConfig {
    /// Parse a JSON configuration file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            InsightError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| InsightError::Config(format!("{}: {}", path.display(), e)))
    }

    /// File (or defaults), then environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        let config = config.with_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the `INSIGHT_*` overrides read through `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(source) = lookup(ENV_DATA_URL) {
            debug!(source = %source, "dataset source overridden");
            self.dataset.source = DatasetSource::parse(&source);
        }
        if let Some(dir) = lookup(ENV_MODELS_DIR) {
            self.model.store_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            self.output.dir = PathBuf::from(dir);
        }
        if let Some(seed) = lookup(ENV_SEED) {
            let seed: u64 = seed.trim().parse().map_err(|_| {
                InsightError::Config(format!("{} must be an unsigned integer, got '{}'", ENV_SEED, seed))
            })?;
            self = self.with_seed(seed);
        }
        Ok(self)
    }

    pub fn with_dataset(mut self, dataset: DatasetSpec) -> Self {
        self.dataset = dataset;
        self
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.model.store_dir = dir.into();
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output.dir = dir.into();
        self
    }

    pub fn with_explain(mut self, explain: ExplainConfig) -> Self {
        self.explain = explain;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.model.training.random_state = Some(seed);
        self.explain.seed = seed;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Reject settings that cannot work together
    pub fn validate(&self) -> Result<()> {
        if self.model.model_id.trim().is_empty() {
            return Err(InsightError::Config("model.model_id is empty".to_string()));
        }
        let training = &self.model.training;
        if training.model_type == ModelType::LogisticRegression && training.task_type == TaskType::Regression {
            return Err(InsightError::Config(
                "logistic regression needs a classification task".to_string(),
            ));
        }
        if training.model_type == ModelType::RandomForest && training.n_estimators == 0 {
            return Err(InsightError::Config("model.training.n_estimators must be at least 1".to_string()));
        }
        if self.model.train_if_missing && self.dataset.target.is_none() {
            return Err(InsightError::Config(
                "training at startup needs dataset.target".to_string(),
            ));
        }
        if self.explain.n_permutations == 0 {
            return Err(InsightError::Config("explain.n_permutations must be at least 1".to_string()));
        }
        if self.cache.enabled && self.cache.max_entries == 0 {
            return Err(InsightError::Config("cache.max_entries must be at least 1".to_string()));
        }
        match &self.dataset.format {
            DatasetFormat::Csv { delimiter } if matches!(delimiter, b'\n' | b'\r' | b'"') => Err(
                InsightError::Config(format!("invalid CSV delimiter {:?}", *delimiter as char)),
            ),
            DatasetFormat::WrappedWhitespace { columns, .. } if columns.is_empty() => Err(
                InsightError::Config("wrapped_whitespace format needs column names".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = DashboardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dataset.target.as_deref(), Some("MEDV"));
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_DATA_URL, "data/boston.csv"),
            (ENV_MODELS_DIR, "/tmp/models"),
            (ENV_SEED, "7"),
        ]
        .into_iter()
        .collect();
        let config = DashboardConfig::default()
            .with_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.dataset.source, DatasetSource::File(PathBuf::from("data/boston.csv")));
        assert_eq!(config.model.store_dir, PathBuf::from("/tmp/models"));
        assert_eq!(config.explain.seed, 7);
        assert_eq!(config.model.training.random_state, Some(7));
        assert_eq!(config.output.dir, PathBuf::from("./output"));
    }

    #[test]
    fn test_bad_seed_is_config_error() {
        let err = DashboardConfig::default()
            .with_env_overrides(|k| (k == ENV_SEED).then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, InsightError::Config(_)));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"explain": {{"max_reference_rows": 50}}, "cache": {{"enabled": true}}}}"#).unwrap();
        let config = DashboardConfig::from_file(file.path()).unwrap();
        assert_eq!(config.explain.max_reference_rows, 50);
        assert_eq!(config.explain.n_permutations, 10);
        assert!(config.cache.enabled);
        assert_eq!(config.model.model_id, "boston_rf");
    }

    #[test]
    fn test_validate_rejects_inconsistent_settings() {
        let mut config = DashboardConfig::default();
        config.model.training.model_type = ModelType::LogisticRegression;
        assert!(matches!(config.validate(), Err(InsightError::Config(_))));

        let config = DashboardConfig::default()
            .with_cache(CacheConfig { enabled: true, max_entries: 0, ttl_secs: None });
        assert!(config.validate().is_err());
    }
}
