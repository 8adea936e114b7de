//! Host-owned dashboard state

use super::{run_with, InputSource, PipelineOptions, PipelineOutput};
use crate::assembler::ControlPanel;
use crate::cache::{CacheStats, MemoCache};
use crate::config::CacheConfig;
use crate::dataset::Dataset;
use crate::error::Result;
use crate::explainability::{AttributionSet, ExplainConfig, Explainer};
use crate::model::FittedModel;
use crate::schema::FeatureSchema;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Identity of one attribution computation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributionKey {
    pub model: String,
    pub dataset: String,
    pub explain: ExplainConfig,
}

/// Long-lived state of a dashboard: the model, its reference data and an
/// optional attribution cache.
///
/// Every [`run`](Self::run) is still a full pipeline pass. With caching
/// enabled the explanation stage is looked up by
/// (model fingerprint, dataset fingerprint, explain config) in the current
/// cache generation before being recomputed.
pub struct DashboardSession {
    model: Arc<FittedModel>,
    reference: Arc<Dataset>,
    dataset_fingerprint: String,
    options: PipelineOptions,
    cache: Option<MemoCache<AttributionKey, Arc<Vec<AttributionSet>>>>,
}

impl DashboardSession {
    /// Fails with a schema mismatch if the reference data does not fit the model
    pub fn new(model: FittedModel, reference: Dataset, options: PipelineOptions) -> Result<Self> {
        model.schema().ensure_compatible(reference.schema())?;
        let dataset_fingerprint = reference.fingerprint();
        info!(
            model = %model.metadata().name,
            rows = reference.n_rows(),
            "dashboard session ready"
        );
        Ok(Self {
            model: Arc::new(model),
            reference: Arc::new(reference),
            dataset_fingerprint,
            options,
            cache: None,
        })
    }

    pub fn with_cache(mut self, config: &CacheConfig) -> Self {
        self.cache = config.enabled.then(|| {
            let cache = MemoCache::new(config.max_entries);
            match config.ttl_secs {
                Some(secs) => cache.with_ttl(Duration::from_secs(secs)),
                None => cache,
            }
        });
        self
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.model.schema()
    }

    pub fn model(&self) -> &FittedModel {
        &self.model
    }

    pub fn reference(&self) -> &Dataset {
        &self.reference
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn control_panel(&self) -> ControlPanel {
        ControlPanel::from_schema(self.model.schema())
    }

    /// One full pipeline pass for the given input
    pub fn run(&self, input: InputSource) -> Result<PipelineOutput> {
        run_with(
            self.model.schema(),
            &self.model,
            &self.reference,
            input,
            &self.options,
            |config| self.attributions(config),
        )
    }

    fn attributions(&self, config: &ExplainConfig) -> Result<Vec<AttributionSet>> {
        let compute = || Explainer::for_model(&self.model, config.clone()).explain(&self.reference);
        let Some(cache) = &self.cache else {
            return compute();
        };
        let key = AttributionKey {
            model: self.model.fingerprint().to_string(),
            dataset: self.dataset_fingerprint.clone(),
            explain: config.clone(),
        };
        let sets = cache.get_or_try_insert_with(key, || compute().map(Arc::new))?;
        Ok(sets.as_ref().clone())
    }

    /// End the current cache generation; returns the new generation
    pub fn invalidate(&self) -> Option<u64> {
        let generation = self.cache.as_ref().map(|c| c.invalidate());
        if let Some(g) = generation {
            debug!(generation = g, "attribution cache invalidated");
        }
        generation
    }

    /// Swap in a new model; cached attributions are invalidated
    pub fn replace_model(&mut self, model: FittedModel) -> Result<()> {
        model.schema().ensure_compatible(self.reference.schema())?;
        self.model = Arc::new(model);
        self.invalidate();
        Ok(())
    }

    /// Swap in new reference data; cached attributions are invalidated
    pub fn replace_reference(&mut self, reference: Dataset) -> Result<()> {
        self.model.schema().ensure_compatible(reference.schema())?;
        self.dataset_fingerprint = reference.fingerprint();
        self.reference = Arc::new(reference);
        self.invalidate();
        Ok(())
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(|c| c.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::ControlValues;
    use crate::dataset::RawColumn;
    use crate::training::{ModelType, TaskType, TrainEngine, TrainingConfig};

    fn reference() -> Dataset {
        let a: Vec<f64> = (0..30).map(|i| (i % 6) as f64).collect();
        let b: Vec<f64> = (0..30).map(|i| (i / 6) as f64).collect();
        let y: Vec<f64> = a.iter().zip(&b).map(|(a, b)| 2.0 * a + b).collect();
        Dataset::from_columns(
            vec![
                ("a".to_string(), RawColumn::Numeric(a)),
                ("b".to_string(), RawColumn::Numeric(b)),
                ("y".to_string(), RawColumn::Numeric(y)),
            ],
            Some("y"),
        )
        .unwrap()
    }

    fn session(cache_enabled: bool) -> DashboardSession {
        let data = reference();
        let model = TrainEngine::new(TrainingConfig::new(TaskType::Regression, ModelType::DecisionTree))
            .fit(&data)
            .unwrap();
        let options = PipelineOptions::default().with_render(false);
        DashboardSession::new(model, data, options)
            .unwrap()
            .with_cache(&CacheConfig {
                enabled: cache_enabled,
                ..CacheConfig::default()
            })
    }

    #[test]
    fn test_cached_runs_reuse_attributions() {
        let session = session(true);
        let first = session.run(InputSource::Controls(ControlValues::new().with("a", 1.0))).unwrap();
        let second = session.run(InputSource::Controls(ControlValues::new().with("a", 4.0))).unwrap();

        let stats = session.cache_stats().unwrap();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(first.attributions[0].values(), second.attributions[0].values());
        assert_ne!(first.predictions[0], second.predictions[0]);
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let session = session(true);
        session.run(InputSource::Controls(ControlValues::new())).unwrap();
        assert_eq!(session.invalidate(), Some(1));
        session.run(InputSource::Controls(ControlValues::new())).unwrap();
        assert_eq!(session.cache_stats().unwrap().misses, 2);
    }

    #[test]
    fn test_cache_disabled_by_default() {
        let session = session(false);
        session.run(InputSource::Controls(ControlValues::new())).unwrap();
        assert!(session.cache_stats().is_none());
        assert_eq!(session.invalidate(), None);
    }
}
