//! Inference engine implementation

use super::{InferenceConfig, Prediction};
use crate::error::{InsightError, Result};
use crate::model::FittedModel;
use crate::schema::FeatureRecord;
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

/// Scores records against a fitted model.
///
/// Stateless apart from its configuration; identical inputs always yield
/// identical predictions.
#[derive(Debug, Clone, Default)]
pub struct InferenceEngine {
    config: InferenceConfig,
}

impl InferenceEngine {
    pub fn new(config: InferenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Predict one output per record, in input order
    pub fn predict(&self, model: &FittedModel, records: &[FeatureRecord]) -> Result<Vec<Prediction>> {
        let start = Instant::now();
        let x = Self::stack(model, records)?;
        let predictions = self.predict_matrix(model, x.view())?;
        debug!(
            model = %model.metadata().name,
            records = records.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "predictions computed"
        );
        Ok(predictions)
    }

    pub fn predict_one(&self, model: &FittedModel, record: &FeatureRecord) -> Result<Prediction> {
        self.predict(model, std::slice::from_ref(record))?
            .pop()
            .ok_or_else(|| InsightError::ShapeError {
                expected: "1 prediction".to_string(),
                actual: "0 predictions".to_string(),
            })
    }

    /// Predict from an already-encoded matrix in schema order
    pub fn predict_matrix(&self, model: &FittedModel, x: ArrayView2<'_, f64>) -> Result<Vec<Prediction>> {
        let raw = self.raw_outputs(model, x)?;
        raw.rows()
            .into_iter()
            .map(|row| self.to_prediction(model, &row.to_vec()))
            .collect()
    }

    /// Raw model outputs, scored in parallel batches when large
    pub fn raw_outputs(&self, model: &FittedModel, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let batch = self.config.batch_size.max(1);
        if x.nrows() <= batch {
            return model.predict_matrix(x);
        }

        let parts = x
            .axis_chunks_iter(Axis(0), batch)
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|chunk| model.predict_matrix(chunk))
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        Ok(ndarray::concatenate(Axis(0), &views)?)
    }

    fn stack(model: &FittedModel, records: &[FeatureRecord]) -> Result<Array2<f64>> {
        let width = model.estimator().n_features();
        let mut x = Array2::zeros((records.len(), width));
        for (i, record) in records.iter().enumerate() {
            model.schema().ensure_compatible(record.schema())?;
            let row = record.to_row();
            if row.len() != width {
                return Err(InsightError::SchemaMismatch(format!(
                    "record {} has {} values, model expects {}",
                    i,
                    row.len(),
                    width
                )));
            }
            x.row_mut(i)
                .iter_mut()
                .zip(row)
                .for_each(|(dst, &v)| *dst = v);
        }
        Ok(x)
    }

    fn to_prediction(&self, model: &FittedModel, raw: &[f64]) -> Result<Prediction> {
        if !model.estimator().is_classification() {
            return Ok(Prediction::Regression { value: raw[0] });
        }

        let labels = model.labels().ok_or_else(|| {
            InsightError::SchemaMismatch("classifier has no class labels".to_string())
        })?;
        if labels.len() != raw.len() {
            return Err(InsightError::SchemaMismatch(format!(
                "classifier emits {} probabilities for {} labels",
                raw.len(),
                labels.len()
            )));
        }

        let total: f64 = raw.iter().sum();
        let probs: Vec<f64> = if (total - 1.0).abs() > self.config.probability_tolerance && total > 0.0 {
            raw.iter().map(|p| p / total).collect()
        } else {
            raw.to_vec()
        };

        let class_index = probs
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
            .0;
        let probabilities = labels
            .as_slice()
            .iter()
            .cloned()
            .zip(probs)
            .collect();

        Ok(Prediction::Classification {
            label: labels.as_slice()[class_index].clone(),
            class_index,
            probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassLabels, Estimator, ModelMetadata};
    use crate::schema::{FeatureSchema, FeatureSpec};
    use crate::training::{RandomForest, TaskType};
    use ndarray::array;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FeatureSpec::numeric("a", 0.0, 10.0, 5.0),
            FeatureSpec::numeric("b", 0.0, 10.0, 5.0),
        ])
        .unwrap()
    }

    fn classifier() -> FittedModel {
        let x = array![[1.0, 1.0], [2.0, 1.0], [8.0, 9.0], [9.0, 8.0], [1.5, 2.0], [8.5, 8.5]];
        let y = array![0.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let mut rf = RandomForest::new_classifier(15).with_random_state(3);
        rf.fit(x.view(), y.view()).unwrap();
        FittedModel::new(
            ModelMetadata::new("c", "random_forest", TaskType::Classification),
            schema(),
            Some(ClassLabels::new(vec!["small".into(), "large".into()]).unwrap()),
            Estimator::RandomForest(rf),
        )
        .unwrap()
    }

    #[test]
    fn test_classification_probabilities_sum_to_one() {
        let model = classifier();
        let record = FeatureRecord::from_pairs(model.schema(), [("a", 9.0), ("b", 9.0)]).unwrap();
        let pred = InferenceEngine::default().predict_one(&model, &record).unwrap();
        match &pred {
            Prediction::Classification {
                label,
                class_index,
                probabilities,
            } => {
                let sum: f64 = probabilities.iter().map(|(_, p)| p).sum();
                assert!((sum - 1.0).abs() < 1e-6);
                assert_eq!(label, &probabilities[*class_index].0);
                assert_eq!(label, "large");
            }
            other => panic!("expected classification, got {:?}", other),
        }
    }

    #[test]
    fn test_incompatible_schema_rejected() {
        let model = classifier();
        let other = FeatureSchema::new(vec![
            FeatureSpec::numeric("b", 0.0, 10.0, 5.0),
            FeatureSpec::numeric("a", 0.0, 10.0, 5.0),
        ])
        .unwrap();
        let record = FeatureRecord::from_pairs(&other, [("a", 1.0), ("b", 1.0)]).unwrap();
        let err = InferenceEngine::default().predict(&model, &[record]).unwrap_err();
        assert!(matches!(err, InsightError::SchemaMismatch(_)));
    }

    #[test]
    fn test_batched_matches_unbatched() {
        let model = classifier();
        let x = Array2::from_shape_fn((25, 2), |(i, j)| ((i * 7 + j * 3) % 10) as f64);
        let whole = InferenceEngine::default().raw_outputs(&model, x.view()).unwrap();
        let batched = InferenceEngine::new(InferenceConfig::default().with_batch_size(4))
            .raw_outputs(&model, x.view())
            .unwrap();
        assert_eq!(whole, batched);
    }

    #[test]
    fn test_deterministic() {
        let model = classifier();
        let record = FeatureRecord::from_pairs(model.schema(), [("a", 4.0), ("b", 6.0)]).unwrap();
        let engine = InferenceEngine::default();
        assert_eq!(
            engine.predict_one(&model, &record).unwrap(),
            engine.predict_one(&model, &record).unwrap()
        );
    }
}
