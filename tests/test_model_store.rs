//! Integration tests for model persistence

use insight_pipeline::dataset::{Dataset, RawColumn};
use insight_pipeline::error::InsightError;
use insight_pipeline::inference::InferenceEngine;
use insight_pipeline::model::{FileModelStore, ModelArtifact, ModelStore};
use insight_pipeline::schema::FeatureRecord;
use insight_pipeline::training::{ModelType, TaskType, TrainEngine, TrainingConfig};
use tempfile::TempDir;

fn labelled() -> Dataset {
    let x: Vec<f64> = (0..40).map(|i| i as f64 / 4.0).collect();
    let z: Vec<f64> = (0..40).map(|i| ((i * 7) % 11) as f64).collect();
    let label: Vec<String> = x
        .iter()
        .map(|&v| if v < 5.0 { "small" } else { "large" }.to_string())
        .collect();
    Dataset::from_columns(
        vec![
            ("x".to_string(), RawColumn::Numeric(x)),
            ("z".to_string(), RawColumn::Numeric(z)),
            ("size".to_string(), RawColumn::Text(label)),
        ],
        Some("size"),
    )
    .unwrap()
}

#[test]
fn test_saved_model_predicts_identically() {
    let dir = TempDir::new().unwrap();
    let store = FileModelStore::new(dir.path());
    let data = labelled();
    let model = TrainEngine::new(
        TrainingConfig::new(TaskType::Classification, ModelType::RandomForest)
            .with_n_estimators(10)
            .with_name("sizes"),
    )
    .fit(&data)
    .unwrap();

    store.save("sizes", &model).unwrap();
    assert!(store.exists("sizes"));
    assert_eq!(store.list().unwrap(), vec!["sizes".to_string()]);

    let loaded = store.load("sizes").unwrap();
    assert_eq!(loaded.fingerprint(), model.fingerprint());
    assert_eq!(loaded.metadata().name, "sizes");
    assert_eq!(loaded.labels(), model.labels());

    let record = FeatureRecord::from_pairs(data.schema(), vec![("x", 2.0), ("z", 3.0)]).unwrap();
    let engine = InferenceEngine::default();
    assert_eq!(
        engine.predict_one(&model, &record).unwrap(),
        engine.predict_one(&loaded, &record).unwrap()
    );
}

#[test]
fn test_missing_model_is_load_error() {
    let dir = TempDir::new().unwrap();
    let store = FileModelStore::new(dir.path());
    assert!(!store.exists("nope"));
    assert!(matches!(store.load("nope"), Err(InsightError::ModelLoad(_))));
}

#[test]
fn test_corrupt_artifact_is_load_error() {
    let dir = TempDir::new().unwrap();
    let store = FileModelStore::new(dir.path());
    let data = labelled();
    let model = TrainEngine::new(TrainingConfig::new(TaskType::Classification, ModelType::DecisionTree))
        .fit(&data)
        .unwrap();
    store.save("tree", &model).unwrap();

    let path = store.path_for("tree").unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(store.load("tree"), Err(InsightError::ModelLoad(_))));

    std::fs::write(&path, b"not a model").unwrap();
    assert!(matches!(store.load("tree"), Err(InsightError::ModelLoad(_))));
}

#[test]
fn test_artifact_bytes_round_trip() {
    let data = labelled();
    let model = TrainEngine::new(TrainingConfig::new(TaskType::Classification, ModelType::LogisticRegression))
        .fit(&data)
        .unwrap();
    let bytes = ModelArtifact::from_model(&model).unwrap().to_bytes().unwrap();
    assert_eq!(&bytes[..4], b"INSM");
    let back = ModelArtifact::from_bytes(&bytes).unwrap().into_model().unwrap();
    assert_eq!(back.fingerprint(), model.fingerprint());
}

#[test]
fn test_invalid_id_rejected() {
    let dir = TempDir::new().unwrap();
    let store = FileModelStore::new(dir.path());
    assert!(store.path_for("../escape").is_err());
    assert!(store.path_for("").is_err());
}
