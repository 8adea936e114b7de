//! Integration test: estimator training through TrainEngine

use insight_pipeline::dataset::{Dataset, RawColumn};
use insight_pipeline::schema::FeatureValue;
use insight_pipeline::training::{ModelType, TaskType, TrainEngine, TrainingConfig};
use insight_pipeline::InsightError;

fn housing_fixture() -> Dataset {
    let rm: Vec<f64> = (0..60).map(|i| 4.0 + (i % 12) as f64 * 0.35).collect();
    let lstat: Vec<f64> = (0..60).map(|i| 2.0 + (i / 5) as f64 * 2.5).collect();
    let medv: Vec<f64> = rm.iter().zip(&lstat).map(|(r, l)| 8.0 * r - 0.7 * l + 5.0).collect();
    Dataset::from_columns(
        vec![
            ("RM".to_string(), RawColumn::Numeric(rm)),
            ("LSTAT".to_string(), RawColumn::Numeric(lstat)),
            ("MEDV".to_string(), RawColumn::Numeric(medv)),
        ],
        Some("MEDV"),
    )
    .unwrap()
}

fn species_fixture() -> Dataset {
    let mut bill = Vec::new();
    let mut mass = Vec::new();
    let mut species = Vec::new();
    for i in 0..45 {
        let (b, m, s) = match i % 3 {
            0 => (37.0, 3600.0, "Adelie"),
            1 => (48.0, 3750.0, "Chinstrap"),
            _ => (46.0, 5200.0, "Gentoo"),
        };
        let jitter = (i / 3) as f64 * 0.1;
        bill.push(b + jitter);
        mass.push(m + jitter * 100.0);
        species.push(s.to_string());
    }
    Dataset::from_columns(
        vec![
            ("bill_length_mm".to_string(), RawColumn::Numeric(bill)),
            ("body_mass_g".to_string(), RawColumn::Numeric(mass)),
            ("species".to_string(), RawColumn::Text(species)),
        ],
        Some("species"),
    )
    .unwrap()
}

#[test]
fn test_forest_regressor_metadata() {
    let config = TrainingConfig::new(TaskType::Regression, ModelType::RandomForest)
        .with_name("housing")
        .with_n_estimators(12)
        .with_max_depth(6);
    let result = TrainEngine::new(config).fit(&housing_fixture());
    assert!(result.is_ok(), "Forest training failed: {:?}", result.err());
    let model = result.unwrap();

    let meta = model.metadata();
    assert_eq!(meta.name, "housing");
    assert_eq!(meta.target_name, "MEDV");
    assert_eq!(meta.n_training_rows, 60);
    assert_eq!(meta.hyperparameters["n_estimators"], "12");
    assert_eq!(meta.hyperparameters["max_depth"], "6");
    assert!(meta.metrics["train_r2"] > 0.8, "train_r2 = {}", meta.metrics["train_r2"]);
    assert_eq!(model.output_names(), vec!["MEDV"]);
    assert_eq!(model.schema().names(), vec!["RM", "LSTAT"]);
}

#[test]
fn test_classifiers_learn_three_species() {
    let data = species_fixture();
    for model_type in [ModelType::DecisionTree, ModelType::RandomForest, ModelType::LogisticRegression] {
        let config = TrainingConfig::new(TaskType::Classification, model_type).with_n_estimators(10);
        let result = TrainEngine::new(config).fit(&data);
        assert!(result.is_ok(), "{} training failed: {:?}", model_type, result.err());
        let model = result.unwrap();

        assert_eq!(model.task(), TaskType::Classification);
        assert_eq!(model.output_names(), vec!["Adelie", "Chinstrap", "Gentoo"]);
        let accuracy = model.metadata().metrics["train_accuracy"];
        assert!(accuracy > 0.85, "{} accuracy = {}", model_type, accuracy);
    }
}

#[test]
fn test_same_seed_same_fingerprint() {
    let data = housing_fixture();
    let fit = |seed| {
        let config = TrainingConfig::new(TaskType::Regression, ModelType::RandomForest)
            .with_n_estimators(6)
            .with_random_state(seed);
        TrainEngine::new(config).fit(&data).unwrap()
    };
    assert_eq!(fit(3).fingerprint(), fit(3).fingerprint());
    assert_ne!(fit(3).fingerprint(), fit(4).fingerprint());
}

#[test]
fn test_schema_keeps_observed_ranges() {
    let model = TrainEngine::new(TrainingConfig::new(TaskType::Regression, ModelType::DecisionTree))
        .fit(&housing_fixture())
        .unwrap();
    let rm = model.schema().get("RM").unwrap();
    assert_eq!(rm.encode(&FeatureValue::Number(4.0)).unwrap(), 4.0);
    assert!(matches!(
        rm.encode(&FeatureValue::Number(100.0)),
        Err(InsightError::SchemaMismatch(_))
    ));
}

#[test]
fn test_logistic_regression_requires_classification() {
    let config = TrainingConfig::new(TaskType::Regression, ModelType::LogisticRegression);
    let err = TrainEngine::new(config).fit(&housing_fixture()).unwrap_err();
    assert!(matches!(err, InsightError::InvalidParameter { .. }), "got {:?}", err);
}

#[test]
fn test_categorical_target_rejected_for_regression() {
    let config = TrainingConfig::new(TaskType::Regression, ModelType::DecisionTree);
    let err = TrainEngine::new(config).fit(&species_fixture()).unwrap_err();
    assert!(matches!(err, InsightError::Training(_)));
}

#[test]
fn test_single_class_target_rejected() {
    let data = Dataset::from_columns(
        vec![
            ("x".to_string(), RawColumn::Numeric(vec![1.0, 2.0, 3.0, 4.0])),
            ("label".to_string(), RawColumn::Text(vec!["a".to_string(); 4])),
        ],
        Some("label"),
    )
    .unwrap();
    let config = TrainingConfig::new(TaskType::Classification, ModelType::DecisionTree);
    let err = TrainEngine::new(config).fit(&data).unwrap_err();
    assert!(matches!(err, InsightError::Training(_)));
}
