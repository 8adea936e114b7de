//! Integration tests for the full input -> prediction -> explanation pipeline

use insight_pipeline::assembler::ControlValues;
use insight_pipeline::cache::CacheStats;
use insight_pipeline::config::CacheConfig;
use insight_pipeline::dataset::{Dataset, RawColumn};
use insight_pipeline::error::InsightError;
use insight_pipeline::explainability::{AttributionMethod, ExplainConfig};
use insight_pipeline::inference::Prediction;
use insight_pipeline::model::FittedModel;
use insight_pipeline::pipeline::{run_pipeline, DashboardSession, InputSource, PipelineOptions};
use insight_pipeline::training::{ModelType, TaskType, TrainEngine, TrainingConfig};
use insight_pipeline::visualization::{PlotKind, BAR_TITLE, DOT_TITLE};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

// ============================================================================
// Fixtures
// ============================================================================

/// Housing-like data spanning RM in [3.5, 8.8] and LSTAT in [1.7, 38.0]
fn housing(n_rows: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut rm: Vec<f64> = (0..n_rows).map(|_| rng.gen_range(3.5..8.8)).collect();
    let mut lstat: Vec<f64> = (0..n_rows).map(|_| rng.gen_range(1.7..38.0)).collect();
    rm[0] = 3.5;
    rm[1] = 8.8;
    lstat[0] = 38.0;
    lstat[1] = 1.7;
    let medv: Vec<f64> = rm
        .iter()
        .zip(&lstat)
        .map(|(r, l)| 9.0 * r - 0.8 * l - 20.0 + rng.gen_range(-0.5..0.5))
        .collect();

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

/// Penguin-like data with three species separated on bill length
fn penguins() -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let species = ["Adelie", "Chinstrap", "Gentoo"];
    let mut bill = Vec::new();
    let mut mass = Vec::new();
    let mut label = Vec::new();
    for i in 0..90 {
        let s = i % 3;
        bill.push(35.0 + 7.0 * s as f64 + rng.gen_range(-1.5..1.5));
        mass.push(3500.0 + 400.0 * (s % 2) as f64 + rng.gen_range(-200.0..200.0));
        label.push(species[s].to_string());
    }
    Dataset::from_columns(
        vec![
            ("bill_length_mm".to_string(), RawColumn::Numeric(bill)),
            ("body_mass_g".to_string(), RawColumn::Numeric(mass)),
            ("species".to_string(), RawColumn::Text(label)),
        ],
        Some("species"),
    )
    .unwrap()
}

fn fit(data: &Dataset, task: TaskType, model: ModelType) -> FittedModel {
    TrainEngine::new(TrainingConfig::new(task, model).with_n_estimators(20))
        .fit(data)
        .unwrap()
}

fn controls(pairs: &[(&str, f64)]) -> InputSource {
    let mut values = ControlValues::new();
    for (name, v) in pairs {
        values.set(*name, *v);
    }
    InputSource::Controls(values)
}

// ============================================================================
// Regression
// ============================================================================

#[test]
fn test_housing_scenario() {
    let data = housing(120);
    let model = fit(&data, TaskType::Regression, ModelType::RandomForest);

    let out = run_pipeline(
        data.schema(),
        &model,
        &data,
        controls(&[("RM", 6.0), ("LSTAT", 12.0)]),
        &PipelineOptions::default(),
    )
    .unwrap();

    assert_eq!(out.predictions.len(), 1);
    match &out.predictions[0] {
        Prediction::Regression { value } => assert!(*value > 0.0 && value.is_finite()),
        other => panic!("expected a regression prediction, got {:?}", other),
    }

    assert_eq!(out.attributions.len(), 1);
    let set = &out.attributions[0];
    assert_eq!(set.method(), AttributionMethod::TreeShap);
    let mut names = set.feature_names().to_vec();
    names.sort();
    assert_eq!(names, vec!["LSTAT", "RM"]);
    assert!(set.values().iter().all(|v| v.is_finite()));

    let titles: Vec<&str> = out.plots.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(titles, vec![DOT_TITLE, BAR_TITLE]);
}

#[test]
fn test_same_input_same_output() {
    let data = housing(80);
    let model = fit(&data, TaskType::Regression, ModelType::RandomForest);
    let options = PipelineOptions::default().with_render(false);

    let a = run_pipeline(data.schema(), &model, &data, controls(&[("RM", 7.1)]), &options).unwrap();
    let b = run_pipeline(data.schema(), &model, &data, controls(&[("RM", 7.1)]), &options).unwrap();

    assert_eq!(a.predictions, b.predictions);
    assert_eq!(a.attributions[0].values(), b.attributions[0].values());
    assert_eq!(a.attributions[0].base_values(), b.attributions[0].base_values());
}

#[test]
fn test_tree_attributions_reconstruct_predictions() {
    let data = housing(100);
    let model = fit(&data, TaskType::Regression, ModelType::RandomForest);
    let out = run_pipeline(
        data.schema(),
        &model,
        &data,
        controls(&[]),
        &PipelineOptions::default().with_render(false),
    )
    .unwrap();

    let raw = model.predict_matrix(data.features()).unwrap();
    let set = &out.attributions[0];
    for i in 0..set.n_observations() {
        let total = set.reconstruct(i).unwrap();
        assert!(
            (total - raw[[i, 0]]).abs() < 1e-6,
            "row {}: {} vs {}",
            i,
            total,
            raw[[i, 0]]
        );
    }
}

#[test]
fn test_rooms_and_status_dominate_in_opposite_directions() {
    let data = housing(150);
    let model = fit(&data, TaskType::Regression, ModelType::RandomForest);
    let out = run_pipeline(
        data.schema(),
        &model,
        &data,
        controls(&[]),
        &PipelineOptions::default().with_render(false),
    )
    .unwrap();
    let set = &out.attributions[0];

    // Larger RM raises the value, larger LSTAT lowers it
    let rm_idx = 0;
    let lstat_idx = 1;
    let x = set.feature_values();
    let rm_hi = (0..set.n_observations())
        .max_by(|&a, &b| x[[a, rm_idx]].total_cmp(&x[[b, rm_idx]]))
        .unwrap();
    let lstat_hi = (0..set.n_observations())
        .max_by(|&a, &b| x[[a, lstat_idx]].total_cmp(&x[[b, lstat_idx]]))
        .unwrap();
    assert!(set.values()[[rm_hi, rm_idx]] > 0.0);
    assert!(set.values()[[lstat_hi, lstat_idx]] < 0.0);
}

#[test]
fn test_reference_subsample_is_respected() {
    let data = housing(100);
    let model = fit(&data, TaskType::Regression, ModelType::DecisionTree);
    let options = PipelineOptions::default()
        .with_explain(ExplainConfig::default().with_max_reference_rows(25))
        .with_render(false);
    let out = run_pipeline(data.schema(), &model, &data, controls(&[]), &options).unwrap();
    assert_eq!(out.attributions[0].n_observations(), 25);
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_classifier_probabilities_sum_to_one() {
    let data = penguins();
    for model_type in [ModelType::RandomForest, ModelType::LogisticRegression] {
        let model = fit(&data, TaskType::Classification, model_type);
        let upload = "bill_length_mm,body_mass_g\n36.0,3600\n43.0,3900\n47.0,3550\n";
        let out = run_pipeline(
            data.schema(),
            &model,
            &data,
            InputSource::upload_csv(upload),
            &PipelineOptions::predictions_only(),
        )
        .unwrap();

        assert_eq!(out.predictions.len(), 3);
        for prediction in &out.predictions {
            match prediction {
                Prediction::Classification {
                    label,
                    class_index,
                    probabilities,
                } => {
                    let sum: f64 = probabilities.iter().map(|(_, p)| p).sum();
                    assert!((sum - 1.0).abs() < 1e-6, "{} sums to {}", model_type, sum);
                    let argmax = probabilities
                        .iter()
                        .enumerate()
                        .max_by(|a, b| a.1 .1.total_cmp(&b.1 .1))
                        .map(|(i, _)| i)
                        .unwrap();
                    assert_eq!(argmax, *class_index);
                    assert_eq!(&probabilities[argmax].0, label);
                }
                other => panic!("expected a classification, got {:?}", other),
            }
        }
    }
}

#[test]
fn test_forest_labels_separated_species() {
    let data = penguins();
    let model = fit(&data, TaskType::Classification, ModelType::RandomForest);
    let out = run_pipeline(
        data.schema(),
        &model,
        &data,
        controls(&[("bill_length_mm", 35.0), ("body_mass_g", 3500.0)]),
        &PipelineOptions::predictions_only(),
    )
    .unwrap();
    assert_eq!(out.predictions[0].label(), Some("Adelie"));
}

#[test]
fn test_opaque_classifier_uses_sampling_per_class() {
    let data = penguins();
    let model = fit(&data, TaskType::Classification, ModelType::LogisticRegression);
    let options = PipelineOptions::default()
        .with_explain(ExplainConfig::default().with_max_reference_rows(30).with_n_permutations(4))
        .with_render(false);
    let out = run_pipeline(data.schema(), &model, &data, controls(&[]), &options).unwrap();

    assert_eq!(out.attributions.len(), 3);
    let names: Vec<&str> = out.attributions.iter().map(|s| s.output_name()).collect();
    assert_eq!(names, vec!["Adelie", "Chinstrap", "Gentoo"]);

    let explained = data.strided(30).unwrap();
    let raw = model.predict_matrix(explained.features()).unwrap();
    for (class, set) in out.attributions.iter().enumerate() {
        assert_eq!(set.method(), AttributionMethod::PermutationSampling);
        for i in 0..set.n_observations() {
            assert!((set.reconstruct(i).unwrap() - raw[[i, class]]).abs() < 1e-9);
        }
    }
}

// ============================================================================
// Input errors
// ============================================================================

#[test]
fn test_upload_missing_column_is_input_parse_error() {
    let data = housing(60);
    let model = fit(&data, TaskType::Regression, ModelType::DecisionTree);
    let err = run_pipeline(
        data.schema(),
        &model,
        &data,
        InputSource::upload_csv("RM\n6.0\n6.5\n"),
        &PipelineOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, InsightError::InputParse(_)));
    assert!(err.is_input_error());
}

#[test]
fn test_garbage_upload_is_input_parse_error() {
    let data = housing(60);
    let model = fit(&data, TaskType::Regression, ModelType::DecisionTree);
    let err = run_pipeline(
        data.schema(),
        &model,
        &data,
        InputSource::Upload {
            bytes: vec![0xff, 0xfe, 0x00, 0x01],
            delimiter: b',',
        },
        &PipelineOptions::predictions_only(),
    )
    .unwrap_err();
    assert!(matches!(err, InsightError::InputParse(_)));
}

#[test]
fn test_control_records_never_mismatch_the_model() {
    let data = housing(60);
    let model = fit(&data, TaskType::Regression, ModelType::RandomForest);
    let mut rng = ChaCha8Rng::seed_from_u64(3);
    for _ in 0..25 {
        // Values well outside the observed range are clamped by the controls
        let input = controls(&[
            ("RM", rng.gen_range(0.0..12.0)),
            ("LSTAT", rng.gen_range(-5.0..50.0)),
        ]);
        let out = run_pipeline(
            data.schema(),
            &model,
            &data,
            input,
            &PipelineOptions::predictions_only(),
        )
        .unwrap();
        assert_eq!(out.records.len(), 1);
    }
}

// ============================================================================
// Host session
// ============================================================================

#[test]
fn test_session_memoizes_attributions_until_invalidated() {
    let data = housing(80);
    let model = fit(&data, TaskType::Regression, ModelType::RandomForest);
    let session = DashboardSession::new(model, data, PipelineOptions::default())
        .unwrap()
        .with_cache(&CacheConfig {
            enabled: true,
            ..CacheConfig::default()
        });

    let first = session.run(controls(&[("RM", 5.0)])).unwrap();
    let second = session.run(controls(&[("RM", 8.0)])).unwrap();
    assert_ne!(first.predictions, second.predictions);
    assert_eq!(first.attributions[0].values(), second.attributions[0].values());
    assert_eq!(second.plots.iter().filter(|p| p.kind == PlotKind::Dot).count(), 1);

    session.invalidate();
    session.run(controls(&[])).unwrap();
    let stats: CacheStats = session.cache_stats().unwrap();
    assert_eq!((stats.hits, stats.misses, stats.generation), (1, 2, 1));
}
