//! Insight CLI Module
//!
//! Command-line host for the dashboard pipeline: train a model, list the
//! controls it expects, and run predictions with SHAP summaries.

use clap::{Parser, Subcommand};
use colored::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::assembler::{ControlPanel, ControlValues, ControlWidget};
use crate::config::DashboardConfig;
use crate::dataset::{DataLoader, Dataset, DatasetFormat, DatasetSource, DatasetSpec};
use crate::error::InsightError;
use crate::explainability::AttributionSet;
use crate::inference::Prediction;
use crate::model::{FileModelStore, FittedModel, ModelStore};
use crate::pipeline::{DashboardSession, InputSource, PipelineOptions, PipelineOutput};
use crate::training::{ModelType, TaskType, TrainEngine};
use crate::visualization::PlotKind;

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) {
    println!("  {:<14} {}", muted(key), val.white());
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
    let _ = std::io::stdout().flush();
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "insight")]
#[command(author = "KolosalAI")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Predictions and SHAP summaries for tabular models")]
#[command(long_about = None)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Dataset location (URL or path), overrides the configuration
    #[arg(short, long, global = true)]
    pub data: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit a model on the dataset and save it to the store
    Train {
        /// Model type (forest, tree, logistic)
        #[arg(short, long)]
        model: Option<ModelType>,

        /// Treat the target as class labels
        #[arg(long)]
        classification: bool,

        /// Number of trees for a forest
        #[arg(long)]
        trees: Option<usize>,

        /// Store id, defaults to the configured model id
        #[arg(long)]
        id: Option<String>,
    },

    /// Show the input controls the model expects
    Controls,

    /// Assemble input, predict and explain
    Run {
        /// Control value, NAME=VALUE (repeatable)
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Delimited file with one record per row
        #[arg(short, long, conflicts_with = "set")]
        upload: Option<PathBuf>,

        /// Field delimiter of the uploaded file
        #[arg(long, default_value = ",")]
        delimiter: char,

        /// Skip attribution and plots
        #[arg(long)]
        no_explain: bool,

        /// Explain at most this many reference rows
        #[arg(long)]
        max_rows: Option<usize>,

        /// Directory for the SVG plots
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show dataset information
    Info,
}

/// Execute a parsed command line
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = DashboardConfig::load(cli.config.as_deref())?;
    if let Some(data) = &cli.data {
        config.dataset = dataset_for(&config.dataset, data);
        config.validate()?;
    }

    match cli.command {
        Commands::Train { model, classification, trees, id } => {
            if let Some(model) = model {
                config.model.training.model_type = model;
            }
            if classification {
                config.model.training.task_type = TaskType::Classification;
            }
            if let Some(trees) = trees {
                config.model.training.n_estimators = trees;
            }
            if let Some(id) = id {
                config.model.model_id = id;
            }
            config.validate()?;
            cmd_train(&config).await
        }
        Commands::Controls => cmd_controls(&config).await,
        Commands::Run { set, upload, delimiter, no_explain, max_rows, output } => {
            if let Some(rows) = max_rows {
                config.explain.max_reference_rows = rows;
            }
            if let Some(dir) = output {
                config.output.dir = dir;
            }
            let delimiter = u8::try_from(delimiter)
                .map_err(|_| anyhow::anyhow!("delimiter must be a single ASCII character"))?;
            let input = match upload {
                Some(path) => InputSource::Upload {
                    bytes: read_upload(&path)?,
                    delimiter,
                },
                None => InputSource::Controls(ControlValues::from_assignments(&set)?),
            };
            cmd_run(&config, input, !no_explain).await
        }
        Commands::Info => cmd_info(&config).await,
    }
}

/// A CSV path keeps the configured target but not the StatLib layout
fn dataset_for(current: &DatasetSpec, data: &str) -> DatasetSpec {
    let source = DatasetSource::parse(data);
    let is_csv = data.to_ascii_lowercase().ends_with(".csv");
    if is_csv {
        let mut spec = DatasetSpec::csv(source, current.target.as_deref());
        spec.descriptions = current.descriptions.clone();
        spec
    } else {
        current.clone().with_source(source)
    }
}

fn read_upload(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        InsightError::InputParse(format!("cannot read {}: {}", path.display(), e)).into()
    })
}

// ─── Shared steps ──────────────────────────────────────────────────────────────

async fn load_reference(config: &DashboardConfig) -> anyhow::Result<Dataset> {
    step_run(&format!("Loading {}", config.dataset.source));
    let start = Instant::now();
    let dataset = DataLoader::new().load(&config.dataset).await?;
    step_done(&format!(
        "{} rows × {} features in {:?}",
        dataset.n_rows(),
        dataset.n_features(),
        start.elapsed()
    ));
    Ok(dataset)
}

fn train(config: &DashboardConfig, dataset: &Dataset) -> anyhow::Result<FittedModel> {
    let training = &config.model.training;
    step_run(&format!("Training {}", training.model_type.to_string().cyan()));
    let start = Instant::now();
    let model = TrainEngine::new(training.clone()).fit(dataset)?;
    step_done(&format!("{:?}", start.elapsed()));
    Ok(model)
}

/// Stored model, or a freshly trained one when allowed
fn obtain_model(config: &DashboardConfig, dataset: &Dataset) -> anyhow::Result<FittedModel> {
    let store = FileModelStore::new(&config.model.store_dir);
    let id = &config.model.model_id;
    if store.exists(id) {
        step_run(&format!("Loading model {}", id.cyan()));
        let model = store.load(id)?;
        step_done(model.metadata().model_type.as_str());
        return Ok(model);
    }
    if !config.model.train_if_missing {
        return Err(InsightError::ModelLoad(format!(
            "no model '{}' in {}",
            id,
            store.root().display()
        ))
        .into());
    }
    let model = train(config, dataset)?;
    store.save(id, &model)?;
    Ok(model)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub async fn cmd_train(config: &DashboardConfig) -> anyhow::Result<()> {
    section("Train");
    let dataset = load_reference(config).await?;
    let model = train(config, &dataset)?;

    let store = FileModelStore::new(&config.model.store_dir);
    step_run(&format!("Saving → {}", store.path_for(&config.model.model_id)?.display()));
    store.save(&config.model.model_id, &model)?;
    step_done(&model.fingerprint()[..12]);

    println!();
    for (name, value) in &model.metadata().metrics {
        println!("  {:<16} {}", muted(name), format!("{:.4}", value).white().bold());
    }
    println!();
    Ok(())
}

pub async fn cmd_controls(config: &DashboardConfig) -> anyhow::Result<()> {
    section("Controls");
    let dataset = load_reference(config).await?;
    let panel = ControlPanel::from_schema(dataset.schema());
    println!();
    print_controls(&panel);
    println!();
    Ok(())
}

fn print_controls(panel: &ControlPanel) {
    println!(
        "  {:<10} {:>10} {:>10} {:>10}  {}",
        muted("Feature"),
        muted("Min"),
        muted("Max"),
        muted("Default"),
        muted("Description")
    );
    println!("  {}", dim(&"─".repeat(72)));
    for control in panel.controls() {
        let description = control.description.as_deref().unwrap_or("");
        match &control.widget {
            ControlWidget::Slider { min, max, default, .. } => println!(
                "  {:<10} {:>10.3} {:>10.3} {:>10.3}  {}",
                control.name.cyan(),
                min,
                max,
                default,
                dim(description)
            ),
            ControlWidget::Select { options, default } => println!(
                "  {:<10} {:>32}  {}",
                control.name.cyan(),
                format!("{} (of {})", default, options.join("/")),
                dim(description)
            ),
        }
    }
}

pub async fn cmd_run(config: &DashboardConfig, input: InputSource, explain: bool) -> anyhow::Result<()> {
    section("Run");
    let dataset = load_reference(config).await?;
    let model = obtain_model(config, &dataset)?;

    let options = if explain {
        PipelineOptions::default().with_explain(config.explain.clone())
    } else {
        PipelineOptions::predictions_only()
    };
    let session = DashboardSession::new(model, dataset, options)?.with_cache(&config.cache);

    step_run("Running pipeline");
    let start = Instant::now();
    let output = session.run(input)?;
    step_done(&format!("{:?}", start.elapsed()));

    print_predictions(&output);
    for set in &output.attributions {
        print_ranking(set);
    }

    if config.output.write_plots && !output.plots.is_empty() {
        section("Plots");
        for plot in &output.plots {
            let path = plot.write_to(&config.output.dir)?;
            let kind = match plot.kind {
                PlotKind::Dot => "Summary",
                PlotKind::Bar => "Bar",
            };
            kv(kind, &path.display().to_string());
        }
    }
    println!();
    Ok(())
}

fn print_predictions(output: &PipelineOutput) {
    section("Prediction");
    for (record, prediction) in output.records.iter().zip(&output.predictions) {
        match prediction {
            Prediction::Regression { value } => {
                println!("  {} {}", format!("{:.4}", value).white().bold(), dim(&record.to_string()));
            }
            Prediction::Classification { label, probabilities, .. } => {
                let probs: Vec<String> = probabilities
                    .iter()
                    .map(|(l, p)| format!("{}={:.3}", l, p))
                    .collect();
                println!("  {} {}", label.white().bold(), dim(&probs.join(" ")));
                println!("    {}", dim(&record.to_string()));
            }
        }
    }
}

fn print_ranking(set: &AttributionSet) {
    section(&format!("Feature importance · {} ({})", set.output_name(), set.method()));
    let ranking = set.ranking();
    let max = ranking.first().map_or(0.0, |(_, v)| *v).max(1e-12);
    for (name, value) in ranking.iter().take(10) {
        let width = ((value / max) * 30.0).round() as usize;
        println!("  {:<10} {:>9.4} {}", name, value, accent(&"▇".repeat(width.max(1))));
    }
}

pub async fn cmd_info(config: &DashboardConfig) -> anyhow::Result<()> {
    section("Data Info");
    let dataset = load_reference(config).await?;

    println!();
    kv("Source", &config.dataset.source.to_string());
    kv(
        "Format",
        match config.dataset.format {
            DatasetFormat::Csv { .. } => "csv",
            DatasetFormat::WrappedWhitespace { .. } => "wrapped whitespace",
        },
    );
    kv("Rows", &dataset.n_rows().to_string());
    kv("Features", &dataset.n_features().to_string());
    if let Some(target) = dataset.target() {
        kv("Target", &target.name);
    }
    kv("Fingerprint", &dataset.fingerprint()[..16]);
    println!();

    println!(
        "  {:<10} {:<12} {:>10} {:>10} {:>10}",
        muted("Column"),
        muted("Type"),
        muted("Min"),
        muted("Max"),
        muted("Mean")
    );
    println!("  {}", dim(&"─".repeat(56)));
    for col in dataset.describe() {
        println!(
            "  {:<10} {:<12} {:>10.3} {:>10.3} {:>10.3}",
            col.name,
            col.kind.truecolor(140, 140, 140),
            col.min,
            col.max,
            col.mean
        );
    }
    println!();
    Ok(())
}
