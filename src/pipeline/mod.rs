//! Input -> prediction -> explanation pipeline
//!
//! [`run_pipeline`] is a pure function of its arguments: it assembles
//! records, predicts, explains the reference data and renders the summary
//! plots from scratch on every call. Hosts that want to reuse attribution
//! results across calls go through [`DashboardSession`], which owns an
//! explicit memoization map.

mod session;

pub use session::{AttributionKey, DashboardSession};

use crate::assembler::{ControlValues, FeatureAssembler};
use crate::dataset::Dataset;
use crate::error::{InsightError, Result};
use crate::explainability::{AttributionSet, ExplainConfig, Explainer};
use crate::inference::{InferenceEngine, Prediction};
use crate::model::FittedModel;
use crate::schema::{FeatureRecord, FeatureSchema};
use crate::visualization::{PlotArtifact, PlotStyle, SummaryPlot};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Where the records of one run come from
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Current control values; yields exactly one record
    Controls(ControlValues),
    /// Raw bytes of a delimited file; yields one record per row
    Upload { bytes: Vec<u8>, delimiter: u8 },
}

impl InputSource {
    pub fn upload_csv(bytes: impl Into<Vec<u8>>) -> Self {
        InputSource::Upload {
            bytes: bytes.into(),
            delimiter: b',',
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            InputSource::Controls(_) => "controls",
            InputSource::Upload { .. } => "upload",
        }
    }
}

/// What a run computes beyond predictions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// Attribution settings; `None` skips explanation and rendering
    pub explain: Option<ExplainConfig>,
    /// Render the dot and bar summary plots for every attribution set
    pub render: bool,
    pub style: PlotStyle,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            explain: Some(ExplainConfig::default()),
            render: true,
            style: PlotStyle::default(),
        }
    }
}

impl PipelineOptions {
    pub fn predictions_only() -> Self {
        Self {
            explain: None,
            render: false,
            style: PlotStyle::default(),
        }
    }

    pub fn with_explain(mut self, explain: ExplainConfig) -> Self {
        self.explain = Some(explain);
        self
    }

    pub fn with_render(mut self, render: bool) -> Self {
        self.render = render;
        self
    }
}

/// Wall-clock milliseconds spent per stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    pub assemble_ms: u64,
    pub predict_ms: u64,
    pub explain_ms: u64,
    pub render_ms: u64,
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub records: Vec<FeatureRecord>,
    /// One per record, in record order
    pub predictions: Vec<Prediction>,
    /// One per model output; empty when explanation is off
    pub attributions: Vec<AttributionSet>,
    /// Dot then bar plot per attribution set; empty when rendering is off
    pub plots: Vec<PlotArtifact>,
    pub timings: StageTimings,
}

/// Assemble, predict, explain and render with no state carried between calls
pub fn run_pipeline(
    schema: &FeatureSchema,
    model: &FittedModel,
    reference: &Dataset,
    input: InputSource,
    options: &PipelineOptions,
) -> Result<PipelineOutput> {
    run_with(schema, model, reference, input, options, |config| {
        Explainer::for_model(model, config.clone()).explain(reference)
    })
}

/// Shared stage sequence; `explain` supplies the attribution sets
pub(crate) fn run_with<F>(
    schema: &FeatureSchema,
    model: &FittedModel,
    reference: &Dataset,
    input: InputSource,
    options: &PipelineOptions,
    explain: F,
) -> Result<PipelineOutput>
where
    F: FnOnce(&ExplainConfig) -> Result<Vec<AttributionSet>>,
{
    let start = Instant::now();
    model.schema().ensure_compatible(schema)?;
    schema.ensure_compatible(reference.schema())?;

    let mut timings = StageTimings::default();
    let source = input.kind();

    let stage = Instant::now();
    let records = assemble(schema, input)?;
    timings.assemble_ms = stage.elapsed().as_millis() as u64;

    let stage = Instant::now();
    let predictions = InferenceEngine::default().predict(model, &records)?;
    timings.predict_ms = stage.elapsed().as_millis() as u64;

    let attributions = match &options.explain {
        Some(config) => {
            let stage = Instant::now();
            let sets = explain(config)?;
            timings.explain_ms = stage.elapsed().as_millis() as u64;
            sets
        }
        None => Vec::new(),
    };

    let plots = if options.render && !attributions.is_empty() {
        let stage = Instant::now();
        let plots = render(&attributions, &options.style)?;
        timings.render_ms = stage.elapsed().as_millis() as u64;
        plots
    } else {
        Vec::new()
    };

    debug!(?timings, "pipeline stages");
    info!(
        source,
        records = records.len(),
        attribution_sets = attributions.len(),
        plots = plots.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "pipeline run complete"
    );

    Ok(PipelineOutput {
        records,
        predictions,
        attributions,
        plots,
        timings,
    })
}

fn assemble(schema: &FeatureSchema, input: InputSource) -> Result<Vec<FeatureRecord>> {
    let assembler = FeatureAssembler::new(schema);
    let records = match input {
        InputSource::Controls(values) => vec![assembler.from_controls(&values)?],
        InputSource::Upload { bytes, delimiter } => assembler.from_upload(&bytes, delimiter)?,
    };
    if records.is_empty() {
        return Err(InsightError::InputParse("no records to predict".to_string()));
    }
    Ok(records)
}

fn render(sets: &[AttributionSet], style: &PlotStyle) -> Result<Vec<PlotArtifact>> {
    let mut plots = Vec::with_capacity(sets.len() * 2);
    for set in sets {
        plots.push(SummaryPlot::dot_with(set, style)?);
        plots.push(SummaryPlot::bar_with(set, style)?);
    }
    Ok(plots)
}
