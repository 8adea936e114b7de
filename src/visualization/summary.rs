//! SHAP summary plots

use super::svg::{blend, SvgDoc};
use super::{PlotArtifact, PlotKind};
use crate::error::{InsightError, Result};
use crate::explainability::AttributionSet;
use serde::{Deserialize, Serialize};

pub const DOT_TITLE: &str = "Feature importance based on SHAP values";
pub const BAR_TITLE: &str = "Feature importance based on SHAP values (Bar)";

/// Layout of summary plots
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotStyle {
    pub width: f64,
    pub row_height: f64,
    /// Show at most this many features, most important first
    pub max_display: usize,
    pub dot_radius: f64,
    /// Horizontal density bins used to spread overlapping dots
    pub density_bins: usize,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 800.0,
            row_height: 32.0,
            max_display: 20,
            dot_radius: 2.5,
            density_bins: 100,
        }
    }
}

const TOP: f64 = 50.0;
const BOTTOM: f64 = 60.0;
const LEFT: f64 = 150.0;
const RIGHT: f64 = 90.0;

/// Builds ranked summary views of an [`AttributionSet`]
pub struct SummaryPlot;

impl SummaryPlot {
    /// Beeswarm: one row per feature, dots at the attribution value,
    /// coloured by the observation's normalised feature value
    pub fn dot(set: &AttributionSet) -> Result<PlotArtifact> {
        Self::dot_with(set, &PlotStyle::default())
    }

    /// Ranked horizontal bars of mean |attribution|
    pub fn bar(set: &AttributionSet) -> Result<PlotArtifact> {
        Self::bar_with(set, &PlotStyle::default())
    }

    pub fn dot_with(set: &AttributionSet, style: &PlotStyle) -> Result<PlotArtifact> {
        Self::ensure_non_empty(set)?;
        let ranked = Self::ranked_indices(set, style.max_display);
        let values = set.values();
        let feature_values = set.feature_values();

        let (mut lo, mut hi) = ranked
            .iter()
            .flat_map(|&j| values.column(j).to_vec())
            .fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let pad = ((hi - lo) * 0.05).max(1e-9);
        lo -= pad;
        hi += pad;

        let plot_w = style.width - LEFT - RIGHT;
        let height = TOP + BOTTOM + style.row_height * ranked.len() as f64;
        let x_of = |v: f64| LEFT + (v - lo) / (hi - lo) * plot_w;

        let mut doc = SvgDoc::new(style.width, height)?;
        doc.text(style.width / 2.0, 24.0, 16.0, "middle", DOT_TITLE)?;
        doc.line(x_of(0.0), TOP - 6.0, x_of(0.0), height - BOTTOM, "#999", true)?;

        for (row, &j) in ranked.iter().enumerate() {
            let cy = TOP + style.row_height * (row as f64 + 0.5);
            doc.line(LEFT, cy, LEFT + plot_w, cy, "#eee", false)?;
            doc.text(LEFT - 8.0, cy + 4.0, 12.0, "end", &set.feature_names()[j])?;

            let column = values.column(j);
            let fv = feature_values.column(j);
            let fmin = fv.iter().copied().fold(f64::INFINITY, f64::min);
            let fmax = fv.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let offsets = Self::swarm_offsets(&column.to_vec(), lo, hi, style);

            for (i, &v) in column.iter().enumerate() {
                let t = if fmax > fmin { (fv[i] - fmin) / (fmax - fmin) } else { 0.5 };
                doc.circle(x_of(v), cy + offsets[i], style.dot_radius, &blend(t))?;
            }
        }

        Self::x_axis(&mut doc, lo, hi, height, plot_w, "SHAP value (impact on model output)")?;

        let bar_top = TOP;
        let bar_h = (height - TOP - BOTTOM).max(40.0);
        let bar_x = style.width - RIGHT + 30.0;
        doc.colour_bar(bar_x, bar_top, 10.0, bar_h)?;
        doc.text(bar_x + 16.0, bar_top + 10.0, 11.0, "start", "High")?;
        doc.text(bar_x + 16.0, bar_top + bar_h, 11.0, "start", "Low")?;
        doc.text(bar_x + 5.0, bar_top + bar_h + 16.0, 11.0, "middle", "Feature value")?;

        Ok(PlotArtifact {
            kind: PlotKind::Dot,
            title: DOT_TITLE.to_string(),
            output_name: set.output_name().to_string(),
            svg: doc.finish()?,
        })
    }

    pub fn bar_with(set: &AttributionSet, style: &PlotStyle) -> Result<PlotArtifact> {
        Self::ensure_non_empty(set)?;
        let ranking: Vec<(String, f64)> = set.ranking().into_iter().take(style.max_display).collect();
        let max = ranking.iter().map(|(_, v)| *v).fold(0.0f64, f64::max).max(1e-12);

        let plot_w = style.width - LEFT - RIGHT;
        let height = TOP + BOTTOM + style.row_height * ranking.len() as f64;
        let bar_h = style.row_height * 0.6;

        let mut doc = SvgDoc::new(style.width, height)?;
        doc.text(style.width / 2.0, 24.0, 16.0, "middle", BAR_TITLE)?;

        for (row, (name, value)) in ranking.iter().enumerate() {
            let cy = TOP + style.row_height * (row as f64 + 0.5);
            let w = value / max * plot_w;
            doc.text(LEFT - 8.0, cy + 4.0, 12.0, "end", name)?;
            doc.rect(LEFT, cy - bar_h / 2.0, w, bar_h, "#ff0051")?;
            doc.text(LEFT + w + 4.0, cy + 4.0, 11.0, "start", &format!("{:.3}", value))?;
        }

        Self::x_axis(
            &mut doc,
            0.0,
            max,
            height,
            plot_w,
            "mean(|SHAP value|) (average impact on model output magnitude)",
        )?;

        Ok(PlotArtifact {
            kind: PlotKind::Bar,
            title: BAR_TITLE.to_string(),
            output_name: set.output_name().to_string(),
            svg: doc.finish()?,
        })
    }

    fn ensure_non_empty(set: &AttributionSet) -> Result<()> {
        if set.n_observations() == 0 || set.n_features() == 0 {
            return Err(InsightError::Render("nothing to plot".to_string()));
        }
        Ok(())
    }

    /// Feature indices by mean |attribution|, most important first
    fn ranked_indices(set: &AttributionSet, max_display: usize) -> Vec<usize> {
        set.ranking()
            .into_iter()
            .take(max_display.max(1))
            .filter_map(|(name, _)| set.feature_names().iter().position(|n| *n == name))
            .collect()
    }

    /// Vertical offsets that stack dots sharing a density bin alternately
    /// above and below the row centre
    fn swarm_offsets(values: &[f64], lo: f64, hi: f64, style: &PlotStyle) -> Vec<f64> {
        let bins = style.density_bins.max(1);
        let max_spread = style.row_height * 0.4;
        let step = style.dot_radius * 0.8;
        let mut counts = vec![0usize; bins];

        values
            .iter()
            .map(|&v| {
                let b = (((v - lo) / (hi - lo)) * bins as f64) as usize;
                let b = b.min(bins - 1);
                let k = counts[b];
                counts[b] += 1;
                let layer = ((k + 1) / 2) as f64 * step;
                let offset = if k % 2 == 0 { layer } else { -layer };
                offset.clamp(-max_spread, max_spread)
            })
            .collect()
    }

    fn x_axis(doc: &mut SvgDoc, lo: f64, hi: f64, height: f64, plot_w: f64, label: &str) -> Result<()> {
        let y = height - BOTTOM + 8.0;
        doc.line(LEFT, y, LEFT + plot_w, y, "#333", false)?;
        for k in 0..=4 {
            let v = lo + (hi - lo) * k as f64 / 4.0;
            let x = LEFT + plot_w * k as f64 / 4.0;
            doc.line(x, y, x, y + 4.0, "#333", false)?;
            doc.text(x, y + 16.0, 10.0, "middle", &format!("{:.2}", v))?;
        }
        doc.text(LEFT + plot_w / 2.0, height - 12.0, 12.0, "middle", label)
    }
}
