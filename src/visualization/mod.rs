//! Visualization module: static SVG summary plots of attributions.

mod summary;
mod svg;

pub use summary::{PlotStyle, SummaryPlot, BAR_TITLE, DOT_TITLE};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    /// Ranked beeswarm of per-observation attributions
    Dot,
    /// Ranked mean |attribution|
    Bar,
}

impl PlotKind {
    fn file_stem(&self) -> &'static str {
        match self {
            PlotKind::Dot => "shap_summary",
            PlotKind::Bar => "shap_bar",
        }
    }
}

/// Rendered, presentation-only plot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotArtifact {
    pub kind: PlotKind,
    pub title: String,
    /// Model output the plot explains
    pub output_name: String,
    pub svg: String,
}

impl PlotArtifact {
    /// `shap_summary_<output>.svg` / `shap_bar_<output>.svg`
    pub fn file_name(&self) -> String {
        let slug: String = self
            .output_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        format!("{}_{}.svg", self.kind.file_stem(), slug)
    }

    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        fs::write(&path, &self.svg)?;
        debug!(path = %path.display(), bytes = self.svg.len(), "plot written");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_slug() {
        let plot = PlotArtifact {
            kind: PlotKind::Bar,
            title: BAR_TITLE.to_string(),
            output_name: "Adelie Penguin".to_string(),
            svg: "<svg></svg>".to_string(),
        };
        assert_eq!(plot.file_name(), "shap_bar_adelie_penguin.svg");
    }
}
