//! Feature input assembler
//!
//! Builds [`FeatureRecord`]s for a schema from one of two sources:
//! interactive controls (one record) or an uploaded delimited file (one
//! record per row, passed through as a batch).

mod controls;
mod upload;

pub use controls::{ControlPanel, ControlSpec, ControlValues, ControlWidget};
pub use upload::UploadParser;

use crate::error::Result;
use crate::schema::{FeatureRecord, FeatureSchema};

/// Record builder bound to one schema
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    panel: ControlPanel,
    upload: UploadParser,
}

impl FeatureAssembler {
    pub fn new(schema: &FeatureSchema) -> Self {
        Self {
            panel: ControlPanel::from_schema(schema),
            upload: UploadParser::new(),
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.panel.schema()
    }

    pub fn panel(&self) -> &ControlPanel {
        &self.panel
    }

    pub fn from_controls(&self, values: &ControlValues) -> Result<FeatureRecord> {
        self.panel.assemble(values)
    }

    pub fn from_upload(&self, bytes: &[u8], delimiter: u8) -> Result<Vec<FeatureRecord>> {
        self.upload.parse(self.panel.schema(), bytes, delimiter)
    }
}
