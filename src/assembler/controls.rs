//! Interactive controls derived from a feature schema

use crate::error::{InsightError, Result};
use crate::schema::{FeatureKind, FeatureRecord, FeatureSchema, FeatureValue};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

/// Widget shown for one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "widget", rename_all = "snake_case")]
pub enum ControlWidget {
    Slider { min: f64, max: f64, step: f64, default: f64 },
    Select { options: Vec<String>, default: String },
}

/// One input control, bound to a schema feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSpec {
    pub name: String,
    pub description: Option<String>,
    pub widget: ControlWidget,
}

impl ControlSpec {
    pub fn default_value(&self) -> FeatureValue {
        match &self.widget {
            ControlWidget::Slider { default, .. } => FeatureValue::Number(*default),
            ControlWidget::Select { default, .. } => FeatureValue::Category(default.clone()),
        }
    }

    /// Bring a value into the widget's domain the way the widget itself would.
    ///
    /// Sliders clamp. Selects cannot produce an unlisted option, so one is
    /// rejected.
    fn settle(&self, value: &FeatureValue) -> Result<FeatureValue> {
        match (&self.widget, value) {
            (ControlWidget::Slider { min, max, .. }, FeatureValue::Number(v)) => {
                if !v.is_finite() {
                    return Err(InsightError::SchemaMismatch(format!(
                        "control '{}' needs a finite number, got {}",
                        self.name, v
                    )));
                }
                Ok(FeatureValue::Number(v.clamp(*min, *max)))
            }
            (ControlWidget::Select { options, .. }, FeatureValue::Category(label)) => {
                if options.contains(label) {
                    Ok(value.clone())
                } else {
                    Err(InsightError::SchemaMismatch(format!(
                        "control '{}' has no option '{}' (options: {})",
                        self.name,
                        label,
                        options.join(", ")
                    )))
                }
            }
            (ControlWidget::Select { options, .. }, FeatureValue::Number(v)) => {
                // "1" typed on a command line for a numeric-looking label
                let label = format_number(*v);
                if options.contains(&label) {
                    Ok(FeatureValue::Category(label))
                } else {
                    Err(InsightError::SchemaMismatch(format!(
                        "control '{}' has no option '{}'",
                        self.name, label
                    )))
                }
            }
            (ControlWidget::Slider { .. }, FeatureValue::Category(label)) => {
                Err(InsightError::SchemaMismatch(format!(
                    "control '{}' is a slider but got '{}'",
                    self.name, label
                )))
            }
        }
    }
}

impl fmt::Display for ControlSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.widget {
            ControlWidget::Slider { min, max, default, .. } => write!(
                f,
                "{}: slider [{:.4}, {:.4}], default {:.4}",
                self.name, min, max, default
            ),
            ControlWidget::Select { options, default } => write!(
                f,
                "{}: select {{{}}}, default {}",
                self.name,
                options.join(", "),
                default
            ),
        }
    }
}

fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// Values set on the controls; anything left unset takes its default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlValues {
    values: BTreeMap<String, FeatureValue>,
}

impl ControlValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FeatureValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Parse `NAME=VALUE`; values that read as numbers become numbers
    pub fn parse_assignment(&mut self, assignment: &str) -> Result<()> {
        let (name, raw) = assignment.split_once('=').ok_or_else(|| {
            InsightError::InvalidParameter {
                name: "set".to_string(),
                value: assignment.to_string(),
                reason: "expected NAME=VALUE".to_string(),
            }
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(InsightError::InvalidParameter {
                name: "set".to_string(),
                value: assignment.to_string(),
                reason: "control name is empty".to_string(),
            });
        }
        let raw = raw.trim();
        let value = match raw.parse::<f64>() {
            Ok(v) => FeatureValue::Number(v),
            Err(_) => FeatureValue::Category(raw.to_string()),
        };
        self.set(name, value);
        Ok(())
    }

    pub fn from_assignments<I, S>(assignments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut values = Self::new();
        for a in assignments {
            values.parse_assignment(a.as_ref())?;
        }
        Ok(values)
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FeatureValue)> {
        self.values.iter()
    }
}

/// The set of controls a schema calls for, in schema order
#[derive(Debug, Clone)]
pub struct ControlPanel {
    schema: FeatureSchema,
    controls: Vec<ControlSpec>,
}

impl ControlPanel {
    /// Sliders span the feature's observed range, defaulting to its mean;
    /// selects list the feature's categories
    pub fn from_schema(schema: &FeatureSchema) -> Self {
        let controls = schema
            .iter()
            .map(|spec| {
                let widget = match &spec.kind {
                    FeatureKind::Numeric { min, max, default } => ControlWidget::Slider {
                        min: *min,
                        max: *max,
                        step: slider_step(*min, *max),
                        default: *default,
                    },
                    FeatureKind::Categorical { categories } => ControlWidget::Select {
                        options: categories.clone(),
                        default: categories.first().cloned().unwrap_or_default(),
                    },
                };
                ControlSpec {
                    name: spec.name.clone(),
                    description: spec.description.clone(),
                    widget,
                }
            })
            .collect();
        Self {
            schema: schema.clone(),
            controls,
        }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn controls(&self) -> &[ControlSpec] {
        &self.controls
    }

    pub fn get(&self, name: &str) -> Option<&ControlSpec> {
        self.controls.iter().find(|c| c.name == name)
    }

    /// Every control at its default
    pub fn defaults(&self) -> ControlValues {
        let mut values = ControlValues::new();
        for control in &self.controls {
            values.set(control.name.clone(), control.default_value());
        }
        values
    }

    /// Exactly one record from the current control values
    pub fn assemble(&self, values: &ControlValues) -> Result<FeatureRecord> {
        let mut unknown: Vec<&str> = values
            .iter()
            .map(|(name, _)| name.as_str())
            .filter(|name| self.get(name).is_none())
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(InsightError::SchemaMismatch(format!(
                "no control named {}",
                unknown.join(", ")
            )));
        }

        let mut fields = HashMap::with_capacity(self.controls.len());
        for control in &self.controls {
            let value = match values.get(&control.name) {
                Some(v) => {
                    let settled = control.settle(v)?;
                    if settled != *v {
                        debug!(control = %control.name, given = %v, used = %settled, "control value clamped");
                    }
                    settled
                }
                None => control.default_value(),
            };
            fields.insert(control.name.clone(), value);
        }
        FeatureRecord::new(&self.schema, fields)
    }
}

/// Roughly a hundred slider positions, rounded to a power of ten
fn slider_step(min: f64, max: f64) -> f64 {
    let span = max - min;
    if !span.is_finite() || span <= 0.0 {
        return 0.01;
    }
    10f64.powf((span / 100.0).log10().floor())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FeatureSpec;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FeatureSpec::numeric("RM", 3.5, 8.8, 6.3).with_description("rooms per dwelling"),
            FeatureSpec::numeric("LSTAT", 1.7, 38.0, 12.6),
            FeatureSpec::categorical("island", vec!["Biscoe".into(), "Dream".into()]),
        ])
        .unwrap()
    }

    #[test]
    fn test_panel_mirrors_schema() {
        let panel = ControlPanel::from_schema(&schema());
        assert_eq!(panel.controls().len(), 3);
        let rm = panel.get("RM").unwrap();
        assert_eq!(rm.description.as_deref(), Some("rooms per dwelling"));
        match &rm.widget {
            ControlWidget::Slider { min, max, step, default } => {
                assert_eq!((*min, *max, *default), (3.5, 8.8, 6.3));
                assert!((step - 0.01).abs() < 1e-12);
            }
            other => panic!("unexpected widget {:?}", other),
        }
        assert!(matches!(
            panel.get("island").unwrap().widget,
            ControlWidget::Select { .. }
        ));
    }

    #[test]
    fn test_defaults_fill_unset_controls() {
        let panel = ControlPanel::from_schema(&schema());
        let record = panel.assemble(&ControlValues::new().with("RM", 6.0)).unwrap();
        assert_eq!(record.to_row(), &[6.0, 12.6, 0.0]);
    }

    #[test]
    fn test_slider_values_are_clamped() {
        let panel = ControlPanel::from_schema(&schema());
        let values = ControlValues::new().with("RM", 12.0).with("LSTAT", -3.0);
        let record = panel.assemble(&values).unwrap();
        assert_eq!(&record.to_row()[..2], &[8.8, 1.7]);
    }

    #[test]
    fn test_unknown_control_rejected() {
        let panel = ControlPanel::from_schema(&schema());
        let err = panel.assemble(&ControlValues::new().with("ZN", 1.0)).unwrap_err();
        assert!(matches!(err, InsightError::SchemaMismatch(_)));
    }

    #[test]
    fn test_unlisted_option_rejected() {
        let panel = ControlPanel::from_schema(&schema());
        let err = panel
            .assemble(&ControlValues::new().with("island", "Torgersen"))
            .unwrap_err();
        assert!(err.to_string().contains("Torgersen"));
    }

    #[test]
    fn test_parse_assignments() {
        let values = ControlValues::from_assignments(["RM=6.5", "island = Dream"]).unwrap();
        assert_eq!(values.get("RM"), Some(&FeatureValue::Number(6.5)));
        assert_eq!(values.get("island"), Some(&FeatureValue::Category("Dream".into())));
        assert!(ControlValues::from_assignments(["RM"]).is_err());
        assert!(ControlValues::from_assignments(["=3"]).is_err());
    }

    #[test]
    fn test_numeric_option_label() {
        let schema = FeatureSchema::new(vec![FeatureSpec::categorical(
            "CHAS",
            vec!["0".into(), "1".into()],
        )])
        .unwrap();
        let panel = ControlPanel::from_schema(&schema);
        let values = ControlValues::from_assignments(["CHAS=1"]).unwrap();
        assert_eq!(panel.assemble(&values).unwrap().to_row(), &[1.0]);
    }
}
