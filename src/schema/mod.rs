//! Feature schema: the ordered set of inputs a model expects
//!
//! A [`FeatureSchema`] is derived once from the reference dataset and then
//! travels with the fitted model. Records are validated against it at
//! construction time, and the inference engine refuses records built against
//! an incompatible schema.

mod record;

pub use record::{FeatureRecord, FeatureValue};

use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Type and valid domain of a single feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureKind {
    /// Continuous value bounded to `[min, max]`
    Numeric { min: f64, max: f64, default: f64 },
    /// One of a fixed set of labels, encoded by position
    Categorical { categories: Vec<String> },
}

impl FeatureKind {
    /// Short type name used in messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureKind::Numeric { .. } => "numeric",
            FeatureKind::Categorical { .. } => "categorical",
        }
    }
}

/// A named feature with its domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
    /// Human readable description shown next to the control
    #[serde(default)]
    pub description: Option<String>,
}

impl FeatureSpec {
    /// Numeric feature with explicit bounds and default
    pub fn numeric(name: impl Into<String>, min: f64, max: f64, default: f64) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Numeric { min, max, default },
            description: None,
        }
    }

    /// Numeric feature bounded by the observed range, defaulting to the mean
    pub fn numeric_from_values(name: impl Into<String>, values: &[f64]) -> Self {
        let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        let (min, max, mean) = if finite.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let min = finite.iter().copied().fold(f64::INFINITY, f64::min);
            let max = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = finite.iter().sum::<f64>() / finite.len() as f64;
            (min, max, mean)
        };
        Self::numeric(name, min, max, mean)
    }

    /// Categorical feature over the given labels
    pub fn categorical(name: impl Into<String>, categories: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Categorical { categories },
            description: None,
        }
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Default value for this feature
    pub fn default_value(&self) -> FeatureValue {
        match &self.kind {
            FeatureKind::Numeric { default, .. } => FeatureValue::Number(*default),
            FeatureKind::Categorical { categories } => {
                FeatureValue::Category(categories.first().cloned().unwrap_or_default())
            }
        }
    }

    /// Encode a value into the numeric model space, validating the domain
    pub fn encode(&self, value: &FeatureValue) -> Result<f64> {
        match (&self.kind, value) {
            (FeatureKind::Numeric { min, max, .. }, FeatureValue::Number(v)) => {
                if !v.is_finite() {
                    return Err(InsightError::SchemaMismatch(format!(
                        "feature '{}' must be finite, got {}",
                        self.name, v
                    )));
                }
                let tol = 1e-9 * (max - min).abs().max(1.0);
                if *v < min - tol || *v > max + tol {
                    return Err(InsightError::SchemaMismatch(format!(
                        "feature '{}' = {} outside [{}, {}]",
                        self.name, v, min, max
                    )));
                }
                Ok(*v)
            }
            (FeatureKind::Categorical { categories }, FeatureValue::Category(label)) => categories
                .iter()
                .position(|c| c == label)
                .map(|idx| idx as f64)
                .ok_or_else(|| {
                    InsightError::SchemaMismatch(format!(
                        "feature '{}' has no category '{}'",
                        self.name, label
                    ))
                }),
            (kind, value) => Err(InsightError::SchemaMismatch(format!(
                "feature '{}' is {} but got {}",
                self.name,
                kind.type_name(),
                value.type_name()
            ))),
        }
    }

    /// Decode a model-space value back into a feature value
    pub fn decode(&self, encoded: f64) -> Result<FeatureValue> {
        match &self.kind {
            FeatureKind::Numeric { .. } => Ok(FeatureValue::Number(encoded)),
            FeatureKind::Categorical { categories } => {
                let idx = encoded.round();
                if idx < 0.0 || idx as usize >= categories.len() {
                    return Err(InsightError::SchemaMismatch(format!(
                        "feature '{}' has no category code {}",
                        self.name, encoded
                    )));
                }
                Ok(FeatureValue::Category(categories[idx as usize].clone()))
            }
        }
    }
}

/// Ordered feature definitions a model expects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    features: Arc<Vec<FeatureSpec>>,
}

impl FeatureSchema {
    /// Build a schema, rejecting duplicate names and empty domains
    pub fn new(features: Vec<FeatureSpec>) -> Result<Self> {
        if features.is_empty() {
            return Err(InsightError::InvalidParameter {
                name: "features".to_string(),
                value: "[]".to_string(),
                reason: "a schema needs at least one feature".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for spec in &features {
            if !seen.insert(spec.name.as_str()) {
                return Err(InsightError::InvalidParameter {
                    name: "features".to_string(),
                    value: spec.name.clone(),
                    reason: "duplicate feature name".to_string(),
                });
            }
            match &spec.kind {
                FeatureKind::Numeric { min, max, default } => {
                    if !(min <= max) || !(min..=max).contains(&default) {
                        return Err(InsightError::InvalidParameter {
                            name: spec.name.clone(),
                            value: format!("[{}, {}] default {}", min, max, default),
                            reason: "range must be ordered and contain the default".to_string(),
                        });
                    }
                }
                FeatureKind::Categorical { categories } => {
                    if categories.is_empty() {
                        return Err(InsightError::InvalidParameter {
                            name: spec.name.clone(),
                            value: "[]".to_string(),
                            reason: "categorical feature needs at least one category".to_string(),
                        });
                    }
                }
            }
        }

        Ok(Self { features: Arc::new(features) })
    }

    /// Attach descriptions by feature name; unknown names are ignored
    pub fn with_descriptions(self, descriptions: &HashMap<String, String>) -> Self {
        let features = self
            .features
            .iter()
            .cloned()
            .map(|mut spec| {
                if let Some(desc) = descriptions.get(&spec.name) {
                    spec.description = Some(desc.clone());
                }
                spec
            })
            .collect();
        Self { features: Arc::new(features) }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureSpec> {
        self.features.iter()
    }

    /// Feature names in schema order
    pub fn names(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&FeatureSpec> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f.name == name)
    }

    /// Check that `other` has the same names, order and kinds.
    ///
    /// Numeric ranges may differ (they come from whatever data the schema
    /// was inferred from); category sets must match exactly because they
    /// define the encoding.
    pub fn ensure_compatible(&self, other: &FeatureSchema) -> Result<()> {
        if self.len() != other.len() {
            return Err(InsightError::SchemaMismatch(format!(
                "expected {} features, got {}",
                self.len(),
                other.len()
            )));
        }

        for (idx, (expected, actual)) in self.iter().zip(other.iter()).enumerate() {
            if expected.name != actual.name {
                return Err(InsightError::SchemaMismatch(format!(
                    "feature {} should be '{}', got '{}'",
                    idx, expected.name, actual.name
                )));
            }
            match (&expected.kind, &actual.kind) {
                (FeatureKind::Numeric { .. }, FeatureKind::Numeric { .. }) => {}
                (
                    FeatureKind::Categorical { categories: a },
                    FeatureKind::Categorical { categories: b },
                ) if a == b => {}
                (a, b) => {
                    return Err(InsightError::SchemaMismatch(format!(
                        "feature '{}' expected {} domain, got {}",
                        expected.name,
                        a.type_name(),
                        b.type_name()
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn is_compatible(&self, other: &FeatureSchema) -> bool {
        self.ensure_compatible(other).is_ok()
    }

    /// Stable hash over names and encodings
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for spec in self.iter() {
            hasher.update(spec.name.as_bytes());
            hasher.update([0u8]);
            match &spec.kind {
                FeatureKind::Numeric { .. } => hasher.update(b"num"),
                FeatureKind::Categorical { categories } => {
                    hasher.update(b"cat");
                    for c in categories {
                        hasher.update(c.as_bytes());
                        hasher.update([0u8]);
                    }
                }
            }
        }
        format!("{:x}", hasher.finalize())
    }
}
