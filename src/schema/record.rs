//! Validated single-row feature records

use super::FeatureSchema;
use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A scalar input value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Category(String),
}

impl FeatureValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureValue::Number(_) => "a number",
            FeatureValue::Category(_) => "a category",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FeatureValue::Number(v) => Some(*v),
            FeatureValue::Category(_) => None,
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Number(v) => write!(f, "{:.4}", v),
            FeatureValue::Category(c) => write!(f, "{}", c),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Number(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        FeatureValue::Category(v.to_string())
    }
}

/// One prediction request: a value for every schema field, in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRecord {
    schema: FeatureSchema,
    values: Vec<FeatureValue>,
    encoded: Vec<f64>,
}

impl FeatureRecord {
    /// Build a record, rejecting missing, unknown or out-of-domain fields
    pub fn new(schema: &FeatureSchema, mut fields: HashMap<String, FeatureValue>) -> Result<Self> {
        let mut values = Vec::with_capacity(schema.len());
        let mut encoded = Vec::with_capacity(schema.len());

        for spec in schema.iter() {
            let value = fields.remove(&spec.name).ok_or_else(|| {
                InsightError::SchemaMismatch(format!("missing feature '{}'", spec.name))
            })?;
            encoded.push(spec.encode(&value)?);
            values.push(value);
        }

        if !fields.is_empty() {
            let mut unknown: Vec<String> = fields.into_keys().collect();
            unknown.sort();
            return Err(InsightError::SchemaMismatch(format!(
                "unknown feature(s): {}",
                unknown.join(", ")
            )));
        }

        Ok(Self {
            schema: schema.clone(),
            values,
            encoded,
        })
    }

    /// Build a record from `(name, value)` pairs
    pub fn from_pairs<I, K, V>(schema: &FeatureSchema, pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FeatureValue>,
    {
        let mut fields = HashMap::new();
        for (name, value) in pairs {
            let name = name.into();
            if fields.insert(name.clone(), value.into()).is_some() {
                return Err(InsightError::SchemaMismatch(format!(
                    "feature '{}' given twice",
                    name
                )));
            }
        }
        Self::new(schema, fields)
    }

    /// Decode an encoded model row back into a record
    pub fn from_encoded(schema: &FeatureSchema, row: &[f64]) -> Result<Self> {
        if row.len() != schema.len() {
            return Err(InsightError::SchemaMismatch(format!(
                "row has {} values, schema has {} features",
                row.len(),
                schema.len()
            )));
        }
        let fields = schema
            .iter()
            .zip(row)
            .map(|(spec, &v)| Ok((spec.name.clone(), spec.decode(v)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Self::new(schema, fields)
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn values(&self) -> &[FeatureValue] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&FeatureValue> {
        self.schema.index_of(name).map(|idx| &self.values[idx])
    }

    /// Encoded row in schema order
    pub fn to_row(&self) -> &[f64] {
        &self.encoded
    }
}

impl fmt::Display for FeatureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .schema
            .iter()
            .zip(&self.values)
            .map(|(spec, value)| format!("{}={}", spec.name, value))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}
