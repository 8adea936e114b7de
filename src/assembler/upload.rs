//! Uploaded tabular input

use crate::dataset::{frame_columns, DataLoader, RawColumn};
use crate::error::{InsightError, Result};
use crate::schema::{FeatureKind, FeatureRecord, FeatureSchema, FeatureSpec, FeatureValue};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Turns raw upload bytes into records, all or nothing
#[derive(Debug, Clone, Default)]
pub struct UploadParser {
    loader: DataLoader,
}

impl UploadParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loader(loader: DataLoader) -> Self {
        Self { loader }
    }

    /// One record per data row, in file order.
    ///
    /// Fails with [`InsightError::InputParse`] when the bytes are not a
    /// delimited table, a schema column is absent or repeated, the table has
    /// no rows, or any single row does not fit the schema. Extra columns are
    /// ignored.
    pub fn parse(&self, schema: &FeatureSchema, bytes: &[u8], delimiter: u8) -> Result<Vec<FeatureRecord>> {
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(InsightError::InputParse("the file is empty".to_string()));
        }

        let df = self
            .loader
            .read_csv(bytes, delimiter)
            .map_err(|e| InsightError::InputParse(format!("not a delimited table: {}", strip_kind(&e))))?;
        let repeated: Vec<String> = repeated_headers(bytes, delimiter)
            .into_iter()
            .filter(|name| schema.get(name).is_some())
            .collect();
        if !repeated.is_empty() {
            return Err(InsightError::InputParse(format!(
                "column(s) appear more than once: {}",
                repeated.join(", ")
            )));
        }
        let mut columns: HashMap<String, RawColumn> = frame_columns(&df)?
            .into_iter()
            .map(|(name, col)| (name.trim().to_string(), col))
            .collect();

        let missing: Vec<&str> = schema
            .iter()
            .map(|spec| spec.name.as_str())
            .filter(|name| !columns.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(InsightError::InputParse(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )));
        }

        let extra: Vec<&String> = columns.keys().filter(|k| schema.get(k).is_none()).collect();
        if !extra.is_empty() {
            debug!(columns = ?extra, "ignoring upload columns outside the schema");
        }

        let ordered: Vec<(&FeatureSpec, RawColumn)> = schema
            .iter()
            .filter_map(|spec| columns.remove(&spec.name).map(|col| (spec, col)))
            .collect();
        let n_rows = ordered.first().map_or(0, |(_, col)| col.len());
        if n_rows == 0 {
            return Err(InsightError::InputParse("the file has no data rows".to_string()));
        }

        let records = (0..n_rows)
            .map(|row| {
                ordered
                    .iter()
                    .map(|(spec, col)| Ok((spec.name.clone(), cell(spec, col, row)?)))
                    .collect::<Result<HashMap<_, _>>>()
                    .and_then(|fields| FeatureRecord::new(schema, fields))
                    .map_err(|e| InsightError::InputParse(format!("row {}: {}", row + 1, strip_kind(&e))))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(rows = records.len(), "upload parsed");
        Ok(records)
    }
}

/// Value at `row`, coerced to the feature's kind
fn cell(spec: &FeatureSpec, column: &RawColumn, row: usize) -> Result<FeatureValue> {
    match (&spec.kind, column) {
        (FeatureKind::Numeric { .. }, RawColumn::Numeric(values)) => Ok(FeatureValue::Number(values[row])),
        (FeatureKind::Numeric { .. }, RawColumn::Text(values)) => values[row]
            .parse::<f64>()
            .map(FeatureValue::Number)
            .map_err(|_| {
                InsightError::InputParse(format!(
                    "column '{}' expects a number, got '{}'",
                    spec.name, values[row]
                ))
            }),
        (FeatureKind::Categorical { .. }, RawColumn::Text(values)) => {
            Ok(FeatureValue::Category(values[row].clone()))
        }
        (FeatureKind::Categorical { .. }, RawColumn::Numeric(values)) => {
            let v = values[row];
            let label = if v.fract() == 0.0 { format!("{}", v as i64) } else { v.to_string() };
            Ok(FeatureValue::Category(label))
        }
    }
}

/// Names occurring more than once in the header line, after trimming.
///
/// The CSV reader renames repeats instead of failing, so they are checked on
/// the raw bytes.
fn repeated_headers(bytes: &[u8], delimiter: u8) -> Vec<String> {
    let header = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    let mut seen = HashSet::new();
    let mut repeated = Vec::new();
    for field in String::from_utf8_lossy(header).split(delimiter as char) {
        let name = field.trim().trim_matches('"').trim().to_string();
        if !seen.insert(name.clone()) && !repeated.contains(&name) {
            repeated.push(name);
        }
    }
    repeated
}

/// Message without the error kind prefix, for nesting inside another error
fn strip_kind(err: &InsightError) -> String {
    match err {
        InsightError::SchemaMismatch(msg)
        | InsightError::InputParse(msg)
        | InsightError::DataFetch(msg) => msg.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FeatureSpec::numeric("RM", 3.5, 8.8, 6.3),
            FeatureSpec::numeric("LSTAT", 1.7, 38.0, 12.6),
        ])
        .unwrap()
    }

    #[test]
    fn test_rows_become_records() {
        let csv = b"LSTAT,RM,NOTE\n12.0,6.0,a\n5.0,7.5,b\n";
        let records = UploadParser::new().parse(&schema(), csv, b',').unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].to_row(), &[6.0, 12.0]);
        assert_eq!(records[1].to_row(), &[7.5, 5.0]);
    }

    #[test]
    fn test_missing_column_is_input_error() {
        let err = UploadParser::new()
            .parse(&schema(), b"RM\n6.0\n", b',')
            .unwrap_err();
        assert!(matches!(err, InsightError::InputParse(ref m) if m.contains("LSTAT")));
    }

    #[test]
    fn test_empty_upload_rejected() {
        let parser = UploadParser::new();
        assert!(matches!(parser.parse(&schema(), b"", b','), Err(InsightError::InputParse(_))));
        assert!(matches!(
            parser.parse(&schema(), b"RM,LSTAT\n", b','),
            Err(InsightError::InputParse(_))
        ));
    }

    #[test]
    fn test_bad_row_fails_whole_upload() {
        let csv = b"RM,LSTAT\n6.0,12.0\n6.1,99.0\n";
        let err = UploadParser::new().parse(&schema(), csv, b',').unwrap_err();
        match err {
            InsightError::InputParse(msg) => assert!(msg.starts_with("row 2:")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_semicolon_delimiter() {
        let records = UploadParser::new()
            .parse(&schema(), b"RM;LSTAT\n6.0;12.0\n", b';')
            .unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_repeated_schema_column_rejected() {
        let csv = b"RM,LSTAT,RM\n6.0,12.0,7.0\n";
        let err = UploadParser::new().parse(&schema(), csv, b',').unwrap_err();
        match err {
            InsightError::InputParse(msg) => assert!(msg.contains("RM"), "{}", msg),
            other => panic!("expected InputParse, got {:?}", other),
        }

        let padded = b"RM, LSTAT ,LSTAT\n6.0,12.0,5.0\n";
        assert!(matches!(
            UploadParser::new().parse(&schema(), padded, b','),
            Err(InsightError::InputParse(_))
        ));
    }

    #[test]
    fn test_repeated_extra_column_ignored() {
        let csv = b"RM,LSTAT,NOTE,NOTE\n6.0,12.0,a,b\n";
        let records = UploadParser::new().parse(&schema(), csv, b',').unwrap();
        assert_eq!(records.len(), 1);
    }
}
