//! Data loading utilities

use super::{Dataset, DatasetSource, DatasetSpec};
use crate::error::{InsightError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A fully-populated column before schema inference
#[derive(Debug, Clone, PartialEq)]
pub enum RawColumn {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl RawColumn {
    pub fn len(&self) -> usize {
        match self {
            RawColumn::Numeric(v) => v.len(),
            RawColumn::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// On-disk layout of a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetFormat {
    /// Delimited text with a header row
    Csv {
        #[serde(default = "default_delimiter")]
        delimiter: u8,
    },
    /// Whitespace separated values after a preamble, where one record may wrap
    /// over several physical lines (StatLib layout)
    WrappedWhitespace {
        skip_rows: usize,
        columns: Vec<String>,
    },
}

fn default_delimiter() -> u8 {
    b','
}

impl Default for DatasetFormat {
    fn default() -> Self {
        DatasetFormat::Csv { delimiter: b',' }
    }
}

/// Loads datasets from files or URLs
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Timeout for network fetches
    timeout: Duration,
    /// Rows used for CSV schema inference
    infer_schema_length: usize,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            infer_schema_length: 1000,
        }
    }

    /// Set network timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set CSV schema inference length
    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows.max(1);
        self
    }

    /// Fetch and parse a dataset. Any failure is a [`InsightError::DataFetch`].
    pub async fn load(&self, spec: &DatasetSpec) -> Result<Dataset> {
        let start = Instant::now();
        let bytes = match &spec.source {
            DatasetSource::File(path) => std::fs::read(path).map_err(|e| {
                InsightError::DataFetch(format!("cannot read {}: {}", path.display(), e))
            })?,
            DatasetSource::Url(url) => self.fetch_url(url).await?,
        };
        let dataset = self.from_bytes(&bytes, spec)?;
        info!(
            source = %spec.source,
            rows = dataset.n_rows(),
            features = dataset.n_features(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Dataset loaded"
        );
        Ok(dataset)
    }

    /// Load a dataset from a local file without a runtime
    pub fn load_local(&self, spec: &DatasetSpec) -> Result<Dataset> {
        match &spec.source {
            DatasetSource::File(path) => {
                let bytes = std::fs::read(path).map_err(|e| {
                    InsightError::DataFetch(format!("cannot read {}: {}", path.display(), e))
                })?;
                self.from_bytes(&bytes, spec)
            }
            DatasetSource::Url(url) => Err(InsightError::DataFetch(format!(
                "{} is remote; use DataLoader::load",
                url
            ))),
        }
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>> {
        debug!(url = %url, "Fetching dataset");
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| InsightError::DataFetch(e.to_string()))?;

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| InsightError::DataFetch(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(InsightError::DataFetch(format!("{} returned HTTP {}", url, status)));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| InsightError::DataFetch(format!("reading body of {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    /// Parse raw bytes according to `spec.format`
    pub fn from_bytes(&self, bytes: &[u8], spec: &DatasetSpec) -> Result<Dataset> {
        let columns = match &spec.format {
            DatasetFormat::Csv { delimiter } => self
                .read_csv(bytes, *delimiter)
                .and_then(|df| frame_columns(&df))
                .map_err(|e| InsightError::DataFetch(e.to_string()))?,
            DatasetFormat::WrappedWhitespace { skip_rows, columns } => {
                parse_wrapped_whitespace(bytes, *skip_rows, columns)?
            }
        };

        let columns = match &spec.features {
            Some(wanted) => select_columns(columns, wanted, spec.target.as_deref())?,
            None => columns,
        };

        Ok(Dataset::from_columns(columns, spec.target.as_deref())?.with_descriptions(&spec.descriptions))
    }

    /// Read delimited text into a frame
    pub fn read_csv(&self, bytes: &[u8], delimiter: u8) -> Result<DataFrame> {
        let parse_opts = CsvParseOptions::default().with_separator(delimiter);

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
            .finish()?;

        Ok(df)
    }
}

/// Convert every frame column into a fully-populated [`RawColumn`].
///
/// Nulls are rejected rather than imputed.
pub fn frame_columns(df: &DataFrame) -> Result<Vec<(String, RawColumn)>> {
    df.get_columns()
        .iter()
        .map(|series| {
            let name = series.name().to_string();
            let column = if series.dtype().is_numeric() {
                let cast = series.cast(&DataType::Float64)?;
                let values = cast
                    .f64()?
                    .into_iter()
                    .enumerate()
                    .map(|(row, v)| {
                        v.ok_or_else(|| {
                            InsightError::InputParse(format!(
                                "column '{}' has a missing value at row {}",
                                name,
                                row + 1
                            ))
                        })
                    })
                    .collect::<Result<Vec<f64>>>()?;
                RawColumn::Numeric(values)
            } else {
                let cast = series.cast(&DataType::String)?;
                let values = cast
                    .str()?
                    .into_iter()
                    .enumerate()
                    .map(|(row, v)| {
                        v.map(|s| s.trim().to_string()).ok_or_else(|| {
                            InsightError::InputParse(format!(
                                "column '{}' has a missing value at row {}",
                                name,
                                row + 1
                            ))
                        })
                    })
                    .collect::<Result<Vec<String>>>()?;
                RawColumn::Text(values)
            };
            Ok((name, column))
        })
        .collect()
}

/// Parse the StatLib-style layout: a preamble, then whitespace separated
/// numbers where each record spans `columns.len()` tokens regardless of
/// line breaks.
pub fn parse_wrapped_whitespace(
    bytes: &[u8],
    skip_rows: usize,
    columns: &[String],
) -> Result<Vec<(String, RawColumn)>> {
    if columns.is_empty() {
        return Err(InsightError::Config("wrapped format needs column names".to_string()));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| InsightError::DataFetch(format!("dataset is not UTF-8: {}", e)))?;

    let tokens: Vec<f64> = text
        .lines()
        .skip(skip_rows)
        .flat_map(|line| line.split_whitespace())
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| InsightError::DataFetch(format!("non-numeric token '{}'", tok)))
        })
        .collect::<Result<_>>()?;

    let width = columns.len();
    if tokens.is_empty() || tokens.len() % width != 0 {
        return Err(InsightError::DataFetch(format!(
            "{} values do not form whole records of {} columns",
            tokens.len(),
            width
        )));
    }

    let n_rows = tokens.len() / width;
    let mut out: Vec<(String, RawColumn)> = columns
        .iter()
        .map(|name| (name.clone(), RawColumn::Numeric(Vec::with_capacity(n_rows))))
        .collect();
    for record in tokens.chunks(width) {
        for (j, &v) in record.iter().enumerate() {
            if let RawColumn::Numeric(col) = &mut out[j].1 {
                col.push(v);
            }
        }
    }
    Ok(out)
}

fn select_columns(
    columns: Vec<(String, RawColumn)>,
    wanted: &[String],
    target: Option<&str>,
) -> Result<Vec<(String, RawColumn)>> {
    let mut pool = columns;
    let mut selected = Vec::with_capacity(wanted.len() + 1);
    let names = wanted.iter().map(String::as_str).chain(target);
    for name in names {
        let idx = pool.iter().position(|(n, _)| n == name).ok_or_else(|| {
            InsightError::DataFetch(format!("column '{}' not found in dataset", name))
        })?;
        selected.push(pool.swap_remove(idx));
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn csv_spec(target: Option<&str>) -> DatasetSpec {
        DatasetSpec::csv(DatasetSource::File(PathBuf::from("unused.csv")), target)
    }

    #[test]
    fn test_csv_from_bytes() {
        let csv = b"RM,LSTAT,MEDV\n6.5,4.98,24.0\n6.4,9.14,21.6\n7.2,4.03,34.7\n";
        let ds = DataLoader::new().from_bytes(csv, &csv_spec(Some("MEDV"))).unwrap();
        assert_eq!(ds.n_rows(), 3);
        assert_eq!(ds.feature_names(), vec!["RM", "LSTAT"]);
        assert_eq!(ds.target().unwrap().values.to_vec(), vec![24.0, 21.6, 34.7]);
    }

    #[test]
    fn test_csv_text_column_is_categorical() {
        let csv = b"island,bill,species\nBiscoe,40.1,Adelie\nDream,45.2,Chinstrap\n";
        let ds = DataLoader::new().from_bytes(csv, &csv_spec(Some("species"))).unwrap();
        assert_eq!(ds.column("island").unwrap().to_vec(), vec![0.0, 1.0]);
    }

    #[test]
    fn test_csv_missing_value_rejected() {
        let csv = b"a,b\n1.0,2.0\n,3.0\n";
        let err = DataLoader::new().from_bytes(csv, &csv_spec(None)).unwrap_err();
        assert!(matches!(err, InsightError::DataFetch(_)));
    }

    #[test]
    fn test_feature_selection_orders_columns() {
        let csv = b"a,b,c,y\n1,2,3,4\n5,6,7,8\n";
        let mut spec = csv_spec(Some("y"));
        spec.features = Some(vec!["c".into(), "a".into()]);
        let ds = DataLoader::new().from_bytes(csv, &spec).unwrap();
        assert_eq!(ds.feature_names(), vec!["c", "a"]);

        spec.features = Some(vec!["z".into()]);
        assert!(DataLoader::new().from_bytes(csv, &spec).is_err());
    }

    #[test]
    fn test_wrapped_whitespace_records() {
        let text = b"preamble line\n another\n 1 2 3\n 4\n 5 6\n 7 8\n";
        let cols: Vec<String> = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        let parsed = parse_wrapped_whitespace(text, 2, &cols).unwrap();
        assert_eq!(parsed[0].1, RawColumn::Numeric(vec![1.0, 5.0]));
        assert_eq!(parsed[3].1, RawColumn::Numeric(vec![4.0, 8.0]));
    }

    #[test]
    fn test_wrapped_whitespace_partial_record_rejected() {
        let text = b"1 2 3\n4 5\n";
        let cols: Vec<String> = vec!["a".into(), "b".into()];
        let err = parse_wrapped_whitespace(text, 0, &cols).unwrap_err();
        assert!(matches!(err, InsightError::DataFetch(_)));
    }

    #[test]
    fn test_load_local_rejects_url() {
        let spec = DatasetSpec {
            source: DatasetSource::Url("http://example.invalid/data".into()),
            ..csv_spec(None)
        };
        assert!(DataLoader::new().load_local(&spec).is_err());
    }
}
