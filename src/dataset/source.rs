//! Where a dataset comes from and how to read it

use super::DatasetFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// StatLib mirror of the Boston housing data
pub const BOSTON_URL: &str = "http://lib.stat.cmu.edu/datasets/boston";

const BOSTON_FEATURES: [(&str, &str); 13] = [
    ("CRIM", "per capita crime rate by town"),
    ("ZN", "proportion of residential land zoned for lots over 25,000 sq.ft."),
    ("INDUS", "proportion of non-retail business acres per town"),
    ("CHAS", "Charles River dummy variable (= 1 if tract bounds river; 0 otherwise)"),
    ("NOX", "nitric oxides concentration (parts per 10 million)"),
    ("RM", "average number of rooms per dwelling"),
    ("AGE", "proportion of owner-occupied units built prior to 1940"),
    ("DIS", "weighted distances to five Boston employment centres"),
    ("RAD", "index of accessibility to radial highways"),
    ("TAX", "full-value property-tax rate per $10,000"),
    ("PTRATIO", "pupil-teacher ratio by town"),
    ("B", "1000(Bk - 0.63)^2 where Bk is the proportion of blacks by town"),
    ("LSTAT", "percentage lower status of the population"),
];

/// Dataset location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSource {
    File(PathBuf),
    Url(String),
}

impl fmt::Display for DatasetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetSource::File(path) => write!(f, "{}", path.display()),
            DatasetSource::Url(url) => write!(f, "{}", url),
        }
    }
}

impl DatasetSource {
    /// Interpret `http(s)://` as a URL and anything else as a path
    pub fn parse(s: &str) -> Self {
        if s.starts_with("http://") || s.starts_with("https://") {
            DatasetSource::Url(s.to_string())
        } else {
            DatasetSource::File(PathBuf::from(s))
        }
    }
}

/// Complete description of a dataset to load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub source: DatasetSource,
    #[serde(default)]
    pub format: DatasetFormat,
    /// Target column to split off
    #[serde(default)]
    pub target: Option<String>,
    /// Feature columns to keep, in order; all non-target columns if unset
    #[serde(default)]
    pub features: Option<Vec<String>>,
    /// Feature descriptions shown alongside the controls
    #[serde(default)]
    pub descriptions: HashMap<String, String>,
}

impl Default for DatasetSpec {
    fn default() -> Self {
        Self::boston()
    }
}

impl DatasetSpec {
    /// Boston housing from StatLib: 22 preamble lines, 14 values per record
    pub fn boston() -> Self {
        let mut columns: Vec<String> = BOSTON_FEATURES.iter().map(|(n, _)| n.to_string()).collect();
        columns.push("MEDV".to_string());

        let mut descriptions: HashMap<String, String> = BOSTON_FEATURES
            .iter()
            .map(|(n, d)| (n.to_string(), d.to_string()))
            .collect();
        descriptions.insert(
            "MEDV".to_string(),
            "Median value of owner-occupied homes in $1000's".to_string(),
        );

        Self {
            source: DatasetSource::Url(BOSTON_URL.to_string()),
            format: DatasetFormat::WrappedWhitespace { skip_rows: 22, columns },
            target: Some("MEDV".to_string()),
            features: None,
            descriptions,
        }
    }

    /// Comma separated file with a header row
    pub fn csv(source: DatasetSource, target: Option<&str>) -> Self {
        Self {
            source,
            format: DatasetFormat::Csv { delimiter: b',' },
            target: target.map(String::from),
            features: None,
            descriptions: HashMap::new(),
        }
    }

    pub fn with_source(mut self, source: DatasetSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = Some(features);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_parse() {
        assert_eq!(
            DatasetSource::parse("https://host/data.csv"),
            DatasetSource::Url("https://host/data.csv".into())
        );
        assert_eq!(
            DatasetSource::parse("data/penguins.csv"),
            DatasetSource::File(PathBuf::from("data/penguins.csv"))
        );
    }

    #[test]
    fn test_boston_layout() {
        let spec = DatasetSpec::boston();
        match &spec.format {
            DatasetFormat::WrappedWhitespace { skip_rows, columns } => {
                assert_eq!(*skip_rows, 22);
                assert_eq!(columns.len(), 14);
                assert_eq!(columns.last().map(String::as_str), Some("MEDV"));
            }
            other => panic!("unexpected format {:?}", other),
        }
        assert_eq!(spec.descriptions.len(), 14);
    }

    #[test]
    fn test_spec_json_round_trip() {
        let spec = DatasetSpec::csv(DatasetSource::File("x.csv".into()), Some("y"));
        let json = serde_json::to_string(&spec).unwrap();
        let back: DatasetSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
