use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::{info, warn};

use crate::error::ValueError;

pub const PLAYER_NAME_COLUMN: &str = "player_name";
pub const ACTUAL_VALUE_COLUMN: &str = "actual_value";
pub const PREDICTED_VALUE_COLUMN: &str = "predicted_value";

const ARTIFACT: &str = "player predictions";

#[derive(Debug, Clone, PartialEq)]
pub struct PrecomputedRow {
    pub player_name: String,
    pub actual_value: Option<f64>,
    pub predicted_value: Option<f64>,
}

/// Why the precomputed dataset is (or is not) usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasetStatus {
    Loaded,
    Missing,
    Unreadable(String),
    Malformed(String),
    NoPlayerNames,
}

impl DatasetStatus {
    pub fn describe(&self) -> String {
        match self {
            DatasetStatus::Loaded => "loaded".to_string(),
            DatasetStatus::Missing => "file not found".to_string(),
            DatasetStatus::Unreadable(reason) => format!("file unreadable ({reason})"),
            DatasetStatus::Malformed(reason) => format!("file malformed ({reason})"),
            DatasetStatus::NoPlayerNames => format!("no '{PLAYER_NAME_COLUMN}' column"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonSummary {
    pub rows: usize,
    pub mean_abs_error: f64,
    pub mean_abs_pct_error: f64,
    /// Share of rows predicted within 20% of the actual value.
    pub within_20_pct: f64,
}

/// Predictions computed offline for known players. Read-only once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct PrecomputedDataset {
    rows: Vec<PrecomputedRow>,
    status: DatasetStatus,
}

impl Default for PrecomputedDataset {
    fn default() -> Self {
        Self::unavailable(DatasetStatus::Missing)
    }
}

impl PrecomputedDataset {
    pub fn from_rows(rows: Vec<PrecomputedRow>) -> Self {
        Self {
            rows,
            status: DatasetStatus::Loaded,
        }
    }

    pub fn unavailable(status: DatasetStatus) -> Self {
        Self {
            rows: Vec::new(),
            status,
        }
    }

    /// Never fails: any read problem yields an empty dataset whose status says why.
    pub fn load(path: &Path) -> Self {
        let dataset = match File::open(path) {
            Ok(file) => Self::from_reader(file),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Self::unavailable(DatasetStatus::Missing)
            }
            Err(err) => Self::unavailable(DatasetStatus::Unreadable(err.to_string())),
        };
        match &dataset.status {
            DatasetStatus::Loaded => info!(
                rows = dataset.rows.len(),
                "loaded player predictions from {}",
                path.display()
            ),
            status => warn!(
                "player predictions at {} unavailable: {}",
                path.display(),
                status.describe()
            ),
        }
        dataset
    }

    pub fn from_reader<R: Read>(rdr: R) -> Self {
        let mut reader = csv::Reader::from_reader(rdr);
        let headers = match reader.headers() {
            Ok(headers) => headers.clone(),
            Err(err) => return Self::unavailable(DatasetStatus::Malformed(err.to_string())),
        };
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim_start_matches('\u{feff}') == name)
        };
        let Some(name_idx) = find(PLAYER_NAME_COLUMN) else {
            return Self::unavailable(DatasetStatus::NoPlayerNames);
        };
        let (Some(actual_idx), Some(predicted_idx)) =
            (find(ACTUAL_VALUE_COLUMN), find(PREDICTED_VALUE_COLUMN))
        else {
            return Self::unavailable(DatasetStatus::Malformed(format!(
                "expected '{ACTUAL_VALUE_COLUMN}' and '{PREDICTED_VALUE_COLUMN}' columns"
            )));
        };

        let mut rows = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    return Self::unavailable(DatasetStatus::Malformed(format!(
                        "row {}: {err}",
                        line + 1
                    )));
                }
            };
            rows.push(PrecomputedRow {
                player_name: record.get(name_idx).unwrap_or_default().to_string(),
                actual_value: parse_number(record.get(actual_idx)),
                predicted_value: parse_number(record.get(predicted_idx)),
            });
        }
        Self::from_rows(rows)
    }

    pub fn rows(&self) -> &[PrecomputedRow] {
        &self.rows
    }

    pub fn status(&self) -> &DatasetStatus {
        &self.status
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_available(&self) -> bool {
        self.status == DatasetStatus::Loaded && !self.rows.is_empty()
    }

    fn ensure_available(&self) -> Result<(), ValueError> {
        if self.is_available() {
            return Ok(());
        }
        let reason = match self.status {
            DatasetStatus::Loaded => "dataset has no rows".to_string(),
            ref status => status.describe(),
        };
        Err(ValueError::ArtifactUnavailable {
            artifact: ARTIFACT,
            reason,
        })
    }

    /// Case-insensitive substring search on player names, in dataset order.
    ///
    /// A blank query returns no rows rather than the whole dataset.
    pub fn search(&self, query: &str) -> Result<Vec<&PrecomputedRow>, ValueError> {
        self.ensure_available()?;
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .rows
            .iter()
            .filter(|row| row.player_name.to_lowercase().contains(&needle))
            .collect())
    }

    pub fn comparison(&self) -> Result<ComparisonSummary, ValueError> {
        self.ensure_available()?;
        Ok(compare_rows(self.rows.iter()))
    }
}

pub fn search<'a>(
    dataset: &'a PrecomputedDataset,
    query: &str,
) -> Result<Vec<&'a PrecomputedRow>, ValueError> {
    dataset.search(query)
}

/// Error metrics over rows where both values are present.
pub fn compare_rows<'a, I>(rows: I) -> ComparisonSummary
where
    I: IntoIterator<Item = &'a PrecomputedRow>,
{
    let mut n = 0usize;
    let mut abs_err_sum = 0.0;
    let mut pct_n = 0usize;
    let mut pct_sum = 0.0;
    let mut within = 0usize;

    for row in rows {
        let (Some(actual), Some(predicted)) = (row.actual_value, row.predicted_value) else {
            continue;
        };
        n += 1;
        let abs_err = (predicted - actual).abs();
        abs_err_sum += abs_err;
        if actual > 0.0 {
            let pct = abs_err / actual;
            pct_n += 1;
            pct_sum += pct;
            if pct <= 0.20 {
                within += 1;
            }
        }
    }

    ComparisonSummary {
        rows: n,
        mean_abs_error: if n == 0 { 0.0 } else { abs_err_sum / n as f64 },
        mean_abs_pct_error: if pct_n == 0 { 0.0 } else { pct_sum / pct_n as f64 },
        within_20_pct: if pct_n == 0 { 0.0 } else { within as f64 / pct_n as f64 },
    }
}

fn parse_number(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, actual: Option<f64>, predicted: Option<f64>) -> PrecomputedRow {
        PrecomputedRow {
            player_name: name.to_string(),
            actual_value: actual,
            predicted_value: predicted,
        }
    }

    #[test]
    fn comparison_skips_incomplete_rows() {
        let summary = compare_rows(&[
            row("a", Some(100.0), Some(110.0)),
            row("b", Some(100.0), Some(150.0)),
            row("c", None, Some(1.0)),
        ]);
        assert_eq!(summary.rows, 2);
        assert!((summary.mean_abs_error - 30.0).abs() < 1e-9);
        assert!((summary.mean_abs_pct_error - 0.30).abs() < 1e-9);
        assert!((summary.within_20_pct - 0.5).abs() < 1e-9);
    }

    #[test]
    fn loaded_but_empty_is_unavailable() {
        let ds = PrecomputedDataset::from_rows(Vec::new());
        assert!(matches!(
            ds.search("a"),
            Err(ValueError::ArtifactUnavailable { .. })
        ));
    }

    #[test]
    fn non_numeric_values_become_none() {
        let raw = "player_name,actual_value,predicted_value\nX,n/a,12.5\n";
        let ds = PrecomputedDataset::from_reader(raw.as_bytes());
        assert_eq!(ds.rows()[0].actual_value, None);
        assert_eq!(ds.rows()[0].predicted_value, Some(12.5));
    }
}
