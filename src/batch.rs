use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::Local;
use rayon::prelude::*;
use rust_xlsxwriter::Workbook;
use tracing::info;

use crate::error::{MissingColumns, ValueError};
use crate::model::ValueModel;
use crate::schema;
use crate::valuation::log_to_value;

pub const PREDICTED_LOG_COLUMN: &str = "predicted_log";
pub const PREDICTED_VALUE_COLUMN: &str = "predicted_value";
pub const NAME_COLUMN: &str = "name";
pub const DOWNLOAD_FILE_NAME: &str = "predicted_players.csv";
pub const XLSX_FILE_NAME: &str = "predicted_players.xlsx";
pub const DEFAULT_CHUNK_ROWS: usize = 256;

/// Uploaded tabular data, kept as text cells so every original value
/// round-trips unchanged into the download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchDataset {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl BatchDataset {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn from_reader<R: Read>(rdr: R) -> Result<Self, ValueError> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(rdr);
        let mut headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if let Some(first) = headers.first_mut()
            && first.starts_with('\u{feff}')
        {
            *first = first.trim_start_matches('\u{feff}').to_string();
        }
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { headers, rows })
    }

    pub fn from_path(path: &Path) -> Result<Self, ValueError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    /// Overwrites an existing column or appends a new one.
    fn set_column(&mut self, name: &str, values: Vec<String>) {
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    if row.len() <= idx {
                        row.resize(idx + 1, String::new());
                    }
                    row[idx] = value;
                }
            }
            None => {
                let width = self.headers.len();
                self.headers.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.resize(width, String::new());
                    row.push(value);
                }
            }
        }
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, ValueError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|err| ValueError::Io(err.into_error()))
    }
}

/// Numeric projection of a dataset onto the model's input columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// Validates the schema, then parses every required cell before any model call.
pub fn extract_features(
    dataset: &BatchDataset,
    required_columns: &[String],
) -> Result<FeatureMatrix, ValueError> {
    schema::validate(dataset.headers(), required_columns)?;

    let indices = required_columns
        .iter()
        .map(|col| {
            dataset.column_index(col).ok_or_else(|| MissingColumns {
                missing: BTreeSet::from([col.clone()]),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(dataset.len());
    for (row_idx, row) in dataset.rows().iter().enumerate() {
        let mut values = Vec::with_capacity(indices.len());
        for (col_idx, &idx) in indices.iter().enumerate() {
            let raw = row.get(idx).map(String::as_str).unwrap_or("");
            let Some(value) = parse_cell(raw) else {
                return Err(ValueError::InvalidCell {
                    row: row_idx + 1,
                    column: required_columns[col_idx].clone(),
                    value: raw.to_string(),
                });
            };
            values.push(value);
        }
        rows.push(values);
    }

    Ok(FeatureMatrix {
        columns: required_columns.to_vec(),
        rows,
    })
}

fn parse_cell(raw: &str) -> Option<f64> {
    let cell = raw.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    if cell.eq_ignore_ascii_case("true") {
        return Some(1.0);
    }
    if cell.eq_ignore_ascii_case("false") {
        return Some(0.0);
    }
    cell.parse::<f64>().ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableView {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub rows: usize,
    pub total_value: f64,
    pub mean_value: f64,
    pub max_value: f64,
    pub top_label: Option<String>,
}

/// A scored dataset: the input plus `predicted_log` and `predicted_value`.
#[derive(Debug, Clone)]
pub struct BatchPrediction {
    dataset: BatchDataset,
    feature_columns: Vec<String>,
    predicted_log: Vec<f64>,
    predicted_value: Vec<f64>,
    created_at: String,
}

impl BatchPrediction {
    pub fn dataset(&self) -> &BatchDataset {
        &self.dataset
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn predicted_logs(&self) -> &[f64] {
        &self.predicted_log
    }

    pub fn predicted_values(&self) -> &[f64] {
        &self.predicted_value
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    /// Name, model inputs and value when a `name` column exists; everything otherwise.
    pub fn display_table(&self) -> TableView {
        let ds = &self.dataset;
        let Some(name_idx) = ds.column_index(NAME_COLUMN) else {
            return TableView {
                headers: ds.headers().to_vec(),
                rows: ds.rows().to_vec(),
            };
        };

        let mut indices = vec![name_idx];
        indices.extend(
            self.feature_columns
                .iter()
                .filter_map(|col| ds.column_index(col)),
        );
        indices.extend(ds.column_index(PREDICTED_VALUE_COLUMN));

        TableView {
            headers: indices.iter().map(|&i| ds.headers()[i].clone()).collect(),
            rows: ds
                .rows()
                .iter()
                .map(|row| {
                    indices
                        .iter()
                        .map(|&i| row.get(i).cloned().unwrap_or_default())
                        .collect()
                })
                .collect(),
        }
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, ValueError> {
        self.dataset.to_csv_bytes()
    }

    /// Writes `predicted_players.csv` into `dir` and returns its path.
    pub fn save_csv(&self, dir: &Path) -> Result<PathBuf, ValueError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(DOWNLOAD_FILE_NAME);
        let tmp = path.with_extension("csv.tmp");
        fs::write(&tmp, self.to_csv_bytes()?)?;
        fs::rename(&tmp, &path)?;
        info!(rows = self.dataset.len(), "saved predictions to {}", path.display());
        Ok(path)
    }

    pub fn export_xlsx(&self, path: &Path) -> Result<(), ValueError> {
        let export_err = |err: rust_xlsxwriter::XlsxError| ValueError::Export(err.to_string());

        let mut workbook = Workbook::new();
        {
            let sheet = workbook.add_worksheet();
            sheet.set_name("Predictions").map_err(export_err)?;
            for (col_idx, header) in self.dataset.headers().iter().enumerate() {
                sheet
                    .write_string(0, col_idx as u16, header)
                    .map_err(export_err)?;
            }
            for (row_idx, row) in self.dataset.rows().iter().enumerate() {
                let xlsx_row = (row_idx + 1) as u32;
                for (col_idx, cell) in row.iter().enumerate() {
                    let written = match cell.trim().parse::<f64>() {
                        Ok(number) if number.is_finite() => {
                            sheet.write_number(xlsx_row, col_idx as u16, number)
                        }
                        _ => sheet.write_string(xlsx_row, col_idx as u16, cell),
                    };
                    written.map_err(export_err)?;
                }
            }
        }
        workbook.save(path).map_err(export_err)?;
        info!(rows = self.dataset.len(), "exported predictions to {}", path.display());
        Ok(())
    }

    pub fn summary(&self) -> BatchSummary {
        let rows = self.predicted_value.len();
        let total_value: f64 = self.predicted_value.iter().sum();
        let top = self
            .predicted_value
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let names = self.dataset.column(NAME_COLUMN);
        let top_label = top.map(|(idx, _)| {
            names
                .as_ref()
                .and_then(|n| n.get(idx))
                .filter(|n| !n.trim().is_empty())
                .map(|n| n.to_string())
                .unwrap_or_else(|| format!("row {}", idx + 1))
        });
        BatchSummary {
            rows,
            total_value,
            mean_value: if rows == 0 { 0.0 } else { total_value / rows as f64 },
            max_value: top.map(|(_, v)| v).unwrap_or(0.0),
            top_label,
        }
    }
}

pub fn predict_batch(
    dataset: &BatchDataset,
    model: &dyn ValueModel,
) -> Result<BatchPrediction, ValueError> {
    predict_batch_chunked(dataset, model, DEFAULT_CHUNK_ROWS)
}

/// Scores `chunk_rows`-sized slices on the rayon pool; output keeps input order.
pub fn predict_batch_chunked(
    dataset: &BatchDataset,
    model: &dyn ValueModel,
    chunk_rows: usize,
) -> Result<BatchPrediction, ValueError> {
    let required = model.feature_names().to_vec();
    let matrix = extract_features(dataset, &required)?;

    let chunks = matrix
        .rows
        .par_chunks(chunk_rows.max(1))
        .map(|rows| model.predict(rows))
        .collect::<Result<Vec<_>, _>>()?;
    let predicted_log: Vec<f64> = chunks.into_iter().flatten().collect();
    if predicted_log.len() != dataset.len() {
        return Err(ValueError::ModelInference(format!(
            "model returned {} predictions for {} rows",
            predicted_log.len(),
            dataset.len()
        )));
    }
    let predicted_value = predicted_log
        .iter()
        .map(|log| log_to_value(*log))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = dataset.clone();
    out.set_column(
        PREDICTED_LOG_COLUMN,
        predicted_log.iter().map(|v| v.to_string()).collect(),
    );
    out.set_column(
        PREDICTED_VALUE_COLUMN,
        predicted_value.iter().map(|v| v.to_string()).collect(),
    );

    info!(rows = out.len(), "scored batch");
    Ok(BatchPrediction {
        dataset: out,
        feature_columns: required,
        predicted_log,
        predicted_value,
        created_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cell_handles_pandas_output() {
        assert_eq!(parse_cell(" 42 "), Some(42.0));
        assert_eq!(parse_cell("True"), Some(1.0));
        assert_eq!(parse_cell("false"), Some(0.0));
        assert!(parse_cell("").is_some_and(f64::is_nan));
        assert!(parse_cell("NaN").is_some_and(f64::is_nan));
        assert_eq!(parse_cell("tall"), None);
    }

    #[test]
    fn set_column_replaces_existing_values() {
        let mut ds = BatchDataset::new(
            vec!["a".into(), "predicted_log".into()],
            vec![vec!["1".into(), "old".into()]],
        );
        ds.set_column("predicted_log", vec!["new".into()]);
        assert_eq!(ds.headers().len(), 2);
        assert_eq!(ds.rows()[0][1], "new");

        ds.set_column("b", vec!["x".into()]);
        assert_eq!(ds.headers(), ["a", "predicted_log", "b"]);
        assert_eq!(ds.rows()[0], vec!["1", "new", "x"]);
    }

    #[test]
    fn reader_strips_byte_order_mark() {
        let raw = "\u{feff}name,overall\nA,70\n";
        let ds = BatchDataset::from_reader(raw.as_bytes()).unwrap();
        assert_eq!(ds.headers(), ["name", "overall"]);
        assert_eq!(ds.len(), 1);
    }
}
