use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use player_value_terminal::ValueError;
use player_value_terminal::batch::{
    self, BatchDataset, DOWNLOAD_FILE_NAME, PREDICTED_LOG_COLUMN, PREDICTED_VALUE_COLUMN,
};
use player_value_terminal::features::feature_schema;
use player_value_terminal::model::{GradientBoostedModel, ValueModel};
use player_value_terminal::schema;

/// Returns `overall / 10` so each row's output is traceable to its input.
struct OverallModel {
    names: Vec<String>,
}

impl ValueModel for OverallModel {
    fn feature_names(&self) -> &[String] {
        &self.names
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ValueError> {
        Ok(rows.iter().map(|row| row[0] / 10.0).collect())
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn scratch_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pvt_{tag}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn fixture_model() -> GradientBoostedModel {
    GradientBoostedModel::load(&fixture("value_model.json")).unwrap()
}

#[test]
fn validate_lists_every_missing_column() {
    let err = schema::validate(["overall", "wage"], ["overall", "wage", "age"]).unwrap_err();
    assert_eq!(err.missing, BTreeSet::from(["age".to_string()]));
    assert!(schema::validate(["age", "wage", "overall", "extra"], ["overall", "age"]).is_ok());
    assert!(schema::validate(["Overall"], ["overall"]).is_err());
}

#[test]
fn fixture_batch_scores_hand_computed_values() {
    let dataset = BatchDataset::from_path(&fixture("batch_players.csv")).unwrap();
    let prediction = batch::predict_batch(&dataset, &fixture_model()).unwrap();

    let expected = [12.75, 10.75, 11.25];
    for (got, want) in prediction.predicted_logs().iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "{got} != {want}");
    }
    for (value, log) in prediction
        .predicted_values()
        .iter()
        .zip(prediction.predicted_logs())
    {
        assert!((value - log.exp_m1()).abs() < 1e-6);
    }
}

#[test]
fn batch_keeps_rows_and_original_cells() {
    let dataset = BatchDataset::from_path(&fixture("batch_players.csv")).unwrap();
    let prediction = batch::predict_batch(&dataset, &fixture_model()).unwrap();
    let out = prediction.dataset();

    assert_eq!(out.len(), dataset.len());
    assert_eq!(out.headers().len(), dataset.headers().len() + 2);
    assert_eq!(&out.headers()[..dataset.headers().len()], dataset.headers());
    for (before, after) in dataset.rows().iter().zip(out.rows()) {
        assert_eq!(&after[..before.len()], before.as_slice());
    }
    assert_eq!(out.column("club").unwrap(), vec!["Alpha FC", "Beta United", "Gamma City"]);
}

#[test]
fn missing_columns_abort_before_scoring() {
    let dataset = BatchDataset::from_path(&fixture("batch_missing_columns.csv")).unwrap();
    let err = batch::predict_batch(&dataset, &fixture_model()).unwrap_err();
    match err {
        ValueError::MissingColumns(missing) => assert_eq!(
            missing.missing,
            BTreeSet::from(["age".to_string(), "position_ST".to_string()])
        ),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn repeated_runs_are_identical() {
    let dataset = BatchDataset::from_path(&fixture("batch_players.csv")).unwrap();
    let model = OverallModel {
        names: feature_schema(),
    };
    let first = batch::predict_batch(&dataset, &model).unwrap();
    let second = batch::predict_batch(&dataset, &model).unwrap();
    assert_eq!(
        first.dataset().column(PREDICTED_VALUE_COLUMN),
        second.dataset().column(PREDICTED_VALUE_COLUMN)
    );
}

#[test]
fn chunking_preserves_row_order() {
    let names = feature_schema();
    let headers = names.clone();
    let rows: Vec<Vec<String>> = (0..50)
        .map(|i| {
            let mut row = vec!["0".to_string(); names.len()];
            row[0] = (40 + i).to_string();
            row
        })
        .collect();
    let dataset = BatchDataset::new(headers, rows);
    let model = OverallModel { names };

    let prediction = batch::predict_batch_chunked(&dataset, &model, 7).unwrap();
    let logs = prediction.predicted_logs();
    assert_eq!(logs.len(), 50);
    for (i, log) in logs.iter().enumerate() {
        assert!((log - (40 + i) as f64 / 10.0).abs() < 1e-12);
    }
}

#[test]
fn display_table_restricts_columns_when_named() {
    let dataset = BatchDataset::from_path(&fixture("batch_players.csv")).unwrap();
    let prediction = batch::predict_batch(&dataset, &fixture_model()).unwrap();
    let view = prediction.display_table();

    assert_eq!(view.headers.first().map(String::as_str), Some("name"));
    assert_eq!(view.headers.last().map(String::as_str), Some(PREDICTED_VALUE_COLUMN));
    assert_eq!(view.headers.len(), 1 + 35 + 1);
    assert!(!view.headers.iter().any(|h| h == "club" || h == PREDICTED_LOG_COLUMN));
    assert_eq!(view.rows.len(), 3);
    assert_eq!(view.rows[1][0], "Keeper Two");
}

#[test]
fn display_table_is_full_without_name_column() {
    let names = feature_schema();
    let dataset = BatchDataset::new(
        names.iter().cloned().chain(["club".to_string()]).collect(),
        vec![vec!["70".to_string(); names.len() + 1]],
    );
    let prediction = batch::predict_batch(&dataset, &OverallModel { names }).unwrap();
    let view = prediction.display_table();
    assert_eq!(view.headers, prediction.dataset().headers());
    assert_eq!(view.headers.len(), 35 + 1 + 2);
}

#[test]
fn non_numeric_cell_names_row_and_column() {
    let names = feature_schema();
    let mut second = vec!["1".to_string(); names.len()];
    second[6] = "old".to_string();
    let dataset = BatchDataset::new(
        names.clone(),
        vec![vec!["1".to_string(); names.len()], second],
    );
    let err = batch::predict_batch(&dataset, &OverallModel { names }).unwrap_err();
    match err {
        ValueError::InvalidCell { row, column, value } => {
            assert_eq!(row, 2);
            assert_eq!(column, "age");
            assert_eq!(value, "old");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn rescoring_a_download_replaces_prediction_columns() {
    let dataset = BatchDataset::from_path(&fixture("batch_players.csv")).unwrap();
    let model = fixture_model();
    let first = batch::predict_batch(&dataset, &model).unwrap();

    let bytes = first.to_csv_bytes().unwrap();
    let reloaded = BatchDataset::from_reader(bytes.as_slice()).unwrap();
    let second = batch::predict_batch(&reloaded, &model).unwrap();

    assert_eq!(second.dataset().headers(), first.dataset().headers());
    assert_eq!(second.predicted_logs(), first.predicted_logs());
}

#[test]
fn save_csv_writes_download_file() {
    let dir = scratch_dir("save");
    let dataset = BatchDataset::from_path(&fixture("batch_players.csv")).unwrap();
    let prediction = batch::predict_batch(&dataset, &fixture_model()).unwrap();

    let path = prediction.save_csv(&dir).unwrap();
    assert_eq!(path, dir.join(DOWNLOAD_FILE_NAME));
    let raw = fs::read_to_string(&path).unwrap();
    let header = raw.lines().next().unwrap();
    assert!(header.starts_with("name,club,overall"));
    assert!(header.ends_with("predicted_log,predicted_value"));
    assert_eq!(raw.lines().count(), 4);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn export_xlsx_creates_workbook() {
    let dir = scratch_dir("xlsx");
    fs::create_dir_all(&dir).unwrap();
    let dataset = BatchDataset::from_path(&fixture("batch_players.csv")).unwrap();
    let prediction = batch::predict_batch(&dataset, &fixture_model()).unwrap();

    let path = dir.join("predicted_players.xlsx");
    prediction.export_xlsx(&path).unwrap();
    assert!(fs::metadata(&path).unwrap().len() > 0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn summary_reports_top_player() {
    let dataset = BatchDataset::from_path(&fixture("batch_players.csv")).unwrap();
    let prediction = batch::predict_batch(&dataset, &fixture_model()).unwrap();
    let summary = prediction.summary();
    assert_eq!(summary.rows, 3);
    assert_eq!(summary.top_label.as_deref(), Some("Striker One"));
    assert!((summary.max_value - 12.75f64.exp_m1()).abs() < 1e-6);
    assert!((summary.mean_value * 3.0 - summary.total_value).abs() < 1e-6);
}
