use std::path::PathBuf;
use std::sync::Arc;

use player_value_terminal::ValueError;
use player_value_terminal::batch::XLSX_FILE_NAME;
use player_value_terminal::config::AppConfig;
use player_value_terminal::features::{ATTRIBUTE_SPECS, Position, feature_schema};
use player_value_terminal::lookup::{DatasetStatus, PrecomputedDataset};
use player_value_terminal::model::ValueModel;
use player_value_terminal::report::EdaReport;
use player_value_terminal::state::{AppState, FORM_FIELDS, POSITION_FIELD, SearchOutcome, Tab};

struct FixedModel {
    names: Vec<String>,
}

impl ValueModel for FixedModel {
    fn feature_names(&self) -> &[String] {
        &self.names
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>, ValueError> {
        Ok(vec![10.0; rows.len()])
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn state_with(precomputed: PrecomputedDataset) -> AppState {
    state_in(precomputed, "pvt_state")
}

fn state_in(precomputed: PrecomputedDataset, dir: &str) -> AppState {
    let config = AppConfig {
        output_dir: std::env::temp_dir().join(format!("{dir}_{}", std::process::id())),
        ..AppConfig::default()
    };
    let report = EdaReport::load(&fixture("eda_report.html"));
    AppState::new(
        Arc::new(FixedModel {
            names: feature_schema(),
        }),
        precomputed,
        report,
        &config,
    )
}

fn state() -> AppState {
    state_with(PrecomputedDataset::load(&fixture("player_predictions.csv")))
}

#[test]
fn form_starts_at_defaults() {
    let state = state();
    assert_eq!(state.form.values, ATTRIBUTE_SPECS.map(|s| s.default));
    assert_eq!(state.form.position(), Position::CB);
    assert_eq!(state.tab, Tab::Manual);
    assert!(state.comparison.is_some());
}

#[test]
fn adjust_clamps_to_attribute_range() {
    let mut state = state();
    state.form.selected = 0;
    state.form.adjust(100);
    assert_eq!(state.form.values[0], 99);
    state.form.adjust(-200);
    assert_eq!(state.form.values[0], 40);

    state.form.selected = 2;
    state.form.adjust(3);
    assert_eq!(state.form.values[2], 15_000);
}

#[test]
fn position_selector_wraps() {
    let mut state = state();
    state.form.selected = POSITION_FIELD;
    state.form.adjust(-1);
    assert_eq!(state.form.position(), Position::ST);
    state.form.adjust(1);
    assert_eq!(state.form.position(), Position::CB);
}

#[test]
fn field_selection_cycles() {
    let mut state = state();
    for _ in 0..FORM_FIELDS {
        state.scroll_down();
    }
    assert_eq!(state.form.selected, 0);
    state.scroll_up();
    assert_eq!(state.form.selected, POSITION_FIELD);
}

#[test]
fn manual_prediction_shows_currency_value() {
    let mut state = state();
    state.form.position = Position::ALL.len() - 1;
    state.predict_manual();
    let result = state.manual_result.clone().unwrap().unwrap();
    assert!((result.predicted_value - 22_025.465_794_806_718).abs() < 1e-6);
    assert!(state.logs.back().unwrap().contains("€22,025"));
}

#[test]
fn search_outcomes() {
    let mut state = state();
    state.search_query = "Messi".to_string();
    state.run_search();
    match &state.search {
        SearchOutcome::Found(rows) => assert_eq!(rows[0].player_name, "Lionel Messi"),
        other => panic!("unexpected outcome {other:?}"),
    }

    state.search_query = "nobody".to_string();
    state.run_search();
    assert_eq!(state.search, SearchOutcome::NoMatches);

    state.search_query = "  ".to_string();
    state.run_search();
    assert_eq!(state.search, SearchOutcome::Idle);
}

#[test]
fn search_reports_unavailable_dataset() {
    let mut state = state_with(PrecomputedDataset::unavailable(DatasetStatus::Missing));
    assert!(!state.search_available());
    assert!(state.comparison.is_none());
    state.search_query = "messi".to_string();
    state.run_search();
    assert!(matches!(state.search, SearchOutcome::Unavailable(_)));
    assert!(state.logs.back().unwrap().starts_with("[WARN]"));
}

#[test]
fn batch_with_missing_columns_shows_error() {
    let mut state = state();
    state.batch.path_input = fixture("batch_missing_columns.csv").display().to_string();
    state.load_batch();
    assert!(state.batch.prediction.is_none());
    let msg = state.batch.error.clone().unwrap();
    assert!(msg.contains("missing required"));
    assert!(msg.contains("age"));
    assert!(msg.contains("position_ST"));
}

#[test]
fn batch_load_and_save() {
    let mut state = state();
    state.batch.path_input = fixture("batch_players.csv").display().to_string();
    state.load_batch();
    assert!(state.batch.error.is_none());
    assert_eq!(state.batch.prediction.as_ref().unwrap().dataset().len(), 3);

    state.tab = Tab::Batch;
    state.scroll_down();
    state.scroll_down();
    state.scroll_down();
    assert_eq!(state.batch.scroll, 2);

    state.save_batch_csv();
    let saved = state.batch.saved_to.clone().unwrap();
    assert!(saved.ends_with("predicted_players.csv"));
    assert!(saved.exists());
    let _ = std::fs::remove_dir_all(state.output_dir());
}

#[test]
fn batch_export_writes_workbook_to_output_dir() {
    let mut state = state_in(
        PrecomputedDataset::load(&fixture("player_predictions.csv")),
        "pvt_state_xlsx",
    );
    state.export_batch_xlsx();
    assert!(state.batch.saved_to.is_none());

    state.batch.path_input = fixture("batch_players.csv").display().to_string();
    state.load_batch();
    state.export_batch_xlsx();
    let saved = state.batch.saved_to.clone().unwrap();
    assert_eq!(saved, state.output_dir().join(XLSX_FILE_NAME));
    assert!(saved.exists());
    let _ = std::fs::remove_dir_all(state.output_dir());
}

#[test]
fn unreadable_batch_path_is_reported() {
    let mut state = state();
    state.batch.path_input = fixture("no_such_upload.csv").display().to_string();
    state.load_batch();
    assert!(state.batch.prediction.is_none());
    assert!(state.batch.error.is_some());

    state.batch.path_input.clear();
    state.load_batch();
    assert_eq!(state.batch.error.as_deref(), Some("Enter a CSV path first"));
}

#[test]
fn tabs_cycle_both_ways() {
    let mut state = state();
    state.next_tab();
    assert_eq!(state.tab, Tab::Batch);
    state.next_tab();
    state.next_tab();
    assert_eq!(state.tab, Tab::Manual);
    state.prev_tab();
    assert_eq!(state.tab, Tab::Eda);
}

#[test]
fn eda_scroll_stops_at_last_line() {
    let mut state = state();
    state.tab = Tab::Eda;
    let lines = state.report.as_ref().unwrap().lines.len();
    for _ in 0..lines + 10 {
        state.scroll_down();
    }
    assert_eq!(state.eda_scroll as usize, lines - 1);
    state.scroll_up();
    assert_eq!(state.eda_scroll as usize, lines - 2);
}

#[test]
fn console_is_bounded() {
    let mut state = state();
    for i in 0..250 {
        state.push_log(format!("[INFO] line {i}"));
    }
    assert_eq!(state.logs.len(), 200);
    assert_eq!(state.logs.front().map(String::as_str), Some("[INFO] line 50"));
}
