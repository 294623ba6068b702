use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::batch::{self, BatchDataset, BatchPrediction};
use crate::config::AppConfig;
use crate::error::ValueError;
use crate::features::{ATTRIBUTE_SPECS, PlayerAttributes, Position, build_feature_record};
use crate::lookup::{ComparisonSummary, PrecomputedDataset, PrecomputedRow};
use crate::model::{ValueModel, predict_one};
use crate::report::EdaReport;
use crate::valuation::{PredictionResult, format_currency};

const MAX_LOGS: usize = 200;

/// Index of the position selector in the manual form; attributes come first.
pub const POSITION_FIELD: usize = ATTRIBUTE_SPECS.len();
pub const FORM_FIELDS: usize = POSITION_FIELD + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Manual,
    Batch,
    Eda,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Manual, Tab::Batch, Tab::Eda];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Manual => "Manual Input",
            Tab::Batch => "Batch Prediction",
            Tab::Eda => "EDA Report",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Tab::Manual => 0,
            Tab::Batch => 1,
            Tab::Eda => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
    BatchPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualForm {
    pub values: [u32; 9],
    pub position: usize,
    pub selected: usize,
}

impl Default for ManualForm {
    fn default() -> Self {
        Self {
            values: ATTRIBUTE_SPECS.map(|spec| spec.default),
            position: 0,
            selected: 0,
        }
    }
}

impl ManualForm {
    pub fn select_next(&mut self) {
        self.selected = (self.selected + 1) % FORM_FIELDS;
    }

    pub fn select_prev(&mut self) {
        self.selected = (self.selected + FORM_FIELDS - 1) % FORM_FIELDS;
    }

    /// Moves the selected control by `steps` increments, clamped to its range.
    pub fn adjust(&mut self, steps: i64) {
        if self.selected == POSITION_FIELD {
            let n = Position::ALL.len() as i64;
            self.position = (self.position as i64 + steps).rem_euclid(n) as usize;
            return;
        }
        let spec = ATTRIBUTE_SPECS[self.selected];
        let current = self.values[self.selected] as i64;
        let next = (current + steps * spec.step as i64).clamp(0, u32::MAX as i64);
        self.values[self.selected] = spec.clamp(next as u32);
    }

    pub fn attributes(&self) -> PlayerAttributes {
        PlayerAttributes::from_values(self.values)
    }

    pub fn position(&self) -> Position {
        Position::ALL[self.position % Position::ALL.len()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Idle,
    Unavailable(String),
    NoMatches,
    Found(Vec<PrecomputedRow>),
}

#[derive(Debug, Clone, Default)]
pub struct BatchTab {
    pub path_input: String,
    pub prediction: Option<BatchPrediction>,
    pub error: Option<String>,
    pub saved_to: Option<PathBuf>,
    pub scroll: usize,
}

pub struct AppState {
    pub tab: Tab,
    pub input_mode: InputMode,
    pub form: ManualForm,
    pub manual_result: Option<Result<PredictionResult, String>>,
    pub batch: BatchTab,
    pub search_query: String,
    pub search: SearchOutcome,
    pub precomputed: PrecomputedDataset,
    pub comparison: Option<ComparisonSummary>,
    pub report: Result<EdaReport, String>,
    pub eda_scroll: u16,
    pub logs: VecDeque<String>,
    pub help_overlay: bool,
    model: Arc<dyn ValueModel>,
    output_dir: PathBuf,
    batch_chunk_rows: usize,
}

impl AppState {
    pub fn new(
        model: Arc<dyn ValueModel>,
        precomputed: PrecomputedDataset,
        report: Result<EdaReport, ValueError>,
        config: &AppConfig,
    ) -> Self {
        let comparison = precomputed.comparison().ok();
        Self {
            tab: Tab::Manual,
            input_mode: InputMode::Normal,
            form: ManualForm::default(),
            manual_result: None,
            batch: BatchTab::default(),
            search_query: String::new(),
            search: SearchOutcome::Idle,
            precomputed,
            comparison,
            report: report.map_err(|err| err.to_string()),
            eda_scroll: 0,
            logs: VecDeque::with_capacity(MAX_LOGS),
            help_overlay: false,
            model,
            output_dir: config.output_dir.clone(),
            batch_chunk_rows: config.batch_chunk_rows,
        }
    }

    pub fn model(&self) -> &dyn ValueModel {
        self.model.as_ref()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn push_log(&mut self, msg: impl Into<String>) {
        self.logs.push_back(msg.into());
        while self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
    }

    pub fn next_tab(&mut self) {
        self.tab = Tab::ALL[(self.tab.index() + 1) % Tab::ALL.len()];
    }

    pub fn prev_tab(&mut self) {
        self.tab = Tab::ALL[(self.tab.index() + Tab::ALL.len() - 1) % Tab::ALL.len()];
    }

    pub fn search_available(&self) -> bool {
        self.precomputed.is_available()
    }

    pub fn predict_manual(&mut self) {
        let position = self.form.position();
        let outcome = build_feature_record(&self.form.attributes(), position.code())
            .and_then(|record| predict_one(self.model.as_ref(), &record));
        match &outcome {
            Ok(result) => self.push_log(format!(
                "[INFO] Estimate for {position}: {}",
                format_currency(result.predicted_value)
            )),
            Err(err) => self.push_log(format!("[WARN] Manual prediction failed: {err}")),
        }
        self.manual_result = Some(outcome.map_err(|err| err.to_string()));
    }

    pub fn run_search(&mut self) {
        self.search = match self.precomputed.search(&self.search_query) {
            Err(err) => SearchOutcome::Unavailable(err.to_string()),
            Ok(_) if self.search_query.trim().is_empty() => SearchOutcome::Idle,
            Ok(rows) if rows.is_empty() => SearchOutcome::NoMatches,
            Ok(rows) => SearchOutcome::Found(rows.into_iter().cloned().collect()),
        };
        match &self.search {
            SearchOutcome::Found(rows) => {
                let msg = format!("[INFO] Found {} matching player(s)", rows.len());
                self.push_log(msg);
            }
            SearchOutcome::NoMatches => {
                let msg = format!("[INFO] No player found for '{}'", self.search_query.trim());
                self.push_log(msg);
            }
            SearchOutcome::Unavailable(reason) => {
                let msg = format!("[WARN] Search unavailable: {reason}");
                self.push_log(msg);
            }
            SearchOutcome::Idle => {}
        }
    }

    /// Reads the CSV at `batch.path_input` and scores it; failures leave no partial output.
    pub fn load_batch(&mut self) {
        let raw_path = self.batch.path_input.trim().to_string();
        if raw_path.is_empty() {
            self.batch.error = Some("Enter a CSV path first".to_string());
            return;
        }
        let path = PathBuf::from(&raw_path);
        let outcome = BatchDataset::from_path(&path).and_then(|dataset| {
            batch::predict_batch_chunked(&dataset, self.model.as_ref(), self.batch_chunk_rows)
        });
        self.batch.scroll = 0;
        self.batch.saved_to = None;
        match outcome {
            Ok(prediction) => {
                self.batch.prediction = Some(prediction);
                self.batch.error = None;
            }
            Err(err) => {
                let msg = match &err {
                    ValueError::MissingColumns(_) => format!(
                        "CSV missing required model input columns. Please include all trained features. ({err})"
                    ),
                    _ => err.to_string(),
                };
                self.push_log(format!("[WARN] Batch {raw_path} rejected: {err}"));
                self.batch.prediction = None;
                self.batch.error = Some(msg);
            }
        }
    }

    pub fn save_batch_csv(&mut self) {
        let Some(prediction) = &self.batch.prediction else {
            self.push_log("[INFO] No batch predictions to save");
            return;
        };
        match prediction.save_csv(&self.output_dir) {
            Ok(path) => self.batch.saved_to = Some(path),
            Err(err) => self.push_log(format!("[WARN] Save failed: {err}")),
        }
    }

    pub fn export_batch_xlsx(&mut self) {
        let Some(prediction) = &self.batch.prediction else {
            self.push_log("[INFO] No batch predictions to export");
            return;
        };
        let path = self.output_dir.join(batch::XLSX_FILE_NAME);
        let outcome = std::fs::create_dir_all(&self.output_dir)
            .map_err(ValueError::from)
            .and_then(|_| prediction.export_xlsx(&path));
        match outcome {
            Ok(()) => self.batch.saved_to = Some(path),
            Err(err) => self.push_log(format!("[WARN] Export failed: {err}")),
        }
    }

    pub fn scroll_down(&mut self) {
        match self.tab {
            Tab::Manual => self.form.select_next(),
            Tab::Batch => {
                let rows = self
                    .batch
                    .prediction
                    .as_ref()
                    .map(|p| p.dataset().len())
                    .unwrap_or(0);
                if self.batch.scroll + 1 < rows {
                    self.batch.scroll += 1;
                }
            }
            Tab::Eda => {
                let lines = self.report.as_ref().map(|r| r.lines.len()).unwrap_or(0);
                if (self.eda_scroll as usize) + 1 < lines {
                    self.eda_scroll = self.eda_scroll.saturating_add(1);
                }
            }
        }
    }

    pub fn scroll_up(&mut self) {
        match self.tab {
            Tab::Manual => self.form.select_prev(),
            Tab::Batch => self.batch.scroll = self.batch.scroll.saturating_sub(1),
            Tab::Eda => self.eda_scroll = self.eda_scroll.saturating_sub(1),
        }
    }
}
