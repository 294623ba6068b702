use std::env;
use std::path::PathBuf;

use crate::batch::DEFAULT_CHUNK_ROWS;

const DEFAULT_MODEL_PATH: &str = "models/xgboost_model.json";
const DEFAULT_PREDICTIONS_PATH: &str = "outputs/PlayerValuePredictions.csv";
const DEFAULT_REPORT_PATH: &str = "notebooks/eda_report.html";
const DEFAULT_OUTPUT_DIR: &str = ".";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub model_path: PathBuf,
    pub predictions_path: PathBuf,
    pub report_path: PathBuf,
    pub output_dir: PathBuf,
    pub batch_chunk_rows: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            predictions_path: PathBuf::from(DEFAULT_PREDICTIONS_PATH),
            report_path: PathBuf::from(DEFAULT_REPORT_PATH),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            batch_chunk_rows: DEFAULT_CHUNK_ROWS,
        }
    }
}

impl AppConfig {
    /// Reads `.env.local`, then `.env`, then the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path_or = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        let batch_chunk_rows = lookup("BATCH_CHUNK_ROWS")
            .and_then(|val| val.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_CHUNK_ROWS)
            .max(1);

        Self {
            model_path: path_or("VALUE_MODEL_PATH", DEFAULT_MODEL_PATH),
            predictions_path: path_or("PRECOMPUTED_PREDICTIONS_PATH", DEFAULT_PREDICTIONS_PATH),
            report_path: path_or("EDA_REPORT_PATH", DEFAULT_REPORT_PATH),
            output_dir: path_or("PREDICTIONS_OUTPUT_DIR", DEFAULT_OUTPUT_DIR),
            batch_chunk_rows,
        }
    }
}
