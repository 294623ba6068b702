use std::collections::BTreeSet;

use thiserror::Error;

/// Every required column that an uploaded dataset does not expose.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required columns: {}", join_names(.missing))]
pub struct MissingColumns {
    pub missing: BTreeSet<String>,
}

#[derive(Debug, Error)]
pub enum ValueError {
    #[error("{field} = {value} is outside [{min}, {max}]")]
    InvalidRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("unknown position code '{0}'")]
    InvalidPosition(String),

    #[error("predicted log value {log_value} overflows the value transform")]
    Overflow { log_value: f64 },

    #[error(transparent)]
    MissingColumns(#[from] MissingColumns),

    #[error("row {row}, column '{column}': '{value}' is not a number")]
    InvalidCell {
        row: usize,
        column: String,
        value: String,
    },

    #[error("model inference failed: {0}")]
    ModelInference(String),

    #[error("{artifact} unavailable: {reason}")]
    ArtifactUnavailable {
        artifact: &'static str,
        reason: String,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("export failed: {0}")]
    Export(String),
}

fn join_names(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
