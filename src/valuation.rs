use crate::error::ValueError;

/// Model output in log space alongside its currency value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionResult {
    pub predicted_log: f64,
    pub predicted_value: f64,
}

impl PredictionResult {
    pub fn from_log(predicted_log: f64) -> Result<Self, ValueError> {
        Ok(Self {
            predicted_log,
            predicted_value: log_to_value(predicted_log)?,
        })
    }
}

/// Inverse of the `ln(1 + value)` training target.
pub fn log_to_value(log_value: f64) -> Result<f64, ValueError> {
    if log_value.is_nan() {
        return Err(ValueError::ModelInference(
            "model produced a NaN prediction".to_string(),
        ));
    }
    let value = log_value.exp_m1();
    if value.is_infinite() {
        return Err(ValueError::Overflow { log_value });
    }
    Ok(value)
}

/// `€12,345` style, rounded to whole euros.
pub fn format_currency(value: f64) -> String {
    let rounded = value.round();
    let sign = if rounded < 0.0 { "-" } else { "" };
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}€{grouped}")
}

/// Compact form for chart labels: `€1.2M`, `€850K`.
pub fn format_compact(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000.0 {
        format!("€{:.1}M", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("€{:.0}K", value / 1_000.0)
    } else {
        format!("€{value:.0}")
    }
}
