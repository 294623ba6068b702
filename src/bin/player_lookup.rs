use std::path::PathBuf;

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

use player_value_terminal::config::AppConfig;
use player_value_terminal::lookup::{self, PrecomputedDataset};
use player_value_terminal::valuation::{format_compact, format_currency};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = AppConfig::from_env();
    let query = parse_query_arg().ok_or_else(|| anyhow!("usage: player_lookup <query> [--data PATH]"))?;
    let data_path = parse_data_arg().unwrap_or(config.predictions_path);

    let dataset = PrecomputedDataset::load(&data_path);
    let rows = lookup::search(&dataset, &query)?;
    if rows.is_empty() {
        println!("No player found for '{}'", query.trim());
        return Ok(());
    }

    println!("{:<32} {:>16} {:>16}", "player", "actual", "predicted");
    for row in rows {
        println!(
            "{:<32} {:>16} {:>16}",
            row.player_name,
            row.actual_value.map(format_currency).unwrap_or_else(|| "-".to_string()),
            row.predicted_value.map(format_currency).unwrap_or_else(|| "-".to_string()),
        );
    }
    if let Ok(summary) = dataset.comparison() {
        println!(
            "model over {} players: MAE {} | MAPE {:.1}% | within 20%: {:.1}%",
            summary.rows,
            format_compact(summary.mean_abs_error),
            summary.mean_abs_pct_error * 100.0,
            summary.within_20_pct * 100.0
        );
    }
    Ok(())
}

fn parse_query_arg() -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut words = Vec::new();
    let mut skip_next = false;
    for arg in &args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg == "--data" {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") {
            continue;
        }
        words.push(arg.as_str());
    }
    let query = words.join(" ");
    (!query.trim().is_empty()).then_some(query)
}

fn parse_data_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix("--data=")
            && !v.trim().is_empty()
        {
            return Some(PathBuf::from(v.trim()));
        }
        if arg == "--data"
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}
