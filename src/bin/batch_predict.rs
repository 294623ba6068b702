use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use tracing_subscriber::EnvFilter;

use player_value_terminal::batch::{self, BatchDataset};
use player_value_terminal::config::AppConfig;
use player_value_terminal::model;
use player_value_terminal::valuation::{format_compact, format_currency};

const VALUE_FLAGS: [&str; 3] = ["--model", "--out", "--xlsx"];

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = AppConfig::from_env();
    let input = parse_input_arg()
        .ok_or_else(|| anyhow!("usage: batch_predict <input.csv> [--model PATH] [--out DIR] [--xlsx PATH]"))?;
    let model_path = parse_path_arg("--model").unwrap_or(config.model_path.clone());
    let out_dir = parse_path_arg("--out").unwrap_or(config.output_dir.clone());

    let model = model::shared_model(&model_path)?;
    let dataset = BatchDataset::from_path(&input)
        .with_context(|| format!("read batch {}", input.display()))?;
    let prediction = batch::predict_batch_chunked(&dataset, &*model, config.batch_chunk_rows)
        .with_context(|| format!("predict batch {}", input.display()))?;

    let saved = prediction.save_csv(&out_dir)?;
    if let Some(xlsx) = parse_path_arg("--xlsx") {
        prediction.export_xlsx(&xlsx)?;
        println!("xlsx: {}", xlsx.display());
    }

    let summary = prediction.summary();
    println!("rows: {}", summary.rows);
    println!("total: {}", format_currency(summary.total_value));
    println!("mean: {}", format_compact(summary.mean_value));
    if let Some(top) = &summary.top_label {
        println!("top: {top} ({})", format_currency(summary.max_value));
    }
    println!("csv: {}", saved.display());
    Ok(())
}

fn parse_input_arg() -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let mut skip_next = false;
    for arg in &args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if arg.starts_with("--") || arg.trim().is_empty() {
            continue;
        }
        return Some(PathBuf::from(arg));
    }
    None
}

fn parse_path_arg(name: &str) -> Option<PathBuf> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    for (idx, arg) in args.iter().enumerate() {
        if let Some(v) = arg.strip_prefix(&format!("{name}="))
            && !v.trim().is_empty()
        {
            return Some(PathBuf::from(v.trim()));
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(PathBuf::from(next));
        }
    }
    None
}
