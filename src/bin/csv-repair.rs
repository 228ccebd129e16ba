//! Joins line breaks inside quoted cells and rewrites a CSV with `;` separators.
//!
//! usage: csv-repair <input.csv> [output.csv]

use anyhow::{anyhow, Result};
use std::path::PathBuf;

use companion_probe::csv_repair::rewrite_with_delimiter;

fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("usage: csv-repair <input.csv> [output.csv]"))?;
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_file_name("fixed_data.csv"));

    let stats = rewrite_with_delimiter(&input, &output, b';')?;
    println!(
        "{} -> {}: {} records, {} line breaks joined",
        input.display(),
        output.display(),
        stats.records,
        stats.joined_lines
    );
    Ok(())
}
