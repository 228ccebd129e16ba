//! Farewell statistics across minimum-message thresholds.
//!
//! usage: farewell-report <conversations.json|transcripts.csv> [summary.csv] [--max-threshold N]

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;

use companion_probe::core::config::load_probe_config;
use companion_probe::farewell_analysis::{
    analyze_threshold, analyze_thresholds, load_conversations, write_summary_csv,
};

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut positional: Vec<String> = Vec::new();
    let mut max_threshold = 100usize;
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--max-threshold" {
            let v = args.next().ok_or_else(|| anyhow!("--max-threshold needs a value"))?;
            max_threshold = v.parse().with_context(|| format!("bad --max-threshold {}", v))?;
        } else {
            positional.push(a);
        }
    }
    let input = positional
        .first()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow!("usage: farewell-report <input.json|input.csv> [summary.csv] [--max-threshold N]"))?;
    let output = positional
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("threshold_comparison_results.csv"));

    let phrases = load_probe_config().phrase_book();
    let matcher = phrases.farewell_matcher();
    let conversations = load_conversations(&input)?;
    println!("Loaded {} conversations from {}", conversations.len(), input.display());

    let base = analyze_threshold(matcher, &conversations, 1);
    println!("\n=== FAREWELL STATISTICS (Min 1 message) ===");
    println!("Total eligible conversations analyzed: {}", base.total_conversations);
    println!("Conversations with farewell messages: {}", base.conversations_with_farewells);
    println!("Percentage with farewell messages: {:.2}%", base.percentage);
    println!("Mean position of last farewell from end: {:.2}", base.mean_position_from_end);
    let total_mentions: usize = base.farewell_counts.iter().map(|(_, c)| c).sum();
    if total_mentions > 0 {
        println!("\n=== FAREWELL MENTIONS ===");
        println!("Total farewell mentions: {}", total_mentions);
        for (phrase, count) in &base.farewell_counts {
            println!(
                "'{}': {} mentions ({:.2}%)",
                phrase,
                count,
                *count as f64 / total_mentions as f64 * 100.0
            );
        }
    }

    let results = analyze_thresholds(matcher, &conversations, 1..=max_threshold.max(1));
    println!("\n{:<10} {:<12} {:<15} {:<11} {:<17}", "Threshold", "Total Convs", "With Farewells", "Percentage", "Mean Pos From End");
    println!("{}", "-".repeat(70));
    for r in &results {
        println!(
            "{:<10} {:<12} {:<15} {:<10.2}% {:<17.2}",
            r.threshold,
            r.total_conversations,
            r.conversations_with_farewells,
            r.percentage,
            r.mean_position_from_end
        );
    }

    write_summary_csv(&output, &results)?;
    println!("\nSummary saved to: {}", output.display());
    Ok(())
}
