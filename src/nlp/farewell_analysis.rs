//! Post-hoc farewell analysis over collected conversations.
//!
//! For each conversation only the human side is inspected. A conversation
//! "has a farewell" when any of its human messages matches a farewell
//! expression; the position of the *last* such message, counted from the
//! end of the conversation, tells whether people say goodbye at the end or
//! drift on afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::core::types::RECORD_HEADER;
use crate::nlp::phrase_matcher::PhraseMatcher;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FarewellDetection {
    pub detected: bool,
    /// Distinct expressions found, in first-seen order.
    pub farewells: Vec<String>,
    /// Distinct messages containing at least one expression.
    pub farewell_messages: Vec<String>,
    /// Index of each entry of `farewell_messages` in the input.
    pub farewell_indices: Vec<usize>,
}

impl FarewellDetection {
    /// 0 when the last farewell is the last message.
    pub fn position_from_end(&self, message_count: usize) -> Option<usize> {
        self.farewell_indices
            .iter()
            .max()
            .map(|last| message_count.saturating_sub(1) - last)
    }
}

pub fn detect_farewells<S: AsRef<str>>(
    matcher: &PhraseMatcher,
    human_messages: &[S],
) -> FarewellDetection {
    let mut out = FarewellDetection::default();
    for (i, message) in human_messages.iter().enumerate() {
        let message = message.as_ref();
        let found = matcher.matches(message);
        if found.is_empty() {
            continue;
        }
        for phrase in found {
            if !out.farewells.contains(&phrase) {
                out.farewells.push(phrase);
            }
        }
        // Repeated identical messages are reported once, at their first index.
        if !out.farewell_messages.iter().any(|m| m == message) {
            out.farewell_messages.push(message.to_string());
            out.farewell_indices.push(i);
        }
    }
    out.detected = !out.farewells.is_empty();
    out
}

/// One conversation as fed to the analysis.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationInput {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub human_messages: Vec<String>,
}

fn id_as_string<'de, D>(de: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(de)?;
    Ok(match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub threshold: usize,
    pub total_conversations: usize,
    pub conversations_with_farewells: usize,
    pub percentage: f64,
    pub mean_position_from_end: f64,
    /// Mentions per expression across farewell messages, most frequent first.
    pub farewell_counts: Vec<(String, usize)>,
}

/// Analysis restricted to conversations with at least `min_messages` human messages.
pub fn analyze_threshold(
    matcher: &PhraseMatcher,
    conversations: &[ConversationInput],
    min_messages: usize,
) -> ThresholdResult {
    let mut total = 0usize;
    let mut with_farewells = 0usize;
    let mut positions_sum = 0usize;
    let mut counts: HashMap<String, usize> = HashMap::new();

    for conv in conversations
        .iter()
        .filter(|c| c.human_messages.len() >= min_messages)
    {
        total += 1;
        let detection = detect_farewells(matcher, &conv.human_messages);
        let Some(position) = detection.position_from_end(conv.human_messages.len()) else {
            continue;
        };
        with_farewells += 1;
        positions_sum += position;
        // One mention per conversation, however often the phrase recurs.
        for phrase in &detection.farewells {
            *counts.entry(phrase.clone()).or_default() += 1;
        }
    }

    let mut farewell_counts: Vec<(String, usize)> = counts.into_iter().collect();
    farewell_counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ThresholdResult {
        threshold: min_messages,
        total_conversations: total,
        conversations_with_farewells: with_farewells,
        percentage: if total > 0 {
            with_farewells as f64 / total as f64 * 100.0
        } else {
            0.0
        },
        mean_position_from_end: if with_farewells > 0 {
            positions_sum as f64 / with_farewells as f64
        } else {
            0.0
        },
        farewell_counts,
    }
}

pub fn analyze_thresholds(
    matcher: &PhraseMatcher,
    conversations: &[ConversationInput],
    thresholds: impl IntoIterator<Item = usize>,
) -> Vec<ThresholdResult> {
    thresholds
        .into_iter()
        .map(|t| {
            let r = analyze_threshold(matcher, conversations, t);
            debug!(
                "threshold {}: {}/{} ({:.2}%)",
                t, r.conversations_with_farewells, r.total_conversations, r.percentage
            );
            r
        })
        .collect()
}

pub const SUMMARY_HEADER: [&str; 5] = [
    "Threshold",
    "Total_Conversations",
    "Conversations_With_Farewells",
    "Percentage",
    "Mean_Position_From_End",
];

pub fn write_summary_csv(path: &Path, results: &[ThresholdResult]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record(SUMMARY_HEADER)?;
    for r in results {
        writer.write_record([
            r.threshold.to_string(),
            r.total_conversations.to_string(),
            r.conversations_with_farewells.to_string(),
            format!("{:.2}%", r.percentage),
            format!("{:.2}", r.mean_position_from_end),
        ])?;
    }
    writer.flush()?;
    info!("summary saved to {}", path.display());
    Ok(())
}

/// Loads `.json` (array of `{id, human_messages}`) or a transcript CSV in
/// the layout this tool writes (user columns plus the farewell column).
pub fn load_conversations(path: &Path) -> Result<Vec<ConversationInput>> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        return serde_json::from_str(&text)
            .with_context(|| format!("parsing {} as conversation JSON", path.display()));
    }
    load_transcript_csv(path)
}

fn load_transcript_csv(path: &Path) -> Result<Vec<ConversationInput>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let id_col = headers.iter().position(|h| h == RECORD_HEADER[0]);
    let human_cols: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, h)| h.starts_with("User_Message_") || *h == "Farewell_Message")
        .map(|(i, _)| i)
        .collect();
    anyhow::ensure!(
        !human_cols.is_empty(),
        "{} has no User_Message_* or Farewell_Message columns",
        path.display()
    );

    let mut out = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("{} row {}", path.display(), row + 2))?;
        let id = id_col
            .and_then(|c| record.get(c))
            .map(str::to_string)
            .unwrap_or_else(|| (row + 1).to_string());
        let human_messages = human_cols
            .iter()
            .filter_map(|&c| record.get(c))
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect();
        out.push(ConversationInput { id, human_messages });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::phrases::FAREWELL_EXPRESSIONS;
    use pretty_assertions::assert_eq;

    fn matcher() -> PhraseMatcher {
        PhraseMatcher::new(FAREWELL_EXPRESSIONS.iter().copied())
    }

    fn conv(id: &str, msgs: &[&str]) -> ConversationInput {
        ConversationInput {
            id: id.to_string(),
            human_messages: msgs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn detection_reports_messages_and_indices() {
        let msgs = ["hi there", "ok gotta go", "what?", "bye!", "bye!"];
        let d = detect_farewells(&matcher(), &msgs);
        assert!(d.detected);
        assert_eq!(d.farewell_messages, vec!["ok gotta go", "bye!"]);
        assert_eq!(d.farewell_indices, vec![1, 3]);
        assert!(d.farewells.contains(&"gotta go".to_string()));
        assert!(d.farewells.contains(&"bye".to_string()));
        assert_eq!(d.position_from_end(msgs.len()), Some(1));
    }

    #[test]
    fn goodbye_is_not_bye() {
        let d = detect_farewells(&matcher(), &["goodbye friend"]);
        assert!(d.farewells.contains(&"goodbye".to_string()));
        assert!(!d.farewells.contains(&"bye".to_string()));
    }

    #[test]
    fn no_farewell_means_no_position() {
        let d = detect_farewells(&matcher(), &["hello", "how are you"]);
        assert!(!d.detected);
        assert_eq!(d.position_from_end(2), None);
    }

    #[test]
    fn threshold_filters_and_averages() {
        let convs = vec![
            conv("1", &["hi", "bye"]),
            conv("2", &["hi", "see you later", "wait one more thing"]),
            conv("3", &["hello"]),
        ];
        let m = matcher();

        let r1 = analyze_threshold(&m, &convs, 1);
        assert_eq!(r1.total_conversations, 3);
        assert_eq!(r1.conversations_with_farewells, 2);
        assert!((r1.percentage - 200.0 / 3.0).abs() < 1e-9);
        assert!((r1.mean_position_from_end - 0.5).abs() < 1e-9);

        let r3 = analyze_threshold(&m, &convs, 3);
        assert_eq!(r3.total_conversations, 1);
        assert_eq!(r3.conversations_with_farewells, 1);
        assert_eq!(r3.farewell_counts, vec![("see you later".to_string(), 1)]);

        let r9 = analyze_threshold(&m, &convs, 9);
        assert_eq!(r9.total_conversations, 0);
        assert_eq!(r9.percentage, 0.0);
    }

    #[test]
    fn repeated_phrase_counts_once_per_conversation() {
        let convs = vec![
            conv("1", &["ok bye", "wait", "bye for real"]),
            conv("2", &["bye"]),
        ];
        let r = analyze_threshold(&matcher(), &convs, 1);
        assert_eq!(r.farewell_counts, vec![("bye".to_string(), 2)]);
    }

    #[test]
    fn summary_csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("summary.csv");
        let convs = vec![conv("1", &["hi", "bye"])];
        let results = analyze_thresholds(&matcher(), &convs, 1..=2);
        write_summary_csv(&out, &results).unwrap();
        let text = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "Threshold,Total_Conversations,Conversations_With_Farewells,Percentage,Mean_Position_From_End"
        );
        assert_eq!(lines[1], "1,1,1,100.00%,0.00");
        assert_eq!(lines[2], "2,1,1,100.00%,0.00");
    }

    #[test]
    fn loads_json_with_numeric_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.json");
        std::fs::write(&path, r#"[{"id": 7, "human_messages": ["hey", "ttyl"]}]"#).unwrap();
        let convs = load_conversations(&path).unwrap();
        assert_eq!(convs, vec![conv("7", &["hey", "ttyl"])]);
    }

    #[test]
    fn loads_transcript_csv_human_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.csv");
        let mut w = csv::Writer::from_path(&path).unwrap();
        w.write_record(RECORD_HEADER).unwrap();
        w.write_record(["1", "u1", "c1", "u2", "c2", "u3", "c3", "u4", "c4", "bye now", ""])
            .unwrap();
        w.flush().unwrap();
        drop(w);

        let convs = load_conversations(&path).unwrap();
        assert_eq!(convs, vec![conv("1", &["u1", "u2", "u3", "u4", "bye now"])]);
    }
}
