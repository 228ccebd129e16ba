//! Repair of scraped CSV exports whose quoted cells contain raw line breaks.
//!
//! Two passes: a quote-parity scan that replaces every newline inside a
//! quoted field with a space, then a proper CSV re-read that writes the
//! records back out with a `;` delimiter.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CsvRepairError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// Replaces `\n` inside quoted fields with a space. Every `"` flips the
/// in-quotes state, so an escaped `""` flips it twice and stays put.
/// A `\r` immediately preceding a replaced `\n` is dropped with it.
pub fn repair_multiline_fields(text: &str) -> String {
    let mut in_quotes = false;
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                out.push(c);
            }
            '\r' if in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if in_quotes => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairStats {
    pub records: usize,
    pub joined_lines: usize,
}

/// Repairs `input` and writes it to `output` with `delimiter`.
/// The header row is carried over as-is.
pub fn rewrite_with_delimiter(
    input: &Path,
    output: &Path,
    delimiter: u8,
) -> Result<RepairStats, CsvRepairError> {
    let raw = std::fs::read_to_string(input).map_err(|source| CsvRepairError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let repaired = repair_multiline_fields(&raw);
    let joined_lines = raw.matches('\n').count() - repaired.matches('\n').count();

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(repaired.as_bytes());

    let file = File::create(output).map_err(|source| CsvRepairError::Write {
        path: output.to_path_buf(),
        source,
    })?;
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_writer(BufWriter::new(file));

    let mut records = 0usize;
    for record in reader.records() {
        writer.write_record(&record?)?;
        records += 1;
    }
    writer
        .into_inner()
        .map_err(|e| CsvRepairError::Write {
            path: output.to_path_buf(),
            source: e.into_error(),
        })?
        .flush()
        .map_err(|source| CsvRepairError::Write {
            path: output.to_path_buf(),
            source,
        })?;

    info!(
        "repaired {} -> {}: {} records, {} embedded line breaks joined",
        input.display(),
        output.display(),
        records,
        joined_lines
    );
    Ok(RepairStats {
        records,
        joined_lines,
    })
}
