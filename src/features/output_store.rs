use anyhow::{anyhow, Context, Result};
use csv::{QuoteStyle, WriterBuilder};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::types::{OutputRecord, RECORD_HEADER};

/// Append-only sink for conversation records.
///
/// The row count is the only resume signal: whoever owns the store reads
/// [`existing_records`](OutputStore::existing_records) once and keeps the
/// cursor in memory from then on.
pub trait OutputStore: Send {
    /// Data rows already persisted (header excluded).
    fn existing_records(&mut self) -> Result<usize>;

    /// Persists one record and flushes it before returning.
    fn append(&mut self, record: &OutputRecord) -> Result<()>;
}

/// CSV file with every field quoted, header written once.
///
/// The file is held under an exclusive advisory lock for the lifetime of
/// the store, so a second process pointed at the same path fails fast
/// instead of interleaving rows.
pub struct CsvOutputStore {
    path: PathBuf,
    file: File,
    writer: csv::Writer<File>,
}

impl std::fmt::Debug for CsvOutputStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvOutputStore").field("path", &self.path).finish()
    }
}

impl CsvOutputStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .with_context(|| format!("opening output {}", path.display()))?;
        file.try_lock_exclusive().map_err(|e| {
            anyhow!(
                "output {} is locked by another process: {}",
                path.display(),
                e
            )
        })?;
        let writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(file.try_clone().context("duplicating output handle")?);
        debug!("output store opened: {}", path.display());
        Ok(Self { path, file, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self
            .file
            .metadata()
            .with_context(|| format!("stat {}", self.path.display()))?
            .len()
            == 0)
    }
}

impl OutputStore for CsvOutputStore {
    fn existing_records(&mut self) -> Result<usize> {
        if self.is_empty()? {
            return Ok(0);
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let mut rows = 0usize;
        for (line, record) in reader.records().enumerate() {
            let record = record
                .with_context(|| format!("malformed row {} in {}", line + 1, self.path.display()))?;
            // A header row is only counted out when it is actually there.
            if line == 0 && record.iter().eq(RECORD_HEADER.iter().copied()) {
                continue;
            }
            rows += 1;
        }
        info!("Existing conversations in {}: {}", self.path.display(), rows);
        Ok(rows)
    }

    fn append(&mut self, record: &OutputRecord) -> Result<()> {
        if self.is_empty()? {
            self.writer
                .write_record(RECORD_HEADER)
                .context("writing header")?;
        }
        self.writer
            .write_record(record.to_row())
            .with_context(|| format!("writing conversation {}", record.index))?;
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))?;
        Ok(())
    }
}

impl Drop for CsvOutputStore {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Transcript;
    use pretty_assertions::assert_eq;

    fn record(index: usize) -> OutputRecord {
        let mut t = Transcript::default();
        for i in 1..=4 {
            t.push_exchange(format!("user {}", i), format!("char {}, \"quoted\"", i));
        }
        t.farewell = Some("Bye for now!".into());
        OutputRecord::from_transcript(index, &t).unwrap()
    }

    #[test]
    fn headerless_file_counts_every_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "\"1\",\"a\"\n\"2\",\"b\"\n").unwrap();

        let mut store = CsvOutputStore::open(&path).unwrap();
        assert_eq!(store.existing_records().unwrap(), 2);
        store.append(&record(3)).unwrap();
        drop(store);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("Conversation_Number"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn header_once_and_all_fields_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        {
            let mut store = CsvOutputStore::open(&path).unwrap();
            assert_eq!(store.existing_records().unwrap(), 0);
            store.append(&record(1)).unwrap();
            store.append(&record(2)).unwrap();
            assert_eq!(store.existing_records().unwrap(), 2);
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("\"Conversation_Number\",\"User_Message_1\""));
        assert!(lines[1].starts_with("\"1\",\"user 1\",\"char 1, \"\"quoted\"\"\""));
        assert!(lines[1].ends_with(",\"Bye for now!\",\"\""));
        assert_eq!(text.matches("Conversation_Number").count(), 1);
    }

    #[test]
    fn reopen_counts_and_appends_without_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        CsvOutputStore::open(&path).unwrap().append(&record(1)).unwrap();

        let mut store = CsvOutputStore::open(&path).unwrap();
        assert_eq!(store.existing_records().unwrap(), 1);
        store.append(&record(2)).unwrap();
        drop(store);

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let indices: Vec<String> = reader
            .records()
            .map(|r| r.unwrap()[0].to_string())
            .collect();
        assert_eq!(indices, vec!["1", "2"]);
    }

    #[test]
    fn multiline_cells_count_as_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut store = CsvOutputStore::open(&path).unwrap();
        let mut r = record(1);
        r.exchanges[1] = "line one\nline two".into();
        store.append(&r).unwrap();
        assert_eq!(store.existing_records().unwrap(), 1);
    }

    #[test]
    fn second_store_on_same_file_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let _first = CsvOutputStore::open(&path).unwrap();
        let err = CsvOutputStore::open(&path).unwrap_err();
        assert!(err.to_string().contains("locked"));
    }
}
