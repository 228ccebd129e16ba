mod common;

use common::{
    init_logger, interaction_failure, read_rows, short_transcript, valid_transcript,
    ScriptedSource,
};
use companion_probe::batch::BatchDriver;
use companion_probe::output_store::{CsvOutputStore, OutputStore};
use companion_probe::{OutputRecord, SessionError, RECORD_HEADER};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn rows_stay_contiguous_across_aborts() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.csv");

    let mut source = ScriptedSource::new(
        "a",
        vec![
            Ok(valid_transcript("first")),
            Err(interaction_failure()),
            Err(SessionError::ScrapeEmpty { round: 2 }),
            Ok(valid_transcript("second")),
            Err(SessionError::GenerationFailed("timeout".into())),
            Ok(valid_transcript("third")),
        ],
    );
    let mut driver = BatchDriver::new(CsvOutputStore::open(&path).unwrap());
    let summary = driver.run(3, &mut source).await.unwrap();

    assert_eq!(summary.starting_cursor, 0);
    assert_eq!(summary.final_cursor, 3);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.aborted, 3);
    assert_eq!(summary.attempts, 6);
    assert_eq!(source.counters.recoveries(), 3);
    drop(driver);

    let rows = read_rows(&path);
    let indices: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(indices, vec!["1", "2", "3"]);
    assert_eq!(rows[1][1], "second user 1");
    assert!(rows.iter().all(|r| r.len() == RECORD_HEADER.len()));
}

#[tokio::test]
async fn short_transcript_is_rejected_and_not_written() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.csv");

    let mut source = ScriptedSource::new("a", vec![Ok(short_transcript())]);
    let mut driver = BatchDriver::new(CsvOutputStore::open(&path).unwrap());
    let summary = driver.run(1, &mut source).await.unwrap();

    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.written, 1);
    assert_eq!(source.counters.attempts(), 2);
    assert_eq!(source.counters.recoveries(), 1);
    drop(driver);

    let rows = read_rows(&path);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "1");
    assert_eq!(rows[0][1], "a-2 user 1");
}

#[tokio::test]
async fn completed_store_needs_no_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.csv");

    let mut first = ScriptedSource::new("a", vec![]);
    BatchDriver::new(CsvOutputStore::open(&path).unwrap())
        .run(2, &mut first)
        .await
        .unwrap();
    let before = std::fs::read(&path).unwrap();

    let mut second = ScriptedSource::new("b", vec![]);
    let summary = BatchDriver::new(CsvOutputStore::open(&path).unwrap())
        .run(2, &mut second)
        .await
        .unwrap();

    assert_eq!(summary.attempts, 0);
    assert_eq!(summary.written, 0);
    assert_eq!(summary.starting_cursor, 2);
    assert_eq!(second.counters.attempts(), 0);
    assert_eq!(std::fs::read(&path).unwrap(), before);
}

#[tokio::test]
async fn resume_continues_numbering_without_second_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.csv");
    {
        let mut store = CsvOutputStore::open(&path).unwrap();
        for i in 1..=2 {
            store
                .append(&OutputRecord::from_transcript(i, &valid_transcript("old")).unwrap())
                .unwrap();
        }
    }

    let mut source = ScriptedSource::new("new", vec![Err(interaction_failure())]);
    let summary = BatchDriver::new(CsvOutputStore::open(&path).unwrap())
        .run(4, &mut source)
        .await
        .unwrap();
    assert_eq!(summary.starting_cursor, 2);
    assert_eq!(summary.final_cursor, 4);

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text.matches("Conversation_Number").count(), 1);
    let indices: Vec<String> = read_rows(&path).into_iter().map(|r| r[0].clone()).collect();
    assert_eq!(indices, vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn store_reports_rows_written_by_driver() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conversations.csv");
    let mut source = ScriptedSource::new("a", vec![]);
    let mut driver = BatchDriver::new(CsvOutputStore::open(&path).unwrap());
    driver.run(3, &mut source).await.unwrap();
    let mut store = driver.into_store();
    assert_eq!(store.existing_records().unwrap(), 3);
}
