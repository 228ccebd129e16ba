//! Parallel collection: one worker per identity, one writer.
//!
//! Each worker owns its own browser (its identity's profile dir) and pushes
//! exactly `repetitions` items into a bounded queue: `Some` for a finished
//! transcript, `None` for a failed attempt. The writer is the only code that
//! touches the output store. Every dequeued item consumes one slot of
//! `identities × repetitions`, so the writer always terminates; a queue that
//! stays silent past the receive timeout, or closes early, marks the
//! remaining slots as failed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::batch::ConversationSource;
use super::output_store::OutputStore;
use crate::core::types::{Identity, OutputRecord, PoolSummary, Transcript};

type QueueItem = Option<(String, Transcript)>;

/// Opens a ready-to-use source (browser launched, logged in) for one identity.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn open(&self, identity: &Identity) -> Result<Box<dyn ConversationSource>>;
}

#[derive(Debug, Clone, Copy)]
pub struct PoolOptions {
    pub repetitions: usize,
    pub queue_capacity: usize,
    pub queue_timeout: Duration,
    pub progress: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            repetitions: 50,
            queue_capacity: 16,
            queue_timeout: Duration::from_secs(300),
            progress: false,
        }
    }
}

pub async fn run_pool<S: OutputStore>(
    identities: Vec<Identity>,
    factory: Arc<dyn SourceFactory>,
    store: &mut S,
    opts: PoolOptions,
) -> Result<PoolSummary> {
    let expected = identities.len() * opts.repetitions;
    let mut summary = PoolSummary {
        expected,
        ..Default::default()
    };
    if expected == 0 {
        warn!("worker pool has nothing to do ({} identities)", identities.len());
        return Ok(summary);
    }

    let (tx, mut rx) = mpsc::channel::<QueueItem>(opts.queue_capacity.max(1));
    let workers: Vec<JoinHandle<()>> = identities
        .into_iter()
        .enumerate()
        .map(|(worker_id, identity)| {
            tokio::spawn(worker(
                worker_id,
                identity,
                opts.repetitions,
                factory.clone(),
                tx.clone(),
            ))
        })
        .collect();
    drop(tx);

    let mut cursor = store.existing_records()?;
    let bar = if opts.progress {
        ProgressBar::new(expected as u64).with_message("Writing results")
    } else {
        ProgressBar::hidden()
    };

    let mut completed = 0usize;
    while completed < expected {
        let slot = completed + 1;
        match tokio::time::timeout(opts.queue_timeout, rx.recv()).await {
            Ok(Some(item)) => {
                completed += 1;
                bar.inc(1);
                let Some((name, transcript)) = item else {
                    summary.failed_slots.push(format!("Failed at {}", slot));
                    continue;
                };
                match OutputRecord::from_transcript(cursor + 1, &transcript) {
                    Ok(record) => {
                        store.append(&record)?;
                        cursor += 1;
                        summary.written += 1;
                        info!("Conversation {} saved (identity {})", record.index, name);
                    }
                    Err(e) => {
                        warn!("discarding transcript from {}: {}", name, e);
                        summary.failed_slots.push(format!("Failed at {}", slot));
                    }
                }
            }
            Ok(None) => {
                error!("all workers exited with {} slots outstanding", expected - completed);
                break;
            }
            Err(_) => {
                error!(
                    "no result within {:?}; giving up on {} slots",
                    opts.queue_timeout,
                    expected - completed
                );
                summary.timed_out = true;
                break;
            }
        }
    }
    summary
        .failed_slots
        .extend((completed + 1..=expected).map(|n| format!("Failed at {}", n)));
    bar.finish();

    for handle in workers {
        if summary.timed_out {
            handle.abort();
        }
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                error!("worker task panicked: {}", e);
            }
        }
    }

    info!(
        "pool finished: {}/{} written, {} failed slots",
        summary.written,
        summary.expected,
        summary.failed_slots.len()
    );
    Ok(summary)
}

async fn worker(
    worker_id: usize,
    identity: Identity,
    repetitions: usize,
    factory: Arc<dyn SourceFactory>,
    tx: mpsc::Sender<QueueItem>,
) {
    let mut source = match factory.open(&identity).await {
        Ok(s) => s,
        Err(e) => {
            error!("Worker {}: could not start {}: {:#}", worker_id, identity.name, e);
            for _ in 0..repetitions {
                if tx.send(None).await.is_err() {
                    break;
                }
            }
            return;
        }
    };

    for n in 0..repetitions {
        info!("Worker {}: conversation {}/{} with {}", worker_id, n + 1, repetitions, identity.name);
        let item = match source.attempt().await {
            Ok(t) => Some((identity.name.clone(), t)),
            Err(e) => {
                warn!("Worker {} error with {}: {}", worker_id, identity.name, e);
                source.recover().await;
                None
            }
        };
        if tx.send(item).await.is_err() {
            warn!("Worker {}: writer gone, stopping", worker_id);
            break;
        }
    }

    if let Err(e) = source.shutdown().await {
        warn!("Worker {}: shutdown failed: {}", worker_id, e);
    }
}

/// Writes `failed_slots_<timestamp>.txt` into `dir`. Nothing is written for
/// an empty list.
pub fn write_failed_slots(dir: &Path, failed: &[String]) -> Result<Option<PathBuf>> {
    if failed.is_empty() {
        return Ok(None);
    }
    let path = dir.join(format!(
        "failed_slots_{}.txt",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));
    std::fs::write(&path, failed.join("\n"))
        .with_context(|| format!("writing {}", path.display()))?;
    info!("{} failed slots listed in {}", failed.len(), path.display());
    Ok(Some(path))
}
