//! Resumable sequential batch loop.
//!
//! The driver owns the resume cursor and the output store. It asks a
//! [`ConversationSource`] for transcripts until the store holds `target`
//! rows; any failed or invalid attempt is discarded and followed by the
//! source's recovery action. There is no cap on aborts: a permanently
//! broken page keeps the loop retrying until the process is stopped.

use anyhow::Result;
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::output_store::OutputStore;
use super::session::ConversationSession;
use crate::core::error::SessionError;
use crate::core::types::{BatchSummary, OutputRecord, Transcript};
use crate::scraping::page::PageDriver;

/// Something that can produce one conversation attempt at a time.
#[async_trait]
pub trait ConversationSource: Send {
    async fn attempt(&mut self) -> Result<Transcript, SessionError>;

    /// Brings the page back to a usable state after a failed attempt.
    async fn recover(&mut self);

    async fn shutdown(&mut self) -> Result<()>;
}

pub struct BatchDriver<S: OutputStore> {
    store: S,
    progress: bool,
}

impl<S: OutputStore> BatchDriver<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            progress: false,
        }
    }

    /// Draws a terminal progress bar starting at the resume cursor.
    pub fn with_progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub async fn run(
        &mut self,
        target: usize,
        source: &mut dyn ConversationSource,
    ) -> Result<BatchSummary> {
        let mut cursor = self.store.existing_records()?;
        let mut summary = BatchSummary {
            starting_cursor: cursor,
            ..Default::default()
        };
        if cursor >= target {
            info!("{} conversations already collected (target {}), nothing to do", cursor, target);
            summary.final_cursor = cursor;
            return Ok(summary);
        }

        let bar = self.progress_bar(target, cursor);
        info!("resuming at conversation {} of {}", cursor + 1, target);

        while cursor < target {
            summary.attempts += 1;
            let outcome = source
                .attempt()
                .await
                .and_then(|t| OutputRecord::from_transcript(cursor + 1, &t));

            match outcome {
                Ok(record) => {
                    self.store.append(&record)?;
                    cursor += 1;
                    summary.written += 1;
                    bar.inc(1);
                    info!("Conversation {} saved", record.index);
                }
                Err(e) => {
                    if matches!(e, SessionError::ValidationFailed { .. }) {
                        summary.rejected += 1;
                    } else {
                        summary.aborted += 1;
                    }
                    error!("Error occurred during dialogue generation ({}): {}", e.kind(), e);
                    source.recover().await;
                }
            }
        }

        bar.finish();
        summary.final_cursor = cursor;
        info!(
            "batch finished: {} written, {} aborted, {} rejected in {} attempts",
            summary.written, summary.aborted, summary.rejected, summary.attempts
        );
        Ok(summary)
    }

    fn progress_bar(&self, target: usize, cursor: usize) -> ProgressBar {
        if !self.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(target as u64).with_position(cursor as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{msg} {bar:40.green/white} {pos}/{len} [{elapsed_precise}<{eta_precise}]",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message("Generating Conversations");
        bar
    }
}

/// Source backed by a real page: each attempt is one [`ConversationSession`] run.
pub struct LiveConversationSource {
    page: Box<dyn PageDriver>,
    session: ConversationSession,
    screenshot_dir: Option<PathBuf>,
    aborts: usize,
}

impl LiveConversationSource {
    pub fn new(page: Box<dyn PageDriver>, session: ConversationSession) -> Self {
        Self {
            page,
            session,
            screenshot_dir: None,
            aborts: 0,
        }
    }

    /// Capture a PNG into `dir` before every recovery reload.
    pub fn with_abort_screenshots(mut self, dir: Option<PathBuf>) -> Self {
        self.screenshot_dir = dir;
        self
    }
}

#[async_trait]
impl ConversationSource for LiveConversationSource {
    async fn attempt(&mut self) -> Result<Transcript, SessionError> {
        self.session.run(self.page.as_mut()).await
    }

    async fn recover(&mut self) {
        self.aborts += 1;
        if let Some(dir) = &self.screenshot_dir {
            let path = dir.join(format!(
                "abort_{}_{:04}.png",
                chrono::Local::now().format("%Y%m%d_%H%M%S"),
                self.aborts
            ));
            if let Err(e) = self.page.screenshot(&path).await {
                warn!("abort screenshot failed: {}", e);
            }
        }
        if let Err(e) = self.page.refresh().await {
            error!("Error occurred while refreshing the page: {}", e);
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.page.close().await
    }
}
