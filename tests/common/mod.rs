#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use companion_probe::batch::ConversationSource;
use companion_probe::core::config::PlatformProfile;
use companion_probe::scraping::{Locator, PageDriver};
use companion_probe::tools::{ChatMessage, TurnGenerator};
use companion_probe::worker_pool::SourceFactory;
use companion_probe::{Identity, SessionError, Transcript};

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A transcript that passes validation.
pub fn valid_transcript(tag: &str) -> Transcript {
    let mut t = Transcript::default();
    for i in 1..=4 {
        t.push_exchange(format!("{} user {}", tag, i), format!("{} reply {}", tag, i));
    }
    t.farewell = Some("I'm going offline now.".into());
    t.farewell_reply = Some("Bye!".into());
    t
}

/// Only three exchanges: fails validation.
pub fn short_transcript() -> Transcript {
    let mut t = valid_transcript("short");
    t.messages.truncate(6);
    t
}

pub fn interaction_failure() -> SessionError {
    SessionError::InteractionFailed {
        op: "click",
        attempts: 3,
        last_error: "element not interactable".into(),
    }
}

// ── Page ─────────────────────────────────────────────────────────────────────

/// In-memory page. Reads of the response selector pop one scripted reply
/// list each; waits are recorded, not slept.
pub struct ScriptedPage {
    pub profile: PlatformProfile,
    pub tiles: usize,
    pub replies: VecDeque<Vec<String>>,
    pub character_name: String,
    pub fail_typing: bool,

    pub navigations: Vec<String>,
    pub typed: Vec<(String, bool)>,
    pub clicked: Vec<Locator>,
    pub refreshes: usize,
    pub waited: Duration,
}

impl ScriptedPage {
    pub fn new(profile: PlatformProfile, tiles: usize, replies: &[&str]) -> Self {
        Self {
            profile,
            tiles,
            replies: replies.iter().map(|r| vec![r.to_string()]).collect(),
            character_name: "Luna".into(),
            fail_typing: false,
            navigations: Vec::new(),
            typed: Vec::new(),
            clicked: Vec::new(),
            refreshes: 0,
            waited: Duration::ZERO,
        }
    }

    pub fn send_clicks(&self) -> usize {
        let Some(send) = &self.profile.send_button else {
            return 0;
        };
        self.clicked.iter().filter(|l| &l.selector == send).count()
    }
}

#[async_trait]
impl PageDriver for ScriptedPage {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.navigations.push(url.to_string());
        Ok(())
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        Ok(if selector == self.profile.character_tile {
            self.tiles
        } else {
            0
        })
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        if locator.selector == self.profile.character_tile
            && locator.nth.resolve(self.tiles).is_none()
        {
            return Err(anyhow!("no tile at {}", locator));
        }
        self.clicked.push(locator.clone());
        Ok(())
    }

    async fn type_text(&mut self, _locator: &Locator, text: &str, submit: bool) -> Result<()> {
        if self.fail_typing {
            return Err(anyhow!("textarea detached"));
        }
        self.typed.push((text.to_string(), submit));
        Ok(())
    }

    async fn read_texts(&mut self, selector: &str) -> Result<Vec<String>> {
        if selector == self.profile.response_text {
            return Ok(self.replies.pop_front().unwrap_or_default());
        }
        if Some(selector) == self.profile.character_name.as_deref() {
            return Ok(vec![self.character_name.clone()]);
        }
        Ok(vec![])
    }

    async fn wait(&mut self, duration: Duration) {
        self.waited += duration;
    }

    async fn refresh(&mut self) -> Result<()> {
        self.refreshes += 1;
        Ok(())
    }

    async fn screenshot(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ── Generator ────────────────────────────────────────────────────────────────

/// Returns `"message <round>"`; fails at `fail_at` when set. Records the
/// history length seen on every call.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub fail_at: Option<usize>,
    pub calls: Mutex<Vec<(usize, usize)>>,
}

impl ScriptedGenerator {
    pub fn failing_at(round: usize) -> Self {
        Self {
            fail_at: Some(round),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TurnGenerator for ScriptedGenerator {
    async fn next_message(
        &self,
        history: &[ChatMessage],
        round: usize,
    ) -> Result<String, SessionError> {
        self.calls.lock().unwrap().push((round, history.len()));
        if self.fail_at == Some(round) {
            return Err(SessionError::GenerationFailed("status=500".into()));
        }
        Ok(format!("message {}", round))
    }
}

// ── Source ───────────────────────────────────────────────────────────────────

#[derive(Default, Clone)]
pub struct SourceCounters {
    pub attempts: Arc<AtomicUsize>,
    pub recoveries: Arc<AtomicUsize>,
    pub shutdowns: Arc<AtomicUsize>,
}

impl SourceCounters {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
    pub fn recoveries(&self) -> usize {
        self.recoveries.load(Ordering::SeqCst)
    }
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

/// Plays back scripted outcomes, then succeeds forever. With `hang` set,
/// every attempt past the script never completes.
pub struct ScriptedSource {
    pub tag: String,
    pub outcomes: VecDeque<Result<Transcript, SessionError>>,
    pub counters: SourceCounters,
    pub hang: bool,
}

impl ScriptedSource {
    pub fn new(tag: &str, outcomes: Vec<Result<Transcript, SessionError>>) -> Self {
        Self {
            tag: tag.to_string(),
            outcomes: outcomes.into(),
            counters: SourceCounters::default(),
            hang: false,
        }
    }
}

#[async_trait]
impl ConversationSource for ScriptedSource {
    async fn attempt(&mut self) -> Result<Transcript, SessionError> {
        let n = self.counters.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        match self.outcomes.pop_front() {
            Some(outcome) => outcome,
            None if self.hang => std::future::pending().await,
            None => Ok(valid_transcript(&format!("{}-{}", self.tag, n))),
        }
    }

    async fn recover(&mut self) {
        self.counters.recoveries.fetch_add(1, Ordering::SeqCst);
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one prepared source per identity name; unknown names fail to open.
#[derive(Default)]
pub struct ScriptedFactory {
    sources: Mutex<HashMap<String, ScriptedSource>>,
}

impl ScriptedFactory {
    pub fn with(self, name: &str, source: ScriptedSource) -> Self {
        self.sources.lock().unwrap().insert(name.to_string(), source);
        self
    }
}

#[async_trait]
impl SourceFactory for ScriptedFactory {
    async fn open(&self, identity: &Identity) -> Result<Box<dyn ConversationSource>> {
        let source = self
            .sources
            .lock()
            .unwrap()
            .remove(&identity.name)
            .ok_or_else(|| anyhow!("browser launch failed for {}", identity.name))?;
        Ok(Box::new(source))
    }
}

pub fn identity(name: &str) -> Identity {
    Identity {
        name: name.to_string(),
        profile_dir: None,
    }
}

/// Data rows of a CSV written by the output store.
pub fn read_rows(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect()
}
