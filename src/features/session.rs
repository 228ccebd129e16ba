//! One scripted conversation with one character.
//!
//! ```text
//! Selecting -> Round(1) -> .. -> Round(4) -> Farewell -> Complete
//!     \____________\______________\____________\-----> Aborted
//! ```
//!
//! A session holds no page and no transcript between runs; every call to
//! [`ConversationSession::run`] starts from the home page with an empty
//! history. On `Aborted` the partial transcript is dropped and the caller
//! owns recovery (page reload) before the next attempt.

use rand::distr::{Distribution, Uniform};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::config::{PlatformProfile, ResponsePick, SessionTiming};
use crate::core::error::SessionError;
use crate::core::phrases::PhraseBook;
use crate::core::types::{Transcript, ROUNDS};
use crate::scraping::interaction::PageInteractor;
use crate::scraping::page::{Locator, PageDriver};
use crate::tools::turn_generator::{history_from_transcript, TurnGenerator};

/// How long to keep polling for character tiles after navigation.
const TILE_WAIT: Duration = Duration::from_secs(10);
const TILE_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Selecting,
    Round(usize),
    Farewell,
    Complete,
    Aborted,
}

fn log_state(state: SessionState) {
    info!("session_state={:?}", state);
}

pub struct ConversationSession {
    generator: Arc<dyn TurnGenerator>,
    profile: PlatformProfile,
    phrases: Arc<PhraseBook>,
    interactor: PageInteractor,
    timing: SessionTiming,
}

impl ConversationSession {
    pub fn new(
        generator: Arc<dyn TurnGenerator>,
        profile: PlatformProfile,
        phrases: Arc<PhraseBook>,
        interactor: PageInteractor,
        timing: SessionTiming,
    ) -> Self {
        Self {
            generator,
            profile,
            phrases,
            interactor,
            timing,
        }
    }

    pub fn profile(&self) -> &PlatformProfile {
        &self.profile
    }

    /// Runs one full conversation. Returns the transcript on `Complete`.
    pub async fn run(&self, page: &mut dyn PageDriver) -> Result<Transcript, SessionError> {
        match self.drive(page).await {
            Ok(transcript) => {
                log_state(SessionState::Complete);
                Ok(transcript)
            }
            Err(e) => {
                log_state(SessionState::Aborted);
                warn!("conversation aborted ({}): {}", e.kind(), e);
                Err(e)
            }
        }
    }

    async fn drive(&self, page: &mut dyn PageDriver) -> Result<Transcript, SessionError> {
        let mut transcript = Transcript::default();

        log_state(SessionState::Selecting);
        transcript.character = self.select_character(page).await?;

        for round in 0..ROUNDS {
            log_state(SessionState::Round(round + 1));
            let history = history_from_transcript(&transcript);
            let user_message = self.generator.next_message(&history, round).await?;

            self.submit(page, &user_message).await?;
            page.wait(self.timing.settle).await;

            let reply = self
                .latest_reply(page)
                .await
                .ok_or(SessionError::ScrapeEmpty { round: round + 1 })?;
            debug!("round {} reply: {}", round + 1, preview(&reply));
            transcript.push_exchange(user_message, reply);

            page.wait(self.jitter()).await;
        }

        log_state(SessionState::Farewell);
        let farewell = self.phrases.pick_farewell().to_string();
        self.submit(page, &farewell).await?;
        transcript.farewell = Some(farewell);
        page.wait(self.timing.settle).await;

        transcript.farewell_reply = self.latest_reply(page).await;
        match &transcript.farewell_reply {
            Some(r) => info!("Final response received: {}", preview(r)),
            None => debug!("no reply to farewell"),
        }

        Ok(transcript)
    }

    async fn select_character(
        &self,
        page: &mut dyn PageDriver,
    ) -> Result<Option<String>, SessionError> {
        page.navigate(&self.profile.home_url)
            .await
            .map_err(|e| SessionError::InteractionFailed {
                op: "navigate",
                attempts: 1,
                last_error: e.to_string(),
            })?;

        let tiles = self.wait_for_tiles(page).await;
        if tiles == 0 {
            return Err(SessionError::InteractionFailed {
                op: "select",
                attempts: 1,
                last_error: format!("no elements match {}", self.profile.character_tile),
            });
        }

        let pick = {
            let mut rng = rand::rng();
            Uniform::new(0, tiles)
                .map(|d| d.sample(&mut rng))
                .unwrap_or(0)
        };
        debug!("selecting character tile {}/{}", pick + 1, tiles);
        self.interactor
            .click(page, &Locator::css(self.profile.character_tile.as_str()).nth(pick))
            .await?;

        let name = match &self.profile.character_name {
            Some(selector) => page
                .read_texts(selector)
                .await
                .ok()
                .and_then(|texts| texts.into_iter().map(|t| t.trim().to_string()).find(|t| !t.is_empty())),
            None => None,
        };
        info!(
            "Selected character on {}: {}",
            self.profile.name,
            name.as_deref().unwrap_or("<unknown>")
        );
        Ok(name)
    }

    async fn wait_for_tiles(&self, page: &mut dyn PageDriver) -> usize {
        let mut waited = Duration::ZERO;
        loop {
            match page.count(&self.profile.character_tile).await {
                Ok(n) if n > 0 => return n,
                Ok(_) => {}
                Err(e) => debug!("counting tiles failed: {}", e),
            }
            if waited >= TILE_WAIT {
                return 0;
            }
            page.wait(TILE_POLL).await;
            waited += TILE_POLL;
        }
    }

    async fn submit(&self, page: &mut dyn PageDriver, text: &str) -> Result<(), SessionError> {
        let input = Locator::css(self.profile.message_input.as_str());
        match &self.profile.send_button {
            Some(button) => {
                self.interactor.type_and_submit(page, &input, text, false).await?;
                self.interactor
                    .click(page, &Locator::css(button.as_str()))
                    .await
            }
            None => self.interactor.type_and_submit(page, &input, text, true).await,
        }
    }

    /// Newest non-empty reply text, if the page shows one.
    async fn latest_reply(&self, page: &mut dyn PageDriver) -> Option<String> {
        let texts = match page.read_texts(&self.profile.response_text).await {
            Ok(t) => t,
            Err(e) => {
                warn!("Error retrieving character response: {}", e);
                return None;
            }
        };
        let reply = pick_reply(texts, self.profile.response_pick);
        if reply.is_none() {
            warn!("Message element not found");
        }
        reply
    }

    fn jitter(&self) -> Duration {
        let lo = self.timing.jitter_min.as_millis() as u64;
        let hi = self.timing.jitter_max.as_millis() as u64;
        let mut rng = rand::rng();
        let ms = Uniform::new_inclusive(lo, hi)
            .map(|d| d.sample(&mut rng))
            .unwrap_or(lo);
        Duration::from_millis(ms)
    }
}

/// Chooses the reply element per `pick`, ignoring blank ones.
pub fn pick_reply(texts: Vec<String>, pick: ResponsePick) -> Option<String> {
    let mut non_empty = texts
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    match pick {
        ResponsePick::First => non_empty.next(),
        ResponsePick::Last => non_empty.last(),
    }
}

fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}
