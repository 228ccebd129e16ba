use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;

use super::batch::{ConversationSource, LiveConversationSource};
use super::login_gate::LoginGate;
use super::session::ConversationSession;
use super::worker_pool::SourceFactory;
use crate::core::config::{PlatformProfile, ProbeConfig, SessionTiming};
use crate::core::phrases::PhraseBook;
use crate::core::types::Identity;
use crate::scraping::browser_manager::{launch_page, LaunchOptions};
use crate::scraping::interaction::PageInteractor;
use crate::scraping::page::PageDriver;
use crate::tools::turn_generator::{OpenAiTurnGenerator, TurnGenerator};

/// Everything a run shares across sessions and workers, resolved once from config.
#[derive(Clone)]
pub struct ProbeRuntime {
    pub config: Arc<ProbeConfig>,
    pub generator: Arc<dyn TurnGenerator>,
    pub phrases: Arc<PhraseBook>,
    pub profile: PlatformProfile,
    pub timing: SessionTiming,
    pub interactor: PageInteractor,
    pub login_gate: LoginGate,
    /// Serializes operator login prompts; only one worker may own the terminal.
    pub login_lock: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for ProbeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeRuntime")
            .field("platform", &self.profile.name)
            .field("timing", &self.timing)
            .finish()
    }
}

impl ProbeRuntime {
    pub fn from_config(config: ProbeConfig) -> Result<Self> {
        let generator = OpenAiTurnGenerator::from_config(&config.llm, config.persona.resolve())?;
        info!("turn generator ready: {:?}", generator);
        Ok(Self::with_generator(config, Arc::new(generator)))
    }

    pub fn with_generator(config: ProbeConfig, generator: Arc<dyn TurnGenerator>) -> Self {
        let phrases = Arc::new(config.phrase_book());
        Self {
            generator,
            phrases,
            profile: config.platform.resolve(),
            timing: config.timing.session(),
            interactor: PageInteractor::new(config.timing.retry_policy()),
            login_gate: LoginGate::new(config.timing.login_timeout(), config.timing.login_poll()),
            login_lock: Arc::new(tokio::sync::Mutex::new(())),
            config: Arc::new(config),
        }
    }

    pub fn session(&self) -> ConversationSession {
        ConversationSession::new(
            self.generator.clone(),
            self.profile.clone(),
            self.phrases.clone(),
            self.interactor,
            self.timing,
        )
    }

    pub fn launch_options(&self, profile_dir: Option<String>) -> LaunchOptions {
        LaunchOptions {
            headless: self.config.batch.headless.unwrap_or(false),
            profile_dir,
            ..Default::default()
        }
    }

    pub fn screenshot_dir(&self) -> Option<PathBuf> {
        self.config
            .batch
            .screenshot_on_abort
            .unwrap_or(false)
            .then(|| self.config.batch.resolve_screenshot_dir())
    }

    /// Runs the operator login gate on `page` using the process's stdin/stdout.
    pub async fn manual_login(&self, page: &mut dyn PageDriver) -> Result<()> {
        let _guard = self.login_lock.lock().await;
        let mut input = BufReader::new(tokio::io::stdin());
        let mut output = tokio::io::stdout();
        self.login_gate
            .run(page, &self.profile.home_url, &mut input, &mut output)
            .await?;
        Ok(())
    }

    /// Launches a browser, optionally waits for login, and wraps it as a source.
    pub async fn open_live_source(
        &self,
        profile_dir: Option<String>,
        skip_login: bool,
    ) -> Result<LiveConversationSource> {
        let mut page = launch_page(&self.launch_options(profile_dir)).await?;
        if !skip_login {
            if let Err(e) = self.manual_login(&mut page).await {
                let _ = page.close().await;
                return Err(e);
            }
        }
        Ok(LiveConversationSource::new(Box::new(page), self.session())
            .with_abort_screenshots(self.screenshot_dir()))
    }
}

/// Pool factory: one Chromium per identity, each with its own profile dir.
pub struct ChromiumSourceFactory {
    runtime: ProbeRuntime,
    skip_login: bool,
}

impl ChromiumSourceFactory {
    pub fn new(runtime: ProbeRuntime, skip_login: bool) -> Self {
        Self {
            runtime,
            skip_login,
        }
    }
}

#[async_trait]
impl SourceFactory for ChromiumSourceFactory {
    async fn open(&self, identity: &Identity) -> Result<Box<dyn ConversationSource>> {
        info!("starting browser for identity {}", identity.name);
        let source = self
            .runtime
            .open_live_source(identity.profile_dir.clone(), self.skip_login)
            .await?;
        Ok(Box::new(source))
    }
}
