//! Native browser management using `chromiumoxide`.
//!
//! This module is the single place that:
//! * finds a usable browser executable (Brave → Chrome → Chromium, cross-platform),
//! * builds a launch config (visible by default, so an operator can log in),
//! * launches a browser with a bounded exponential-backoff retry and hands
//!   back a [`ChromiumPage`] ready to drive.

use anyhow::{anyhow, Result};
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Browser;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

use super::chromium_page::ChromiumPage;

// ── Browser executable discovery ─────────────────────────────────────────────

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan – finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "brave-browser",
            "brave",
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

// ── Launch options ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Persistent user-data dir; this is what keeps an identity logged in.
    pub profile_dir: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: false,
            profile_dir: None,
            width: 1280,
            height: 900,
        }
    }
}

/// Build a `BrowserConfig` for a chat session.
///
/// `--disable-blink-features=AutomationControlled` hides `navigator.webdriver`,
/// which several companion sites check before rendering the chat view.
pub fn build_session_config(exe: &str, opts: &LaunchOptions) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: opts.width,
            height: opts.height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(opts.width, opts.height)
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled");

    if !opts.headless {
        builder = builder.with_head();
    } else {
        builder = builder.arg("--disable-gpu").arg("--no-sandbox");
    }

    if let Some(dir) = opts.profile_dir.as_deref().filter(|d| !d.trim().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow!("Failed to create profile dir {}: {}", dir, e))?;
        builder = builder.user_data_dir(dir);
    }

    builder
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

/// Launch a browser and open a blank tab.
///
/// Launch failures (profile still locked by a dying process, slow startup)
/// are retried with exponential backoff for up to a minute.
pub async fn launch_page(opts: &LaunchOptions) -> Result<ChromiumPage> {
    let exe = find_chrome_executable().ok_or_else(|| {
        anyhow!("No browser found. Install Chrome, Chromium, or Brave. Set CHROME_EXECUTABLE if installed in a non-standard location.")
    })?;

    info!(
        "launching browser ({}) headless={} profile={:?}",
        exe, opts.headless, opts.profile_dir
    );

    let (browser, handler) = retry(
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_secs(1))
            .with_max_interval(Duration::from_secs(10))
            .with_max_elapsed_time(Some(Duration::from_secs(60)))
            .build(),
        || async {
            let config = build_session_config(&exe, opts).map_err(backoff::Error::permanent)?;
            Browser::launch(config).await.map_err(|e| {
                warn!("browser launch failed, will retry: {}", e);
                backoff::Error::transient(anyhow!("Failed to launch browser ({}): {}", exe, e))
            })
        },
    )
    .await?;

    let handler_task = tokio::spawn(async move {
        let mut handler = handler;
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("CDP handler error: {}", e);
            }
        }
    });

    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| anyhow!("Failed to open tab: {}", e))?;

    Ok(ChromiumPage::new(browser, page, handler_task))
}
