use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::page::{Locator, PageDriver};

/// [`PageDriver`] backed by one tab of a chromiumoxide-controlled browser.
pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    closed: bool,
}

impl ChromiumPage {
    pub(crate) fn new(browser: Browser, page: Page, handler_task: JoinHandle<()>) -> Self {
        Self {
            browser,
            page,
            handler_task,
            closed: false,
        }
    }

    async fn element(&self, locator: &Locator) -> Result<Element> {
        let mut elements = self
            .page
            .find_elements(locator.selector.as_str())
            .await
            .map_err(|e| anyhow!("query {} failed: {}", locator, e))?;
        let idx = locator
            .nth
            .resolve(elements.len())
            .ok_or_else(|| anyhow!("no element for {} ({} matches)", locator, elements.len()))?;
        Ok(elements.swap_remove(idx))
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        debug!("navigate: {}", url);
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("goto({}) failed: {}", url, e))?;
        Ok(())
    }

    async fn count(&mut self, selector: &str) -> Result<usize> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| anyhow!("query {} failed: {}", selector, e))?;
        Ok(elements.len())
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        let el = self.element(locator).await?;
        el.click()
            .await
            .map_err(|e| anyhow!("click {} failed: {}", locator, e))?;
        Ok(())
    }

    async fn type_text(&mut self, locator: &Locator, text: &str, submit: bool) -> Result<()> {
        let el = self.element(locator).await?;
        el.click()
            .await
            .map_err(|e| anyhow!("focus {} failed: {}", locator, e))?;
        // Leftover draft text from a failed attempt would be sent along.
        if let Err(e) = el
            .call_js_fn("function() { if ('value' in this) { this.value = ''; } }", false)
            .await
        {
            debug!("clear {} failed: {}", locator, e);
        }
        el.type_str(text)
            .await
            .map_err(|e| anyhow!("type into {} failed: {}", locator, e))?;
        if submit {
            el.press_key("Enter")
                .await
                .map_err(|e| anyhow!("submit {} failed: {}", locator, e))?;
        }
        Ok(())
    }

    async fn read_texts(&mut self, selector: &str) -> Result<Vec<String>> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(|e| anyhow!("query {} failed: {}", selector, e))?;
        let mut texts = Vec::with_capacity(elements.len());
        for el in elements {
            let text = el
                .inner_text()
                .await
                .map_err(|e| anyhow!("read {} failed: {}", selector, e))?;
            texts.push(text.unwrap_or_default());
        }
        Ok(texts)
    }

    async fn wait(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    async fn refresh(&mut self) -> Result<()> {
        self.page
            .reload()
            .await
            .map_err(|e| anyhow!("reload failed: {}", e))?;
        info!("Page refreshed successfully");
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path) -> Result<()> {
        let bytes = self
            .page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(|e| anyhow!("screenshot capture failed: {}", e))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        info!("screenshot saved: {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("browser close failed: {}", e));
        self.handler_task.abort();
        result
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        if !self.closed {
            warn!("ChromiumPage dropped without close(); CDP handler stopped");
        }
        self.handler_task.abort();
    }
}
