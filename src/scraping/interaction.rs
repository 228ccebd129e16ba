//! Retry-wrapped page primitives.
//!
//! A click or an input is attempted up to [`RetryPolicy::attempts`] times
//! with a fixed delay in between. When every attempt fails the caller gets
//! [`SessionError::InteractionFailed`] and is expected to abandon the
//! conversation and reload the page. Attempts are not idempotent: a failed
//! input may already have put characters into the page.

use std::time::Duration;
use tracing::{debug, error};

use super::page::{Locator, PageDriver};
use crate::core::error::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PageInteractor {
    policy: RetryPolicy,
}

impl PageInteractor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn click(
        &self,
        page: &mut dyn PageDriver,
        locator: &Locator,
    ) -> Result<(), SessionError> {
        self.attempt_with_retry(page, locator, Action::Click).await
    }

    /// Types `text` into `locator`. `submit_with_enter` presses Enter after
    /// typing, for chat inputs that have no send button.
    pub async fn type_and_submit(
        &self,
        page: &mut dyn PageDriver,
        locator: &Locator,
        text: &str,
        submit_with_enter: bool,
    ) -> Result<(), SessionError> {
        self.attempt_with_retry(
            page,
            locator,
            Action::Input {
                text,
                submit: submit_with_enter,
            },
        )
        .await
    }

    async fn attempt_with_retry(
        &self,
        page: &mut dyn PageDriver,
        locator: &Locator,
        action: Action<'_>,
    ) -> Result<(), SessionError> {
        let attempts = self.policy.attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            let outcome = match action {
                Action::Click => page.click(locator).await,
                Action::Input { text, submit } => page.type_text(locator, text, submit).await,
            };
            match outcome {
                Ok(()) => return Ok(()),
                Err(e) => {
                    debug!(
                        "{} failed on {} (attempt {}/{}): {}",
                        action.op(),
                        locator,
                        attempt,
                        attempts,
                        e
                    );
                    last_error = e.to_string();
                }
            }
            if attempt < attempts {
                tokio::time::sleep(self.policy.delay).await;
            }
        }
        error!("{} on {} failed after {} attempts", action.op(), locator, attempts);
        Err(SessionError::InteractionFailed {
            op: action.op(),
            attempts,
            last_error,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Action<'a> {
    Click,
    Input { text: &'a str, submit: bool },
}

impl Action<'_> {
    fn op(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Input { .. } => "input",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use std::path::Path;

    /// Fails the first `fail_first` calls of click/type, then succeeds.
    struct FlakyPage {
        fail_first: usize,
        clicks: usize,
        inputs: usize,
    }

    impl FlakyPage {
        fn new(fail_first: usize) -> Self {
            Self {
                fail_first,
                clicks: 0,
                inputs: 0,
            }
        }
    }

    #[async_trait]
    impl PageDriver for FlakyPage {
        async fn navigate(&mut self, _url: &str) -> Result<()> {
            Ok(())
        }
        async fn count(&mut self, _selector: &str) -> Result<usize> {
            Ok(0)
        }
        async fn click(&mut self, _locator: &Locator) -> Result<()> {
            self.clicks += 1;
            if self.clicks <= self.fail_first {
                Err(anyhow!("element not interactable"))
            } else {
                Ok(())
            }
        }
        async fn type_text(&mut self, _locator: &Locator, _text: &str, _submit: bool) -> Result<()> {
            self.inputs += 1;
            if self.inputs <= self.fail_first {
                Err(anyhow!("element detached"))
            } else {
                Ok(())
            }
        }
        async fn read_texts(&mut self, _selector: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn wait(&mut self, _duration: Duration) {}
        async fn refresh(&mut self) -> Result<()> {
            Ok(())
        }
        async fn screenshot(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }
        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_click_stops_after_three_attempts() {
        let mut page = FlakyPage::new(usize::MAX);
        let interactor = PageInteractor::default();
        let start = tokio::time::Instant::now();

        let err = interactor
            .click(&mut page, &Locator::css("button"))
            .await
            .unwrap_err();

        assert_eq!(page.clicks, 3);
        assert!(matches!(
            err,
            SessionError::InteractionFailed { op: "click", attempts: 3, .. }
        ));
        // Two backoff gaps between three attempts.
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(10) && waited < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_input_stops_after_three_attempts() {
        let mut page = FlakyPage::new(usize::MAX);
        let err = PageInteractor::default()
            .type_and_submit(&mut page, &Locator::css("textarea"), "hi", false)
            .await
            .unwrap_err();
        assert_eq!(page.inputs, 3);
        assert_eq!(err.kind(), "interaction_failed");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_recovers_within_budget() {
        let mut page = FlakyPage::new(2);
        PageInteractor::default()
            .click(&mut page, &Locator::css("button"))
            .await
            .unwrap();
        assert_eq!(page.clicks, 3);
    }

    #[tokio::test]
    async fn first_try_success_does_not_wait() {
        let mut page = FlakyPage::new(0);
        let interactor = PageInteractor::new(RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(3600),
        });
        interactor
            .type_and_submit(&mut page, &Locator::css("textarea"), "hi", true)
            .await
            .unwrap();
        assert_eq!(page.inputs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn input_retries_share_the_click_budget() {
        let policy = RetryPolicy {
            attempts: 2,
            delay: Duration::from_secs(1),
        };
        let interactor = PageInteractor::new(policy);

        let mut page = FlakyPage::new(usize::MAX);
        let click = interactor
            .click(&mut page, &Locator::css("button"))
            .await
            .unwrap_err();
        let input = interactor
            .type_and_submit(&mut page, &Locator::css("textarea"), "hi", false)
            .await
            .unwrap_err();

        assert_eq!((page.clicks, page.inputs), (2, 2));
        assert!(matches!(click, SessionError::InteractionFailed { op: "click", attempts: 2, .. }));
        assert!(matches!(input, SessionError::InteractionFailed { op: "input", attempts: 2, .. }));
    }
}
