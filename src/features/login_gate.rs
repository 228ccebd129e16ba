//! Operator login gate.
//!
//! Logging in is left to a human: the browser is parked on the home page
//! and the operator is asked to confirm. Any answer other than `y` waits one
//! poll interval and asks again, until the overall deadline passes.

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{error, info};

use crate::scraping::page::PageDriver;

pub const LOGIN_PROMPT: &str = "Have you completed the login? (y/n): ";

#[derive(Debug, Error)]
pub enum LoginGateError {
    #[error("login not confirmed within {0:?}")]
    TimedOut(Duration),
    #[error("operator input closed before login was confirmed")]
    Closed,
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct LoginGate {
    pub timeout: Duration,
    pub poll: Duration,
}

impl Default for LoginGate {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            poll: Duration::from_secs(10),
        }
    }
}

impl LoginGate {
    pub fn new(timeout: Duration, poll: Duration) -> Self {
        Self { timeout, poll }
    }

    /// Prompts on `output` and reads answers from `input` until the operator
    /// answers `y` or the deadline passes.
    pub async fn confirm<R, W>(&self, input: &mut R, output: &mut W) -> Result<(), LoginGateError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let deadline = Instant::now() + self.timeout;
        let mut line = String::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            output.write_all(LOGIN_PROMPT.as_bytes()).await?;
            output.flush().await?;

            line.clear();
            match tokio::time::timeout(remaining, input.read_line(&mut line)).await {
                Err(_) => break,
                Ok(Ok(0)) => return Err(LoginGateError::Closed),
                Ok(Ok(_)) if line.trim().eq_ignore_ascii_case("y") => {
                    info!("User has confirmed login");
                    return Ok(());
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(e.into()),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.poll.min(remaining)).await;
        }
        error!("Login timed out");
        Err(LoginGateError::TimedOut(self.timeout))
    }

    /// Parks `page` on `home_url`, waits for the operator, then returns to
    /// `home_url` in case the login flow navigated elsewhere.
    pub async fn run<R, W>(
        &self,
        page: &mut dyn PageDriver,
        home_url: &str,
        input: &mut R,
        output: &mut W,
    ) -> Result<(), LoginGateError>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        page.navigate(home_url)
            .await
            .map_err(|e| LoginGateError::Navigation(e.to_string()))?;
        info!("Waiting for manual login at {}", home_url);
        output
            .write_all(b"Please log in manually in the browser window.\n")
            .await?;
        self.confirm(input, output).await?;
        page.navigate(home_url)
            .await
            .map_err(|e| LoginGateError::Navigation(e.to_string()))?;
        Ok(())
    }
}
