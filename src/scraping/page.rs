//! The opaque page capability the conversation logic drives.
//!
//! Everything above this module talks to a browser tab only through
//! [`PageDriver`]. Elements are addressed by a [`Locator`] (CSS selector +
//! which match to use) rather than by live handles, so a driver is free to
//! re-query the DOM on every call.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Which of the elements matching a selector to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Nth {
    First,
    Last,
    Index(usize),
}

impl Nth {
    /// Resolves against a match count; `None` when out of range.
    pub fn resolve(self, len: usize) -> Option<usize> {
        match self {
            Nth::First if len > 0 => Some(0),
            Nth::Last if len > 0 => Some(len - 1),
            Nth::Index(i) if i < len => Some(i),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub selector: String,
    pub nth: Nth,
}

impl Locator {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            nth: Nth::First,
        }
    }

    pub fn nth(mut self, index: usize) -> Self {
        self.nth = Nth::Index(index);
        self
    }

    pub fn last(mut self) -> Self {
        self.nth = Nth::Last;
        self
    }
}

impl std::fmt::Display for Locator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.nth {
            Nth::First => write!(f, "{}", self.selector),
            Nth::Last => write!(f, "{} (last)", self.selector),
            Nth::Index(i) => write!(f, "{} [{}]", self.selector, i),
        }
    }
}

#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Number of elements currently matching `selector`.
    async fn count(&mut self, selector: &str) -> Result<usize>;

    async fn click(&mut self, locator: &Locator) -> Result<()>;

    /// Types `text` into the element; presses Enter afterwards when `submit` is set.
    async fn type_text(&mut self, locator: &Locator, text: &str, submit: bool) -> Result<()>;

    /// Visible text of every element matching `selector`, in document order.
    async fn read_texts(&mut self, selector: &str) -> Result<Vec<String>>;

    async fn wait(&mut self, duration: Duration);

    async fn refresh(&mut self) -> Result<()>;

    async fn screenshot(&mut self, path: &Path) -> Result<()>;

    async fn close(&mut self) -> Result<()>;
}
