use thiserror::Error;

/// Everything that can end a single conversation attempt.
///
/// None of these are fatal to a batch: the driver logs them, runs its
/// recovery action and starts another attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("{op} failed after {attempts} attempts: {last_error}")]
    InteractionFailed {
        op: &'static str,
        attempts: u32,
        last_error: String,
    },

    #[error("turn generation failed: {0}")]
    GenerationFailed(String),

    #[error("no character response found in round {round}")]
    ScrapeEmpty { round: usize },

    #[error("transcript rejected: {reason}")]
    ValidationFailed { reason: String },
}

impl SessionError {
    /// Short label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::InteractionFailed { .. } => "interaction_failed",
            SessionError::GenerationFailed(_) => "generation_failed",
            SessionError::ScrapeEmpty { .. } => "scrape_empty",
            SessionError::ValidationFailed { .. } => "validation_failed",
        }
    }
}
