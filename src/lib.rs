pub mod core;
pub mod features;
pub mod nlp;
pub mod scraping;
pub mod tools;

// --- Primary core exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::{PhraseBook, ProbeConfig, SessionError};

// --- Short module paths ---
pub use features::{batch, output_store, session, worker_pool};
pub use nlp::{farewell_analysis, phrase_matcher};
pub use tools::{csv_repair, turn_generator};
