pub mod config;
pub mod error;
pub mod phrases;
pub mod types;

pub use config::ProbeConfig;
pub use error::SessionError;
pub use phrases::PhraseBook;
