pub mod csv_repair;
pub mod turn_generator;

pub use turn_generator::{ChatMessage, ChatRole, OpenAiTurnGenerator, TurnGenerator};
