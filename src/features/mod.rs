pub mod batch;
pub mod login_gate;
pub mod output_store;
pub mod runtime;
pub mod session;
pub mod worker_pool;

pub use batch::{BatchDriver, ConversationSource, LiveConversationSource};
pub use output_store::{CsvOutputStore, OutputStore};
pub use session::{ConversationSession, SessionState};
pub use worker_pool::{run_pool, PoolOptions, SourceFactory};
