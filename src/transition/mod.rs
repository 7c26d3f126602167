pub mod config;
pub mod orchestrator;
pub mod sentinel;
pub mod state;

pub use config::*;
pub use orchestrator::*;
pub use sentinel::{SentinelInterceptor, SentinelWrite, FINAL_MARKER};
pub use state::*;
