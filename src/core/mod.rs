//! Session state: bounded conversation history and the dispatch loop

pub mod history;
pub mod session;

pub use history::{History, HistoryEntry, ToolOutcome};
pub use session::Session;
