//! tool-agent-rs: a lightweight Rust agent that routes free-text
//! instructions (Chinese or English) to a fixed set of typed utility
//! tools: calculator, time, file access and web fetch.
//!
//! Routing is rule-based and deterministic; the same `ToolInvocation`
//! contract would serve an LLM-driven router without touching the tools.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use tool_agent_rs::{AgentConfig, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AgentConfig::default().with_file_root(".");
//!     let mut session = Session::new(&config)?;
//!
//!     let reply = session.handle("计算2+3*4").await;
//!     println!("{}", reply);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod router;
pub mod tools;

pub use config::AgentConfig;
pub use core::{History, HistoryEntry, Session, ToolOutcome};
pub use error::{AgentError, Result};
pub use router::{RuleRouter, ToolInvocation, ToolKind};
pub use tools::{
    CalculatorTool, Clock, FileTool, FixedClock, SystemClock, TimeTool, Tool, ToolRegistry,
    WebTool,
};

#[cfg(feature = "cli")]
pub mod cli;
