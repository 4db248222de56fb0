//! Conversation session: routes each instruction, executes the selected
//! tool, records the turn in bounded history, and always returns a
//! user-readable message. Instructions are processed strictly one at a
//! time; a tool-level failure never terminates the session.

use crate::config::AgentConfig;
use crate::core::history::{History, HistoryEntry, ToolOutcome};
use crate::error::{AgentError, Result};
use crate::router::RuleRouter;
use crate::tools::{CalculatorTool, FileTool, TimeTool, ToolRegistry, WebTool};
use chrono::Utc;
use tracing::{info, warn};

const FALLBACK_MESSAGE: &str =
    "Sorry, I could not match that instruction to a tool. Try a calculation (计算2+3), \
     a time query (今天星期几), a file operation (读取data.txt) or a URL.";

/// A single-user conversation over the four fixed tools.
#[derive(Debug)]
pub struct Session {
    router: RuleRouter,
    registry: ToolRegistry,
    history: History,
}

impl Session {
    /// Build a session with the standard four tools wired from config.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool::new());
        registry.register(TimeTool::new());
        registry.register(FileTool::new(&config.file_root)?.with_timeout(config.request_timeout));
        registry.register(WebTool::new(config.request_timeout, config.proxy.as_deref())?);

        Ok(Self::with_registry(registry, config.max_history))
    }

    /// Build a session around a prepared registry (used by tests to
    /// inject fixed clocks or temp roots).
    pub fn with_registry(registry: ToolRegistry, max_history: usize) -> Self {
        Self {
            router: RuleRouter::new(),
            registry,
            history: History::new(max_history),
        }
    }

    /// Dispatch one instruction and return the text to show the user.
    /// Every outcome, success or failure, lands in history.
    pub async fn handle(&mut self, instruction: &str) -> String {
        let outcome = self.dispatch(instruction).await;
        let reply = match &outcome {
            Ok(payload) => payload.clone(),
            Err(error) => friendly_message(error),
        };

        let outcome = match outcome {
            Ok(payload) => ToolOutcome::success(payload),
            Err(error) => ToolOutcome::failure(error.to_string(), error.error_code()),
        };
        self.history.push(HistoryEntry {
            instruction: instruction.to_string(),
            outcome,
            timestamp: Utc::now(),
        });

        reply
    }

    async fn dispatch(&self, instruction: &str) -> Result<String> {
        let invocation = self.router.route(instruction)?;
        info!(
            target: "tool_agent::session",
            tool = invocation.tool.name(),
            "routed instruction"
        );

        let value = self
            .registry
            .execute(invocation.tool.name(), invocation.arguments)
            .await
            .map_err(|error| {
                warn!(
                    target: "tool_agent::session",
                    tool = invocation.tool.name(),
                    code = error.error_code(),
                    "tool failed"
                );
                error
            })?;

        Ok(match value {
            serde_json::Value::String(text) => text,
            other => other.to_string(),
        })
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Names and descriptions of the registered tools, for `/tools`.
    pub fn tool_summaries(&self) -> Vec<(&'static str, &'static str)> {
        self.registry.summaries()
    }
}

/// Render an error as a message for the user. The session stays alive,
/// so these are phrased as replies, not crashes.
fn friendly_message(error: &AgentError) -> String {
    match error {
        AgentError::EmptyInstruction => "Please enter an instruction.".to_string(),
        AgentError::UnroutableInstruction(_) => FALLBACK_MESSAGE.to_string(),
        other => format!("{} [{}]", other, other.error_code()),
    }
}
