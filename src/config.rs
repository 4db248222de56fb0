use crate::error::{AgentError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const API_KEY_VAR: &str = "DASHSCOPE_API_KEY";
const API_KEY_PLACEHOLDER: &str = "your-api-key-here";

/// Runtime configuration, resolved once at startup and passed explicitly
/// to the session. No process-wide singletons.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Credential for the hosted model API collaborator.
    pub api_key: String,
    /// Most recent history entries kept per session (FIFO eviction).
    pub max_history: usize,
    /// Root directory the file tool is confined to.
    pub file_root: PathBuf,
    /// Upper bound on any single network call.
    pub request_timeout: Duration,
    /// Optional HTTP(S) proxy for outbound requests.
    pub proxy: Option<String>,
}

impl AgentConfig {
    /// Load configuration from environment variables. A missing or
    /// placeholder API key is the only fatal condition.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var(API_KEY_VAR)
            .ok()
            .filter(|key| !key.is_empty() && key != API_KEY_PLACEHOLDER)
            .ok_or_else(|| AgentError::MissingCredential(API_KEY_VAR.to_string()))?;

        let max_history = env::var("MAX_HISTORY")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(10);

        let file_root = env::var("AGENT_FILE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let timeout_secs = env::var("AGENT_TIMEOUT_SECS")
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(10);

        let proxy = env::var("HTTPS_PROXY")
            .or_else(|_| env::var("HTTP_PROXY"))
            .ok()
            .filter(|value| !value.is_empty());

        Ok(Self {
            api_key,
            max_history,
            file_root,
            request_timeout: Duration::from_secs(timeout_secs),
            proxy,
        })
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn with_file_root(mut self, file_root: impl Into<PathBuf>) -> Self {
        self.file_root = file_root.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for AgentConfig {
    /// Defaults for embedding and tests: no credential required because
    /// the rule-based router never calls the model API.
    fn default() -> Self {
        Self {
            api_key: String::new(),
            max_history: 10,
            file_root: PathBuf::from("."),
            request_timeout: Duration::from_secs(10),
            proxy: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.max_history, 10);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert!(config.proxy.is_none());
    }

    #[test]
    fn test_builders() {
        let config = AgentConfig::default()
            .with_max_history(3)
            .with_file_root("/tmp/sandbox")
            .with_request_timeout(Duration::from_secs(2));
        assert_eq!(config.max_history, 3);
        assert_eq!(config.file_root, PathBuf::from("/tmp/sandbox"));
        assert_eq!(config.request_timeout, Duration::from_secs(2));
    }
}
