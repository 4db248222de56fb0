use thiserror::Error;

/// Main error type for the agent system
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    #[error("Instruction is empty")]
    EmptyInstruction,

    #[error("No tool matches the instruction: {0}")]
    UnroutableInstruction(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Path escapes the configured root: {0}")]
    PathEscapesRoot(String),

    #[error("Unreadable content: {0}")]
    UnreadableFormat(String),

    #[error("Request timed out: {0}")]
    RequestTimeout(String),

    #[error("Request failed with status {status}: {url}")]
    RequestFailed { status: u16, url: String },

    #[error("Invalid response body: {0}")]
    InvalidResponseBody(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Fatal errors abort startup; everything else is reported to the
    /// user and the session keeps accepting instructions.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Config(_) | AgentError::MissingCredential(_)
        )
    }

    /// Get the error code for structured responses
    pub fn error_code(&self) -> &'static str {
        match self {
            AgentError::Config(_) => "CONFIG_ERROR",
            AgentError::MissingCredential(_) => "MISSING_CREDENTIAL",
            AgentError::EmptyInstruction => "EMPTY_INSTRUCTION",
            AgentError::UnroutableInstruction(_) => "UNROUTABLE_INSTRUCTION",
            AgentError::InvalidExpression(_) => "INVALID_EXPRESSION",
            AgentError::UnknownUnit(_) => "UNKNOWN_UNIT",
            AgentError::UnknownTimezone(_) => "UNKNOWN_TIMEZONE",
            AgentError::PathEscapesRoot(_) => "PATH_ESCAPES_ROOT",
            AgentError::UnreadableFormat(_) => "UNREADABLE_FORMAT",
            AgentError::RequestTimeout(_) => "REQUEST_TIMEOUT",
            AgentError::RequestFailed { .. } => "REQUEST_FAILED",
            AgentError::InvalidResponseBody(_) => "INVALID_RESPONSE_BODY",
            AgentError::Serialization(_) => "SERIALIZATION_ERROR",
            AgentError::Io(_) => "IO_ERROR",
            AgentError::ToolExecution(_) => "TOOL_EXECUTION_ERROR",
            AgentError::ToolNotFound(_) => "TOOL_NOT_FOUND",
        }
    }

    /// Convert to a structured error payload
    pub fn to_error_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
                "fatal": self.is_fatal()
            }
        })
    }
}
