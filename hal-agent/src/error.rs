use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

/// Reply used when the agent ran but produced nothing usable.
pub const FALLBACK_REPLY: &str = "I'm here \u{2014} can you rephrase that?";
/// Reply used when the agent did not finish within its time bound.
pub const TIMEOUT_REPLY: &str = "Thinking took too long. Please try again.";
/// Reply used when the agent could not be started at all.
pub const SYSTEM_ERROR_REPLY: &str = "System error processing request.";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to spawn agent {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("agent timed out after {0:?}")]
    Timeout(Duration),

    #[error("agent exited with status {code}: {stderr}")]
    ExitStatus { code: i32, stderr: String },

    #[error("agent returned empty output")]
    EmptyOutput,

    #[error("agent output contained no text parts")]
    NoText,

    #[error("io error: {0}")]
    Io(String),
}

impl AgentError {
    /// User-facing text sent in place of a response when this error occurs.
    pub fn fallback_reply(&self) -> &'static str {
        match self {
            Self::Timeout(_) => TIMEOUT_REPLY,
            Self::Spawn { .. } | Self::Io(_) => SYSTEM_ERROR_REPLY,
            Self::ExitStatus { .. } | Self::EmptyOutput | Self::NoText => FALLBACK_REPLY,
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}
