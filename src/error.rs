//! Error types for gmail-chat

use thiserror::Error;

/// Result type alias for gmail-chat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gmail-chat
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed credentials: {0}")]
    MalformedCredentials(String),

    #[error("Missing configuration: {}", .0.join(", "))]
    MissingConfiguration(Vec<&'static str>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Prompt template error: {0}")]
    Template(String),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

/// The three conditions a user can see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedCredentials,
    MissingConfiguration,
    AgentInvocationFailure,
}

impl Error {
    /// Classify this error for display at the UI boundary.
    ///
    /// Everything raised by the remote model, template registry or mailbox
    /// is an agent invocation failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedCredentials(_) => ErrorKind::MalformedCredentials,
            Error::MissingConfiguration(_) => ErrorKind::MissingConfiguration,
            _ => ErrorKind::AgentInvocationFailure,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
