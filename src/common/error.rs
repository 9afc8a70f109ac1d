//! Error types for agency-sync

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === Agency Errors ===
    #[error("Agent unreachable: {0}")]
    AgentUnreachable(String),

    #[error("Agency is not serving: {0}")]
    QuorumLost(String),

    #[error("Agency is not healthy: {0}")]
    NotHealthy(String),

    #[error("Malformed agency response: {0}")]
    MalformedResponse(String),

    #[error("Unexpected HTTP status {status} from {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("Leader {0} is not among the known agent connections")]
    LeaderNotFound(String),

    #[error("Agency state not loaded")]
    StateNotLoaded,

    /// Wraps a failure with the identity of the agent that caused it
    #[error("agent {agent}: {source}")]
    Agent {
        agent: String,
        #[source]
        source: Box<Error>,
    },

    // === Network Errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration source error: {0}")]
    Config(#[from] config::ConfigError),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Attach the agent name to an error
    pub fn for_agent(agent: impl Into<String>, source: Error) -> Self {
        Error::Agent {
            agent: agent.into(),
            source: Box::new(source),
        }
    }

    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_)
            | Error::AgentUnreachable(_)
            | Error::QuorumLost(_)
            | Error::LeaderNotFound(_) => true,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::UnexpectedStatus { status, .. } => *status >= 500,
            Error::Agent { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Other(e.to_string())
    }
}
