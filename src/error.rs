//! Error taxonomy shared by the transport, the run client and the lifecycle.

/// How the transport reacts to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Server asked us to slow down (429, 503 maintenance).
    RateLimited,
    /// Connection problems and 5xx other than maintenance.
    Transient,
    /// Raised immediately, never retried.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("network error: {0}")]
    Network(String),
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("service is in maintenance: {0}")]
    ServiceUnavailable(String),
    #[error("too many requests")]
    RateLimited,
    #[error("{message}")]
    Client { status: u16, message: String },
    #[error("malformed url: {0}")]
    MalformedUrl(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("abort flag raised: {0}")]
    Abort(String),
    #[error("value not yet set: {0}")]
    NotYetSet(String),
    #[error("terminal state reached: {0}")]
    TerminalState(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("malformed document: {0}")]
    Document(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("interrupted")]
    Interrupted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;

impl AgentError {
    /// Classifies the error for the transport retry loop.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            AgentError::RateLimited | AgentError::ServiceUnavailable(_) => RetryClass::RateLimited,
            AgentError::Network(_) | AgentError::Server { .. } => RetryClass::Transient,
            _ => RetryClass::Fatal,
        }
    }

    /// Process exit code for the top-level binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            AgentError::TerminalState(_) => 0,
            AgentError::Config(_) => 2,
            AgentError::Client { .. } | AgentError::MalformedUrl(_) => 3,
            AgentError::NotFound(_) => 4,
            AgentError::Network(_)
            | AgentError::Server { .. }
            | AgentError::ServiceUnavailable(_)
            | AgentError::RateLimited => 5,
            AgentError::Timeout(_) => 6,
            AgentError::Execution(_) => 7,
            AgentError::Abort(_) => 8,
            AgentError::Internal(_) | AgentError::Document(_) => 9,
            AgentError::Io(_) => 10,
            AgentError::NotYetSet(_) => 11,
            AgentError::Interrupted => 130,
        }
    }
}
