//! Errors raised by host operations.

/// Errors that can occur while a host serves a request or starts up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// No ruleset with this name is registered on the host.
    #[error("unknown ruleset '{0}'")]
    UnknownRuleset(String),

    /// The message body has a shape the engine cannot accept.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A startup seed or hook failed while bringing a host up.
    #[error("host startup failed: {0}")]
    Startup(String),
}

/// Result alias for host operations.
pub type Result<T> = std::result::Result<T, EngineError>;
