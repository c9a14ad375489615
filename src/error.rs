//! Error taxonomy for command dispatch.
//!
//! Every fault raised while handling a command is converted into a
//! `DispatchError` at the dispatch boundary. Each variant maps to the status
//! code reported to the caller; none of them closes a connection.

use thiserror::Error;

/// Errors surfaced to clients as a status code plus message.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The inbound message could not be decoded.
    #[error("{0}")]
    Protocol(String),

    /// No handler is registered for the method.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// A handler failed (bad parameters or a provider error).
    #[error("{0}")]
    Handler(String),

    /// The capability provider could not read the requested region.
    #[error("{0}")]
    Capture(String),
}

impl DispatchError {
    /// Malformed JSON on the persistent channel.
    pub fn invalid_json() -> Self {
        Self::Protocol("Invalid JSON".to_string())
    }

    /// Shorthand for a handler fault with a formatted message.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Outcome code reported to the client.
    pub fn status(&self) -> u16 {
        match self {
            Self::Protocol(_) => 400,
            Self::UnknownMethod(_) => 404,
            Self::Handler(_) | Self::Capture(_) => 500,
        }
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        Self::Handler(format!("{:#}", err))
    }
}
