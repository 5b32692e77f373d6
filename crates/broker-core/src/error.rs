//! Error taxonomy for transport and peer-client boundaries.
//!
//! `TransportError` is the unified error for a full dial/write/read
//! exchange; `SendError` is reserved for the fire-and-forget write-only leg
//! of `claim_console`, splitting fatal-vs-transient the way a write with
//! no paired read needs to.

use std::fmt;

/// Error raised by the [`crate::transport::Transport`] dial/write/read cycle.
#[derive(Debug)]
pub enum TransportError {
    /// No listener at this pipe name, or the dial timed out.
    Unreachable(std::io::Error),
    /// The connection dropped mid-exchange (write failed, or EOF mid-read).
    Broken(std::io::Error),
    /// A declared frame length violates the framing safety rules (negative,
    /// zero when a body was expected, or over the control-message cap).
    Framing(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Unreachable(e) => write!(f, "pipe unreachable: {e}"),
            TransportError::Broken(e) => write!(f, "connection broken: {e}"),
            TransportError::Framing(msg) => write!(f, "framing error: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl TransportError {
    /// Dead-pipe errors should cause the caller to clear the pipe from the
    /// session manager.
    pub fn is_dead_pipe(&self) -> bool {
        matches!(self, TransportError::Unreachable(_) | TransportError::Broken(_))
    }
}

/// Error raised when forwarding a request to the peer.
///
/// Fatal: the pipe must be considered dead. Transient: the caller may retry
/// against a different pipe.
#[derive(Debug)]
pub enum SendError {
    Fatal(anyhow::Error),
    Transient(anyhow::Error),
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Fatal(e) => write!(f, "fatal: {e:#}"),
            SendError::Transient(e) => write!(f, "transient: {e:#}"),
        }
    }
}

impl std::error::Error for SendError {}

impl From<TransportError> for SendError {
    fn from(value: TransportError) -> Self {
        if value.is_dead_pipe() {
            SendError::Fatal(anyhow::Error::new(value))
        } else {
            SendError::Transient(anyhow::Error::new(value))
        }
    }
}
