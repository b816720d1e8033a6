//! Domain-specific error types for the projector control engine.
//!
//! All fallible operations return `Result<T, JvcError>`.
//! No panics on input received from the wire. Every error is typed, and
//! [`JvcError::is_transient`] tells the dispatcher which failures may be
//! retried on a fresh connection.

use std::time::Duration;
use thiserror::Error;

use crate::wire::AckClass;

/// The canonical error type for the projector control engine.
#[derive(Debug, Error)]
pub enum JvcError {
    // ── Connection Errors ────────────────────────────────────────
    /// The TCP connection could not be established.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The greeting/request/ack exchange did not complete as expected.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// The projector rejected the connection request (`PJNAK`), which
    /// means a missing or incorrect network password.
    #[error("authentication rejected by projector")]
    Auth,

    /// No reply arrived within the configured window.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The connection dropped mid-exchange.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A reply frame was malformed or did not match the expectation
    /// for the command in flight.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The projector answered with a negative acknowledgment.
    #[error("command refused by projector ({class})")]
    Nak { class: AckClass },

    // ── Caller Errors ────────────────────────────────────────────
    /// The command name is not present in the command table.
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    /// The parameter name is not valid for the given command.
    #[error("unknown parameter {parameter:?} for command {command:?}")]
    UnknownParameter { command: String, parameter: String },

    // ── Engine Errors ────────────────────────────────────────────
    /// Every attempt at a transiently failing exchange was used up.
    #[error("gave up after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<JvcError>,
    },

    /// The session's dispatch loop is no longer running.
    #[error("session closed")]
    SessionClosed,
}

impl JvcError {
    /// True for failures the dispatcher may retry on a fresh connection.
    ///
    /// Handshake and authentication failures are not transient; a bad
    /// password stays bad.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            JvcError::Connect { .. } | JvcError::Timeout(_) | JvcError::ConnectionLost(_)
        )
    }
}

// ── Conversions ──────────────────────────────────────────────────

/// I/O failures outside connection setup mean the link is gone.
impl From<std::io::Error> for JvcError {
    fn from(e: std::io::Error) -> Self {
        JvcError::ConnectionLost(e.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for JvcError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        JvcError::SessionClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for JvcError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        JvcError::SessionClosed
    }
}
