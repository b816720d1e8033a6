//! Wire-level vocabulary of the projector control protocol.
//!
//! Byte constants and type tags shared by the codec, the connection
//! handshake and the simulator. Unknown bytes surface as typed errors
//! through `TryFrom`, never as panics.

use crate::error::JvcError;
use std::fmt;

// ── Handshake tokens ─────────────────────────────────────────────

/// Sent by the projector immediately after accepting the TCP connection.
pub const GREETING: &[u8] = b"PJ_OK";

/// Connection request sent by the client. Password-protected models
/// expect `PJREQ_<password>` instead.
pub const REQUEST: &[u8] = b"PJREQ";

/// Connection granted, the command channel is open.
pub const GRANTED: &[u8] = b"PJACK";

/// Connection refused, wrong or missing network password.
pub const REFUSED: &[u8] = b"PJNAK";

/// Joins [`REQUEST`] and the password on protected models.
pub const PASSWORD_SEPARATOR: u8 = b'_';

/// Default TCP port of the projector's control service.
pub const DEFAULT_PORT: u16 = 20554;

// ── Frame grammar ────────────────────────────────────────────────

/// Unit id following the type byte in every frame. Constant for the
/// whole D-ILA family.
pub const UNIT_ID: [u8; 2] = [0x89, 0x01];

/// Every frame ends with a line feed.
pub const TERMINATOR: u8 = 0x0A;

/// Frames are a handful of bytes. A buffer growing past this without a
/// terminator is not speaking this protocol.
pub const MAX_FRAME_LEN: usize = 64;

// ── OperationType ────────────────────────────────────────────────

/// First byte of an outbound frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// State-changing command. Acknowledged, returns no data.
    Operation = b'!',
    /// Reference (query). Acknowledged, then answered with a data frame.
    Reference = b'?',
}

impl TryFrom<u8> for OperationType {
    type Error = JvcError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'!' => Ok(OperationType::Operation),
            b'?' => Ok(OperationType::Reference),
            _ => Err(JvcError::Protocol(format!(
                "unknown operation type byte {value:#04x}"
            ))),
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Operation => write!(f, "operation"),
            OperationType::Reference => write!(f, "reference"),
        }
    }
}

// ── ReplyType ────────────────────────────────────────────────────

/// First byte of an inbound frame.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyType {
    /// Positive acknowledgment of a received command.
    Ack = 0x06,
    /// Data frame answering a reference command.
    Data = b'@',
    /// Negative acknowledgment, the command was refused.
    Nak = 0x15,
}

impl TryFrom<u8> for ReplyType {
    type Error = JvcError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x06 => Ok(ReplyType::Ack),
            b'@' => Ok(ReplyType::Data),
            0x15 => Ok(ReplyType::Nak),
            _ => Err(JvcError::Protocol(format!(
                "unknown reply type byte {value:#04x}"
            ))),
        }
    }
}

impl fmt::Display for ReplyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyType::Ack => write!(f, "ack"),
            ReplyType::Data => write!(f, "data"),
            ReplyType::Nak => write!(f, "nak"),
        }
    }
}

// ── AckClass ─────────────────────────────────────────────────────

/// Two-byte class code carried by every reply, identifying the command
/// family being answered (`PW`, `PM`, `IS`, ...).
///
/// The dispatcher compares the class of each inbound frame against the
/// class the command table expects for the command in flight.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AckClass([u8; 2]);

impl AckClass {
    pub const fn new(bytes: [u8; 2]) -> Self {
        AckClass(bytes)
    }

    /// Reads a class from the start of a reply body.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let pair: [u8; 2] = bytes.get(..2)?.try_into().ok()?;
        Some(AckClass(pair))
    }

    pub fn as_bytes(&self) -> [u8; 2] {
        self.0
    }
}

impl fmt::Display for AckClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

impl fmt::Debug for AckClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AckClass(\"{}\")", self.0.escape_ascii())
    }
}
