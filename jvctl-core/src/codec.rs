//! Frame encoding and decoding.
//!
//! Outbound [`Frame`]s, inbound [`Reply`]s and the tokio-util codec
//! gluing them to the TCP stream. Encoding from command names is a pure
//! lookup against the command table; parsing never panics on wire input.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::JvcError;
use crate::table::{self, CommandKind, CommandTable};
use crate::wire::{self, AckClass, OperationType, ReplyType};

/// Prefix for infrared remote key emulation.
const REMOTE_PREFIX: &[u8] = b"RC73";

// ── Frame (outbound) ─────────────────────────────────────────────

/// A single outbound frame: type byte plus body (command code followed
/// by parameter bytes). Unit id and terminator are applied on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    op: OperationType,
    body: Vec<u8>,
}

impl Frame {
    /// Builds a frame from raw body bytes, for callers driving codes
    /// the table does not know.
    pub fn raw(op: OperationType, body: &[u8]) -> Result<Frame, JvcError> {
        // type byte + unit id + terminator
        if body.len() + 4 > wire::MAX_FRAME_LEN {
            return Err(JvcError::Protocol(format!(
                "frame body too long: {} bytes",
                body.len()
            )));
        }
        if body.contains(&wire::TERMINATOR) {
            return Err(JvcError::Protocol(
                "frame body contains the terminator byte".into(),
            ));
        }
        Ok(Frame {
            op,
            body: body.to_vec(),
        })
    }

    pub fn op(&self) -> OperationType {
        self.op
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Full wire form: type byte, unit id, body, terminator.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 4);
        out.push(self.op as u8);
        out.extend_from_slice(&wire::UNIT_ID);
        out.extend_from_slice(&self.body);
        out.push(wire::TERMINATOR);
        out
    }
}

// ── Name-based encoding ──────────────────────────────────────────

/// Encodes an operation frame, validating the command and parameter
/// names against the table. Returns the frame with the reply class the
/// projector must answer with.
pub fn encode(
    table: &CommandTable,
    command: &str,
    parameter: &str,
) -> Result<(Frame, AckClass), JvcError> {
    let spec = table.spec(command)?;
    let unknown_parameter = || JvcError::UnknownParameter {
        command: command.to_string(),
        parameter: parameter.to_string(),
    };
    let body = match spec.kind() {
        CommandKind::Action if parameter.is_empty() => spec.code().to_vec(),
        // queries cannot be submitted, actions take no parameter
        CommandKind::Action | CommandKind::Query => return Err(unknown_parameter()),
        CommandKind::Parameter => {
            let value = spec.parameter_bytes(parameter).ok_or_else(unknown_parameter)?;
            let mut body = spec.code().to_vec();
            body.extend_from_slice(value);
            body
        }
    };
    Ok((
        Frame {
            op: OperationType::Operation,
            body,
        },
        spec.ack(),
    ))
}

/// Encodes the reference (query) form of a command.
pub fn encode_query(table: &CommandTable, command: &str) -> Result<(Frame, AckClass), JvcError> {
    let spec = table.spec(command)?;
    Ok((
        Frame {
            op: OperationType::Reference,
            body: spec.code().to_vec(),
        },
        spec.ack(),
    ))
}

/// Encodes an infrared remote key press: `RC73` plus the two-digit
/// remote code, normalized to uppercase.
pub fn encode_remote(code: &str) -> Result<(Frame, AckClass), JvcError> {
    if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(JvcError::UnknownParameter {
            command: "remote".to_string(),
            parameter: code.to_string(),
        });
    }
    let mut body = REMOTE_PREFIX.to_vec();
    body.extend_from_slice(code.to_ascii_uppercase().as_bytes());
    Ok((
        Frame {
            op: OperationType::Operation,
            body,
        },
        table::ack::MENU,
    ))
}

// ── Reply (inbound) ──────────────────────────────────────────────

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub kind: ReplyType,
    pub class: AckClass,
    /// Payload after the class. Empty for acks and naks.
    pub value: Vec<u8>,
}

impl Reply {
    /// Parses one frame, terminator already stripped.
    pub fn parse(raw: &[u8]) -> Result<Reply, JvcError> {
        let (&type_byte, rest) = raw
            .split_first()
            .ok_or_else(|| JvcError::Protocol("empty frame".to_string()))?;
        let kind = ReplyType::try_from(type_byte)?;

        let unit = rest
            .get(..2)
            .ok_or_else(|| JvcError::Protocol("frame truncated before unit id".to_string()))?;
        if unit != wire::UNIT_ID {
            return Err(JvcError::Protocol(format!(
                "unexpected unit id {:02x?}",
                unit
            )));
        }

        let body = &rest[2..];
        let class = AckClass::from_slice(body)
            .ok_or_else(|| JvcError::Protocol("frame truncated before reply class".to_string()))?;
        let value = body[2..].to_vec();
        if kind != ReplyType::Data && !value.is_empty() {
            return Err(JvcError::Protocol(format!(
                "unexpected payload on {kind} frame"
            )));
        }
        Ok(Reply { kind, class, value })
    }
}

// ── JvcCodec ─────────────────────────────────────────────────────

/// Splits the inbound stream on the frame terminator and parses each
/// frame into a [`Reply`].
#[derive(Debug, Default)]
pub struct JvcCodec;

impl Decoder for JvcCodec {
    type Item = Reply;
    type Error = JvcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Reply>, JvcError> {
        match src.iter().position(|&b| b == wire::TERMINATOR) {
            Some(pos) => {
                let frame = src.split_to(pos + 1);
                Reply::parse(&frame[..pos]).map(Some)
            }
            None if src.len() > wire::MAX_FRAME_LEN => Err(JvcError::Protocol(format!(
                "no terminator within {} bytes",
                src.len()
            ))),
            None => Ok(None),
        }
    }
}

impl Encoder<Frame> for JvcCodec {
    type Error = JvcError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), JvcError> {
        dst.extend_from_slice(&item.to_wire());
        Ok(())
    }
}
