//! # jvctl-core
//!
//! Client engine for the JVC D-ILA projector IP control protocol.
//!
//! This crate contains:
//! - **Wire**: handshake tokens, frame grammar, `OperationType` /
//!   `ReplyType` / `AckClass`
//! - **Table**: `CommandTable` mapping command names to wire codes and
//!   parameter vocabularies
//! - **Codec**: `Frame` / `Reply` and `JvcCodec` for framed TCP I/O via
//!   `tokio_util`
//! - **Connection**: authenticated TCP session with the
//!   greeting/request/ack handshake
//! - **Session**: serialized dispatcher with pacing, bounded retry and
//!   a cached power state
//! - **Status**: pure interpreters for power state, model codes and
//!   counters
//! - **Error**: `JvcError`, a typed `thiserror`-based hierarchy
//!
//! ```no_run
//! use jvctl_core::{Session, SessionConfig};
//!
//! # async fn demo() -> Result<(), jvctl_core::JvcError> {
//! let session = Session::new(SessionConfig::new("10.0.0.5"));
//! session.power_on().await?;
//! session.submit("picture_mode", "natural").await?;
//! let state = session.power_state().await?;
//! println!("projector is {state}");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod connection;
pub mod error;
pub mod phase;
pub mod session;
pub mod status;
pub mod table;
pub mod wire;

// ── Re-exports ───────────────────────────────────────────────────

pub use codec::{Frame, JvcCodec, Reply};
pub use connection::Connection;
pub use error::JvcError;
pub use phase::LinkPhase;
pub use session::{CommandHandle, CommandReply, Session, SessionConfig};
pub use status::PowerState;
pub use table::{CommandKind, CommandSpec, CommandTable};
pub use wire::{AckClass, DEFAULT_PORT, OperationType, ReplyType};
