//! Connection lifecycle state machine.
//!
//! Provides a `LinkPhase` enum modeling the life of one projector
//! connection, with validated transitions that return `Result` instead
//! of panicking.

use std::time::Instant;

use crate::error::JvcError;

// ── LinkPhase ────────────────────────────────────────────────────

/// The current phase of the projector link.
///
/// ```text
///  Disconnected ──► Connecting ──► Handshaking ──► Ready
///        ▲               │               │            │
///        └───────────────┴───────────────┴────────────┘
/// ```
///
/// There is no goodbye sequence in this protocol; a close or a failure
/// in any phase drops straight back to `Disconnected`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LinkPhase {
    /// No active connection. Initial / terminal state.
    #[default]
    Disconnected,

    /// TCP connection initiated but not yet established.
    Connecting,

    /// TCP link is up; exchanging the greeting/request/ack sequence.
    Handshaking,

    /// Handshake accepted; the command channel is open.
    Ready {
        /// When the link became ready.
        since: Instant,
    },
}

impl std::fmt::Display for LinkPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Handshaking => write!(f, "Handshaking"),
            Self::Ready { .. } => write!(f, "Ready"),
        }
    }
}

impl LinkPhase {
    /// Returns `true` when the link is up and commands may be sent.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected)
    }

    /// How long the link has been ready, `None` in any other phase.
    pub fn ready_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Ready { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Transition to `Connecting`.
    ///
    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), JvcError> {
        match self {
            Self::Disconnected => {
                *self = Self::Connecting;
                Ok(())
            }
            other => Err(JvcError::Protocol(format!(
                "cannot connect while {other}"
            ))),
        }
    }

    /// Transition to `Handshaking`.
    ///
    /// Valid from: `Connecting`.
    pub fn begin_handshake(&mut self) -> Result<(), JvcError> {
        match self {
            Self::Connecting => {
                *self = Self::Handshaking;
                Ok(())
            }
            other => Err(JvcError::Protocol(format!(
                "cannot handshake while {other}"
            ))),
        }
    }

    /// Transition to `Ready`.
    ///
    /// Valid from: `Handshaking`.
    pub fn complete_handshake(&mut self) -> Result<(), JvcError> {
        match self {
            Self::Handshaking => {
                *self = Self::Ready {
                    since: Instant::now(),
                };
                Ok(())
            }
            other => Err(JvcError::Protocol(format!(
                "cannot complete handshake while {other}"
            ))),
        }
    }

    /// Reset to `Disconnected` from any phase. Used both for normal
    /// close and for failures mid-stream.
    pub fn disconnect(&mut self) {
        *self = Self::Disconnected;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_lifecycle() {
        let mut phase = LinkPhase::Disconnected;

        phase.begin_connect().unwrap();
        assert_eq!(phase, LinkPhase::Connecting);

        phase.begin_handshake().unwrap();
        assert_eq!(phase, LinkPhase::Handshaking);

        phase.complete_handshake().unwrap();
        assert!(phase.is_ready());
        assert!(phase.ready_duration().is_some());

        phase.disconnect();
        assert!(phase.is_disconnected());
    }

    #[test]
    fn invalid_transition_connect_when_ready() {
        let mut phase = LinkPhase::Ready {
            since: Instant::now(),
        };
        assert!(phase.begin_connect().is_err());
    }

    #[test]
    fn invalid_transition_handshake_from_disconnected() {
        let mut phase = LinkPhase::Disconnected;
        assert!(phase.begin_handshake().is_err());
    }

    #[test]
    fn invalid_transition_complete_handshake_from_connecting() {
        let mut phase = LinkPhase::Connecting;
        assert!(phase.complete_handshake().is_err());
    }

    #[test]
    fn disconnect_from_any_phase() {
        for mut phase in [
            LinkPhase::Disconnected,
            LinkPhase::Connecting,
            LinkPhase::Handshaking,
            LinkPhase::Ready {
                since: Instant::now(),
            },
        ] {
            phase.disconnect();
            assert!(phase.is_disconnected());
        }
    }

    #[test]
    fn display_format() {
        assert_eq!(LinkPhase::Disconnected.to_string(), "Disconnected");
        assert_eq!(LinkPhase::Connecting.to_string(), "Connecting");
        assert_eq!(LinkPhase::Handshaking.to_string(), "Handshaking");
        assert_eq!(
            LinkPhase::Ready {
                since: Instant::now()
            }
            .to_string(),
            "Ready"
        );
    }

    #[test]
    fn default_phase_is_disconnected() {
        let phase = LinkPhase::default();
        assert!(phase.is_disconnected());
    }
}
