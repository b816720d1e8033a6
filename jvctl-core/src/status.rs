//! Pure interpreters for projector status replies.
//!
//! Everything here is a function of reply bytes. No I/O, no state.

use crate::error::JvcError;

// ── PowerState ───────────────────────────────────────────────────

/// Power state reported by the power status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PowerState {
    /// Mains on, lamp off.
    Standby,
    /// Fully on and accepting picture commands.
    On,
    /// Lamp off, fans running. Power commands are refused until the
    /// projector settles in standby.
    Cooling,
    /// Lamp striking. Settles to `On`.
    Warming,
    /// Error state. The projector needs attention before it will obey
    /// power commands again.
    Emergency,
    /// Reply code outside the documented set. Newer firmware must not
    /// crash the engine.
    #[default]
    Unknown,
}

impl PowerState {
    /// Decodes the value of a power status reply.
    pub fn from_wire(value: &[u8]) -> PowerState {
        match value {
            b"0" => PowerState::Standby,
            b"1" => PowerState::On,
            b"2" => PowerState::Cooling,
            b"3" => PowerState::Warming,
            b"4" => PowerState::Emergency,
            _ => PowerState::Unknown,
        }
    }

    /// Wire code for this state, `None` for `Unknown`.
    pub fn to_wire(&self) -> Option<&'static [u8]> {
        match self {
            PowerState::Standby => Some(b"0"),
            PowerState::On => Some(b"1"),
            PowerState::Cooling => Some(b"2"),
            PowerState::Warming => Some(b"3"),
            PowerState::Emergency => Some(b"4"),
            PowerState::Unknown => None,
        }
    }

    /// True for states the projector settles in, as opposed to the
    /// transitional warming and cooling phases.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PowerState::Standby | PowerState::On | PowerState::Emergency
        )
    }
}

impl std::fmt::Display for PowerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PowerState::Standby => "standby",
            PowerState::On => "on",
            PowerState::Cooling => "cooling",
            PowerState::Warming => "warming",
            PowerState::Emergency => "emergency",
            PowerState::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

// ── Model identification ─────────────────────────────────────────

/// Model code suffixes to marketing names, per the vendor's external
/// control documentation.
const MODEL_CODES: &[(&str, &str)] = &[
    ("B5A1", "NZ9"),
    ("B5A2", "NZ8"),
    ("B5A3", "NZ7"),
    ("A2B1", "NX9"),
    ("A2B2", "NX7"),
    ("A2B3", "NX5"),
    ("B2A1", "NX9"),
    ("B2A2", "NX7"),
    ("B2A3", "NX5"),
    ("B5B1", "NP5"),
    ("XHR1", "X570R"),
    ("XHR3", "X770R||X970R"),
    ("XHP1", "X5000"),
    ("XHP2", "XC6890"),
    ("XHP3", "X7000||X9000"),
    ("XHK1", "X500R"),
    ("XHK2", "RS4910"),
    ("XHK3", "X700R||X900R"),
];

/// Maps a model reply to the marketing name. The reply carries a vendor
/// string whose last four characters identify the family.
pub fn model_name(raw: &[u8]) -> Option<&'static str> {
    let code = std::str::from_utf8(raw).ok()?;
    let suffix = code.get(code.len().saturating_sub(4)..)?;
    MODEL_CODES
        .iter()
        .find(|(c, _)| *c == suffix)
        .map(|(_, name)| *name)
}

// ── Version and counters ─────────────────────────────────────────

/// Formats a software version reply (`0210PJ`) as a dotted version
/// (`2.10`).
pub fn software_version(raw: &[u8]) -> Result<String, JvcError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| JvcError::Protocol("version reply is not ascii".to_string()))?;
    let digits = text.trim_end_matches("PJ").trim_start_matches('0');
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(JvcError::Protocol(format!(
            "unintelligible version reply {text:?}"
        )));
    }
    Ok(format!("{}.{}", &digits[..1], &digits[1..]))
}

/// Parses a hexadecimal counter reply (lamp hours, laser values).
pub fn hex_counter(raw: &[u8]) -> Result<u32, JvcError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| JvcError::Protocol("counter reply is not ascii".to_string()))?;
    u32::from_str_radix(text.trim(), 16)
        .map_err(|_| JvcError::Protocol(format!("bad counter reply {text:?}")))
}
