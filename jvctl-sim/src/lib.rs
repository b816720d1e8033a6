//! Protocol simulator for the D-ILA IP control port.
//!
//! Binds a TCP listener that speaks the device side of the protocol:
//! the device-first handshake, ack and data replies, and the lamp
//! warmup/cooldown cycle. Intended for exercising clients without a
//! projector on the bench.

use std::collections::BTreeMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use jvctl_core::wire::{self, OperationType, ReplyType};
use jvctl_core::{AckClass, CommandKind, CommandSpec, CommandTable, PowerState};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

const SOFTWARE_VERSION: &[u8] = b"0210PJ";
const USAGE_COUNTER: &[u8] = b"0064";

// ── Configuration ────────────────────────────────────────────────

/// Simulated device behavior.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Password demanded during the handshake, if any.
    pub password: Option<String>,
    /// Power state the device boots in.
    pub initial_power: PowerState,
    /// Time spent in `warming` before the lamp reports `on`.
    pub warmup: Duration,
    /// Time spent in `cooling` before the lamp reports `standby`.
    pub cooldown: Duration,
    /// Artificial delay before each reply.
    pub reply_delay: Duration,
    /// Model identification string returned for model queries.
    pub model: String,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            password: None,
            initial_power: PowerState::Standby,
            warmup: Duration::from_secs(2),
            cooldown: Duration::from_secs(3),
            reply_delay: Duration::ZERO,
            model: "ILAFPJ -- B5A1".to_string(),
        }
    }
}

// ── Device state ─────────────────────────────────────────────────

struct DeviceState {
    power: PowerState,
    changed_at: Instant,
    settings: BTreeMap<String, Vec<u8>>,
}

impl DeviceState {
    fn new(power: PowerState) -> Self {
        DeviceState {
            power,
            changed_at: Instant::now(),
            settings: BTreeMap::new(),
        }
    }

    /// Commits pending lamp transitions whose timer has elapsed.
    fn settle(&mut self, config: &SimulatorConfig) {
        let settled = match self.power {
            PowerState::Warming if self.changed_at.elapsed() >= config.warmup => PowerState::On,
            PowerState::Cooling if self.changed_at.elapsed() >= config.cooldown => {
                PowerState::Standby
            }
            other => other,
        };
        if settled != self.power {
            debug!(from = %self.power, to = %settled, "lamp transition settled");
            self.power = settled;
            self.changed_at = Instant::now();
        }
    }

    /// Applies a power operation. Only `standby -> warming` and
    /// `on -> cooling` change state; repeated requests are acked and
    /// ignored, like the hardware does.
    fn apply_power(&mut self, param: &[u8], config: &SimulatorConfig) -> bool {
        match param {
            b"1" if self.power == PowerState::Standby => {
                self.power = if config.warmup.is_zero() {
                    PowerState::On
                } else {
                    PowerState::Warming
                };
                self.changed_at = Instant::now();
                true
            }
            b"0" if self.power == PowerState::On => {
                self.power = if config.cooldown.is_zero() {
                    PowerState::Standby
                } else {
                    PowerState::Cooling
                };
                self.changed_at = Instant::now();
                true
            }
            b"0" | b"1" => true,
            _ => false,
        }
    }
}

// ── Simulator ────────────────────────────────────────────────────

struct Shared {
    config: SimulatorConfig,
    table: CommandTable,
    state: Mutex<DeviceState>,
}

/// A listening simulator. [`run`](Simulator::run) serves connections
/// until the task is dropped.
pub struct Simulator {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl Simulator {
    pub async fn bind(addr: &str, config: SimulatorConfig) -> io::Result<Simulator> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "simulator listening");
        let state = Mutex::new(DeviceState::new(config.initial_power));
        Ok(Simulator {
            listener,
            shared: Arc::new(Shared {
                config,
                table: CommandTable::builtin(),
                state,
            }),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                debug!(%peer, "client connected");
                if let Err(e) = serve_connection(stream, shared).await {
                    debug!(%peer, error = %e, "connection ended");
                }
                debug!(%peer, "client disconnected");
            });
        }
    }
}

// ── Connection handling ──────────────────────────────────────────

enum Outgoing {
    Ack(AckClass),
    Data(AckClass, Vec<u8>),
    Nak(AckClass),
}

async fn serve_connection(mut stream: TcpStream, shared: Arc<Shared>) -> io::Result<()> {
    // device-first handshake
    stream.write_all(wire::GREETING).await?;

    let mut expected = wire::REQUEST.to_vec();
    if let Some(password) = &shared.config.password {
        expected.push(wire::PASSWORD_SEPARATOR);
        expected.extend_from_slice(password.as_bytes());
    }

    let mut request = [0u8; 64];
    let n = stream.read(&mut request).await?;
    if request[..n] != expected[..] {
        warn!(
            request = %request[..n].escape_ascii(),
            "handshake request refused"
        );
        stream.write_all(wire::REFUSED).await?;
        return Ok(());
    }
    stream.write_all(wire::GRANTED).await?;

    let mut link = BufReader::new(stream);
    let mut frame = Vec::new();
    loop {
        frame.clear();
        let n = link.read_until(wire::TERMINATOR, &mut frame).await?;
        if n == 0 {
            return Ok(());
        }
        if frame.pop() != Some(wire::TERMINATOR) {
            warn!("connection closed mid-frame");
            return Ok(());
        }
        if frame.len() > wire::MAX_FRAME_LEN {
            warn!(len = frame.len(), "oversized frame, dropping client");
            return Ok(());
        }

        let reply = {
            let mut state = shared
                .state
                .lock()
                .map_err(|e| io::Error::other(format!("device state poisoned: {e}")))?;
            state.settle(&shared.config);
            evaluate(&frame, &shared.table, &shared.config, &mut state)
        };
        let Some(reply) = reply else {
            warn!(frame = %frame.escape_ascii(), "unintelligible frame, dropping client");
            return Ok(());
        };

        if !shared.config.reply_delay.is_zero() {
            tokio::time::sleep(shared.config.reply_delay).await;
        }
        match reply {
            Outgoing::Ack(class) => {
                link.write_all(&reply_frame(ReplyType::Ack, class, b"")).await?;
            }
            Outgoing::Data(class, value) => {
                link.write_all(&reply_frame(ReplyType::Ack, class, b"")).await?;
                link.write_all(&reply_frame(ReplyType::Data, class, &value)).await?;
            }
            Outgoing::Nak(class) => {
                link.write_all(&reply_frame(ReplyType::Nak, class, b"")).await?;
            }
        }
    }
}

fn reply_frame(kind: ReplyType, class: AckClass, value: &[u8]) -> Vec<u8> {
    let mut out = vec![kind as u8];
    out.extend_from_slice(&wire::UNIT_ID);
    out.extend_from_slice(&class.as_bytes());
    out.extend_from_slice(value);
    out.push(wire::TERMINATOR);
    out
}

/// Decides the reply to one inbound frame. `None` means the frame is
/// too mangled to even refuse.
fn evaluate(
    frame: &[u8],
    table: &CommandTable,
    config: &SimulatorConfig,
    state: &mut DeviceState,
) -> Option<Outgoing> {
    let (&type_byte, rest) = frame.split_first()?;
    let op = OperationType::try_from(type_byte).ok()?;
    let body = rest.strip_prefix(&wire::UNIT_ID[..])?;

    let Some((name, spec, param)) = table.classify(body) else {
        debug!(body = %body.escape_ascii(), "unknown command code");
        return Some(Outgoing::Nak(AckClass::from_slice(body)?));
    };

    match op {
        OperationType::Operation => {
            let accepted = match spec.kind() {
                CommandKind::Query => false,
                CommandKind::Action => param.is_empty(),
                CommandKind::Parameter if name == "power" => state.apply_power(param, config),
                CommandKind::Parameter => {
                    if spec.reply_name(param).is_some() {
                        state.settings.insert(name.to_string(), param.to_vec());
                        true
                    } else {
                        false
                    }
                }
            };
            if accepted {
                debug!(command = name, param = %param.escape_ascii(), "operation applied");
                Some(Outgoing::Ack(spec.ack()))
            } else {
                debug!(command = name, param = %param.escape_ascii(), "operation refused");
                Some(Outgoing::Nak(spec.ack()))
            }
        }
        OperationType::Reference if !param.is_empty() => Some(Outgoing::Nak(spec.ack())),
        OperationType::Reference => {
            let value = reply_value(state, name, spec, config);
            debug!(command = name, value = %value.escape_ascii(), "reference answered");
            Some(Outgoing::Data(spec.ack(), value))
        }
    }
}

fn reply_value(
    state: &DeviceState,
    name: &str,
    spec: &CommandSpec,
    config: &SimulatorConfig,
) -> Vec<u8> {
    match name {
        "power" => state.power.to_wire().unwrap_or(b"0").to_vec(),
        "model" => config.model.as_bytes().to_vec(),
        "software_version" => SOFTWARE_VERSION.to_vec(),
        "lamp_time" | "laser_value" => USAGE_COUNTER.to_vec(),
        "source_status" => b"1".to_vec(),
        "source_display" => b"08".to_vec(),
        "hdr_data" => b"0".to_vec(),
        _ => state
            .settings
            .get(name)
            .cloned()
            .or_else(|| {
                // unset parameters report the first declared value
                let first = spec.parameters().next()?;
                Some(spec.parameter_bytes(first)?.to_vec())
            })
            .unwrap_or_else(|| b"0".to_vec()),
    }
}
