//! The session: serialized command dispatch with pacing and retry.
//!
//! A [`Session`] owns one dispatch-loop task. Callers from any number
//! of tasks queue [`Request`]s over a FIFO channel; the loop executes
//! them strictly one at a time in arrival order, enforces the minimum
//! gap between exchanges and applies the retry policy. At most one
//! frame is ever in flight per projector.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::codec::{self, Frame};
use crate::connection::Connection;
use crate::error::JvcError;
use crate::phase::LinkPhase;
use crate::status::{self, PowerState};
use crate::table::CommandTable;
use crate::wire::{self, AckClass, OperationType, ReplyType};

/// Retry backoff stops growing here.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Cadence of power status polls in [`Session::wait_for_power`].
const POWER_POLL_INTERVAL: Duration = Duration::from_secs(1);

// ── SessionConfig ────────────────────────────────────────────────

/// Connection and dispatch policy for one projector.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Host name or address of the projector.
    pub host: String,
    /// Control port. [`wire::DEFAULT_PORT`] unless changed on the device.
    pub port: u16,
    /// Network password, required by the NZ series.
    pub password: Option<String>,
    /// Window for the TCP dial and each handshake read.
    pub connect_timeout: Duration,
    /// Window for each reply frame.
    pub reply_timeout: Duration,
    /// Minimum gap between consecutive exchanges. The device silently
    /// drops commands that arrive faster than it can process them.
    pub command_spacing: Duration,
    /// Re-attempts after a transient failure.
    pub retries: u32,
    /// Backoff before the first re-attempt. Grows 1.5x per attempt,
    /// capped at thirty seconds.
    pub retry_backoff: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>) -> Self {
        SessionConfig {
            host: host.into(),
            port: wire::DEFAULT_PORT,
            password: None,
            connect_timeout: Duration::from_secs(10),
            reply_timeout: Duration::from_secs(5),
            command_spacing: Duration::from_millis(600),
            retries: 3,
            retry_backoff: Duration::from_secs(1),
        }
    }

    pub(crate) fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn grow_backoff(current: Duration) -> Duration {
    current.mul_f32(1.5).min(MAX_BACKOFF)
}

// ── Requests and replies ─────────────────────────────────────────

/// Outcome of one completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// Operation acknowledged by the projector.
    Acked,
    /// Reference answered. `name` carries the table-mapped value when
    /// the command has a named reply vocabulary.
    Value { raw: Vec<u8>, name: Option<String> },
}

impl CommandReply {
    /// Raw reply payload. Empty for acks.
    pub fn raw(&self) -> &[u8] {
        match self {
            CommandReply::Acked => &[],
            CommandReply::Value { raw, .. } => raw,
        }
    }

    /// Mapped value name, if the table knows one.
    pub fn name(&self) -> Option<&str> {
        match self {
            CommandReply::Acked => None,
            CommandReply::Value { name, .. } => name.as_deref(),
        }
    }
}

#[derive(Debug)]
enum RequestBody {
    Operation { command: String, parameter: String },
    Query { command: String },
    Raw { frame: Frame, ack: AckClass },
}

struct Request {
    body: RequestBody,
    done: oneshot::Sender<Result<CommandReply, JvcError>>,
}

/// Completion slot for a queued command.
///
/// Dropping the handle cancels the request if it is still queued. An
/// exchange that already reached the wire runs to completion and its
/// result is discarded; the wire is never disturbed mid-exchange.
#[derive(Debug)]
pub struct CommandHandle {
    rx: oneshot::Receiver<Result<CommandReply, JvcError>>,
}

impl CommandHandle {
    /// Waits for the command to complete.
    pub async fn outcome(self) -> Result<CommandReply, JvcError> {
        self.rx.await?
    }
}

// ── Session ──────────────────────────────────────────────────────

/// Handle to one projector.
///
/// All methods take `&self`; any number of tasks may submit through a
/// shared reference or an `Arc`. Ordering across callers follows queue
/// arrival order.
#[derive(Debug)]
pub struct Session {
    tx: mpsc::UnboundedSender<Request>,
    power: watch::Receiver<PowerState>,
    phase: watch::Receiver<LinkPhase>,
    table: Arc<CommandTable>,
    dispatcher: JoinHandle<()>,
}

impl Session {
    /// Opens a session with the builtin command table.
    ///
    /// No connection is made here. The first command that needs the
    /// wire dials out, so a session to a powered-off projector is
    /// cheap to hold.
    pub fn new(config: SessionConfig) -> Session {
        Session::with_table(config, CommandTable::builtin())
    }

    /// Opens a session with a caller-assembled command table.
    pub fn with_table(config: SessionConfig, table: CommandTable) -> Session {
        let table = Arc::new(table);
        let (tx, rx) = mpsc::unbounded_channel();
        let (power_tx, power_rx) = watch::channel(PowerState::Unknown);
        let (phase_tx, phase_rx) = watch::channel(LinkPhase::Disconnected);
        let dispatcher = tokio::spawn(dispatch_loop(
            rx,
            config,
            Arc::clone(&table),
            power_tx,
            phase_tx,
        ));
        Session {
            tx,
            power: power_rx,
            phase: phase_rx,
            table,
            dispatcher,
        }
    }

    // ── Core operations ──────────────────────────────────────────

    /// Queues an operation and waits for the projector's ack.
    pub async fn submit(&self, command: &str, parameter: &str) -> Result<(), JvcError> {
        self.submit_nowait(command, parameter)?.outcome().await?;
        Ok(())
    }

    /// Queues an operation without waiting for its outcome.
    pub fn submit_nowait(
        &self,
        command: &str,
        parameter: &str,
    ) -> Result<CommandHandle, JvcError> {
        self.enqueue(RequestBody::Operation {
            command: command.to_string(),
            parameter: parameter.to_string(),
        })
    }

    /// Queues a reference command and waits for its value.
    pub async fn query(&self, command: &str) -> Result<CommandReply, JvcError> {
        self.query_nowait(command)?.outcome().await
    }

    /// Queues a reference command without waiting for its outcome.
    pub fn query_nowait(&self, command: &str) -> Result<CommandHandle, JvcError> {
        self.enqueue(RequestBody::Query {
            command: command.to_string(),
        })
    }

    /// Queues a pre-encoded frame, for driving codes the table does not
    /// know. The caller supplies the reply class the projector must
    /// answer with.
    pub fn submit_raw(&self, frame: Frame, ack: AckClass) -> Result<CommandHandle, JvcError> {
        self.enqueue(RequestBody::Raw { frame, ack })
    }

    fn enqueue(&self, body: RequestBody) -> Result<CommandHandle, JvcError> {
        let (done, rx) = oneshot::channel();
        self.tx.send(Request { body, done })?;
        Ok(CommandHandle { rx })
    }

    // ── Convenience layer ────────────────────────────────────────

    /// Presses an infrared remote key by its two-digit code.
    pub async fn remote_code(&self, code: &str) -> Result<(), JvcError> {
        let (frame, ack) = codec::encode_remote(code)?;
        self.submit_raw(frame, ack)?.outcome().await?;
        Ok(())
    }

    pub async fn power_on(&self) -> Result<(), JvcError> {
        self.submit("power", "on").await
    }

    pub async fn power_off(&self) -> Result<(), JvcError> {
        self.submit("power", "off").await
    }

    /// Fresh power state from the device.
    pub async fn power_state(&self) -> Result<PowerState, JvcError> {
        let reply = self.query("power").await?;
        Ok(PowerState::from_wire(reply.raw()))
    }

    /// Last power state seen on the wire. Never touches the network and
    /// starts out [`PowerState::Unknown`].
    pub fn cached_power_state(&self) -> PowerState {
        *self.power.borrow()
    }

    pub async fn is_on(&self) -> Result<bool, JvcError> {
        Ok(self.power_state().await? == PowerState::On)
    }

    /// Polls until the projector reaches `target` or `wait` elapses.
    ///
    /// Polls travel the ordinary queue, so pacing and retry policy
    /// apply. Fails fast when the device reports an emergency.
    pub async fn wait_for_power(
        &self,
        target: PowerState,
        wait: Duration,
    ) -> Result<(), JvcError> {
        let deadline = Instant::now() + wait;
        loop {
            let state = self.power_state().await?;
            if state == target {
                return Ok(());
            }
            if state == PowerState::Emergency {
                return Err(JvcError::Protocol(
                    "projector reports an emergency state".to_string(),
                ));
            }
            if Instant::now() + POWER_POLL_INTERVAL > deadline {
                return Err(JvcError::Timeout(wait));
            }
            sleep(POWER_POLL_INTERVAL).await;
        }
    }

    /// Marketing name of the connected model, or the raw code when the
    /// vendor table does not know it.
    pub async fn model(&self) -> Result<String, JvcError> {
        let reply = self.query("model").await?;
        Ok(match status::model_name(reply.raw()) {
            Some(name) => name.to_string(),
            None => String::from_utf8_lossy(reply.raw()).into_owned(),
        })
    }

    /// Firmware version formatted as `major.minor`.
    pub async fn software_version(&self) -> Result<String, JvcError> {
        let reply = self.query("software_version").await?;
        status::software_version(reply.raw())
    }

    /// Lamp hours counter.
    pub async fn lamp_time(&self) -> Result<u32, JvcError> {
        let reply = self.query("lamp_time").await?;
        status::hex_counter(reply.raw())
    }

    /// Current value of a named command, as the table maps it.
    pub async fn current(&self, command: &str) -> Result<Option<String>, JvcError> {
        let reply = self.query(command).await?;
        Ok(reply.name().map(str::to_string))
    }

    /// Brings up the on-screen info panel.
    pub async fn info(&self) -> Result<(), JvcError> {
        self.submit("info", "").await
    }

    // ── Observability ────────────────────────────────────────────

    /// Link phase as last published by the dispatcher.
    pub fn link_phase(&self) -> LinkPhase {
        self.phase.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.phase.borrow().is_ready()
    }

    /// The command table this session dispatches against.
    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Stops accepting new commands, lets queued work finish and drops
    /// the connection.
    pub async fn close(self) {
        drop(self.tx);
        let _ = self.dispatcher.await;
    }
}

// ── Dispatch loop ────────────────────────────────────────────────

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<Request>,
    config: SessionConfig,
    table: Arc<CommandTable>,
    power: watch::Sender<PowerState>,
    phase: watch::Sender<LinkPhase>,
) {
    debug!(addr = %config.addr(), "dispatcher started");
    let mut conn: Option<Connection> = None;
    let mut last_done: Option<Instant> = None;

    while let Some(req) = rx.recv().await {
        // a caller that stopped waiting while queued costs nothing
        if req.done.is_closed() {
            continue;
        }

        if let Some(done) = last_done {
            let since = done.elapsed();
            if since < config.command_spacing {
                sleep(config.command_spacing - since).await;
            }
        }

        let result = execute(&mut conn, &config, &table, &req.body, &power, &phase).await;
        last_done = Some(Instant::now());

        if let Err(e) = &result {
            warn!(error = %e, "command failed");
        }
        let _ = req.done.send(result);
    }

    if let Some(conn) = conn.take() {
        conn.close().await;
    }
    let _ = phase.send(LinkPhase::Disconnected);
    debug!("dispatcher stopped");
}

/// Runs one request to completion, including the retry policy.
///
/// Caller errors resolve before any network activity. Only transient
/// failures are retried, each retry on a fresh connection after a
/// growing backoff; a NAK or a protocol violation fails immediately.
async fn execute(
    conn: &mut Option<Connection>,
    config: &SessionConfig,
    table: &CommandTable,
    body: &RequestBody,
    power: &watch::Sender<PowerState>,
    phase: &watch::Sender<LinkPhase>,
) -> Result<CommandReply, JvcError> {
    let (frame, ack) = match body {
        RequestBody::Operation { command, parameter } => codec::encode(table, command, parameter)?,
        RequestBody::Query { command } => codec::encode_query(table, command)?,
        RequestBody::Raw { frame, ack } => (frame.clone(), *ack),
    };

    let mut attempt: u32 = 0;
    let mut backoff = config.retry_backoff;
    loop {
        attempt += 1;
        match exchange(conn, config, phase, &frame, ack).await {
            Ok(mut reply) => {
                if let (RequestBody::Query { command }, CommandReply::Value { raw, name }) =
                    (body, &mut reply)
                {
                    *name = table
                        .get(command)
                        .and_then(|spec| spec.reply_name(raw))
                        .map(str::to_string);
                }
                note_power(power, table, &frame, &reply);
                return Ok(reply);
            }
            Err(e) if e.is_transient() && attempt <= config.retries => {
                warn!(attempt, error = %e, "exchange failed, reconnecting");
                discard(conn, phase).await;
                sleep(backoff).await;
                backoff = grow_backoff(backoff);
            }
            Err(e) => {
                // a refused command leaves the link healthy; anything
                // else poisons it
                if !matches!(e, JvcError::Nak { .. }) {
                    discard(conn, phase).await;
                }
                return Err(if e.is_transient() {
                    JvcError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(e),
                    }
                } else {
                    e
                });
            }
        }
    }
}

/// One attempt: ensure the link, send the frame, verify the ack and
/// collect the data frame for references.
async fn exchange(
    conn: &mut Option<Connection>,
    config: &SessionConfig,
    phase: &watch::Sender<LinkPhase>,
    frame: &Frame,
    ack: AckClass,
) -> Result<CommandReply, JvcError> {
    let link = match conn {
        Some(link) => link,
        None => {
            let _ = phase.send(LinkPhase::Connecting);
            let link = match Connection::open(config).await {
                Ok(link) => link,
                Err(e) => {
                    let _ = phase.send(LinkPhase::Disconnected);
                    return Err(e);
                }
            };
            let _ = phase.send(link.phase().clone());
            conn.insert(link)
        }
    };

    link.send(frame.clone()).await?;

    let first = link.recv(config.reply_timeout).await?;
    match first.kind {
        ReplyType::Nak => return Err(JvcError::Nak { class: first.class }),
        ReplyType::Ack if first.class == ack => {}
        ReplyType::Ack => {
            return Err(JvcError::Protocol(format!(
                "ack class {} does not match expected {}",
                first.class, ack
            )));
        }
        ReplyType::Data => {
            return Err(JvcError::Protocol("data frame before ack".to_string()));
        }
    }

    if frame.op() == OperationType::Reference {
        let data = link.recv(config.reply_timeout).await?;
        match data.kind {
            ReplyType::Data if data.class == ack => Ok(CommandReply::Value {
                raw: data.value,
                name: None,
            }),
            ReplyType::Data => Err(JvcError::Protocol(format!(
                "data class {} does not match expected {}",
                data.class, ack
            ))),
            ReplyType::Nak => Err(JvcError::Nak { class: data.class }),
            ReplyType::Ack => Err(JvcError::Protocol(
                "second ack instead of data".to_string(),
            )),
        }
    } else {
        Ok(CommandReply::Acked)
    }
}

/// A successful power status query refreshes the cached state.
fn note_power(
    power: &watch::Sender<PowerState>,
    table: &CommandTable,
    frame: &Frame,
    reply: &CommandReply,
) {
    if frame.op() != OperationType::Reference {
        return;
    }
    let Some(spec) = table.get("power") else {
        return;
    };
    if frame.body() != spec.code() {
        return;
    }
    if let CommandReply::Value { raw, .. } = reply {
        let _ = power.send(PowerState::from_wire(raw));
    }
}

async fn discard(conn: &mut Option<Connection>, phase: &watch::Sender<LinkPhase>) {
    if let Some(conn) = conn.take() {
        conn.close().await;
    }
    let _ = phase.send(LinkPhase::Disconnected);
}
