//! The projector connection: TCP link plus protocol handshake.
//!
//! One `Connection` is one authenticated session. The dispatcher owns
//! at most one at a time and replaces it wholesale after transport
//! failures; nothing in this module retries.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::codec::{Frame, JvcCodec, Reply};
use crate::error::JvcError;
use crate::phase::LinkPhase;
use crate::session::SessionConfig;
use crate::wire;

/// An authenticated projector connection.
#[derive(Debug)]
pub struct Connection {
    framed: Framed<TcpStream, JvcCodec>,
    phase: LinkPhase,
    addr: String,
}

impl Connection {
    /// Connects and performs the greeting/request/ack handshake.
    ///
    /// The configured connect timeout covers the TCP dial and each
    /// handshake read. A `PJNAK` verdict surfaces as [`JvcError::Auth`]
    /// and must not be retried.
    pub async fn open(config: &SessionConfig) -> Result<Connection, JvcError> {
        let addr = config.addr();
        let mut phase = LinkPhase::default();
        phase.begin_connect()?;

        debug!(%addr, "connecting to projector");
        let mut stream = match timeout(config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(JvcError::Connect { addr, source: e }),
            Err(_) => {
                return Err(JvcError::Connect {
                    addr,
                    source: std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("no route within {:?}", config.connect_timeout),
                    ),
                });
            }
        };

        phase.begin_handshake()?;
        handshake(&mut stream, config.password.as_deref(), config.connect_timeout).await?;
        phase.complete_handshake()?;
        debug!(%addr, "handshake accepted");

        Ok(Connection {
            framed: Framed::new(stream, JvcCodec),
            phase,
            addr,
        })
    }

    /// Sends one frame. Pacing between frames is the dispatcher's job.
    pub async fn send(&mut self, frame: Frame) -> Result<(), JvcError> {
        if !self.phase.is_ready() {
            return Err(JvcError::ConnectionLost(format!("link is {}", self.phase)));
        }
        trace!(body = %frame.body().escape_ascii(), "sending frame");
        match self.framed.send(frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.phase.disconnect();
                Err(e)
            }
        }
    }

    /// Waits for one reply frame within the window.
    pub async fn recv(&mut self, window: Duration) -> Result<Reply, JvcError> {
        if !self.phase.is_ready() {
            return Err(JvcError::ConnectionLost(format!("link is {}", self.phase)));
        }
        match timeout(window, self.framed.next()).await {
            Err(_) => Err(JvcError::Timeout(window)),
            Ok(None) => {
                self.phase.disconnect();
                Err(JvcError::ConnectionLost(
                    "stream closed by projector".to_string(),
                ))
            }
            Ok(Some(Err(e))) => {
                if matches!(e, JvcError::ConnectionLost(_)) {
                    self.phase.disconnect();
                }
                Err(e)
            }
            Ok(Some(Ok(reply))) => {
                trace!(kind = %reply.kind, class = %reply.class, "received frame");
                Ok(reply)
            }
        }
    }

    pub fn phase(&self) -> &LinkPhase {
        &self.phase
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Closes the link. There is no goodbye in this protocol, the
    /// socket is simply shut down.
    pub async fn close(mut self) {
        self.phase.disconnect();
        let _ = self.framed.get_mut().shutdown().await;
    }
}

/// Device speaks first: greeting, then our connection request (with the
/// password appended on protected models), then the verdict.
async fn handshake<S>(
    stream: &mut S,
    password: Option<&str>,
    window: Duration,
) -> Result<(), JvcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut greeting = [0u8; wire::GREETING.len()];
    timeout(window, stream.read_exact(&mut greeting))
        .await
        .map_err(|_| JvcError::Timeout(window))?
        .map_err(|e| JvcError::Handshake(format!("reading greeting: {e}")))?;
    if greeting != wire::GREETING {
        return Err(JvcError::Handshake(format!(
            "unexpected greeting {:02x?}",
            greeting
        )));
    }

    let mut request = wire::REQUEST.to_vec();
    if let Some(password) = password {
        request.push(wire::PASSWORD_SEPARATOR);
        request.extend_from_slice(password.as_bytes());
    }
    stream
        .write_all(&request)
        .await
        .map_err(|e| JvcError::Handshake(format!("sending request: {e}")))?;

    let mut verdict = [0u8; wire::GRANTED.len()];
    timeout(window, stream.read_exact(&mut verdict))
        .await
        .map_err(|_| JvcError::Timeout(window))?
        .map_err(|e| JvcError::Handshake(format!("reading verdict: {e}")))?;
    if verdict == wire::GRANTED {
        Ok(())
    } else if verdict == wire::REFUSED {
        Err(JvcError::Auth)
    } else {
        Err(JvcError::Handshake(format!(
            "unexpected verdict {:02x?}",
            verdict
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn handshake_plain() {
        let mut stream = Builder::new()
            .read(b"PJ_OK")
            .write(b"PJREQ")
            .read(b"PJACK")
            .build();
        handshake(&mut stream, None, Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn handshake_appends_the_password() {
        let mut stream = Builder::new()
            .read(b"PJ_OK")
            .write(b"PJREQ_jvc123")
            .read(b"PJACK")
            .build();
        handshake(&mut stream, Some("jvc123"), Duration::from_secs(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn foreign_greeting_fails_the_handshake() {
        let mut stream = Builder::new().read(b"HELLO").build();
        let err = handshake(&mut stream, None, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, JvcError::Handshake(_)));
    }

    #[tokio::test]
    async fn refusal_is_an_auth_error() {
        let mut stream = Builder::new()
            .read(b"PJ_OK")
            .write(b"PJREQ_wrong")
            .read(b"PJNAK")
            .build();
        let err = handshake(&mut stream, Some("wrong"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, JvcError::Auth));
        assert!(!err.is_transient());
    }
}
