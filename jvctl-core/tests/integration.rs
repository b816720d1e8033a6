//! Integration tests — session dispatch, pacing, retry policy and
//! power interpretation against a scripted projector on localhost.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use jvctl_core::{JvcError, PowerState, Session, SessionConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

// ── Helpers ──────────────────────────────────────────────────────

/// Listener on an OS-assigned port plus a session config pointed at it,
/// with timings tightened for tests.
async fn ephemeral_listener() -> (TcpListener, SessionConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = SessionConfig::new(addr.ip().to_string());
    config.port = addr.port();
    config.connect_timeout = Duration::from_secs(2);
    config.reply_timeout = Duration::from_secs(2);
    config.command_spacing = Duration::from_millis(50);
    config.retries = 2;
    config.retry_backoff = Duration::from_millis(50);
    (listener, config)
}

/// Device side of the handshake on an accepted socket.
async fn device_handshake(stream: &mut TcpStream) {
    stream.write_all(b"PJ_OK").await.unwrap();
    let mut request = [0u8; 5];
    stream.read_exact(&mut request).await.unwrap();
    assert_eq!(&request, b"PJREQ");
    stream.write_all(b"PJACK").await.unwrap();
}

/// Reads one terminated frame, without the terminator. `None` when the
/// client hung up.
async fn read_frame(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut frame = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte).await {
            Ok(0) | Err(_) => return None,
            Ok(_) if byte[0] == 0x0A => return Some(frame),
            Ok(_) => frame.push(byte[0]),
        }
    }
}

async fn send_ack(stream: &mut TcpStream, class: &[u8; 2]) {
    let mut reply = vec![0x06, 0x89, 0x01];
    reply.extend_from_slice(class);
    reply.push(0x0A);
    stream.write_all(&reply).await.unwrap();
}

async fn send_data(stream: &mut TcpStream, class: &[u8; 2], value: &[u8]) {
    let mut reply = vec![b'@', 0x89, 0x01];
    reply.extend_from_slice(class);
    reply.extend_from_slice(value);
    reply.push(0x0A);
    stream.write_all(&reply).await.unwrap();
}

async fn send_nak(stream: &mut TcpStream, class: &[u8; 2]) {
    let mut reply = vec![0x15, 0x89, 0x01];
    reply.extend_from_slice(class);
    reply.push(0x0A);
    stream.write_all(&reply).await.unwrap();
}

/// The reply class is always the first two bytes of the command code.
fn class_of(frame: &[u8]) -> [u8; 2] {
    frame[3..5].try_into().unwrap()
}

type FrameLog = Arc<Mutex<Vec<(Instant, Vec<u8>)>>>;

/// Accepts one connection, handshakes and acks everything, answering
/// references with a generic `1`. Records frame arrival times.
fn spawn_ack_server(listener: TcpListener) -> (FrameLog, JoinHandle<()>) {
    let log: FrameLog = Arc::new(Mutex::new(Vec::new()));
    let handle = tokio::spawn({
        let log = Arc::clone(&log);
        async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            device_handshake(&mut stream).await;
            while let Some(frame) = read_frame(&mut stream).await {
                log.lock().unwrap().push((Instant::now(), frame.clone()));
                let class = class_of(&frame);
                send_ack(&mut stream, &class).await;
                if frame[0] == b'?' {
                    send_data(&mut stream, &class, b"1").await;
                }
            }
        }
    });
    (log, handle)
}

fn logged_bodies(log: &FrameLog) -> Vec<Vec<u8>> {
    log.lock().unwrap().iter().map(|(_, f)| f.clone()).collect()
}

// ── Ordering and single flight ───────────────────────────────────

#[tokio::test]
async fn test_wire_order_matches_submission_order() {
    let (listener, config) = ephemeral_listener().await;
    let (log, server) = spawn_ack_server(listener);

    let session = Session::new(config);
    let a = session.submit_nowait("picture_mode", "natural").unwrap();
    let b = session.submit_nowait("low_latency", "on").unwrap();
    session.submit("power", "on").await.unwrap();
    a.outcome().await.unwrap();
    b.outcome().await.unwrap();

    assert_eq!(
        logged_bodies(&log),
        vec![
            b"!\x89\x01PMPM03".to_vec(),
            b"!\x89\x01PMLL1".to_vec(),
            b"!\x89\x01PW1".to_vec(),
        ]
    );

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_single_frame_in_flight() {
    let (listener, config) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        device_handshake(&mut stream).await;

        let first = read_frame(&mut stream).await.unwrap();
        // hold the ack back; the wire must stay quiet meanwhile
        let mut probe = [0u8; 1];
        let quiet =
            tokio::time::timeout(Duration::from_millis(200), stream.read(&mut probe)).await;
        assert!(quiet.is_err(), "a second frame arrived before the ack");
        send_ack(&mut stream, &class_of(&first)).await;

        let second = read_frame(&mut stream).await.unwrap();
        send_ack(&mut stream, &class_of(&second)).await;
    });

    let session = Session::new(config);
    let a = session.submit_nowait("low_latency", "on").unwrap();
    let b = session.submit_nowait("low_latency", "off").unwrap();
    a.outcome().await.unwrap();
    b.outcome().await.unwrap();

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_command_spacing_is_enforced() {
    let (listener, mut config) = ephemeral_listener().await;
    config.command_spacing = Duration::from_millis(200);
    let (log, server) = spawn_ack_server(listener);

    let session = Session::new(config);
    let a = session.submit_nowait("menu", "up").unwrap();
    let b = session.submit_nowait("menu", "down").unwrap();
    a.outcome().await.unwrap();
    b.outcome().await.unwrap();

    let arrivals: Vec<Instant> = log.lock().unwrap().iter().map(|(t, _)| *t).collect();
    assert_eq!(arrivals.len(), 2);
    assert!(
        arrivals[1] - arrivals[0] >= Duration::from_millis(200),
        "frames only {:?} apart",
        arrivals[1] - arrivals[0]
    );

    session.close().await;
    server.await.unwrap();
}

// ── Retry policy ─────────────────────────────────────────────────

#[tokio::test]
async fn test_reconnect_after_connection_loss() {
    let (listener, config) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        // first connection dies mid-exchange
        let (mut stream, _) = listener.accept().await.unwrap();
        device_handshake(&mut stream).await;
        let _ = read_frame(&mut stream).await.unwrap();
        drop(stream);

        // the engine comes back and finishes the job
        let (mut stream, _) = listener.accept().await.unwrap();
        device_handshake(&mut stream).await;
        let frame = read_frame(&mut stream).await.unwrap();
        assert_eq!(frame, b"!\x89\x01PW1");
        send_ack(&mut stream, &class_of(&frame)).await;
    });

    let session = Session::new(config);
    session.submit("power", "on").await.unwrap();

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_nak_is_not_retried() {
    let (listener, config) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        device_handshake(&mut stream).await;
        let frame = read_frame(&mut stream).await.unwrap();
        send_nak(&mut stream, &class_of(&frame)).await;

        // the refused command must not come back
        let mut probe = [0u8; 1];
        match tokio::time::timeout(Duration::from_millis(300), stream.read(&mut probe)).await {
            Err(_) => {}
            Ok(Ok(0)) => {}
            other => panic!("unexpected traffic after nak: {other:?}"),
        }
    });

    let session = Session::new(config);
    let err = session.submit("power", "on").await.unwrap_err();
    assert!(matches!(err, JvcError::Nak { .. }));

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_connect_failures_exhaust_retries() {
    let (listener, config) = ephemeral_listener().await;
    // nobody is listening on the port anymore
    drop(listener);

    let session = Session::new(config);
    let err = session.submit("power", "on").await.unwrap_err();
    match err {
        JvcError::RetriesExhausted { attempts, source } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*source, JvcError::Connect { .. }));
        }
        other => panic!("expected RetriesExhausted, got {other}"),
    }

    session.close().await;
}

#[tokio::test]
async fn test_auth_rejection_is_not_retried() {
    let (listener, mut config) = ephemeral_listener().await;
    config.password = Some("wrong".to_string());

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"PJ_OK").await.unwrap();
        let mut request = [0u8; 32];
        let n = stream.read(&mut request).await.unwrap();
        assert_eq!(&request[..n], b"PJREQ_wrong");
        stream.write_all(b"PJNAK").await.unwrap();

        // a rejected password must not trigger another dial
        let again = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
        assert!(again.is_err(), "engine retried after auth rejection");
    });

    let session = Session::new(config);
    let err = session.submit("power", "on").await.unwrap_err();
    assert!(matches!(err, JvcError::Auth));

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_garbled_reply_is_a_protocol_error() {
    let (listener, config) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        device_handshake(&mut stream).await;
        let _ = read_frame(&mut stream).await.unwrap();
        stream.write_all(b"XYZ\x0A").await.unwrap();

        // protocol violations fail the command without a retry
        let mut probe = [0u8; 1];
        match tokio::time::timeout(Duration::from_millis(300), stream.read(&mut probe)).await {
            Err(_) => {}
            Ok(Ok(0)) => {}
            other => panic!("unexpected traffic after garbled reply: {other:?}"),
        }
    });

    let session = Session::new(config);
    let err = session.submit("power", "on").await.unwrap_err();
    assert!(matches!(err, JvcError::Protocol(_)));

    session.close().await;
    server.await.unwrap();
}

// ── Caller behavior ──────────────────────────────────────────────

#[tokio::test]
async fn test_abandoned_wait_does_not_disturb_the_wire() {
    let (listener, config) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        device_handshake(&mut stream).await;

        // slow-walk the first ack past the caller's patience
        let first = read_frame(&mut stream).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        send_ack(&mut stream, &class_of(&first)).await;

        // the follow-up command still arrives in order
        let second = read_frame(&mut stream).await.unwrap();
        assert_eq!(second, b"!\x89\x01PMLL1");
        send_ack(&mut stream, &class_of(&second)).await;
    });

    let session = Session::new(config);
    let handle = session.submit_nowait("picture_mode", "natural").unwrap();
    let gave_up = tokio::time::timeout(Duration::from_millis(50), handle.outcome()).await;
    assert!(gave_up.is_err());

    session.submit("low_latency", "on").await.unwrap();

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_cancelled_while_queued_never_reaches_the_wire() {
    let (listener, config) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        device_handshake(&mut stream).await;

        let first = read_frame(&mut stream).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        send_ack(&mut stream, &class_of(&first)).await;

        // the dropped request is skipped; the next frame is the third
        let next = read_frame(&mut stream).await.unwrap();
        assert_eq!(next, b"!\x89\x01RC732F");
        send_ack(&mut stream, &class_of(&next)).await;
    });

    let session = Session::new(config);
    let first = session.submit_nowait("picture_mode", "natural").unwrap();
    let cancelled = session.submit_nowait("picture_mode", "cinema").unwrap();
    drop(cancelled);
    let third = session.submit_nowait("menu", "ok").unwrap();

    first.outcome().await.unwrap();
    third.outcome().await.unwrap();

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_unknown_names_never_touch_the_network() {
    let (listener, config) = ephemeral_listener().await;

    let session = Session::new(config);
    let err = session.submit("warp_drive", "on").await.unwrap_err();
    assert!(matches!(err, JvcError::UnknownCommand(_)));

    let err = session.submit("power", "sideways").await.unwrap_err();
    assert!(matches!(err, JvcError::UnknownParameter { .. }));

    let dialed = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(dialed.is_err(), "engine dialed out for a caller error");

    session.close().await;
}

// ── Queries and power state ──────────────────────────────────────

#[tokio::test]
async fn test_query_maps_reply_and_updates_cached_power() {
    let (listener, config) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        device_handshake(&mut stream).await;
        let frame = read_frame(&mut stream).await.unwrap();
        assert_eq!(frame, b"?\x89\x01PW");
        send_ack(&mut stream, b"PW").await;
        send_data(&mut stream, b"PW", b"1").await;
    });

    let session = Session::new(config);
    assert_eq!(session.cached_power_state(), PowerState::Unknown);

    let reply = session.query("power").await.unwrap();
    assert_eq!(reply.raw(), b"1");
    assert_eq!(reply.name(), Some("on"));
    assert_eq!(session.cached_power_state(), PowerState::On);

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_power_on_then_wait_reaches_the_target() {
    let (listener, config) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        device_handshake(&mut stream).await;

        // the lamp takes two polls to strike
        let mut states = VecDeque::from([&b"3"[..], b"3", b"1"]);
        while let Some(frame) = read_frame(&mut stream).await {
            let class = class_of(&frame);
            send_ack(&mut stream, &class).await;
            if frame[0] == b'?' {
                let value = if states.len() > 1 {
                    states.pop_front().unwrap()
                } else {
                    states[0]
                };
                send_data(&mut stream, &class, value).await;
            }
        }
    });

    let session = Session::new(config);
    session.power_on().await.unwrap();
    session
        .wait_for_power(PowerState::On, Duration::from_secs(10))
        .await
        .unwrap();
    assert_eq!(session.cached_power_state(), PowerState::On);

    session.close().await;
    server.await.unwrap();
}

#[tokio::test]
async fn test_model_and_version_queries() {
    let (listener, config) = ephemeral_listener().await;

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        device_handshake(&mut stream).await;
        while let Some(frame) = read_frame(&mut stream).await {
            let class = class_of(&frame);
            send_ack(&mut stream, &class).await;
            match &frame[3..] {
                b"MD" => send_data(&mut stream, &class, b"ILAFPJ -- B5A3").await,
                b"IFSV" => send_data(&mut stream, &class, b"0210PJ").await,
                b"IFLT" => send_data(&mut stream, &class, b"64").await,
                other => panic!("unexpected query {other:02x?}"),
            }
        }
    });

    let session = Session::new(config);
    assert_eq!(session.model().await.unwrap(), "NZ7");
    assert_eq!(session.software_version().await.unwrap(), "2.10");
    assert_eq!(session.lamp_time().await.unwrap(), 100);

    session.close().await;
    server.await.unwrap();
}
