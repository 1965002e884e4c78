//! End-to-end tests against a scripted server speaking the ESL wire
//! protocol over a real TCP socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use eventsocket::{
    Channel, EslConfig, EslError, EventMessage, EventSocket, HangupCause, OutboundListener,
    TransferFailure, TransferResult,
};

const PASSWORD: &str = "ClueCon";

/// Honor `RUST_LOG` when debugging a failing test.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Server side: read one client command (terminated by a blank line).
async fn recv_command(stream: &mut TcpStream, buf: &mut Vec<u8>) -> String {
    loop {
        if let Some(pos) = find(buf, b"\n\n") {
            let command = String::from_utf8(buf[..pos].to_vec()).unwrap();
            buf.drain(..pos + 2);
            return command;
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed while the server expected a command");
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn send_raw(stream: &mut TcpStream, data: &str) {
    stream.write_all(data.as_bytes()).await.unwrap();
}

async fn send_reply(stream: &mut TcpStream, reply_text: &str) {
    send_raw(
        stream,
        &format!("Content-Type: command/reply\nReply-Text: {}\n\n", reply_text),
    )
    .await;
}

async fn send_api_response(stream: &mut TcpStream, body: &str) {
    send_raw(
        stream,
        &format!(
            "Content-Type: api/response\nContent-Length: {}\n\n{}",
            body.len(),
            body
        ),
    )
    .await;
}

/// Build and send a `text/event-plain` frame from header pairs.
async fn send_event(stream: &mut TcpStream, headers: &[(&str, &str)]) {
    let mut body = String::new();
    for (name, value) in headers {
        body.push_str(&format!("{}: {}\n", name, value));
    }
    send_raw(
        stream,
        &format!(
            "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
            body.len(),
            body
        ),
    )
    .await;
}

/// Server side of the inbound auth handshake.
async fn serve_auth(stream: &mut TcpStream, buf: &mut Vec<u8>) {
    send_raw(stream, "Content-Type: auth/request\n\n").await;
    let command = recv_command(stream, buf).await;
    assert_eq!(command, format!("auth {}", PASSWORD));
    send_reply(stream, "+OK accepted").await;
}

/// Connect a client and run the server-side handshake, returning both ends.
async fn connected_pair() -> (EventSocket, TcpStream, Vec<u8>) {
    init_tracing();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (socket, server) = tokio::join!(
        EventSocket::connect("127.0.0.1", port, PASSWORD),
        async {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            serve_auth(&mut stream, &mut buf).await;
            (stream, buf)
        }
    );
    let (stream, buf) = server;
    (socket.unwrap(), stream, buf)
}

/// Poll a condition until it holds or two seconds elapse.
async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

#[tokio::test]
async fn auth_success() {
    let (socket, _stream, _buf) = connected_pair().await;
    assert!(socket.is_connected());
}

#[tokio::test]
async fn auth_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (result, _) = tokio::join!(
        EventSocket::connect("127.0.0.1", port, "wrong"),
        async {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            send_raw(&mut stream, "Content-Type: auth/request\n\n").await;
            let _ = recv_command(&mut stream, &mut buf).await;
            send_reply(&mut stream, "-ERR invalid").await;
        }
    );
    assert!(matches!(result, Err(EslError::AuthFailed { .. })));
}

#[tokio::test]
async fn rude_rejection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let (result, _) = tokio::join!(
        EventSocket::connect("127.0.0.1", port, PASSWORD),
        async {
            let (mut stream, _) = listener.accept().await.unwrap();
            let body = "Access Denied, go away.\n";
            send_raw(
                &mut stream,
                &format!(
                    "Content-Type: text/rude-rejection\nContent-Length: {}\n\n{}",
                    body.len(),
                    body
                ),
            )
            .await;
        }
    );
    match result {
        Err(EslError::Rejected { reason }) => assert!(reason.contains("Access Denied")),
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn api_ordering_two_concurrent_callers() {
    let (socket, mut stream, mut buf) = connected_pair().await;

    let socket2 = socket.clone();
    let first = tokio::spawn(async move { socket2.send_api("status").await });

    // Wait until the first command is on the wire before issuing the
    // second, so the issue order is deterministic.
    let command = recv_command(&mut stream, &mut buf).await;
    assert_eq!(command, "api status");

    let socket3 = socket.clone();
    let second = tokio::spawn(async move { socket3.send_api("sofia status").await });
    let command = recv_command(&mut stream, &mut buf).await;
    assert_eq!(command, "api sofia status");

    // Replies in wire order: first caller gets the first body.
    send_api_response(&mut stream, "UP 0 years, 0 days, 1 hour\n").await;
    send_api_response(&mut stream, "sofia profiles:\ninternal\n").await;

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    assert!(first.body_text().starts_with("UP 0 years"));
    assert!(second.body_text().starts_with("sofia profiles"));
}

#[tokio::test]
async fn timed_out_command_does_not_desync_the_fifo() {
    let (socket, mut stream, mut buf) = connected_pair().await;
    socket.set_command_timeout(Duration::from_millis(100));

    // The server swallows the first command; the caller times out.
    let (result, _) = tokio::join!(socket.send_command("noop"), async {
        let command = recv_command(&mut stream, &mut buf).await;
        assert_eq!(command, "noop");
    });
    assert!(matches!(result, Err(EslError::Timeout { .. })));

    // The late reply must be consumed by the tombstone, not handed to
    // the next caller.
    send_reply(&mut stream, "+OK late").await;

    socket.set_command_timeout(Duration::from_secs(5));
    let (result, _) = tokio::join!(socket.send_command("noop"), async {
        let command = recv_command(&mut stream, &mut buf).await;
        assert_eq!(command, "noop");
        send_reply(&mut stream, "+OK second").await;
    });
    assert_eq!(result.unwrap().reply_text(), "+OK second");
}

#[tokio::test]
async fn bgapi_with_server_assigned_job_uuid() {
    let (socket, mut stream, mut buf) = connected_pair().await;

    let (result, _) = tokio::join!(socket.bg_api("originate user/1000 &park"), async {
        let command = recv_command(&mut stream, &mut buf).await;
        assert_eq!(command, "bgapi originate user/1000 &park");
        send_raw(
            &mut stream,
            "Content-Type: command/reply\nReply-Text: +OK Job-UUID: 7f00-1234\nJob-UUID: 7f00-1234\n\n",
        )
        .await;

        let inner = "+OK 3c9a-0000\n";
        let body = format!(
            "Event-Name: BACKGROUND_JOB\nJob-UUID: 7f00-1234\nContent-Length: {}\n\n{}",
            inner.len(),
            inner
        );
        send_raw(
            &mut stream,
            &format!(
                "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
                body.len(),
                body
            ),
        )
        .await;
    });

    let result = result.unwrap();
    assert_eq!(result.job_uuid, "7f00-1234");
    assert!(result.success);
    assert_eq!(result.body_text, "+OK 3c9a-0000\n");
}

#[tokio::test]
async fn bgapi_with_client_chosen_job_uuid() {
    let (socket, mut stream, mut buf) = connected_pair().await;

    let (result, _) = tokio::join!(
        socket.bg_api_with_job_uuid("status", "my-job-1"),
        async {
            let command = recv_command(&mut stream, &mut buf).await;
            assert_eq!(command, "bgapi status\nJob-UUID: my-job-1");
            send_reply(&mut stream, "+OK Job-UUID: my-job-1").await;

            let inner = "-ERR command not found\n";
            let body = format!(
                "Event-Name: BACKGROUND_JOB\nJob-UUID: my-job-1\nContent-Length: {}\n\n{}",
                inner.len(),
                inner
            );
            send_raw(
                &mut stream,
                &format!(
                    "Content-Length: {}\nContent-Type: text/event-plain\n\n{}",
                    body.len(),
                    body
                ),
            )
            .await;
        }
    );

    let result = result.unwrap();
    assert_eq!(result.job_uuid, "my-job-1");
    assert!(!result.success);
}

#[tokio::test]
async fn execute_app_correlates_by_application_uuid() {
    let (socket, mut stream, mut buf) = connected_pair().await;

    let (result, _) = tokio::join!(
        socket.execute_app("u-1", "playback", Some("beep.wav"), true),
        async {
            let command = recv_command(&mut stream, &mut buf).await;
            assert!(command.starts_with("sendmsg u-1\n"));
            assert!(command.contains("execute-app-name: playback"));
            let event_uuid = command
                .lines()
                .find_map(|l| l.strip_prefix("Event-UUID: "))
                .expect("execute carries an Event-UUID")
                .to_string();
            send_reply(&mut stream, "+OK").await;

            // A completion for a *different* run of the same app must be
            // skipped.
            send_event(
                &mut stream,
                &[
                    ("Event-Name", "CHANNEL_EXECUTE_COMPLETE"),
                    ("Unique-ID", "u-1"),
                    ("Application", "playback"),
                    ("Application-UUID", "some-other-run"),
                    ("X-Marker", "wrong"),
                ],
            )
            .await;
            send_event(
                &mut stream,
                &[
                    ("Event-Name", "CHANNEL_EXECUTE_COMPLETE"),
                    ("Unique-ID", "u-1"),
                    ("Application", "playback"),
                    ("Application-UUID", &event_uuid),
                    ("X-Marker", "right"),
                ],
            )
            .await;
        }
    );

    let event = result.unwrap();
    assert_eq!(event.get_header("X-Marker").as_deref(), Some("right"));
}

#[tokio::test]
async fn event_stream_order_and_fidelity() {
    let (socket, mut stream, _buf) = connected_pair().await;

    let mut events = socket.events();
    for i in 0..3 {
        send_event(
            &mut stream,
            &[
                ("Event-Name", "HEARTBEAT"),
                ("Event-Sequence", &i.to_string()),
            ],
        )
        .await;
    }

    for i in 0..3 {
        let event = events.next().await.unwrap().unwrap();
        assert_eq!(
            event.get_header("Event-Sequence").as_deref(),
            Some(i.to_string().as_str())
        );
    }
}

#[tokio::test]
async fn event_stream_ends_on_disconnect() {
    let (socket, stream, _buf) = connected_pair().await;
    let mut events = socket.events();

    drop(stream);
    assert!(events.next().await.is_none());
    wait_until(|| !socket.is_connected()).await;

    let err = socket.send_command("noop").await.unwrap_err();
    assert!(matches!(
        err,
        EslError::NotConnected | EslError::ConnectionClosed
    ));
}

fn answered_event(uuid: &str) -> Arc<EventMessage> {
    Arc::new(EventMessage::from_headers(
        vec![
            ("Event-Name".into(), "CHANNEL_ANSWER".into()),
            ("Unique-ID".into(), uuid.into()),
            ("Answer-State".into(), "answered".into()),
        ],
        None,
    ))
}

#[tokio::test]
async fn channel_hangup_hook_fires_exactly_once() {
    let (socket, mut stream, _buf) = connected_pair().await;

    let channel = Channel::new(socket.clone(), answered_event("u-7")).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let (hook_tx, hook_rx) = tokio::sync::oneshot::channel();
    {
        let fired = fired.clone();
        channel.on_hangup(move |event| {
            fired.fetch_add(1, Ordering::SeqCst);
            let _ = hook_tx.send(event);
        });
    }

    // Duplicate hangups for the same call.
    for _ in 0..2 {
        send_event(
            &mut stream,
            &[
                ("Event-Name", "CHANNEL_HANGUP"),
                ("Unique-ID", "u-7"),
                ("Hangup-Cause", "NORMAL_CLEARING"),
            ],
        )
        .await;
    }

    let hangup_event = hook_rx.await.unwrap();
    assert_eq!(hangup_event.hangup_cause(), Some(HangupCause::NormalClearing));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(channel.is_disposed());

    // Operations on a disposed channel are rejected.
    let err = channel.hangup(HangupCause::NormalClearing).await.unwrap_err();
    assert!(matches!(err, EslError::ChannelDisposed));
}

#[tokio::test]
async fn channel_tracks_last_event_and_answer_state() {
    let (socket, mut stream, _buf) = connected_pair().await;

    let initial = Arc::new(EventMessage::from_headers(
        vec![
            ("Event-Name".into(), "CHANNEL_CREATE".into()),
            ("Unique-ID".into(), "u-8".into()),
            ("Answer-State".into(), "ringing".into()),
        ],
        None,
    ));
    let channel = Channel::new(socket.clone(), initial).unwrap();
    assert!(!channel.is_answered());

    send_event(
        &mut stream,
        &[
            ("Event-Name", "CHANNEL_ANSWER"),
            ("Unique-ID", "u-8"),
            ("Answer-State", "answered"),
            ("Other-Leg-Unique-ID", "peer-1"),
        ],
    )
    .await;
    // An event for a different call must not advance this channel.
    send_event(
        &mut stream,
        &[
            ("Event-Name", "CHANNEL_HANGUP"),
            ("Unique-ID", "someone-else"),
        ],
    )
    .await;

    wait_until(|| channel.is_answered()).await;
    assert!(channel.is_bridged());
    assert_eq!(channel.other_leg_uuid().as_deref(), Some("peer-1"));
    assert!(!channel.is_disposed());
}

#[tokio::test]
async fn channel_hangup_sends_uuid_kill_when_answered() {
    let (socket, mut stream, mut buf) = connected_pair().await;
    let channel = Channel::new(socket.clone(), answered_event("u-9")).unwrap();

    let (result, _) = tokio::join!(channel.hangup(HangupCause::UserBusy), async {
        let command = recv_command(&mut stream, &mut buf).await;
        assert_eq!(command, "api uuid_kill u-9 USER_BUSY");
        send_api_response(&mut stream, "+OK\n").await;
    });
    result.unwrap();
}

#[tokio::test]
async fn channel_hangup_is_noop_when_not_answered() {
    let (socket, _stream, _buf) = connected_pair().await;
    let initial = Arc::new(EventMessage::from_headers(
        vec![
            ("Event-Name".into(), "CHANNEL_CREATE".into()),
            ("Unique-ID".into(), "u-10".into()),
        ],
        None,
    ));
    let channel = Channel::new(socket.clone(), initial).unwrap();
    // Resolves immediately; the scripted server would panic on any read.
    channel.hangup(HangupCause::NormalClearing).await.unwrap();
}

#[tokio::test]
async fn attended_transfer_success_pattern() {
    let (socket, mut stream, mut buf) = connected_pair().await;

    let initial = Arc::new(EventMessage::from_headers(
        vec![
            ("Event-Name".into(), "CHANNEL_ANSWER".into()),
            ("Unique-ID".into(), "b-leg".into()),
            ("Answer-State".into(), "answered".into()),
            ("Other-Leg-Unique-ID".into(), "a-leg".into()),
        ],
        None,
    ));
    let channel = Channel::new(socket.clone(), initial).unwrap();

    let (result, _) = tokio::join!(channel.attended_transfer("user/1002"), async {
        let command = recv_command(&mut stream, &mut buf).await;
        assert!(command.starts_with("sendmsg b-leg\n"));
        assert!(command.contains("execute-app-name: att_xfer"));
        assert!(command.contains("execute-app-arg: user/1002"));
        send_reply(&mut stream, "+OK").await;

        // B presses *: C answers, B hangs up, C bridges to A.
        send_event(
            &mut stream,
            &[("Event-Name", "CHANNEL_ANSWER"), ("Unique-ID", "c-leg")],
        )
        .await;
        send_event(
            &mut stream,
            &[("Event-Name", "CHANNEL_HANGUP"), ("Unique-ID", "b-leg")],
        )
        .await;
        send_event(
            &mut stream,
            &[
                ("Event-Name", "CHANNEL_BRIDGE"),
                ("Unique-ID", "c-leg"),
                ("Other-Leg-Unique-ID", "a-leg"),
            ],
        )
        .await;
    });

    assert!(matches!(result.unwrap(), TransferResult::Transferred));
}

#[tokio::test]
async fn attended_transfer_no_answer_pattern() {
    let (socket, mut stream, mut buf) = connected_pair().await;

    let initial = Arc::new(EventMessage::from_headers(
        vec![
            ("Event-Name".into(), "CHANNEL_ANSWER".into()),
            ("Unique-ID".into(), "b-leg".into()),
            ("Answer-State".into(), "answered".into()),
            ("Other-Leg-Unique-ID".into(), "a-leg".into()),
        ],
        None,
    ));
    let channel = Channel::new(socket.clone(), initial).unwrap();

    let (result, _) = tokio::join!(channel.attended_transfer("user/1002"), async {
        let _ = recv_command(&mut stream, &mut buf).await;
        send_reply(&mut stream, "+OK").await;

        send_event(
            &mut stream,
            &[("Event-Name", "CHANNEL_HANGUP"), ("Unique-ID", "c-leg")],
        )
        .await;
        send_event(
            &mut stream,
            &[
                ("Event-Name", "CHANNEL_EXECUTE_COMPLETE"),
                ("Unique-ID", "b-leg"),
                ("Application", "att_xfer"),
                ("variable_originate_disposition", "NO_ANSWER"),
            ],
        )
        .await;
    });

    assert!(matches!(
        result.unwrap(),
        TransferResult::Failed(Some(TransferFailure::NoAnswer))
    ));
}

#[tokio::test]
async fn outbound_handshake_builds_channel() {
    let listener = OutboundListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (session, _) = tokio::join!(listener.accept(), async {
        // Fake FreeSWITCH originating the outbound socket.
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut buf = Vec::new();

        let command = recv_command(&mut stream, &mut buf).await;
        assert_eq!(command, "connect");
        send_raw(
            &mut stream,
            "Content-Type: command/reply\nReply-Text: +OK\nEvent-Name: CHANNEL_DATA\nUnique-ID: ob-call-1\nChannel-Name: sofia/internal/1000%40example.com\nAnswer-State: early\n\n",
        )
        .await;

        let command = recv_command(&mut stream, &mut buf).await;
        assert_eq!(command, "linger");
        send_reply(&mut stream, "+OK will linger").await;

        let command = recv_command(&mut stream, &mut buf).await;
        assert_eq!(command, "myevents plain");
        send_reply(&mut stream, "+OK Events Enabled").await;

        // Keep the connection open long enough for assertions.
        tokio::time::sleep(Duration::from_millis(200)).await;
    });

    let session = session.unwrap();
    assert_eq!(session.channel.uuid(), "ob-call-1");
    assert_eq!(
        session.channel_data.get_header("Channel-Name").as_deref(),
        Some("sofia/internal/1000@example.com")
    );
    assert!(session.channel.is_pre_answered());
}

#[tokio::test]
async fn slow_consumer_is_disconnected() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let mut config = EslConfig::new("127.0.0.1", port, PASSWORD);
    config.event_bus_capacity = 4;

    let (socket, server) = tokio::join!(EventSocket::connect_with_config(config), async {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        serve_auth(&mut stream, &mut buf).await;
        (stream, buf)
    });
    let socket = socket.unwrap();
    let (mut stream, _buf) = server;

    let mut events = socket.events();
    // Overflow the 4-slot bus without draining it.
    for i in 0..32 {
        send_event(
            &mut stream,
            &[("Event-Name", "HEARTBEAT"), ("Event-Sequence", &i.to_string())],
        )
        .await;
    }
    // Give the reader time to publish everything.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut lagged = false;
    while let Some(item) = events.next().await {
        match item {
            Ok(_) => continue,
            Err(EslError::SlowConsumer { missed }) => {
                assert!(missed > 0);
                lagged = true;
                break;
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert!(lagged, "expected a SlowConsumer error");

    // The socket itself is unaffected.
    assert!(socket.is_connected());
}
