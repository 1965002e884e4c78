//! The low-level event socket: framing, command/reply correlation, and
//! event broadcast.
//!
//! One background reader task per socket drives the [`FrameParser`] and
//! routes every frame: `command/reply` and `api/response` frames complete
//! the head waiter of the matching FIFO, `BACKGROUND_JOB` events complete
//! their job waiter, and every event is published on a broadcast bus that
//! subscribers can join at any time.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot, watch, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::{
    command::{ApiResponse, BackgroundJobResult, Command, CommandReply},
    config::EslConfig,
    constants::SOCKET_BUF_SIZE,
    error::{EslError, EslResult},
    event::{EventMessage, EventName},
    protocol::{ContentClass, Frame, FrameParser},
};

/// Connection status, published on a watch channel.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SocketStatus {
    /// The ESL session is active.
    Connected,
    /// The ESL session ended.
    Disconnected(DisconnectReason),
}

/// Why the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Server sent a `text/disconnect-notice`.
    ServerNotice,
    /// TCP I/O error (`io::Error` is not `Clone`, so the message is kept).
    IoError(String),
    /// Clean EOF on the TCP connection.
    ConnectionClosed,
    /// Frame-level parse failure or desync.
    ProtocolError(String),
    /// The client called [`EventSocket::exit`] or dropped the connection.
    ClientRequested,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DisconnectReason::ServerNotice => write!(f, "server sent disconnect notice"),
            DisconnectReason::IoError(msg) => write!(f, "I/O error: {}", msg),
            DisconnectReason::ConnectionClosed => write!(f, "connection closed"),
            DisconnectReason::ProtocolError(msg) => write!(f, "protocol error: {}", msg),
            DisconnectReason::ClientRequested => write!(f, "client requested disconnect"),
        }
    }
}

/// Which reply FIFO a command waits on. ESL replies carry no correlation
/// id; ordering is the correlation, but `command/reply` and
/// `api/response` frames form two independent ordered streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaiterKind {
    Command,
    Api,
}

/// Pending reply waiters.
///
/// A slot whose receiver was dropped (timeout or cancellation) stays in
/// the queue as a tombstone: the eventual reply pops it and is discarded,
/// which keeps every later caller aligned with the reply stream.
#[derive(Default)]
struct PendingWaiters {
    command: VecDeque<oneshot::Sender<Frame>>,
    api: VecDeque<oneshot::Sender<Frame>>,
}

/// Background-job rendezvous. Results that arrive before the caller has
/// registered (the reply and the event race through different paths) are
/// parked in `arrived` until claimed.
#[derive(Default)]
struct JobTable {
    waiters: HashMap<String, oneshot::Sender<BackgroundJobResult>>,
    arrived: HashMap<String, BackgroundJobResult>,
}

/// Upper bound on unclaimed parked job results.
const MAX_PARKED_JOBS: usize = 128;

struct Shared {
    pending: std::sync::Mutex<PendingWaiters>,
    jobs: std::sync::Mutex<JobTable>,
    /// Taken (and thereby closed) on teardown so subscribers see end-of-stream.
    events_tx: std::sync::Mutex<Option<broadcast::Sender<Arc<EventMessage>>>>,
    status_tx: watch::Sender<SocketStatus>,
    command_timeout_ms: AtomicU64,
}

impl Shared {
    /// Fatal-path shutdown: record the reason, fail every pending waiter
    /// and job, and close the event bus. Idempotent; the first reason
    /// recorded wins.
    fn teardown(&self, reason: DisconnectReason) {
        self.status_tx.send_if_modified(|status| {
            if matches!(status, SocketStatus::Connected) {
                *status = SocketStatus::Disconnected(reason);
                true
            } else {
                false
            }
        });
        {
            let mut pending = self.pending.lock().unwrap();
            pending.command.clear();
            pending.api.clear();
        }
        {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.waiters.clear();
            jobs.arrived.clear();
        }
        self.events_tx.lock().unwrap().take();
    }
}

/// Multicast subscription to the socket's event stream.
///
/// Subscribers receive every event published after they join, in wire
/// order. A subscriber that falls behind the bus capacity is disconnected
/// with [`EslError::SlowConsumer`]; the parser and other subscribers are
/// never blocked by a slow one.
pub struct EventStream {
    rx: Option<broadcast::Receiver<Arc<EventMessage>>>,
}

impl EventStream {
    fn closed() -> Self {
        Self { rx: None }
    }

    /// Next event, or `None` once the socket has disconnected (or this
    /// subscriber was dropped for falling behind).
    pub async fn next(&mut self) -> Option<EslResult<Arc<EventMessage>>> {
        let rx = self.rx.as_mut()?;
        match rx.recv().await {
            Ok(event) => Some(Ok(event)),
            Err(broadcast::error::RecvError::Closed) => {
                self.rx = None;
                None
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // Fail closed for this consumer only.
                self.rx = None;
                Some(Err(EslError::SlowConsumer { missed }))
            }
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("open", &self.rx.is_some())
            .finish()
    }
}

/// Handle to one ESL connection (`Clone + Send`).
///
/// Commands may be issued concurrently from any task; a writer lock
/// serializes them on the wire and the reply FIFOs keep each caller
/// matched to its own reply.
#[derive(Clone)]
pub struct EventSocket {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    shared: Arc<Shared>,
    status_rx: watch::Receiver<SocketStatus>,
}

impl std::fmt::Debug for EventSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSocket")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Read one frame from an unsplit stream (handshake phase only; the
/// reader task takes over after the socket is spawned).
async fn recv_frame(
    stream: &mut TcpStream,
    parser: &mut FrameParser,
    read_buffer: &mut [u8],
    deadline: Duration,
) -> EslResult<Frame> {
    loop {
        if let Some(frame) = parser.poll_frame()? {
            trace!("[HANDSHAKE] parsed {:?}", frame.content_class());
            return Ok(frame);
        }
        let n = match timeout(deadline, stream.read(read_buffer)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(EslError::Io(e)),
            Err(_) => {
                return Err(EslError::Timeout {
                    timeout_ms: deadline.as_millis() as u64,
                })
            }
        };
        if n == 0 {
            return Err(EslError::ConnectionClosed);
        }
        parser.feed(&read_buffer[..n])?;
    }
}

/// Perform the inbound auth handshake.
async fn authenticate(
    stream: &mut TcpStream,
    parser: &mut FrameParser,
    read_buffer: &mut [u8],
    password: &str,
    deadline: Duration,
) -> EslResult<()> {
    debug!("[AUTH] waiting for auth request");
    let frame = recv_frame(stream, parser, read_buffer, deadline).await?;

    match frame.content_class() {
        ContentClass::AuthRequest => {}
        ContentClass::RudeRejection => {
            let reason = frame.body().unwrap_or("access denied").trim().to_string();
            return Err(EslError::Rejected { reason });
        }
        other => {
            return Err(EslError::protocol(format!(
                "expected auth/request, got {:?}",
                other
            )))
        }
    }

    let wire = Command::Auth {
        password: password.to_string(),
    }
    .to_wire_format()?;
    debug!("[AUTH] sending auth [REDACTED]");
    stream.write_all(wire.as_bytes()).await.map_err(EslError::Io)?;

    let reply_frame = recv_frame(stream, parser, read_buffer, deadline).await?;
    let reply = CommandReply::from_frame(reply_frame);
    if !reply.success() {
        return Err(EslError::auth_failed(reply.reply_text().to_string()));
    }

    debug!("[AUTH] accepted");
    Ok(())
}

/// Background reader loop with a panic guard; a panicking reader must
/// still flip the status so callers do not wait forever.
async fn reader_loop(reader: OwnedReadHalf, parser: FrameParser, shared: Arc<Shared>) {
    let inner = std::panic::AssertUnwindSafe(reader_loop_inner(reader, parser, shared.clone()));
    if futures_util::FutureExt::catch_unwind(inner).await.is_err() {
        tracing::error!("reader task panicked");
        shared.teardown(DisconnectReason::IoError("reader task panicked".to_string()));
    }
}

async fn reader_loop_inner(mut reader: OwnedReadHalf, mut parser: FrameParser, shared: Arc<Shared>) {
    let mut read_buffer = [0u8; SOCKET_BUF_SIZE];

    loop {
        // Drain complete frames from buffered data first.
        match parser.poll_frame() {
            Ok(Some(frame)) => {
                if !dispatch_frame(frame, &shared) {
                    return;
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("parser error: {}", e);
                shared.teardown(DisconnectReason::ProtocolError(e.to_string()));
                return;
            }
        }

        match reader.read(&mut read_buffer).await {
            Ok(0) => {
                if parser.mid_frame() {
                    warn!("EOF in the middle of a frame");
                    shared.teardown(DisconnectReason::ProtocolError(
                        "EOF mid-frame (short body)".to_string(),
                    ));
                } else {
                    info!("connection closed (EOF)");
                    shared.teardown(DisconnectReason::ConnectionClosed);
                }
                return;
            }
            Ok(n) => {
                if let Err(e) = parser.feed(&read_buffer[..n]) {
                    warn!("buffer error: {}", e);
                    shared.teardown(DisconnectReason::ProtocolError(e.to_string()));
                    return;
                }
            }
            Err(e) => {
                warn!("read error: {}", e);
                shared.teardown(DisconnectReason::IoError(e.to_string()));
                return;
            }
        }
    }
}

/// Route one frame. Returns `false` when the reader should exit.
fn dispatch_frame(frame: Frame, shared: &Shared) -> bool {
    match frame.content_class() {
        ContentClass::CommandReply => complete_waiter(shared, WaiterKind::Command, frame),
        ContentClass::ApiResponse => complete_waiter(shared, WaiterKind::Api, frame),
        ContentClass::Event(_) => {
            let event = match EventMessage::from_frame(frame) {
                Ok(event) => Arc::new(event),
                Err(e) => {
                    warn!("dropping unparseable event: {}", e);
                    return true;
                }
            };
            if event.is(EventName::BackgroundJob) {
                complete_job(shared, &event);
            }
            publish_event(shared, event);
        }
        ContentClass::DisconnectNotice => {
            let disposition = frame.header("Content-Disposition");
            if disposition == Some("linger") {
                debug!("disconnect notice with linger disposition, draining events");
                return true;
            }
            info!("server sent disconnect notice");
            shared.teardown(DisconnectReason::ServerNotice);
            return false;
        }
        ContentClass::RudeRejection => {
            let reason = frame.body().unwrap_or("access denied").trim().to_string();
            warn!("server rejected connection: {}", reason);
            shared.teardown(DisconnectReason::ProtocolError(format!(
                "rude rejection: {}",
                reason
            )));
            return false;
        }
        ContentClass::AuthRequest | ContentClass::Unknown(_) => {
            debug!("ignoring frame: {:?}", frame.content_class());
        }
    }
    true
}

fn complete_waiter(shared: &Shared, kind: WaiterKind, frame: Frame) {
    let waiter = {
        let mut pending = shared.pending.lock().unwrap();
        match kind {
            WaiterKind::Command => pending.command.pop_front(),
            WaiterKind::Api => pending.api.pop_front(),
        }
    };
    match waiter {
        // A send error means the caller timed out or was cancelled; the
        // slot was its tombstone and the reply is dropped here.
        Some(tx) => {
            if tx.send(frame).is_err() {
                debug!("discarding reply for a timed-out {:?} waiter", kind);
            }
        }
        None => warn!("received {:?} reply with no pending waiter", kind),
    }
}

fn complete_job(shared: &Shared, event: &EventMessage) {
    let Some(job_uuid) = event.job_uuid().map(|u| u.into_owned()) else {
        warn!("BACKGROUND_JOB event without Job-UUID");
        return;
    };
    let result = BackgroundJobResult::from_event(job_uuid.clone(), event);
    let mut jobs = shared.jobs.lock().unwrap();
    match jobs.waiters.remove(&job_uuid) {
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => {
            // The caller has not registered yet (server-assigned Job-UUID
            // still in flight through the reply path). Park the result.
            // Jobs started by other clients land here too when subscribed
            // broadly, so the parking lot is bounded.
            if jobs.arrived.len() >= MAX_PARKED_JOBS {
                warn!("parked background-job results overflowed, dropping them");
                jobs.arrived.clear();
            }
            jobs.arrived.insert(job_uuid, result);
        }
    }
}

fn publish_event(shared: &Shared, event: Arc<EventMessage>) {
    let guard = shared.events_tx.lock().unwrap();
    if let Some(tx) = guard.as_ref() {
        // Err just means no subscriber right now; events are not queued
        // for future subscribers.
        let _ = tx.send(event);
    }
}

impl EventSocket {
    /// Connect to FreeSWITCH (inbound mode) and authenticate.
    pub async fn connect(host: &str, port: u16, password: &str) -> EslResult<Self> {
        Self::connect_with_config(EslConfig::new(host, port, password)).await
    }

    /// Connect with explicit configuration.
    pub async fn connect_with_config(config: EslConfig) -> EslResult<Self> {
        info!("connecting to FreeSWITCH at {}:{}", config.host, config.port);

        let mut stream = match timeout(
            config.response_timeout,
            TcpStream::connect((config.host.as_str(), config.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(EslError::Io(e)),
            Err(_) => {
                return Err(EslError::Timeout {
                    timeout_ms: config.response_timeout.as_millis() as u64,
                })
            }
        };

        let mut parser = FrameParser::new();
        let mut read_buffer = vec![0u8; SOCKET_BUF_SIZE];
        authenticate(
            &mut stream,
            &mut parser,
            &mut read_buffer,
            &config.password,
            config.response_timeout,
        )
        .await?;

        info!("connected and authenticated");
        Ok(Self::spawn(stream, parser, &config))
    }

    /// Wrap a TCP stream that FreeSWITCH opened toward us (outbound mode).
    /// The caller still has to perform the `connect` handshake; see
    /// [`OutboundListener`](crate::OutboundListener).
    pub fn from_accepted(stream: TcpStream, config: &EslConfig) -> Self {
        Self::spawn(stream, FrameParser::new(), config)
    }

    fn spawn(stream: TcpStream, parser: FrameParser, config: &EslConfig) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (status_tx, status_rx) = watch::channel(SocketStatus::Connected);
        let (events_tx, _) = broadcast::channel(config.event_bus_capacity.max(1));

        let shared = Arc::new(Shared {
            pending: std::sync::Mutex::new(PendingWaiters::default()),
            jobs: std::sync::Mutex::new(JobTable::default()),
            events_tx: std::sync::Mutex::new(Some(events_tx)),
            status_tx,
            command_timeout_ms: AtomicU64::new(config.command_timeout.as_millis() as u64),
        });

        tokio::spawn(reader_loop(read_half, parser, shared.clone()));

        EventSocket {
            writer: Arc::new(Mutex::new(write_half)),
            shared,
            status_rx,
        }
    }

    /// Issue a command and await the frame that completes it.
    ///
    /// The writer lock is held across enqueue-then-write so the FIFO order
    /// matches the wire order exactly; it is released before awaiting the
    /// reply, which is what lets callers overlap.
    async fn roundtrip(&self, kind: WaiterKind, command: Command) -> EslResult<Frame> {
        if !self.is_connected() {
            return Err(EslError::NotConnected);
        }

        let wire = command.to_wire_format()?;
        match &command {
            Command::Auth { .. } => debug!("sending: auth [REDACTED]"),
            _ => debug!("sending: {}", wire.trim_end()),
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut writer = self.writer.lock().await;
            {
                let mut pending = self.shared.pending.lock().unwrap();
                match kind {
                    WaiterKind::Command => pending.command.push_back(tx),
                    WaiterKind::Api => pending.api.push_back(tx),
                }
            }
            if let Err(e) = writer.write_all(wire.as_bytes()).await {
                // Write failures are fatal; teardown also clears the
                // waiter we just enqueued.
                self.shared
                    .teardown(DisconnectReason::IoError(e.to_string()));
                return Err(EslError::Io(e));
            }
        }

        let timeout_ms = self.shared.command_timeout_ms.load(Ordering::Relaxed);
        match timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(EslError::ConnectionClosed),
            // Dropping `rx` leaves our queue slot as a tombstone; the
            // late reply is popped and discarded by the reader.
            Err(_) => Err(EslError::Timeout { timeout_ms }),
        }
    }

    pub(crate) async fn send(&self, command: Command) -> EslResult<CommandReply> {
        let frame = self.roundtrip(WaiterKind::Command, command).await?;
        let reply = CommandReply::from_frame(frame);
        debug!("reply: success={}", reply.success());
        Ok(reply)
    }

    async fn send_ok(&self, command: Command) -> EslResult<CommandReply> {
        self.send(command).await?.into_result()
    }

    /// Send a raw ESL command line and await its `command/reply`.
    pub async fn send_command(&self, command: &str) -> EslResult<CommandReply> {
        self.send(Command::Raw {
            line: command.to_string(),
        })
        .await
    }

    /// Execute a synchronous API command (`api <cmd>`).
    ///
    /// FreeSWITCH blocks the socket while an `api` command runs; prefer
    /// [`bg_api`](Self::bg_api) for anything slow.
    pub async fn send_api(&self, command: &str) -> EslResult<ApiResponse> {
        let frame = self
            .roundtrip(
                WaiterKind::Api,
                Command::Api {
                    command: command.to_string(),
                },
            )
            .await?;
        Ok(ApiResponse::from_frame(frame))
    }

    /// Run an API command in the background and await its result, which
    /// FreeSWITCH delivers as a `BACKGROUND_JOB` event.
    ///
    /// The `BACKGROUND_JOB` event must be able to reach this socket
    /// (subscribe to it, or rely on `myevents`). There is no deadline on
    /// the job itself; an `originate` may legitimately ring for a minute;
    /// wrap the call in [`tokio::time::timeout`] if one is needed.
    pub async fn bg_api(&self, command: &str) -> EslResult<BackgroundJobResult> {
        let reply = self
            .send_ok(Command::BgApi {
                command: command.to_string(),
                job_uuid: None,
            })
            .await?;
        let job_uuid = reply
            .job_uuid()
            .map(|u| u.into_owned())
            .ok_or_else(|| EslError::protocol("bgapi reply missing Job-UUID"))?;
        self.await_job(job_uuid).await
    }

    /// Like [`bg_api`](Self::bg_api) with a caller-chosen `Job-UUID`,
    /// registered before the command is sent so the completion cannot be
    /// missed however fast it arrives.
    pub async fn bg_api_with_job_uuid(
        &self,
        command: &str,
        job_uuid: &str,
    ) -> EslResult<BackgroundJobResult> {
        let (tx, rx) = oneshot::channel();
        self.shared
            .jobs
            .lock()
            .unwrap()
            .waiters
            .insert(job_uuid.to_string(), tx);

        let sent = self
            .send_ok(Command::BgApi {
                command: command.to_string(),
                job_uuid: Some(job_uuid.to_string()),
            })
            .await;
        if let Err(e) = sent {
            self.shared.jobs.lock().unwrap().waiters.remove(job_uuid);
            return Err(e);
        }

        rx.await.map_err(|_| EslError::JobLost {
            job_uuid: job_uuid.to_string(),
        })
    }

    async fn await_job(&self, job_uuid: String) -> EslResult<BackgroundJobResult> {
        let rx = {
            let mut jobs = self.shared.jobs.lock().unwrap();
            // The event may have beaten us here through the reader.
            if let Some(result) = jobs.arrived.remove(&job_uuid) {
                return Ok(result);
            }
            if !self.is_connected() {
                return Err(EslError::JobLost { job_uuid });
            }
            let (tx, rx) = oneshot::channel();
            jobs.waiters.insert(job_uuid.clone(), tx);
            rx
        };
        rx.await.map_err(|_| EslError::JobLost { job_uuid })
    }

    /// Execute a dialplan application on a channel and await its
    /// `CHANNEL_EXECUTE_COMPLETE`.
    ///
    /// The completion is correlated by the channel UUID, the application
    /// name, and a client-chosen `Event-UUID` echoed back as
    /// `Application-UUID`, required to tell apart repeated runs of the
    /// same application. The channel's events must reach this socket
    /// (`myevents` or an explicit subscription). No deadline is applied;
    /// a `playback` takes as long as the file is.
    pub async fn execute_app(
        &self,
        uuid: &str,
        app: &str,
        arg: Option<&str>,
        event_lock: bool,
    ) -> EslResult<Arc<EventMessage>> {
        let event_uuid = uuid::Uuid::new_v4().to_string();
        // Subscribe before sending so the completion cannot slip past.
        let mut events = self.events();

        self.send_ok(Command::execute(uuid, app, arg, event_lock, &event_uuid))
            .await?;

        while let Some(item) = events.next().await {
            let event = item?;
            if !event.is(EventName::ChannelExecuteComplete) || event.uuid() != Some(uuid) {
                continue;
            }
            let app_matches = event.application().as_deref() == Some(app);
            let correlated = match event.application_uuid() {
                Some(application_uuid) => application_uuid.as_ref() == event_uuid.as_str(),
                None => app_matches,
            };
            if app_matches && correlated {
                return Ok(event);
            }
        }
        Err(EslError::ConnectionClosed)
    }

    /// Fire-and-forget variant of [`execute_app`](Self::execute_app):
    /// returns the `command/reply` acking the request instead of waiting
    /// for the application to finish.
    pub async fn execute_app_async(
        &self,
        uuid: &str,
        app: &str,
        arg: Option<&str>,
        event_lock: bool,
    ) -> EslResult<CommandReply> {
        let event_uuid = uuid::Uuid::new_v4().to_string();
        self.send_ok(Command::execute(uuid, app, arg, event_lock, &event_uuid))
            .await
    }

    /// Subscribe to events by name (`event plain <names...>`).
    pub async fn subscribe_events(&self, events: &[EventName]) -> EslResult<()> {
        let names = if events.contains(&EventName::All) {
            "ALL".to_string()
        } else {
            events
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        self.subscribe_events_raw(&names).await
    }

    /// Subscribe using a raw event-name list, for subclasses
    /// (`CUSTOM sofia::register`) or names this crate does not know.
    pub async fn subscribe_events_raw(&self, events: &str) -> EslResult<()> {
        self.send_ok(Command::Events {
            format: "plain".to_string(),
            events: events.to_string(),
        })
        .await?;
        info!("subscribed to events: {}", events);
        Ok(())
    }

    /// Install a server-side event filter (`filter <header> <value>`).
    pub async fn filter(&self, header: &str, value: &str) -> EslResult<CommandReply> {
        self.send_ok(Command::Filter {
            header: header.to_string(),
            value: value.to_string(),
        })
        .await
    }

    /// Remove a server-side event filter.
    pub async fn filter_delete(&self, header: &str, value: Option<&str>) -> EslResult<()> {
        self.send_ok(Command::FilterDelete {
            header: header.to_string(),
            value: value.map(|v| v.to_string()),
        })
        .await
        .map(|_| ())
    }

    /// Subscribe to one session's events. Outbound sockets pass `None`
    /// (the session is implicit); inbound sockets name the UUID.
    pub async fn myevents(&self, uuid: Option<&str>) -> EslResult<()> {
        self.send_ok(Command::MyEvents {
            format: "plain".to_string(),
            uuid: uuid.map(|u| u.to_string()),
        })
        .await
        .map(|_| ())
    }

    /// Keep the socket open after hangup so remaining events can drain
    /// (outbound mode).
    pub async fn linger(&self, seconds: Option<u32>) -> EslResult<()> {
        self.send_ok(Command::Linger { seconds }).await.map(|_| ())
    }

    /// Cancel linger mode.
    pub async fn nolinger(&self) -> EslResult<()> {
        self.send_ok(Command::NoLinger).await.map(|_| ())
    }

    /// Redirect session events to this socket (outbound mode).
    pub async fn divert_events(&self, on: bool) -> EslResult<()> {
        self.send_ok(Command::DivertEvents { on }).await.map(|_| ())
    }

    /// Unsubscribe from specific events.
    pub async fn nixevent(&self, events: &[EventName]) -> EslResult<()> {
        let names = events
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.send_ok(Command::NixEvent { events: names })
            .await
            .map(|_| ())
    }

    /// Unsubscribe from all events.
    pub async fn noevents(&self) -> EslResult<()> {
        self.send_ok(Command::NoEvents).await.map(|_| ())
    }

    /// Join the event stream. Subscribers receive all events published
    /// after this call, in arrival order.
    pub fn events(&self) -> EventStream {
        let guard = self.shared.events_tx.lock().unwrap();
        match guard.as_ref() {
            Some(tx) => EventStream {
                rx: Some(tx.subscribe()),
            },
            None => EventStream::closed(),
        }
    }

    /// Send `exit`, await the reply, and close the connection.
    pub async fn exit(&self) -> EslResult<CommandReply> {
        let reply = self.send(Command::Exit).await?;
        self.shared.teardown(DisconnectReason::ClientRequested);
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
        Ok(reply)
    }

    /// Adjust the reply deadline applied to every awaited command.
    pub fn set_command_timeout(&self, duration: Duration) {
        self.shared
            .command_timeout_ms
            .store(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Whether the session is still up.
    pub fn is_connected(&self) -> bool {
        matches!(*self.status_rx.borrow(), SocketStatus::Connected)
    }

    /// Current status snapshot.
    pub fn status(&self) -> SocketStatus {
        self.status_rx.borrow().clone()
    }

    /// Wait until the socket disconnects, returning the reason.
    pub async fn disconnected(&self) -> DisconnectReason {
        let mut rx = self.status_rx.clone();
        loop {
            if let SocketStatus::Disconnected(reason) = &*rx.borrow() {
                return reason.clone();
            }
            if rx.changed().await.is_err() {
                return DisconnectReason::ConnectionClosed;
            }
        }
    }
}
