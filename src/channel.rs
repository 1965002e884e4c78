//! The [`Channel`] abstraction: one live FreeSWITCH call, reconstructed
//! from the event stream, with call-control operations on top.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{
    call::{AnswerState, ChannelState, HangupCause},
    constants::{DEFAULT_DTMF_DURATION_MS, FEATURE_CODE_WINDOW_MS},
    error::{EslError, EslResult},
    event::{EventMessage, EventName},
    socket::{EventSocket, EventStream},
};

/// Which leg of the call audio is played to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayLeg {
    /// The channel itself (uses the `playback` application).
    ALeg,
    /// The bridged peer (uses `displace_session`).
    BLeg,
    /// Both legs at once (two parallel `displace_session` runs).
    Both,
}

/// Options for [`Channel::play_and_get_digits`].
#[derive(Debug, Clone)]
pub struct PlayGetDigitsOptions {
    /// Minimum digits to collect.
    pub min_digits: u32,
    /// Maximum digits to collect.
    pub max_digits: u32,
    /// Attempts before giving up.
    pub max_tries: u32,
    /// Inter-attempt timeout in milliseconds.
    pub timeout_ms: u32,
    /// Digits that terminate input early.
    pub terminators: String,
    /// Prompt file.
    pub file: String,
    /// Played when input fails validation.
    pub invalid_file: String,
    /// Channel variable the application stores the digits in.
    pub var_name: String,
    /// Validation regex applied to the collected digits.
    pub digits_regex: String,
}

impl Default for PlayGetDigitsOptions {
    fn default() -> Self {
        Self {
            min_digits: 1,
            max_digits: 11,
            max_tries: 3,
            timeout_ms: 5000,
            terminators: "#".to_string(),
            file: "silence_stream://250".to_string(),
            invalid_file: "silence_stream://250".to_string(),
            var_name: "pagd_digits".to_string(),
            digits_regex: r"\d+".to_string(),
        }
    }
}

/// Options for [`Channel::read`].
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Minimum digits to collect.
    pub min_digits: u32,
    /// Maximum digits to collect.
    pub max_digits: u32,
    /// Prompt file.
    pub file: String,
    /// Channel variable the application stores the digits in.
    pub var_name: String,
    /// Overall timeout in milliseconds.
    pub timeout_ms: u32,
    /// Digits that terminate input early.
    pub terminators: String,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            min_digits: 1,
            max_digits: 11,
            file: "silence_stream://250".to_string(),
            var_name: "read_digits".to_string(),
            timeout_ms: 5000,
            terminators: "#".to_string(),
        }
    }
}

/// Digits collected by [`Channel::read`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadResult {
    /// The collected digits (empty when nothing was entered or the
    /// channel was not answered).
    pub digits: String,
    /// The terminator digit that ended input, if any.
    pub terminator: Option<String>,
}

/// Options for [`Channel::say`].
#[derive(Debug, Clone)]
pub struct SayOptions {
    /// Language module (e.g. `en`).
    pub language: String,
    /// What the text represents (`NUMBER`, `ITEMS`, `CURRENCY`, ...).
    pub say_type: String,
    /// Pronunciation method (`pronounced`, `iterated`, `counted`).
    pub method: String,
    /// The text to speak.
    pub text: String,
}

impl SayOptions {
    /// Say `text` as a plain number in English.
    pub fn number(text: impl Into<String>) -> Self {
        Self {
            language: "en".to_string(),
            say_type: "NUMBER".to_string(),
            method: "pronounced".to_string(),
            text: text.into(),
        }
    }
}

type HangupHook = Box<dyn FnOnce(Arc<EventMessage>) + Send + 'static>;

struct ChannelInner {
    uuid: String,
    socket: EventSocket,
    last_event: watch::Sender<Arc<EventMessage>>,
    disposed: AtomicBool,
    hangup_hook: std::sync::Mutex<Option<HangupHook>>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ChannelInner {
    /// Idempotent disposal: the first caller wins, aborts every derived
    /// task, and (on the hangup path) fires the hook.
    fn dispose(&self, hangup_event: Option<Arc<EventMessage>>) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(uuid = %self.uuid, "channel disposed");
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
        if let Some(event) = hangup_event {
            if let Some(hook) = self.hangup_hook.lock().unwrap().take() {
                hook(event);
            }
        }
    }
}

/// A live FreeSWITCH call identified by its UUID.
///
/// The channel subscribes to its socket's event stream filtered by that
/// UUID; `last_event` always reflects the newest matching event. The
/// first `CHANNEL_HANGUP` disposes the channel and fires the hangup hook
/// exactly once. Cloning shares the same underlying channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("uuid", &self.inner.uuid)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Channel {
    /// Build a channel from its initial event (a `CHANNEL_DATA` on
    /// outbound sockets, or any event carrying the call's `Unique-ID`).
    pub fn new(socket: EventSocket, initial: Arc<EventMessage>) -> EslResult<Self> {
        let uuid = initial
            .uuid()
            .ok_or_else(|| EslError::protocol("initial channel event has no Unique-ID"))?
            .to_string();

        let (last_event, _) = watch::channel(initial);
        let inner = Arc::new(ChannelInner {
            uuid,
            socket: socket.clone(),
            last_event,
            disposed: AtomicBool::new(false),
            hangup_hook: std::sync::Mutex::new(None),
            tasks: std::sync::Mutex::new(Vec::new()),
        });

        // Subscribe before spawning so no event published after this call
        // can be missed by the watcher.
        let events = socket.events();
        let watcher = tokio::spawn(watch_events(events, inner.clone()));
        inner.tasks.lock().unwrap().push(watcher);

        Ok(Self { inner })
    }

    /// The call's immutable UUID.
    pub fn uuid(&self) -> &str {
        &self.inner.uuid
    }

    /// The underlying socket.
    pub fn socket(&self) -> &EventSocket {
        &self.inner.socket
    }

    /// Newest event observed for this UUID.
    pub fn last_event(&self) -> Arc<EventMessage> {
        self.inner.last_event.borrow().clone()
    }

    /// Register the hook fired (once) when the channel hangs up. Replaces
    /// any previously registered hook.
    pub fn on_hangup(&self, hook: impl FnOnce(Arc<EventMessage>) + Send + 'static) {
        *self.inner.hangup_hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Channel state from the newest event.
    pub fn channel_state(&self) -> Option<ChannelState> {
        self.last_event().channel_state()
    }

    /// Answer state from the newest event.
    pub fn answer_state(&self) -> Option<AnswerState> {
        self.last_event().answer_state()
    }

    /// Whether the call has been answered.
    pub fn is_answered(&self) -> bool {
        self.answer_state() == Some(AnswerState::Answered)
    }

    /// Whether the call has early media.
    pub fn is_pre_answered(&self) -> bool {
        self.answer_state() == Some(AnswerState::Early)
    }

    /// Whether the call is currently bridged to another leg.
    pub fn is_bridged(&self) -> bool {
        self.last_event().other_leg_uuid().is_some()
    }

    /// UUID of the bridged peer, while bridged.
    pub fn other_leg_uuid(&self) -> Option<String> {
        self.last_event().other_leg_uuid().map(|u| u.into_owned())
    }

    /// Whether the channel has been disposed (hangup or explicit).
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Dispose the channel: cancel its subscriptions and derived streams.
    /// Idempotent; does not hang up the call.
    pub fn dispose(&self) {
        self.inner.dispose(None);
    }

    fn check_live(&self) -> EslResult<()> {
        if self.is_disposed() {
            return Err(EslError::ChannelDisposed);
        }
        Ok(())
    }

    /// Hang up the call with the given cause. A call that is neither
    /// answered nor pre-answered resolves immediately without sending
    /// anything.
    pub async fn hangup(&self, cause: HangupCause) -> EslResult<()> {
        self.check_live()?;
        if !self.is_answered() && !self.is_pre_answered() {
            return Ok(());
        }
        self.inner
            .socket
            .send_api(&format!("uuid_kill {} {}", self.inner.uuid, cause))
            .await?
            .into_result()
            .map(|_| ())
    }

    /// Play an audio file to one or both legs. No-op unless answered.
    ///
    /// The A-leg uses `playback`; the B-leg (and `Both`) use
    /// `displace_session` with `w`/`r` flags selecting the direction and
    /// `m` mixing the file into the live audio instead of replacing it.
    pub async fn play_file(
        &self,
        file: &str,
        leg: PlayLeg,
        mix: bool,
        terminators: Option<&str>,
    ) -> EslResult<()> {
        self.check_live()?;
        if !self.is_answered() {
            return Ok(());
        }
        if let Some(terminators) = terminators {
            self.set_variable("playback_terminators", terminators).await?;
        }

        let mix_flag = if mix { "m" } else { "" };
        match leg {
            PlayLeg::ALeg => {
                self.execute("playback", Some(file)).await?;
            }
            PlayLeg::BLeg => {
                let arg = format!("{} {}r", file, mix_flag);
                self.execute("displace_session", Some(&arg)).await?;
            }
            PlayLeg::Both => {
                let write_arg = format!("{} {}w", file, mix_flag);
                let read_arg = format!("{} {}r", file, mix_flag);
                tokio::try_join!(
                    self.execute("displace_session", Some(&write_arg)),
                    self.execute("displace_session", Some(&read_arg)),
                )?;
            }
        }
        Ok(())
    }

    /// Run `play_and_get_digits` and return the collected digits
    /// (empty when the call is not answered or nothing valid was entered).
    pub async fn play_and_get_digits(&self, options: PlayGetDigitsOptions) -> EslResult<String> {
        self.check_live()?;
        if !self.is_answered() {
            return Ok(String::new());
        }
        let arg = format!(
            "{} {} {} {} {} {} {} {} {}",
            options.min_digits,
            options.max_digits,
            options.max_tries,
            options.timeout_ms,
            options.terminators,
            options.file,
            options.invalid_file,
            options.var_name,
            options.digits_regex,
        );
        let complete = self.execute("play_and_get_digits", Some(&arg)).await?;
        Ok(complete
            .get_variable(&options.var_name)
            .map(|d| d.into_owned())
            .unwrap_or_default())
    }

    /// Run the `read` application; returns the digits and the terminator
    /// that ended input. Empty result when not answered.
    pub async fn read(&self, options: ReadOptions) -> EslResult<ReadResult> {
        self.check_live()?;
        if !self.is_answered() {
            return Ok(ReadResult::default());
        }
        let arg = format!(
            "{} {} {} {} {} {}",
            options.min_digits,
            options.max_digits,
            options.file,
            options.var_name,
            options.timeout_ms,
            options.terminators,
        );
        let complete = self.execute("read", Some(&arg)).await?;
        Ok(ReadResult {
            digits: complete
                .get_variable(&options.var_name)
                .map(|d| d.into_owned())
                .unwrap_or_default(),
            terminator: complete
                .get_variable("read_terminator_used")
                .map(|t| t.into_owned()),
        })
    }

    /// Speak text with the `say` application. No-op unless answered.
    pub async fn say(&self, options: SayOptions) -> EslResult<()> {
        self.check_live()?;
        if !self.is_answered() {
            return Ok(());
        }
        let arg = format!(
            "{} {} {} {}",
            options.language, options.say_type, options.method, options.text
        );
        self.execute("say", Some(&arg)).await?;
        Ok(())
    }

    /// Set a channel variable (`uuid_setvar`).
    pub async fn set_variable(&self, name: &str, value: &str) -> EslResult<()> {
        self.check_live()?;
        self.inner
            .socket
            .send_api(&format!("uuid_setvar {} {} {}", self.inner.uuid, name, value))
            .await?
            .into_result()
            .map(|_| ())
    }

    /// Read a channel variable (`uuid_getvar`); `None` when unset.
    pub async fn get_variable(&self, name: &str) -> EslResult<Option<String>> {
        self.check_live()?;
        let response = self
            .inner
            .socket
            .send_api(&format!("uuid_getvar {} {}", self.inner.uuid, name))
            .await?;
        let value = response.body_text().trim();
        if value.is_empty() || value == "_undef_" || !response.success() {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }

    /// Send DTMF digits down the call. No-op unless answered.
    pub async fn send_dtmf(&self, digits: &str, duration_ms: Option<u32>) -> EslResult<()> {
        self.check_live()?;
        if !self.is_answered() {
            return Ok(());
        }
        let duration = duration_ms.unwrap_or(DEFAULT_DTMF_DURATION_MS);
        let arg = format!("{}@{}", digits, duration);
        self.execute("send_dtmf", Some(&arg)).await?;
        Ok(())
    }

    /// Start inband DTMF detection: subscribes this socket to DTMF events
    /// and starts the detection session on the channel.
    pub async fn start_detecting_inband_dtmf(&self) -> EslResult<()> {
        self.check_live()?;
        self.inner.socket.subscribe_events(&[EventName::Dtmf]).await?;
        self.inner
            .socket
            .send_api(&format!("uuid_dtmf_session {} start", self.inner.uuid))
            .await?
            .into_result()
            .map(|_| ())
    }

    /// Stop inband DTMF detection.
    pub async fn stop_detecting_inband_dtmf(&self) -> EslResult<()> {
        self.check_live()?;
        self.inner
            .socket
            .send_api(&format!("uuid_dtmf_session {} stop", self.inner.uuid))
            .await?
            .into_result()
            .map(|_| ())
    }

    /// Bridge this call to another live channel (`uuid_bridge`).
    pub async fn bridge_to(&self, other_uuid: &str) -> EslResult<()> {
        self.check_live()?;
        if !self.is_answered() && !self.is_pre_answered() {
            return Ok(());
        }
        self.inner
            .socket
            .send_api(&format!("uuid_bridge {} {}", self.inner.uuid, other_uuid))
            .await?
            .into_result()
            .map(|_| ())
    }

    /// Blind-transfer this call to a dialplan extension (`uuid_transfer`).
    pub async fn transfer_to(&self, extension: &str) -> EslResult<()> {
        self.check_live()?;
        self.inner
            .socket
            .send_api(&format!("uuid_transfer {} {}", self.inner.uuid, extension))
            .await?
            .into_result()
            .map(|_| ())
    }

    /// Execute a dialplan application on this channel and await its
    /// completion event.
    pub async fn execute(&self, app: &str, arg: Option<&str>) -> EslResult<Arc<EventMessage>> {
        self.check_live()?;
        self.inner
            .socket
            .execute_app(&self.inner.uuid, app, arg, true)
            .await
    }

    /// Stream of DTMF digits pressed on this channel.
    ///
    /// The stream ends when the channel is disposed or the socket
    /// disconnects. Remember to subscribe the socket to DTMF events (or
    /// call [`start_detecting_inband_dtmf`](Self::start_detecting_inband_dtmf)).
    pub fn dtmf_digits(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(64);
        let mut events = self.inner.socket.events();
        let uuid = self.inner.uuid.clone();
        let task = tokio::spawn(async move {
            while let Some(item) = events.next().await {
                let event = match item {
                    Ok(event) => event,
                    Err(e) => {
                        warn!("dtmf stream dropped: {}", e);
                        break;
                    }
                };
                if !event.is(EventName::Dtmf) || event.uuid() != Some(uuid.as_str()) {
                    continue;
                }
                let Some(digit) = event.dtmf_digit() else {
                    continue;
                };
                if tx.send(digit.into_owned()).await.is_err() {
                    break;
                }
            }
        });
        self.inner.tasks.lock().unwrap().push(task);
        rx
    }

    /// Stream of two-digit feature codes: pairs of digits completed
    /// within a two-second window whose first digit equals `prefix`
    /// (default `#`). Emits the concatenated pair, e.g. `"#1"`.
    pub fn feature_codes(&self, prefix: Option<&str>) -> mpsc::Receiver<String> {
        let prefix = prefix.unwrap_or("#").to_string();
        let digits = self.dtmf_digits();
        let (tx, rx) = mpsc::channel(16);
        let window = Duration::from_millis(FEATURE_CODE_WINDOW_MS);
        let task = tokio::spawn(pair_feature_codes(prefix, window, digits, tx));
        self.inner.tasks.lock().unwrap().push(task);
        rx
    }
}

/// Pair consecutive digits into feature codes: a pair must complete
/// within `window` of its first digit, and only pairs starting with
/// `prefix` are emitted. Windows do not overlap: a digit consumed as
/// the second of a pair never starts the next one.
pub(crate) async fn pair_feature_codes(
    prefix: String,
    window: Duration,
    mut digits: mpsc::Receiver<String>,
    out: mpsc::Sender<String>,
) {
    loop {
        let Some(first) = digits.recv().await else {
            break;
        };
        match timeout(window, digits.recv()).await {
            Ok(Some(second)) => {
                if first == prefix {
                    let code = format!("{}{}", first, second);
                    if out.send(code).await.is_err() {
                        break;
                    }
                }
            }
            Ok(None) => break,
            // Window expired with a single digit: discard it.
            Err(_) => continue,
        }
    }
}

/// Per-channel event watcher: advances `last_event`, logs answers, and
/// disposes on the first hangup.
async fn watch_events(mut events: EventStream, inner: Arc<ChannelInner>) {
    while let Some(item) = events.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                warn!(uuid = %inner.uuid, "channel watcher dropped: {}", e);
                break;
            }
        };
        if event.uuid() != Some(inner.uuid.as_str()) {
            continue;
        }
        // last_event must reflect the event before anything reacts to it.
        inner.last_event.send_replace(event.clone());

        match event.event_name() {
            Some(EventName::ChannelAnswer) => {
                debug!(uuid = %inner.uuid, "channel answered");
            }
            Some(EventName::ChannelHangup) => {
                debug!(uuid = %inner.uuid, cause = ?event.hangup_cause(), "channel hung up");
                inner.dispose(Some(event));
                return;
            }
            _ => {}
        }
    }
}
