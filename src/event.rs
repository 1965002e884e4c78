//! Event names, formats, and the immutable [`EventMessage`] view.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{
    call::{AnswerState, CallDirection, ChannelState, HangupCause},
    error::{EslError, EslResult},
    headers::EventHeader,
    protocol::{decode_value, parse_header_block, ContentClass, Frame},
};

/// Event serialization formats supported by `mod_event_socket`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum EventFormat {
    /// `text/event-plain` (default): headers in the body, percent-encoded.
    Plain,
    /// `text/event-json`.
    Json,
    /// `text/event-xml`.
    Xml,
}

impl fmt::Display for EventFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventFormat::Plain => write!(f, "plain"),
            EventFormat::Json => write!(f, "json"),
            EventFormat::Xml => write!(f, "xml"),
        }
    }
}

/// Error returned when parsing an invalid event format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventFormatError(pub String);

impl fmt::Display for ParseEventFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event format: {}", self.0)
    }
}

impl std::error::Error for ParseEventFormatError {}

impl FromStr for EventFormat {
    type Err = ParseEventFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            _ => Err(ParseEventFormatError(s.to_string())),
        }
    }
}

/// Generates the `EventName` enum with `Display`, `FromStr`, and an
/// `Option`-returning `parse` for unrecognized names.
macro_rules! event_names {
    (
        $(
            $(#[$attr:meta])*
            $variant:ident => $wire:literal
        ),+ $(,)?
    ) => {
        /// FreeSWITCH event names in the canonical order of
        /// `switch_event.c` EVENT_NAMES[].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        pub enum EventName {
            $(
                $(#[$attr])*
                $variant,
            )+
        }

        impl EventName {
            /// Parse a wire name (case-insensitive); `None` for names this
            /// enum does not cover.
            pub fn parse(s: &str) -> Option<Self> {
                match s.to_uppercase().as_str() {
                    $( $wire => Some(EventName::$variant), )+
                    _ => None,
                }
            }
        }

        impl fmt::Display for EventName {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $( EventName::$variant => $wire, )+
                };
                f.write_str(name)
            }
        }

        impl FromStr for EventName {
            type Err = ParseEventNameError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s).ok_or_else(|| ParseEventNameError(s.to_string()))
            }
        }
    };
}

event_names! {
    Custom => "CUSTOM",
    Clone => "CLONE",
    ChannelCreate => "CHANNEL_CREATE",
    ChannelDestroy => "CHANNEL_DESTROY",
    ChannelState => "CHANNEL_STATE",
    ChannelCallstate => "CHANNEL_CALLSTATE",
    ChannelAnswer => "CHANNEL_ANSWER",
    ChannelHangup => "CHANNEL_HANGUP",
    ChannelHangupComplete => "CHANNEL_HANGUP_COMPLETE",
    ChannelExecute => "CHANNEL_EXECUTE",
    ChannelExecuteComplete => "CHANNEL_EXECUTE_COMPLETE",
    ChannelHold => "CHANNEL_HOLD",
    ChannelUnhold => "CHANNEL_UNHOLD",
    ChannelBridge => "CHANNEL_BRIDGE",
    ChannelUnbridge => "CHANNEL_UNBRIDGE",
    ChannelProgress => "CHANNEL_PROGRESS",
    ChannelProgressMedia => "CHANNEL_PROGRESS_MEDIA",
    ChannelOutgoing => "CHANNEL_OUTGOING",
    ChannelPark => "CHANNEL_PARK",
    ChannelUnpark => "CHANNEL_UNPARK",
    ChannelApplication => "CHANNEL_APPLICATION",
    ChannelOriginate => "CHANNEL_ORIGINATE",
    ChannelUuid => "CHANNEL_UUID",
    Api => "API",
    Log => "LOG",
    InboundChan => "INBOUND_CHAN",
    OutboundChan => "OUTBOUND_CHAN",
    Startup => "STARTUP",
    Shutdown => "SHUTDOWN",
    Publish => "PUBLISH",
    Unpublish => "UNPUBLISH",
    Talk => "TALK",
    Notalk => "NOTALK",
    SessionCrash => "SESSION_CRASH",
    ModuleLoad => "MODULE_LOAD",
    ModuleUnload => "MODULE_UNLOAD",
    Dtmf => "DTMF",
    Message => "MESSAGE",
    PresenceIn => "PRESENCE_IN",
    PresenceOut => "PRESENCE_OUT",
    PresenceProbe => "PRESENCE_PROBE",
    MessageWaiting => "MESSAGE_WAITING",
    MessageQuery => "MESSAGE_QUERY",
    Roster => "ROSTER",
    Codec => "CODEC",
    BackgroundJob => "BACKGROUND_JOB",
    DetectedSpeech => "DETECTED_SPEECH",
    DetectedTone => "DETECTED_TONE",
    PrivateCommand => "PRIVATE_COMMAND",
    Heartbeat => "HEARTBEAT",
    Trap => "TRAP",
    AddSchedule => "ADD_SCHEDULE",
    DelSchedule => "DEL_SCHEDULE",
    ExeSchedule => "EXE_SCHEDULE",
    ReSchedule => "RE_SCHEDULE",
    ReloadXml => "RELOADXML",
    Notify => "NOTIFY",
    SendMessage => "SEND_MESSAGE",
    RecvMessage => "RECV_MESSAGE",
    RequestParams => "REQUEST_PARAMS",
    ChannelData => "CHANNEL_DATA",
    General => "GENERAL",
    Command => "COMMAND",
    SessionHeartbeat => "SESSION_HEARTBEAT",
    ClientDisconnected => "CLIENT_DISCONNECTED",
    ServerDisconnected => "SERVER_DISCONNECTED",
    SendInfo => "SEND_INFO",
    RecvInfo => "RECV_INFO",
    CallSecure => "CALL_SECURE",
    Nat => "NAT",
    RecordStart => "RECORD_START",
    RecordStop => "RECORD_STOP",
    PlaybackStart => "PLAYBACK_START",
    PlaybackStop => "PLAYBACK_STOP",
    CallUpdate => "CALL_UPDATE",
    Failure => "FAILURE",
    SocketData => "SOCKET_DATA",
    MediaBugStart => "MEDIA_BUG_START",
    MediaBugStop => "MEDIA_BUG_STOP",
    CallSetupReq => "CALL_SETUP_REQ",
    CallSetupResult => "CALL_SETUP_RESULT",
    CallDetail => "CALL_DETAIL",
    DeviceState => "DEVICE_STATE",
    Text => "TEXT",
    ShutdownRequested => "SHUTDOWN_REQUESTED",
    /// Wildcard used only in subscriptions.
    All => "ALL",
}

/// Error returned when parsing an unknown event name string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventNameError(pub String);

impl fmt::Display for ParseEventNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event name: {}", self.0)
    }
}

impl std::error::Error for ParseEventNameError {}

/// Frozen view of one event frame.
///
/// Header values are stored raw and percent-decoded on access; the typed
/// fields every consumer needs (name, call UUID, channel/answer state,
/// hangup cause) are extracted once at construction. Equality is by
/// identity: every frame off the wire is value-unique, so the type
/// deliberately does not implement `PartialEq`.
#[derive(Debug, Clone)]
pub struct EventMessage {
    event_name: Option<EventName>,
    uuid: Option<String>,
    channel_state: Option<ChannelState>,
    answer_state: Option<AnswerState>,
    hangup_cause: Option<HangupCause>,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl EventMessage {
    /// Build from a classified event frame.
    ///
    /// Plain events carry their headers percent-encoded in the frame body
    /// (with an optional inner body after the blank line); JSON and XML
    /// events embed a serialized document. A frame with no body (such as
    /// the channel-data reply on an outbound socket) uses the frame
    /// headers directly.
    pub fn from_frame(frame: Frame) -> EslResult<Self> {
        let format = match frame.content_class() {
            ContentClass::Event(format) => format,
            _ => EventFormat::Plain,
        };
        if frame.body().is_none() {
            let (headers, body) = frame.into_parts();
            return Ok(Self::from_headers(headers, body));
        }
        match format {
            EventFormat::Plain => Self::from_plain_body(frame),
            EventFormat::Json => Self::from_json_body(frame),
            EventFormat::Xml => Self::from_xml_body(frame),
        }
    }

    fn from_plain_body(frame: Frame) -> EslResult<Self> {
        let body = frame.body().expect("checked by caller");

        // Event headers end at the first blank line; anything after it is
        // the inner body (e.g. a BACKGROUND_JOB result).
        let (header_section, inner_body) = match body.find("\n\n") {
            Some(pos) => (&body[..pos], Some(&body[pos + 2..])),
            None => (body, None),
        };

        let headers = parse_header_block(header_section)?;
        let body = inner_body
            .filter(|b| !b.is_empty())
            .map(|b| b.to_string());
        Ok(Self::from_headers(headers, body))
    }

    fn from_json_body(frame: Frame) -> EslResult<Self> {
        let body = frame.body().expect("checked by caller");
        let value: serde_json::Value = serde_json::from_str(body)?;
        let obj = value
            .as_object()
            .ok_or_else(|| EslError::protocol("JSON event is not an object"))?;

        let mut headers = Vec::with_capacity(obj.len());
        let mut inner_body = None;
        for (key, value) in obj {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if key == "_body" {
                inner_body = Some(text);
            } else {
                headers.push((key.clone(), text));
            }
        }
        Ok(Self::from_headers(headers, inner_body))
    }

    fn from_xml_body(frame: Frame) -> EslResult<Self> {
        use quick_xml::events::Event as XmlEvent;
        use quick_xml::Reader;

        let body = frame.body().expect("checked by caller");
        let mut reader = Reader::from_str(body);

        // Serialized shape: `<event><headers><Name>value</Name>...</headers>
        // <body>...</body></event>`. Keep the element path as a stack and
        // interpret each text node by where it sits: three levels deep
        // under `headers` it is a header value (the tag is the header
        // name), two levels deep inside `body` it is the inner body.
        let mut path: Vec<String> = Vec::new();
        let mut headers = Vec::new();
        let mut inner_body = None;

        loop {
            match reader.read_event()? {
                XmlEvent::Start(start) => {
                    path.push(String::from_utf8_lossy(start.name().as_ref()).into_owned());
                }
                XmlEvent::End(_) => {
                    path.pop();
                }
                XmlEvent::Text(text) => {
                    let value = text.unescape()?.into_owned();
                    match path.as_slice() {
                        [_, section, name] if section == "headers" => {
                            headers.push((name.clone(), value));
                        }
                        [_, section] if section == "body" => {
                            inner_body = Some(value);
                        }
                        _ => {}
                    }
                }
                XmlEvent::Eof => break,
                _ => {}
            }
        }

        Ok(Self::from_headers(headers, inner_body))
    }

    /// Build directly from ordered `(name, value)` pairs (values may be
    /// percent-encoded or plain) plus an optional body.
    pub fn from_headers(headers: Vec<(String, String)>, body: Option<String>) -> Self {
        let lookup = |name: &str| {
            headers
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| decode_value(v))
        };

        let event_name = lookup(EventHeader::EventName.as_str())
            .and_then(|v| EventName::parse(&v));
        let uuid = lookup(EventHeader::UniqueId.as_str())
            .or_else(|| lookup(EventHeader::ChannelCallUuid.as_str()))
            .map(|v| v.into_owned());
        let channel_state =
            lookup(EventHeader::ChannelState.as_str()).and_then(|v| v.parse().ok());
        let answer_state =
            lookup(EventHeader::AnswerState.as_str()).and_then(|v| v.parse().ok());
        let hangup_cause =
            lookup(EventHeader::HangupCause.as_str()).and_then(|v| v.parse().ok());

        Self {
            event_name,
            uuid,
            channel_state,
            answer_state,
            hangup_cause,
            headers,
            body,
        }
    }

    /// Parsed event name, `None` if unrecognized.
    pub fn event_name(&self) -> Option<EventName> {
        self.event_name
    }

    /// Whether this event has the given name.
    pub fn is(&self, name: EventName) -> bool {
        self.event_name == Some(name)
    }

    /// The call UUID (`Unique-ID`, falling back to `Channel-Call-UUID`).
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    /// Parsed `Channel-State`.
    pub fn channel_state(&self) -> Option<ChannelState> {
        self.channel_state
    }

    /// Parsed `Answer-State`.
    pub fn answer_state(&self) -> Option<AnswerState> {
        self.answer_state
    }

    /// Parsed `Hangup-Cause`.
    pub fn hangup_cause(&self) -> Option<HangupCause> {
        self.hangup_cause
    }

    /// Parsed `Channel-State-Number`.
    pub fn channel_state_number(&self) -> Option<ChannelState> {
        let n: u8 = self
            .get_header(EventHeader::ChannelStateNumber.as_str())?
            .parse()
            .ok()?;
        ChannelState::from_number(n)
    }

    /// Parsed `Call-Direction`.
    pub fn call_direction(&self) -> Option<CallDirection> {
        self.get_header(EventHeader::CallDirection.as_str())?
            .parse()
            .ok()
    }

    /// Header value by name, percent-decoded on access.
    pub fn get_header(&self, name: impl AsRef<str>) -> Option<Cow<'_, str>> {
        let name = name.as_ref();
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| decode_value(v))
    }

    /// Header value by name, raw as received.
    pub fn get_header_raw(&self, name: impl AsRef<str>) -> Option<&str> {
        let name = name.as_ref();
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the header is present at all.
    pub fn has_header(&self, name: impl AsRef<str>) -> bool {
        let name = name.as_ref();
        self.headers.iter().any(|(k, _)| k == name)
    }

    /// Channel variable lookup: reads the `variable_<name>` header.
    pub fn get_variable(&self, name: &str) -> Option<Cow<'_, str>> {
        let key = format!("variable_{}", name);
        self.get_header(key)
    }

    /// All headers in wire order, values raw.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Inner event body (e.g. a `BACKGROUND_JOB` result).
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// `Event-Subclass` for `CUSTOM` events (e.g. `sofia::register`).
    pub fn subclass(&self) -> Option<Cow<'_, str>> {
        self.get_header(EventHeader::EventSubclass.as_str())
    }

    /// `Job-UUID` from `BACKGROUND_JOB` events.
    pub fn job_uuid(&self) -> Option<Cow<'_, str>> {
        self.get_header(EventHeader::JobUuid.as_str())
    }

    /// `Application` from execute-related events.
    pub fn application(&self) -> Option<Cow<'_, str>> {
        self.get_header(EventHeader::Application.as_str())
    }

    /// `Application-UUID` correlating a `CHANNEL_EXECUTE_COMPLETE` to the
    /// `Event-UUID` of the `sendmsg` that started it.
    pub fn application_uuid(&self) -> Option<Cow<'_, str>> {
        self.get_header(EventHeader::ApplicationUuid.as_str())
    }

    /// `Other-Leg-Unique-ID`, present while bridged.
    pub fn other_leg_uuid(&self) -> Option<Cow<'_, str>> {
        self.get_header(EventHeader::OtherLegUniqueId.as_str())
    }

    /// `DTMF-Digit` from DTMF events.
    pub fn dtmf_digit(&self) -> Option<Cow<'_, str>> {
        self.get_header(EventHeader::DtmfDigit.as_str())
    }
}
