//! Outgoing command encoding and the reply/response types.

use std::borrow::Cow;
use std::fmt;

use crate::{
    constants::{HEADER_REPLY_TEXT, HEADER_TERMINATOR, LINE_TERMINATOR},
    error::{EslError, EslResult},
    event::EventMessage,
    headers::EventHeader,
    protocol::{decode_value, Frame},
};

/// Reject user-supplied strings containing newlines.
///
/// ESL commands are line-delimited; an embedded newline would smuggle a
/// second protocol command onto the wire.
fn validate_no_newlines(s: &str, context: &str) -> EslResult<()> {
    if s.contains('\n') || s.contains('\r') {
        return Err(EslError::protocol(format!(
            "{} must not contain newlines",
            context
        )));
    }
    Ok(())
}

/// Commands the socket knows how to put on the wire.
#[derive(Clone)]
pub enum Command {
    /// Authenticate with the ESL password.
    Auth { password: String },
    /// Synchronous API command (`api <cmd>`).
    Api { command: String },
    /// Background API command. The optional `job_uuid` is sent as a
    /// `Job-UUID` header so the caller controls the correlation key.
    BgApi {
        command: String,
        job_uuid: Option<String>,
    },
    /// Subscribe to events (`event <format> <names...>`).
    Events { format: String, events: String },
    /// Add a server-side event filter.
    Filter { header: String, value: String },
    /// Remove event filters (`filter delete ...`).
    FilterDelete {
        header: String,
        value: Option<String>,
    },
    /// Subscribe to one session's events.
    MyEvents {
        format: String,
        uuid: Option<String>,
    },
    /// Redirect session events to this socket (outbound mode).
    DivertEvents { on: bool },
    /// Unsubscribe from specific events.
    NixEvent { events: String },
    /// Unsubscribe from all events.
    NoEvents,
    /// Keep the socket open after hangup (outbound mode).
    Linger { seconds: Option<u32> },
    /// Cancel linger mode.
    NoLinger,
    /// Request channel data (first command on an outbound socket).
    Connect,
    /// Close the session gracefully.
    Exit,
    /// `sendmsg <uuid>` with arbitrary dispatch headers and optional body.
    SendMsg {
        uuid: String,
        headers: Vec<(String, String)>,
        body: Option<String>,
    },
    /// Raw single-line command, passed through verbatim.
    Raw { line: String },
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Auth { .. } => f
                .debug_struct("Auth")
                .field("password", &"[REDACTED]")
                .finish(),
            Command::Api { command } => {
                f.debug_struct("Api").field("command", command).finish()
            }
            Command::BgApi { command, job_uuid } => f
                .debug_struct("BgApi")
                .field("command", command)
                .field("job_uuid", job_uuid)
                .finish(),
            Command::Events { format, events } => f
                .debug_struct("Events")
                .field("format", format)
                .field("events", events)
                .finish(),
            Command::Filter { header, value } => f
                .debug_struct("Filter")
                .field("header", header)
                .field("value", value)
                .finish(),
            Command::FilterDelete { header, value } => f
                .debug_struct("FilterDelete")
                .field("header", header)
                .field("value", value)
                .finish(),
            Command::MyEvents { format, uuid } => f
                .debug_struct("MyEvents")
                .field("format", format)
                .field("uuid", uuid)
                .finish(),
            Command::DivertEvents { on } => {
                f.debug_struct("DivertEvents").field("on", on).finish()
            }
            Command::NixEvent { events } => {
                f.debug_struct("NixEvent").field("events", events).finish()
            }
            Command::NoEvents => write!(f, "NoEvents"),
            Command::Linger { seconds } => {
                f.debug_struct("Linger").field("seconds", seconds).finish()
            }
            Command::NoLinger => write!(f, "NoLinger"),
            Command::Connect => write!(f, "Connect"),
            Command::Exit => write!(f, "Exit"),
            Command::SendMsg { uuid, headers, .. } => f
                .debug_struct("SendMsg")
                .field("uuid", uuid)
                .field("headers", headers)
                .finish(),
            Command::Raw { line } => f.debug_struct("Raw").field("line", line).finish(),
        }
    }
}

impl Command {
    fn simple(cmd: &str, args: &[&str]) -> String {
        let mut out = String::from(cmd);
        for arg in args {
            out.push(' ');
            out.push_str(arg);
        }
        out.push_str(HEADER_TERMINATOR);
        out
    }

    /// Validate all user-supplied fields, then encode to the wire format.
    pub fn to_wire_format(&self) -> EslResult<String> {
        match self {
            Command::Auth { password } => {
                validate_no_newlines(password, "password")?;
                Ok(Self::simple("auth", &[password]))
            }
            Command::Api { command } => {
                validate_no_newlines(command, "api command")?;
                Ok(Self::simple("api", &[command]))
            }
            Command::BgApi { command, job_uuid } => {
                validate_no_newlines(command, "bgapi command")?;
                match job_uuid {
                    Some(uuid) => {
                        validate_no_newlines(uuid, "job uuid")?;
                        Ok(format!(
                            "bgapi {}{}Job-UUID: {}{}{}",
                            command, LINE_TERMINATOR, uuid, LINE_TERMINATOR, LINE_TERMINATOR
                        ))
                    }
                    None => Ok(Self::simple("bgapi", &[command])),
                }
            }
            Command::Events { format, events } => {
                validate_no_newlines(format, "event format")?;
                validate_no_newlines(events, "event list")?;
                Ok(Self::simple("event", &[format, events]))
            }
            Command::Filter { header, value } => {
                validate_no_newlines(header, "filter header")?;
                validate_no_newlines(value, "filter value")?;
                Ok(Self::simple("filter", &[header, value]))
            }
            Command::FilterDelete { header, value } => {
                validate_no_newlines(header, "filter delete header")?;
                if let Some(v) = value {
                    validate_no_newlines(v, "filter delete value")?;
                }
                Ok(match value {
                    Some(v) => Self::simple("filter", &["delete", header, v]),
                    None => Self::simple("filter", &["delete", header]),
                })
            }
            Command::MyEvents { format, uuid } => {
                validate_no_newlines(format, "myevents format")?;
                if let Some(u) = uuid {
                    validate_no_newlines(u, "myevents uuid")?;
                }
                Ok(match uuid {
                    Some(u) => Self::simple("myevents", &[u, format]),
                    None => Self::simple("myevents", &[format]),
                })
            }
            Command::DivertEvents { on } => {
                let arg = if *on { "on" } else { "off" };
                Ok(Self::simple("divert_events", &[arg]))
            }
            Command::NixEvent { events } => {
                validate_no_newlines(events, "nixevent list")?;
                Ok(Self::simple("nixevent", &[events]))
            }
            Command::NoEvents => Ok(Self::simple("noevents", &[])),
            Command::Linger { seconds } => Ok(match seconds {
                Some(n) => Self::simple("linger", &[&n.to_string()]),
                None => Self::simple("linger", &[]),
            }),
            Command::NoLinger => Ok(Self::simple("nolinger", &[])),
            Command::Connect => Ok(Self::simple("connect", &[])),
            Command::Exit => Ok(Self::simple("exit", &[])),
            Command::SendMsg {
                uuid,
                headers,
                body,
            } => {
                validate_no_newlines(uuid, "sendmsg uuid")?;
                let mut out = format!("sendmsg {}{}", uuid, LINE_TERMINATOR);
                for (name, value) in headers {
                    validate_no_newlines(name, "sendmsg header name")?;
                    validate_no_newlines(value, "sendmsg header value")?;
                    out.push_str(name);
                    out.push_str(": ");
                    out.push_str(value);
                    out.push_str(LINE_TERMINATOR);
                }
                match body {
                    Some(body) => {
                        out.push_str(&format!(
                            "Content-Length: {}{}{}",
                            body.len(),
                            LINE_TERMINATOR,
                            LINE_TERMINATOR
                        ));
                        out.push_str(body);
                    }
                    None => out.push_str(LINE_TERMINATOR),
                }
                Ok(out)
            }
            Command::Raw { line } => {
                validate_no_newlines(line, "command")?;
                Ok(Self::simple(line, &[]))
            }
        }
    }

    /// Build the `sendmsg` that executes a dialplan application on a
    /// channel. `event_uuid` becomes the `Application-UUID` on the
    /// resulting execute events, which is what disambiguates repeated
    /// applications on the same channel.
    pub fn execute(
        uuid: &str,
        app: &str,
        arg: Option<&str>,
        event_lock: bool,
        event_uuid: &str,
    ) -> Self {
        let mut headers = vec![
            ("call-command".to_string(), "execute".to_string()),
            ("execute-app-name".to_string(), app.to_string()),
        ];
        if let Some(arg) = arg {
            headers.push(("execute-app-arg".to_string(), arg.to_string()));
        }
        if event_lock {
            headers.push(("event-lock".to_string(), "true".to_string()));
        }
        headers.push(("Event-UUID".to_string(), event_uuid.to_string()));
        Command::SendMsg {
            uuid: uuid.to_string(),
            headers,
            body: None,
        }
    }
}

/// Synchronous reply to a command (`Content-Type: command/reply`).
#[derive(Debug, Clone)]
pub struct CommandReply {
    success: bool,
    reply_text: String,
    headers: Vec<(String, String)>,
}

impl CommandReply {
    /// Classify a `command/reply` frame. Success means `Reply-Text`
    /// starts with `+OK` (absent or empty counts as success; a handful
    /// of commands reply with headers only).
    pub fn from_frame(frame: Frame) -> Self {
        let reply_text = frame
            .header_decoded(HEADER_REPLY_TEXT)
            .map(|v| v.into_owned())
            .unwrap_or_default();
        let success = reply_text.is_empty() || reply_text.starts_with("+OK");
        let (headers, _) = frame.into_parts();
        Self {
            success,
            reply_text,
            headers,
        }
    }

    /// `true` when `Reply-Text` began with `+OK` (or was absent).
    pub fn success(&self) -> bool {
        self.success
    }

    /// The full `Reply-Text` value (e.g. `+OK accepted`).
    pub fn reply_text(&self) -> &str {
        &self.reply_text
    }

    /// Reply header by name, percent-decoded on access.
    pub fn header(&self, name: impl AsRef<str>) -> Option<Cow<'_, str>> {
        let name = name.as_ref();
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| decode_value(v))
    }

    /// All reply headers in wire order, values raw.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// `Job-UUID` from a `bgapi` acknowledgement.
    pub fn job_uuid(&self) -> Option<Cow<'_, str>> {
        self.header(EventHeader::JobUuid.as_str())
    }

    /// `Event-UUID` acknowledged for a `sendmsg` execute request.
    pub fn event_uuid(&self) -> Option<Cow<'_, str>> {
        self.header(EventHeader::EventUuid.as_str())
    }

    /// Convert `-ERR` replies into [`EslError::CommandFailed`].
    pub fn into_result(self) -> EslResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(EslError::CommandFailed {
                reply_text: self.reply_text,
            })
        }
    }
}

/// Synchronous API response (`Content-Type: api/response`); the body is
/// the command's stdout.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    success: bool,
    body_text: String,
}

impl ApiResponse {
    /// Classify an `api/response` frame. Failure means the body starts
    /// with `-ERR` or `-USAGE`.
    pub fn from_frame(frame: Frame) -> Self {
        let body_text = frame.body().unwrap_or_default().to_string();
        Self::from_body(body_text)
    }

    pub(crate) fn from_body(body_text: String) -> Self {
        let trimmed = body_text.trim_start();
        let success = !trimmed.starts_with("-ERR") && !trimmed.starts_with("-USAGE");
        Self { success, body_text }
    }

    /// `true` when the body did not begin with `-ERR`/`-USAGE`.
    pub fn success(&self) -> bool {
        self.success
    }

    /// The response body.
    pub fn body_text(&self) -> &str {
        &self.body_text
    }

    /// Convert failures into [`EslError::ApiFailed`].
    pub fn into_result(self) -> EslResult<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(EslError::ApiFailed {
                body: self.body_text,
            })
        }
    }
}

/// Completion of a `bgapi` command, delivered by its `BACKGROUND_JOB`
/// event. The body is classified the same way as an [`ApiResponse`].
#[derive(Debug, Clone)]
pub struct BackgroundJobResult {
    /// The job's `Job-UUID`.
    pub job_uuid: String,
    /// Whether the body did not begin with `-ERR`/`-USAGE`.
    pub success: bool,
    /// The job's output.
    pub body_text: String,
}

impl BackgroundJobResult {
    /// Derive from a `BACKGROUND_JOB` event.
    pub fn from_event(job_uuid: String, event: &EventMessage) -> Self {
        let api = ApiResponse::from_body(event.body().unwrap_or_default().to_string());
        Self {
            job_uuid,
            success: api.success,
            body_text: api.body_text,
        }
    }
}
