//! Protocol constants and tuning values.

/// Default FreeSWITCH ESL port for inbound connections.
pub const DEFAULT_ESL_PORT: u16 = 8021;

/// Read buffer handed to the socket (64KB, one TCP receive window).
pub const SOCKET_BUF_SIZE: usize = 65536;

/// Largest single frame we accept (8MB). Validates `Content-Length`;
/// nothing FreeSWITCH emits legitimately comes close (the largest is a
/// full `sofia status` dump at ~1-2MB).
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

/// Hard cap on buffered unparsed bytes (16MB). Exceeding it means the
/// peer is not speaking ESL.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Frame terminator: a blank line ends the header block.
pub const HEADER_TERMINATOR: &str = "\n\n";
/// Single line terminator inside multi-line commands.
pub const LINE_TERMINATOR: &str = "\n";

/// `Content-Type` values the classifier recognizes.
pub const CONTENT_TYPE_AUTH_REQUEST: &str = "auth/request";
pub const CONTENT_TYPE_COMMAND_REPLY: &str = "command/reply";
pub const CONTENT_TYPE_API_RESPONSE: &str = "api/response";
pub const CONTENT_TYPE_EVENT_PLAIN: &str = "text/event-plain";
pub const CONTENT_TYPE_EVENT_JSON: &str = "text/event-json";
pub const CONTENT_TYPE_EVENT_XML: &str = "text/event-xml";
pub const CONTENT_TYPE_DISCONNECT_NOTICE: &str = "text/disconnect-notice";
pub const CONTENT_TYPE_RUDE_REJECTION: &str = "text/rude-rejection";

/// Framing header names (protocol level, not event payload).
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";
/// Framing header: body length in bytes.
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";
/// Framing header: command reply status line.
pub const HEADER_REPLY_TEXT: &str = "Reply-Text";

/// Default timeout for command replies and API responses (milliseconds).
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 5000;
/// Default timeout for the TCP connect and auth handshake (milliseconds).
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 5000;

/// Capacity of the event broadcast bus. A subscriber that falls this far
/// behind is disconnected with a slow-consumer error.
pub const EVENT_BUS_CAPACITY: usize = 1024;

/// Default duration of a DTMF tone sent with `send_dtmf` (milliseconds).
pub const DEFAULT_DTMF_DURATION_MS: u32 = 2000;

/// Window within which a two-digit feature code must complete.
pub const FEATURE_CODE_WINDOW_MS: u64 = 2000;
