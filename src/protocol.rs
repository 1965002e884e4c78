//! ESL frame parsing and classification.
//!
//! The wire protocol is a stream of MIME-style frames: a block of
//! `Name: value` header lines terminated by a blank line, optionally
//! followed by exactly `Content-Length` bytes of body. The parser keeps
//! header values RAW; percent-decoding happens at the accessor level
//! ([`Frame::header_decoded`], [`EventMessage`](crate::EventMessage)).

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

use crate::{
    buffer::RecvBuffer,
    constants::{
        CONTENT_TYPE_API_RESPONSE, CONTENT_TYPE_AUTH_REQUEST, CONTENT_TYPE_COMMAND_REPLY,
        CONTENT_TYPE_DISCONNECT_NOTICE, CONTENT_TYPE_EVENT_JSON, CONTENT_TYPE_EVENT_PLAIN,
        CONTENT_TYPE_EVENT_XML, CONTENT_TYPE_RUDE_REJECTION, HEADER_CONTENT_LENGTH,
        HEADER_CONTENT_TYPE, HEADER_TERMINATOR, MAX_FRAME_SIZE,
    },
    error::{EslError, EslResult},
    event::EventFormat,
};

/// Percent-decode a raw header value on access.
///
/// Invalid `%HH` sequences or non-UTF-8 decodes fall back to the raw value
/// unchanged, so a malformed header never poisons the whole frame.
pub(crate) fn decode_value(raw: &str) -> Cow<'_, str> {
    match percent_decode_str(raw).decode_utf8() {
        Ok(decoded) => decoded,
        Err(_) => Cow::Borrowed(raw),
    }
}

/// Frame classification by `Content-Type`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContentClass {
    /// Server solicits authentication (`auth/request`).
    AuthRequest,
    /// Synchronous command reply (`command/reply`).
    CommandReply,
    /// Synchronous API response (`api/response`), body is the command output.
    ApiResponse,
    /// An event in one of the three serialization formats.
    Event(EventFormat),
    /// Server is closing the socket (`text/disconnect-notice`).
    DisconnectNotice,
    /// ACL refused the connection (`text/rude-rejection`).
    RudeRejection,
    /// Anything else (e.g. `log/data`).
    Unknown(String),
}

impl ContentClass {
    /// Classify a `Content-Type` header value.
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            CONTENT_TYPE_AUTH_REQUEST => ContentClass::AuthRequest,
            CONTENT_TYPE_COMMAND_REPLY => ContentClass::CommandReply,
            CONTENT_TYPE_API_RESPONSE => ContentClass::ApiResponse,
            CONTENT_TYPE_EVENT_PLAIN => ContentClass::Event(EventFormat::Plain),
            CONTENT_TYPE_EVENT_JSON => ContentClass::Event(EventFormat::Json),
            CONTENT_TYPE_EVENT_XML => ContentClass::Event(EventFormat::Xml),
            CONTENT_TYPE_DISCONNECT_NOTICE => ContentClass::DisconnectNotice,
            CONTENT_TYPE_RUDE_REJECTION => ContentClass::RudeRejection,
            other => ContentClass::Unknown(other.to_string()),
        }
    }
}

/// One parsed wire frame: ordered raw headers plus optional body.
#[derive(Debug, Clone)]
pub struct Frame {
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl Frame {
    pub(crate) fn new(headers: Vec<(String, String)>, body: Option<String>) -> Self {
        Self { headers, body }
    }

    /// Raw (undecoded) header value. First match wins; FreeSWITCH does not
    /// emit duplicate frame headers in practice.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Header value, percent-decoded on access.
    pub fn header_decoded(&self, name: &str) -> Option<Cow<'_, str>> {
        self.header(name).map(decode_value)
    }

    /// All headers in wire order, values raw.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Frame body, if `Content-Length` announced one.
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    pub(crate) fn into_parts(self) -> (Vec<(String, String)>, Option<String>) {
        (self.headers, self.body)
    }

    /// Classification of this frame by its `Content-Type` header.
    pub fn content_class(&self) -> ContentClass {
        self.header(HEADER_CONTENT_TYPE)
            .map(ContentClass::from_content_type)
            .unwrap_or_else(|| ContentClass::Unknown(String::new()))
    }
}

enum ParseState {
    ReadHeaders,
    ReadBody {
        headers: Vec<(String, String)>,
        length: usize,
    },
}

/// Incremental frame parser.
///
/// Feed raw socket bytes with [`feed`](Self::feed); each
/// [`poll_frame`](Self::poll_frame) call yields at most one complete frame.
pub struct FrameParser {
    buffer: RecvBuffer,
    state: ParseState,
}

impl FrameParser {
    pub fn new() -> Self {
        Self {
            buffer: RecvBuffer::new(),
            state: ParseState::ReadHeaders,
        }
    }

    /// Append bytes read from the socket.
    pub fn feed(&mut self, bytes: &[u8]) -> EslResult<()> {
        self.buffer.extend(bytes)
    }

    /// True when EOF at this point would cut a frame in half.
    pub fn mid_frame(&self) -> bool {
        matches!(self.state, ParseState::ReadBody { .. }) || self.buffer.remaining() > 0
    }

    /// Try to extract one complete frame from buffered bytes.
    pub fn poll_frame(&mut self) -> EslResult<Option<Frame>> {
        loop {
            match &mut self.state {
                ParseState::ReadHeaders => {
                    let Some(raw) = self.buffer.take_until(HEADER_TERMINATOR.as_bytes()) else {
                        return Ok(None);
                    };
                    let text = String::from_utf8(raw)
                        .map_err(|_| EslError::protocol("invalid UTF-8 in frame headers"))?;
                    let headers = parse_header_block(&text)?;

                    // Every ESL frame carries Content-Type; a missing one
                    // means we lost framing (e.g. a lying Content-Length).
                    if headers.iter().all(|(k, _)| k != HEADER_CONTENT_TYPE) {
                        return Err(EslError::protocol(
                            "frame without Content-Type, protocol desync",
                        ));
                    }

                    let length = match headers
                        .iter()
                        .find(|(k, _)| k == HEADER_CONTENT_LENGTH)
                        .map(|(_, v)| v.as_str())
                    {
                        Some(v) => v.trim().parse::<usize>().map_err(|_| {
                            EslError::InvalidHeader {
                                header: format!("Content-Length: {}", v),
                            }
                        })?,
                        None => 0,
                    };
                    if length > MAX_FRAME_SIZE {
                        return Err(EslError::protocol(format!(
                            "Content-Length {} exceeds frame limit {}",
                            length, MAX_FRAME_SIZE
                        )));
                    }

                    if length == 0 {
                        return Ok(Some(Frame::new(headers, None)));
                    }
                    self.state = ParseState::ReadBody { headers, length };
                }
                ParseState::ReadBody { headers, length } => {
                    let Some(raw) = self.buffer.take_exact(*length) else {
                        return Ok(None);
                    };
                    let body = String::from_utf8(raw)
                        .map_err(|_| EslError::protocol("invalid UTF-8 in frame body"))?;
                    let headers = std::mem::take(headers);
                    self.state = ParseState::ReadHeaders;
                    return Ok(Some(Frame::new(headers, Some(body))));
                }
            }
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a header block into ordered `(name, value)` pairs, values raw.
///
/// Lines split on the first `:`; `.lines()` strips any stray `\r`.
pub(crate) fn parse_header_block(text: &str) -> EslResult<Vec<(String, String)>> {
    let mut headers = Vec::new();
    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let Some(colon) = line.find(':') else {
            return Err(EslError::InvalidHeader {
                header: line.to_string(),
            });
        };
        let name = line[..colon].trim().to_string();
        let value = line[colon + 1..]
            .strip_prefix(' ')
            .unwrap_or(&line[colon + 1..])
            .trim_end()
            .to_string();
        headers.push((name, value));
    }
    Ok(headers)
}
