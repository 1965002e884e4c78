//! Crate-wide error taxonomy.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type EslResult<T> = Result<T, EslError>;

/// Errors surfaced by the ESL client.
///
/// Connection-fatal variants (`Io`, `ConnectionClosed`, `Protocol`,
/// `InvalidHeader`) tear down the socket: every pending waiter and
/// background job fails and the event stream terminates. `CommandFailed`,
/// `ApiFailed` and `Timeout` are scoped to the failing operation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EslError {
    /// Transport-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The TCP connection closed (EOF or disconnect notice).
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation attempted on a socket that is no longer connected.
    #[error("not connected")]
    NotConnected,

    /// The `auth` reply was `-ERR`, or the handshake went off-script.
    #[error("authentication failed: {message}")]
    AuthFailed {
        /// Server-provided reason, if any.
        message: String,
    },

    /// The server refused the connection with a `text/rude-rejection`.
    #[error("connection rejected: {reason}")]
    Rejected {
        /// Rejection reason from the frame body (usually an ACL name).
        reason: String,
    },

    /// Frame-level parse failure or protocol desync.
    #[error("protocol error: {message}")]
    Protocol {
        /// What went wrong.
        message: String,
    },

    /// A header line could not be parsed.
    #[error("invalid header: {header}")]
    InvalidHeader {
        /// The offending line or header name.
        header: String,
    },

    /// A `command/reply` came back `-ERR`.
    #[error("command failed: {reply_text}")]
    CommandFailed {
        /// The full `Reply-Text` value.
        reply_text: String,
    },

    /// An `api/response` body began with `-ERR` or `-USAGE`.
    #[error("api command failed: {body}")]
    ApiFailed {
        /// The response body.
        body: String,
    },

    /// An awaited completion did not arrive within the deadline.
    /// Non-fatal: the reply slot stays reserved so later commands keep
    /// their alignment with the reply stream.
    #[error("operation timed out after {timeout_ms}ms")]
    Timeout {
        /// The deadline that expired.
        timeout_ms: u64,
    },

    /// This event subscriber fell behind the broadcast bus and was
    /// disconnected. Other subscribers and the parser are unaffected.
    #[error("event subscriber too slow, {missed} event(s) missed")]
    SlowConsumer {
        /// Number of events dropped for this subscriber.
        missed: u64,
    },

    /// The socket disconnected before the `BACKGROUND_JOB` event for this
    /// job arrived.
    #[error("background job {job_uuid} lost to disconnect")]
    JobLost {
        /// The job's `Job-UUID`.
        job_uuid: String,
    },

    /// Operation attempted on a channel that has been disposed.
    #[error("channel disposed")]
    ChannelDisposed,

    /// `text/event-json` body failed to parse.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// `text/event-xml` body failed to parse.
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),
}

impl EslError {
    /// Shorthand for a [`EslError::Protocol`] with a formatted message.
    pub fn protocol(message: impl Into<String>) -> Self {
        EslError::Protocol {
            message: message.into(),
        }
    }

    /// Shorthand for a [`EslError::AuthFailed`].
    pub fn auth_failed(message: impl Into<String>) -> Self {
        EslError::AuthFailed {
            message: message.into(),
        }
    }

    /// Whether this error is fatal to the whole socket (as opposed to the
    /// single operation that produced it).
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EslError::Io(_)
                | EslError::ConnectionClosed
                | EslError::Protocol { .. }
                | EslError::InvalidHeader { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        assert!(EslError::ConnectionClosed.is_fatal());
        assert!(EslError::protocol("desync").is_fatal());
        assert!(!EslError::Timeout { timeout_ms: 5000 }.is_fatal());
        assert!(!EslError::CommandFailed {
            reply_text: "-ERR no".into()
        }
        .is_fatal());
    }

    #[test]
    fn display_messages() {
        let e = EslError::auth_failed("invalid");
        assert_eq!(e.to_string(), "authentication failed: invalid");

        let e = EslError::SlowConsumer { missed: 3 };
        assert!(e.to_string().contains("3 event(s)"));
    }
}
