//! FreeSWITCH Event Socket (ESL) client for Rust.
//!
//! ESL is a line-oriented control protocol that intermixes three streams
//! on one TCP connection: synchronous command replies, synchronous API
//! responses, and an open-ended stream of call events. This crate turns
//! that into a disciplined async model:
//!
//! - [`EventSocket`]: framing, strict command/reply correlation (two
//!   FIFOs of pending waiters), `bgapi` job correlation, and a multicast
//!   event stream any number of tasks can subscribe to.
//! - [`Channel`]: one live call, its state continuously reconstructed
//!   from the event stream, with call-control operations (`play_file`,
//!   `read`, `send_dtmf`, `hangup`, ...) and multi-leg orchestrations
//!   such as [`Channel::attended_transfer`].
//!
//! # Inbound connection
//!
//! ```rust,no_run
//! use eventsocket::{EventSocket, EventName, EslError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let socket = EventSocket::connect("localhost", 8021, "ClueCon").await?;
//!
//!     let response = socket.send_api("status").await?;
//!     println!("{}", response.body_text());
//!
//!     socket.subscribe_events(&[EventName::ChannelAnswer, EventName::ChannelHangup]).await?;
//!     let mut events = socket.events();
//!     while let Some(Ok(event)) = events.next().await {
//!         println!("{:?} on {:?}", event.event_name(), event.uuid());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Outbound mode
//!
//! FreeSWITCH connects to *your* application via the `socket` dialplan
//! application; each accepted connection is one call:
//!
//! ```rust,no_run
//! use eventsocket::{OutboundListener, PlayLeg, EslError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), EslError> {
//!     let listener = OutboundListener::bind("0.0.0.0:8084").await?;
//!     loop {
//!         let session = listener.accept().await?;
//!         tokio::spawn(async move {
//!             let channel = session.channel;
//!             channel.on_hangup(|event| {
//!                 println!("hangup: {:?}", event.hangup_cause());
//!             });
//!             let _ = channel
//!                 .play_file("ivr/ivr-welcome.wav", PlayLeg::ALeg, false, None)
//!                 .await;
//!         });
//!     }
//! }
//! ```
//!
//! # Background API jobs
//!
//! ```rust,no_run
//! # async fn example(socket: &eventsocket::EventSocket) -> Result<(), eventsocket::EslError> {
//! use eventsocket::EventName;
//! socket.subscribe_events(&[EventName::BackgroundJob]).await?;
//! let result = socket.bg_api("originate user/1000 &park").await?;
//! println!("job {} -> {}", result.job_uuid, result.body_text);
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;

pub mod call;
pub mod channel;
pub mod command;
pub mod config;
pub mod constants;
pub mod error;
pub mod event;
pub mod headers;
pub mod outbound;
pub mod socket;
pub mod transfer;

pub(crate) mod buffer;
pub mod protocol;

pub use call::{
    AnswerState, CallDirection, ChannelState, HangupCause, ParseAnswerStateError,
    ParseCallDirectionError, ParseChannelStateError, ParseHangupCauseError,
};
pub use channel::{
    Channel, PlayGetDigitsOptions, PlayLeg, ReadOptions, ReadResult, SayOptions,
};
pub use command::{ApiResponse, BackgroundJobResult, Command, CommandReply};
pub use config::EslConfig;
pub use constants::DEFAULT_ESL_PORT;
pub use error::{EslError, EslResult};
pub use event::{EventFormat, EventMessage, EventName, ParseEventNameError};
pub use headers::{EventHeader, ParseEventHeaderError};
pub use outbound::{OutboundListener, OutboundSession};
pub use protocol::{ContentClass, Frame, FrameParser};
pub use socket::{DisconnectReason, EventSocket, EventStream, SocketStatus};
pub use transfer::{TransferFailure, TransferResult};
