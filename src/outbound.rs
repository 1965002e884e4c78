//! Outbound-socket listener: FreeSWITCH connects to us.
//!
//! In outbound mode the dialplan's `socket` application opens a TCP
//! connection to the application for each call. The first command on the
//! accepted socket must be `connect`, whose reply carries every channel
//! variable of the initiating call as headers (`Event-Name: CHANNEL_DATA`).

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, info};

use crate::{
    channel::Channel,
    command::Command,
    config::EslConfig,
    error::EslResult,
    event::EventMessage,
    socket::EventSocket,
};

/// One accepted outbound session, handshake already complete.
#[derive(Debug)]
pub struct OutboundSession {
    /// The connection to drive the call with.
    pub socket: EventSocket,
    /// The initiating channel's variables from the `connect` reply.
    pub channel_data: Arc<EventMessage>,
    /// A channel built from the channel data, already tracking events.
    pub channel: Channel,
}

/// TCP listener accepting outbound connections from `mod_event_socket`.
///
/// ```xml
/// <action application="socket" data="127.0.0.1:8084 async full"/>
/// ```
#[derive(Debug)]
pub struct OutboundListener {
    listener: TcpListener,
    config: EslConfig,
}

impl OutboundListener {
    /// Bind with default configuration (the password field is unused in
    /// outbound mode; no authentication happens on accepted sockets).
    pub async fn bind(addr: impl ToSocketAddrs) -> EslResult<Self> {
        Self::bind_with_config(addr, EslConfig::default()).await
    }

    /// Bind with explicit configuration.
    pub async fn bind_with_config(
        addr: impl ToSocketAddrs,
        config: EslConfig,
    ) -> EslResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("outbound listener on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    /// The bound address (useful with port 0).
    pub fn local_addr(&self) -> EslResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one connection and perform the outbound handshake:
    /// `connect`, `linger`, `myevents`. Returns the session with a
    /// ready-made [`Channel`] for the initiating call.
    pub async fn accept(&self) -> EslResult<OutboundSession> {
        let (stream, peer) = self.listener.accept().await?;
        info!("accepted outbound connection from {}", peer);

        let socket = EventSocket::from_accepted(stream, &self.config);

        let reply = socket.send(Command::Connect).await?.into_result()?;
        let channel_data = Arc::new(EventMessage::from_headers(
            reply.headers().to_vec(),
            None,
        ));
        debug!(
            uuid = ?channel_data.uuid(),
            channel = ?channel_data.get_header("Channel-Name").as_deref(),
            "outbound session connected"
        );

        socket.linger(None).await?;
        socket.myevents(None).await?;

        let channel = Channel::new(socket.clone(), channel_data.clone())?;
        Ok(OutboundSession {
            socket,
            channel_data,
            channel,
        })
    }
}
