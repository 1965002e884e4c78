//! Connection configuration.

use std::time::Duration;

use crate::constants::{
    DEFAULT_COMMAND_TIMEOUT_MS, DEFAULT_ESL_PORT, DEFAULT_RESPONSE_TIMEOUT_MS, EVENT_BUS_CAPACITY,
};

/// Configuration for an inbound ESL connection.
///
/// Only the endpoint and password are required; the timeouts default to
/// 5 seconds each.
///
/// ```
/// use eventsocket::EslConfig;
///
/// let config = EslConfig::new("127.0.0.1", 8021, "ClueCon");
/// assert_eq!(config.command_timeout.as_millis(), 5000);
/// ```
#[derive(Debug, Clone)]
pub struct EslConfig {
    /// FreeSWITCH host name or address.
    pub host: String,
    /// ESL port (FreeSWITCH default is 8021).
    pub port: u16,
    /// ESL password (`event_socket.conf` default is `ClueCon`).
    pub password: String,
    /// Deadline for TCP connect and each handshake step.
    pub response_timeout: Duration,
    /// Deadline for every awaited command reply or API response.
    pub command_timeout: Duration,
    /// Capacity of the event broadcast bus. Subscribers that fall this
    /// far behind are disconnected with a slow-consumer error.
    pub event_bus_capacity: usize,
}

impl EslConfig {
    /// Configuration with default timeouts.
    pub fn new(host: impl Into<String>, port: u16, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.into(),
            response_timeout: Duration::from_millis(DEFAULT_RESPONSE_TIMEOUT_MS),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            event_bus_capacity: EVENT_BUS_CAPACITY,
        }
    }
}

impl Default for EslConfig {
    fn default() -> Self {
        Self::new("127.0.0.1", DEFAULT_ESL_PORT, "ClueCon")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EslConfig::default();
        assert_eq!(config.port, 8021);
        assert_eq!(config.password, "ClueCon");
        assert_eq!(config.response_timeout, Duration::from_secs(5));
        assert_eq!(config.command_timeout, Duration::from_secs(5));
    }
}
