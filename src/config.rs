//! Client configuration

use std::time::Duration;

/// SSH client configuration.
///
/// The `*_deadline` fields bound operations that otherwise retry until the
/// peer responds. `None` means "retry until the operation completes", which
/// mirrors the behavior of the embedded deployment this client descends
/// from; a wedged peer can then hang the caller indefinitely, so callers
/// that need a bound should set one.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Remote hostname or IP
    pub host: String,
    /// Remote port (default: 22)
    pub port: u16,
    /// TCP connection timeout
    pub connect_timeout: Duration,
    /// Upper bound for a single socket readiness wait
    pub wait_timeout: Duration,
    /// Deadline for sending the exec request; exceeding it tears the
    /// connection down
    pub send_timeout: Duration,
    /// Cumulative deadline for draining command output; exceeding it returns
    /// whatever was buffered so far and keeps the connection alive
    pub recv_timeout: Duration,
    /// Response buffer capacity; output beyond it is silently discarded
    pub max_response_len: usize,
    /// Optional deadline for the transport handshake
    pub handshake_deadline: Option<Duration>,
    /// Optional deadline for authentication
    pub auth_deadline: Option<Duration>,
    /// Optional deadline for opening the exec channel
    pub open_deadline: Option<Duration>,
    /// Optional deadline for closing the exec channel
    pub close_deadline: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22,
            connect_timeout: Duration::from_secs(30),
            wait_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(5),
            recv_timeout: Duration::from_secs(10),
            max_response_len: 8192,
            handshake_deadline: None,
            auth_deadline: None,
            open_deadline: None,
            close_deadline: None,
        }
    }
}
