//! Pure connection state and configuration for the transport channel
//!
//! This module contains the connection state enum, channel configuration,
//! close events and the channel error type. Nothing here performs I/O.

use super::heartbeat::HeartbeatConfig;
use super::reconnect::ReconnectConfig;
use crate::protocol::IdentityError;
use crate::transport::TransportError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Connection state of a channel instance
///
/// Transitions within one attempt are monotonic:
/// `Connecting -> Open -> Closing -> Closed`, or `Connecting -> Closed` when the
/// attempt fails. Every new attempt starts again at `Connecting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }

    /// Connecting or open - a new `open()` is a no-op in these states
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq)]
pub enum CloseReason {
    /// The connect attempt failed or timed out
    ConnectFailed,
    /// The server sent a close frame or the stream ended
    PeerClosed { reason: Option<String> },
    /// Read or write on the socket failed
    TransportError,
    /// No pong within the staleness deadline
    HeartbeatTimeout,
    /// `close()` was called on the channel
    ClosedByClient { permanent: bool },
    /// `reconnect()` replaced the connection
    ManualReconnect,
}

impl CloseReason {
    /// Closes that hand control to the reconnection policy
    pub fn is_unplanned(&self) -> bool {
        !matches!(
            self,
            CloseReason::ClosedByClient { permanent: true } | CloseReason::ManualReconnect
        )
    }
}

/// Delivered to close handlers after every close
#[derive(Debug, Clone, PartialEq)]
pub struct CloseEvent {
    pub reason: CloseReason,
    /// Delay before the next automatic attempt, if one is scheduled
    pub retry_in: Option<Duration>,
}

/// Where the reconnection policy stands after the latest close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryState {
    /// Nothing scheduled (connected, connecting, or never opened)
    #[default]
    Idle,
    /// A backoff timer is pending
    Scheduled,
    /// The attempt cap was reached; only a manual reconnect recovers
    Exhausted,
}

/// Channel behavior configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,
    pub heartbeat: HeartbeatConfig,
    pub reconnect: ReconnectConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Errors surfaced to error handlers and callers
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Connection attempt failed: {0}")]
    ConnectFailed(#[source] TransportError),
    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),
    #[error("Connection lost: reconnection attempts exhausted after {attempts} tries")]
    RetriesExhausted { attempts: u32 },
    #[error("Invalid channel identity: {0}")]
    InvalidIdentity(#[from] IdentityError),
}
