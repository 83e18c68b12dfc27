//! Transport layer for the real-time channel
//!
//! This module provides the socket abstraction the channel supervisor drives,
//! a tokio-tungstenite implementation of it, and the supervised
//! [`channel::TransportChannel`] built on top.

use crate::protocol::ChannelIdentity;
use async_trait::async_trait;
use thiserror::Error;

pub mod channel;
pub mod ws;

/// A single inbound frame as seen by the channel
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// UTF-8 text frame (JSON envelopes)
    Text(String),
    /// Binary frame - not part of the protocol, ignored
    Binary(Vec<u8>),
    /// Close frame from the peer, with its reason if one was given
    Close(Option<String>),
}

/// One live bidirectional connection
///
/// Implementations must make `recv` cancel-safe: the supervisor polls it inside
/// `tokio::select!` alongside timers and commands.
#[async_trait]
pub trait Socket: Send {
    /// Write a text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound frame; `None` once the stream has ended
    async fn recv(&mut self) -> Option<Result<Frame, TransportError>>;

    /// Close the connection (best effort)
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens sockets for a channel identity
///
/// This is the seam between the channel state machine and the network, so the
/// supervisor can be driven by an in-memory connector in tests.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, identity: &ChannelIdentity) -> Result<Box<dyn Socket>, TransportError>;
}

/// Socket-level errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    #[error("Socket already closed")]
    Closed,
}

pub use channel::TransportChannel;
pub use ws::WsConnector;
