//! Self-healing real-time channel
//!
//! Pure modules (`connection`, `heartbeat`, `reconnect`, `message_handler`)
//! hold the state machine decisions; `client` drives them from a supervisor
//! task; `listeners` is the fan-out registry shared with the hub.

pub mod client;
pub mod connection;
pub mod heartbeat;
pub mod listeners;
pub mod message_handler;
pub mod reconnect;

pub use client::TransportChannel;
pub use connection::{
    ChannelConfig, ChannelError, CloseEvent, CloseReason, ConnectionState, RetryState,
};
pub use heartbeat::{HealthMetrics, HeartbeatConfig, HeartbeatMonitor};
pub use listeners::{ListenerKind, Listeners, Subscription};
pub use message_handler::{FrameRoute, MessageHandler};
pub use reconnect::{ReconnectConfig, ReconnectPolicy, ReconnectionDecision};
