//! moodfeed - self-healing real-time mood feed client
//!
//! Keeps one long-lived WebSocket connection to a `/ws/<subject-id>` endpoint,
//! detects silent connections with an application-level heartbeat, reconnects
//! with bounded exponential backoff, and fans inbound envelopes out to any
//! number of subscribers.
//!
//! # Layers
//!
//! - [`protocol`]: envelopes, mood payloads and channel identities
//! - [`transport`]: the supervised [`TransportChannel`] and its socket seam
//! - [`hub`]: the [`SubscriptionHub`] sharing one channel among subscribers
//! - [`adapter`]: the typed [`MoodUpdates`] consumer
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use moodfeed::adapter::{EndpointConfig, MoodUpdates, StaticSession};
//! use moodfeed::hub::SubscriptionHub;
//! use moodfeed::transport::channel::ChannelConfig;
//! use moodfeed::transport::WsConnector;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let hub = Arc::new(SubscriptionHub::new(
//!     Arc::new(WsConnector::new()),
//!     ChannelConfig::default(),
//! ));
//! let updates = MoodUpdates::new(
//!     hub,
//!     Arc::new(StaticSession::signed_in("user-42")),
//!     EndpointConfig::new("localhost:8000", false),
//!     Duration::from_secs(3),
//! );
//! updates.start().expect("valid subject id");
//!
//! let mut view = updates.watch();
//! while view.changed().await.is_ok() {
//!     println!("{:?}", view.borrow().mood);
//! }
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod hub;
pub mod observability;
pub mod protocol;
pub mod testing;
pub mod transport;

pub use adapter::{MoodUpdates, MoodView};
pub use config::{ConfigError, FeedConfig};
pub use error::{FeedError, FeedResult};
pub use hub::SubscriptionHub;
pub use protocol::*;
pub use transport::channel::{ChannelError, ConnectionState, Subscription};
pub use transport::TransportChannel;
