//! Wire protocol for the mood feed
//!
//! Envelope and payload types carried over the real-time channel, plus the
//! endpoint addressing used to identify a channel.

pub mod endpoint;
pub mod messages;

pub use endpoint::*;
pub use messages::*;
