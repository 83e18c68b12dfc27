//! Consumer adapters over the subscription hub

pub mod endpoint;
pub mod mood;
pub mod session;

pub use endpoint::EndpointConfig;
pub use mood::{MoodUpdates, MoodView};
pub use session::{SessionProvider, StaticSession};
