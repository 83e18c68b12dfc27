//! Testing utilities and mock implementations
//!
//! In-memory transport doubles for exercising channels, the hub and the
//! adapter without a WebSocket server.

pub mod mocks;

pub use mocks::*;
