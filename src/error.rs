//! Crate-level error type
//!
//! Each layer has its own error enum; `FeedError` gathers them for callers that
//! drive the whole client, such as the binary.

use crate::config::ConfigError;
use crate::protocol::IdentityError;
use crate::transport::channel::ChannelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid channel identity: {0}")]
    Identity(#[from] IdentityError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl FeedError {
    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// True for errors the user can fix by changing configuration or input
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            FeedError::Config(_) | FeedError::Identity(_) | FeedError::InvalidInput { .. }
        )
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let error: FeedError = IdentityError::Empty.into();
        assert!(matches!(error, FeedError::Identity(_)));
        assert!(error.is_user_error());

        let error: FeedError = ChannelError::RetriesExhausted { attempts: 5 }.into();
        assert!(matches!(error, FeedError::Channel(_)));
        assert!(!error.is_user_error());

        let error: FeedError = ConfigError::InvalidConfig("bad".to_string()).into();
        assert!(error.to_string().contains("bad"));
    }

    #[test]
    fn test_invalid_input_constructor() {
        let error = FeedError::invalid_input("no subject id");
        assert_eq!(error.to_string(), "Invalid input: no subject id");
        assert!(error.is_user_error());
    }

    #[test]
    fn test_question_mark_propagation() {
        fn parse(address: &str) -> FeedResult<crate::protocol::ChannelIdentity> {
            Ok(crate::protocol::ChannelIdentity::parse(address)?)
        }

        assert!(parse("ws://localhost:8000/ws/user-42").is_ok());
        assert!(matches!(parse("nope"), Err(FeedError::Identity(_))));
    }
}
