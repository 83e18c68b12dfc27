//! Where the mood feed lives

use crate::protocol::{strip_http_scheme, ChannelIdentity, IdentityError};
use serde::{Deserialize, Serialize};

/// Endpoint settings used to derive a subject's channel identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// API origin, with or without an `http(s)://` prefix; wins over `page_host`
    pub api_origin: Option<String>,
    /// Host (and port) the dashboard itself is served from
    pub page_host: String,
    /// Use `wss` instead of `ws`
    pub secure: bool,
}

impl EndpointConfig {
    pub fn new(page_host: impl Into<String>, secure: bool) -> Self {
        Self {
            api_origin: None,
            page_host: page_host.into(),
            secure,
        }
    }

    pub fn with_api_origin(mut self, api_origin: impl Into<String>) -> Self {
        self.api_origin = Some(api_origin.into());
        self
    }

    /// Host the channel connects to
    pub fn host(&self) -> &str {
        self.api_origin
            .as_deref()
            .map(|origin| strip_http_scheme(origin.trim()))
            .filter(|origin| !origin.is_empty())
            .unwrap_or(&self.page_host)
    }

    /// `ws(s)://<host>/ws/<subject_id>`
    pub fn identity_for(&self, subject_id: &str) -> Result<ChannelIdentity, IdentityError> {
        ChannelIdentity::for_subject(self.host(), subject_id, self.secure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_host_is_used_without_api_origin() {
        let endpoint = EndpointConfig::new("localhost:8000", false);
        assert_eq!(
            endpoint.identity_for("user-42").unwrap().as_str(),
            "ws://localhost:8000/ws/user-42"
        );
    }

    #[test]
    fn test_api_origin_wins_and_is_stripped() {
        let endpoint =
            EndpointConfig::new("dashboard.example.com", true).with_api_origin("https://api.example.com/");
        assert_eq!(endpoint.host(), "api.example.com/");
        assert_eq!(
            endpoint.identity_for("user-42").unwrap().as_str(),
            "wss://api.example.com/ws/user-42"
        );
    }

    #[test]
    fn test_blank_api_origin_falls_back() {
        let endpoint = EndpointConfig::new("localhost:8000", false).with_api_origin("http://");
        assert_eq!(endpoint.host(), "localhost:8000");
    }

    #[test]
    fn test_invalid_subject_is_rejected() {
        let endpoint = EndpointConfig::new("localhost:8000", false);
        assert!(endpoint.identity_for("").is_err());
        assert!(endpoint.identity_for("a/b").is_err());
    }
}
