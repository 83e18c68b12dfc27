//! Channel identity and endpoint construction
//!
//! A channel is identified by its full WebSocket URL, which embeds the
//! per-user path segment: `ws(s)://<host>/ws/<subject-id>`.

use std::fmt;
use thiserror::Error;
use url::Url;

/// Path prefix of the real-time endpoint
pub const WS_PATH_PREFIX: &str = "/ws";

/// Parsed, validated endpoint address of a real-time channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelIdentity {
    url: Url,
}

impl ChannelIdentity {
    /// Parse and validate an endpoint address
    ///
    /// Only `ws` and `wss` URLs with a host are accepted.
    pub fn parse(address: &str) -> Result<Self, IdentityError> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::Empty);
        }

        let url = Url::parse(trimmed).map_err(|e| IdentityError::Malformed {
            address: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(IdentityError::UnsupportedScheme(other.to_string())),
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(IdentityError::MissingHost(trimmed.to_string()));
        }

        Ok(Self { url })
    }

    /// Build the identity for a subject on a host
    pub fn for_subject(host: &str, subject_id: &str, secure: bool) -> Result<Self, IdentityError> {
        validate_subject_id(subject_id)?;
        let scheme = if secure { "wss" } else { "ws" };
        let host = strip_http_scheme(host).trim_end_matches('/');
        Self::parse(&format!("{scheme}://{host}{WS_PATH_PREFIX}/{subject_id}"))
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn is_secure(&self) -> bool {
        self.url.scheme() == "wss"
    }

    /// Last path segment, i.e. the subject id for `/ws/<subject-id>` endpoints
    pub fn subject_id(&self) -> Option<&str> {
        self.url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
    }
}

impl fmt::Display for ChannelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Strip an `http://` or `https://` prefix from a configured origin
pub fn strip_http_scheme(origin: &str) -> &str {
    origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .unwrap_or(origin)
}

/// Subject ids become a single path segment, so keep them to a safe charset
pub fn validate_subject_id(subject_id: &str) -> Result<(), IdentityError> {
    if subject_id.is_empty() {
        return Err(IdentityError::EmptySubject);
    }

    // "." and ".." would be normalized away by URL parsing
    if subject_id.chars().all(|ch| ch == '.') {
        return Err(IdentityError::DotSegmentSubject(subject_id.to_string()));
    }

    for ch in subject_id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(IdentityError::InvalidSubjectChar(ch));
        }
    }

    Ok(())
}

/// Channel identity validation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IdentityError {
    #[error("Channel address cannot be empty")]
    Empty,
    #[error("Malformed channel address '{address}': {reason}")]
    Malformed { address: String, reason: String },
    #[error("Unsupported channel scheme '{0}' (expected ws or wss)")]
    UnsupportedScheme(String),
    #[error("Channel address has no host: {0}")]
    MissingHost(String),
    #[error("Subject id cannot be empty")]
    EmptySubject,
    #[error("Subject id cannot be a dot segment: '{0}'")]
    DotSegmentSubject(String),
    #[error("Subject id contains invalid character: '{0}'")]
    InvalidSubjectChar(char),
}
