//! Wire message types for the mood feed
//!
//! Every frame on the real-time channel is a JSON text frame carrying an
//! [`Envelope`]. The envelope is generic; only the consumer adapter narrows
//! `mood_update` payloads into [`MoodData`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Generic envelope exchanged over the channel
///
/// Fields the client does not know about are kept in `extra` so frames can be
/// forwarded to subscribers verbatim.
///
/// # Examples
/// ```
/// use moodfeed::protocol::{Envelope, EnvelopeKind};
///
/// let envelope: Envelope =
///     serde_json::from_str(r#"{"type":"mood_update","data":{"mood":"Chill"}}"#).unwrap();
/// assert_eq!(envelope.kind(), EnvelopeKind::MoodUpdate);
///
/// let ping = serde_json::to_string(&Envelope::ping()).unwrap();
/// assert_eq!(ping, r#"{"type":"ping"}"#);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Message type discriminator (`type` on the wire)
    #[serde(rename = "type")]
    pub message_type: String,
    /// Structured payload (mood updates)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Human-readable message (errors, connection notices)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Any other top-level fields, e.g. server timestamps
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Recognized envelope types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    MoodUpdate,
    Error,
    ConnectionEstablished,
    Ping,
    Pong,
    /// Unknown type - tolerated and ignored by the adapter
    Other,
}

impl EnvelopeKind {
    pub fn parse(message_type: &str) -> Self {
        match message_type {
            "mood_update" => EnvelopeKind::MoodUpdate,
            "error" => EnvelopeKind::Error,
            "connection_established" => EnvelopeKind::ConnectionEstablished,
            "ping" => EnvelopeKind::Ping,
            "pong" => EnvelopeKind::Pong,
            _ => EnvelopeKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKind::MoodUpdate => "mood_update",
            EnvelopeKind::Error => "error",
            EnvelopeKind::ConnectionEstablished => "connection_established",
            EnvelopeKind::Ping => "ping",
            EnvelopeKind::Pong => "pong",
            EnvelopeKind::Other => "other",
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Envelope {
    /// Create an envelope carrying only a type
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            data: None,
            message: None,
            extra: Map::new(),
        }
    }

    pub fn ping() -> Self {
        Self::new("ping")
    }

    pub fn pong() -> Self {
        Self::new("pong")
    }

    pub fn connection_established() -> Self {
        Self::new("connection_established")
    }

    pub fn mood_update(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::new("mood_update")
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new("error")
        }
    }

    /// Classify this envelope
    pub fn kind(&self) -> EnvelopeKind {
        EnvelopeKind::parse(&self.message_type)
    }

    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode for the wire
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Narrow a `mood_update` payload into [`MoodData`]
    ///
    /// Returns `None` for other envelope types or a missing payload.
    pub fn mood_data(&self) -> Option<Result<MoodData, serde_json::Error>> {
        if self.kind() != EnvelopeKind::MoodUpdate {
            return None;
        }
        self.data
            .as_ref()
            .map(|data| MoodData::deserialize(data.clone()))
    }
}

/// Typed mood snapshot pushed by the server
///
/// Only `mood` is required; the client treats the rest as opaque display data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MoodData {
    pub mood: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    /// Classifier confidence in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<TrackInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_features: Option<AudioFeatures>,
    /// Server timestamp in milliseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Currently playing track
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrackInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album_image: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub progress_ms: u64,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

/// Audio feature name to value (energy, valence, tempo, ...)
pub type AudioFeatures = HashMap<String, f64>;
