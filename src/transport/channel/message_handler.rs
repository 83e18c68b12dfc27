//! Pure frame routing for inbound traffic
//!
//! Decides what the supervisor does with each frame: deliver it to
//! subscribers, consume it as a heartbeat, or drop it.

use crate::protocol::{Envelope, EnvelopeKind};
use crate::transport::Frame;
use tracing::debug;

/// Routing decision for an inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRoute {
    /// Forward to every message handler
    Deliver(Envelope),
    /// Heartbeat response - update liveness, do not forward
    Pong,
    /// The peer closed the connection
    PeerClosed(Option<String>),
    /// Text frame that is not a valid envelope
    DecodeFailed(String),
    /// Not part of the protocol
    Ignored(&'static str),
}

/// Stateless frame routing
pub struct MessageHandler;

impl MessageHandler {
    /// Route one inbound frame
    pub fn route_frame(frame: Frame) -> FrameRoute {
        match frame {
            Frame::Text(text) => match Self::parse_envelope(&text) {
                Ok(envelope) if envelope.kind() == EnvelopeKind::Pong => FrameRoute::Pong,
                Ok(envelope) => FrameRoute::Deliver(envelope),
                Err(reason) => FrameRoute::DecodeFailed(reason),
            },
            Frame::Binary(bytes) => {
                debug!(target: "ws_transport", "Ignoring {} byte binary frame", bytes.len());
                FrameRoute::Ignored("binary frame")
            }
            Frame::Close(reason) => FrameRoute::PeerClosed(reason),
        }
    }

    /// Decode a text frame into an envelope
    pub fn parse_envelope(text: &str) -> Result<Envelope, String> {
        Envelope::decode(text).map_err(|e| format!("Failed to parse envelope: {e}"))
    }

    /// Encode an outbound envelope
    pub fn format_envelope(envelope: &Envelope) -> Result<String, String> {
        envelope
            .encode()
            .map_err(|e| format!("Serialization error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pong_is_consumed() {
        let route = MessageHandler::route_frame(Frame::Text(r#"{"type":"pong"}"#.to_string()));
        assert_eq!(route, FrameRoute::Pong);

        let with_timestamp = MessageHandler::route_frame(Frame::Text(
            r#"{"type":"pong","timestamp":1700000000000}"#.to_string(),
        ));
        assert_eq!(with_timestamp, FrameRoute::Pong);
    }

    #[test]
    fn test_recognized_and_unknown_frames_are_delivered() {
        for text in [
            r#"{"type":"mood_update","data":{"mood":"Chill"}}"#,
            r#"{"type":"error","message":"boom"}"#,
            r#"{"type":"connection_established"}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"player_state","data":{}}"#,
        ] {
            let route = MessageHandler::route_frame(Frame::Text(text.to_string()));
            match route {
                FrameRoute::Deliver(envelope) => {
                    assert_eq!(envelope, Envelope::decode(text).unwrap());
                }
                other => panic!("expected delivery for {text}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_malformed_text_fails_decode() {
        let route = MessageHandler::route_frame(Frame::Text("{not json".to_string()));
        assert!(matches!(route, FrameRoute::DecodeFailed(_)));

        let route = MessageHandler::route_frame(Frame::Text("pong".to_string()));
        assert!(matches!(route, FrameRoute::DecodeFailed(_)));
    }

    #[test]
    fn test_binary_is_ignored() {
        let route = MessageHandler::route_frame(Frame::Binary(vec![1, 2, 3]));
        assert_eq!(route, FrameRoute::Ignored("binary frame"));
    }

    #[test]
    fn test_close_frame() {
        let route = MessageHandler::route_frame(Frame::Close(Some("bye".to_string())));
        assert_eq!(route, FrameRoute::PeerClosed(Some("bye".to_string())));
    }

    #[test]
    fn test_format_envelope() {
        assert_eq!(
            MessageHandler::format_envelope(&Envelope::ping()).unwrap(),
            r#"{"type":"ping"}"#
        );
    }
}
