//! tokio-tungstenite socket implementation

use super::{Connector, Frame, Socket, TransportError};
use crate::protocol::ChannelIdentity;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector that dials real WebSocket endpoints
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, identity: &ChannelIdentity) -> Result<Box<dyn Socket>, TransportError> {
        debug!(target: "ws_transport", "Dialing {}", identity);

        let (stream, response) = connect_async(identity.as_str())
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

        debug!(
            target: "ws_transport",
            status = %response.status(),
            "WebSocket handshake complete"
        );

        let (write, read) = stream.split();
        Ok(Box::new(WsSocket { write, read }))
    }
}

/// Split tungstenite stream behind the [`Socket`] trait
pub struct WsSocket {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
}

#[async_trait]
impl Socket for WsSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.write
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            let message = match self.read.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::ReceiveFailed(e.to_string()))),
            };

            let frame = match message {
                Message::Text(text) => Frame::Text(text),
                Message::Binary(bytes) => Frame::Binary(bytes),
                Message::Close(close) => Frame::Close(close.map(|c| c.reason.into_owned())),
                // Control frames are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.write
            .close()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
