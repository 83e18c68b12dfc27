//! Mock implementations for testing
//!
//! Provides an in-memory [`Connector`] whose sockets are driven from the test
//! through [`MockServer`] handles, so channel behavior can be exercised without
//! a network and under a paused tokio clock.

use crate::protocol::{ChannelIdentity, Envelope};
use crate::transport::{Connector, Frame, Socket, TransportError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Server-side event fed to a mock socket
#[derive(Debug)]
enum ServerEvent {
    Frame(Result<Frame, TransportError>),
    End,
}

#[derive(Debug, Default)]
struct ConnectorState {
    connect_count: usize,
    fail_next: usize,
    hang_next: usize,
    servers: Vec<MockServer>,
    identities: Vec<String>,
}

/// Scriptable in-memory connector
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` connect attempts fail immediately
    pub fn fail_next(&self, count: usize) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).fail_next += count;
    }

    /// Make the next `count` connect attempts never complete
    pub fn hang_next(&self, count: usize) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).hang_next += count;
    }

    /// Connect attempts made so far, successful or not
    pub fn connect_count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).connect_count
    }

    /// Identities of every connect attempt, in order
    pub fn connected_identities(&self) -> Vec<String> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).identities.clone()
    }

    /// Server handle of the `index`-th successful connection
    pub fn server(&self, index: usize) -> Option<MockServer> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).servers.get(index).cloned()
    }

    /// Server handle of the most recent successful connection
    pub fn latest_server(&self) -> Option<MockServer> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).servers.last().cloned()
    }

    /// Successful connections so far
    pub fn server_count(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).servers.len()
    }

    /// Sockets handed out and not yet dropped
    pub fn live_sockets(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live sockets observed
    pub fn max_live_sockets(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, identity: &ChannelIdentity) -> Result<Box<dyn Socket>, TransportError> {
        let hang = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.connect_count += 1;
            state.identities.push(identity.to_string());

            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(TransportError::ConnectFailed(
                    "connection refused (scripted)".to_string(),
                ));
            }
            if state.hang_next > 0 {
                state.hang_next -= 1;
                true
            } else {
                false
            }
        };

        if hang {
            std::future::pending::<()>().await;
        }

        let (events, inbound) = mpsc::unbounded_channel();
        let server = MockServer {
            identity: identity.to_string(),
            events,
            sent: Arc::new(Mutex::new(Vec::new())),
            closed_by_client: Arc::new(AtomicBool::new(false)),
            fail_sends: Arc::new(AtomicBool::new(false)),
        };

        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        let socket = MockSocket {
            inbound,
            sent: server.sent.clone(),
            closed_by_client: server.closed_by_client.clone(),
            fail_sends: server.fail_sends.clone(),
            live: self.live.clone(),
        };
        self.state.lock().unwrap_or_else(PoisonError::into_inner).servers.push(server);

        Ok(Box::new(socket))
    }
}

/// Test-side handle to one mock connection
#[derive(Debug, Clone)]
pub struct MockServer {
    identity: String,
    events: mpsc::UnboundedSender<ServerEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed_by_client: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl MockServer {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn push_text(&self, text: &str) {
        self.push_frame(Frame::Text(text.to_string()));
    }

    pub fn push_envelope(&self, envelope: &Envelope) {
        if let Ok(text) = envelope.encode() {
            self.push_text(&text);
        }
    }

    pub fn push_frame(&self, frame: Frame) {
        let _ = self.events.send(ServerEvent::Frame(Ok(frame)));
    }

    /// Deliver a read error to the client
    pub fn push_error(&self, error: TransportError) {
        let _ = self.events.send(ServerEvent::Frame(Err(error)));
    }

    /// Send a close frame
    pub fn close(&self, reason: Option<&str>) {
        self.push_frame(Frame::Close(reason.map(str::to_string)));
    }

    /// End the stream without a close frame (dropped connection)
    pub fn drop_connection(&self) {
        let _ = self.events.send(ServerEvent::End);
    }

    /// Make every later client write fail
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Text frames written by the client
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of heartbeat probes written by the client
    pub fn pings_received(&self) -> usize {
        self.sent()
            .iter()
            .filter(|text| Envelope::decode(text).map(|e| e.message_type == "ping").unwrap_or(false))
            .count()
    }

    pub fn closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}

struct MockSocket {
    inbound: mpsc::UnboundedReceiver<ServerEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed_by_client: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl Socket for MockSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed_by_client.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::SendFailed("broken pipe (scripted)".to_string()));
        }
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).push(text);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        match self.inbound.recv().await {
            Some(ServerEvent::Frame(frame)) => Some(frame),
            Some(ServerEvent::End) | None => None,
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed_by_client.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MockSocket {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
