//! Subscription hub: one shared channel, many subscribers
//!
//! The hub owns at most one [`TransportChannel`] and the subscriber registry.
//! Consumers register handlers against the hub rather than a channel, so their
//! subscriptions survive reconnects and identity changes.

use crate::protocol::{ChannelIdentity, Envelope};
use crate::transport::channel::{
    ChannelConfig, ChannelError, CloseEvent, ConnectionState, Listeners, Subscription,
    TransportChannel,
};
use crate::transport::Connector;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

pub struct SubscriptionHub {
    connector: Arc<dyn Connector>,
    config: ChannelConfig,
    listeners: Arc<Listeners>,
    current: Mutex<Option<TransportChannel>>,
}

impl SubscriptionHub {
    pub fn new(connector: Arc<dyn Connector>, config: ChannelConfig) -> Self {
        Self {
            connector,
            config,
            listeners: Listeners::new(),
            current: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<TransportChannel>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the channel for `identity`, creating and opening it if needed
    ///
    /// An existing channel for a different identity is detached from the
    /// subscribers and closed permanently before the new one is created.
    pub fn get_or_create(&self, identity: &ChannelIdentity) -> TransportChannel {
        let mut current = self.slot();

        if let Some(channel) = current.as_ref() {
            if channel.identity() == identity && !channel.is_permanently_closed() {
                return channel.clone();
            }
        }

        if let Some(previous) = current.take() {
            info!(
                from = %previous.identity(),
                to = %identity,
                "Replacing channel for new identity"
            );
            previous.detach();
            previous.close(true);
        }

        let channel = TransportChannel::new(
            identity.clone(),
            self.config.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.listeners),
        );
        channel.open();
        *current = Some(channel.clone());
        channel
    }

    /// Parse `address` and delegate to [`SubscriptionHub::get_or_create`]
    ///
    /// A malformed address never reaches the network.
    pub fn connect(&self, address: &str) -> Result<TransportChannel, ChannelError> {
        let identity = ChannelIdentity::parse(address).map_err(|e| {
            warn!(address, "Rejected channel address: {}", e);
            ChannelError::InvalidIdentity(e)
        })?;
        Ok(self.get_or_create(&identity))
    }

    pub fn current(&self) -> Option<TransportChannel> {
        self.slot().clone()
    }

    pub fn current_identity(&self) -> Option<ChannelIdentity> {
        self.slot().as_ref().map(|channel| channel.identity().clone())
    }

    /// State of the current channel, `Closed` when there is none
    pub fn state(&self) -> ConnectionState {
        self.slot()
            .as_ref()
            .map(TransportChannel::state)
            .unwrap_or(ConnectionState::Closed)
    }

    /// Send on the current channel; false when there is none or it is not open
    pub fn send(&self, envelope: &Envelope) -> bool {
        match self.current() {
            Some(channel) => channel.send(envelope),
            None => {
                warn!(message_type = %envelope.message_type, "Cannot send, no channel");
                false
            }
        }
    }

    /// Manual reconnect of the current channel
    ///
    /// Returns false when there is no channel to reconnect.
    pub fn reconnect(&self) -> bool {
        match self.current() {
            Some(channel) => {
                channel.reconnect();
                true
            }
            None => false,
        }
    }

    /// Permanently close and drop the current channel
    ///
    /// Subscribers keep their registrations and observe the final `Closed`.
    pub fn close(&self) {
        if let Some(channel) = self.slot().take() {
            info!(channel = %channel.identity(), "Closing channel");
            channel.close(true);
        }
    }

    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.listeners.on_message(handler)
    }

    pub fn on_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChannelError) + Send + Sync + 'static,
    {
        self.listeners.on_error(handler)
    }

    pub fn on_close<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CloseEvent) + Send + Sync + 'static,
    {
        self.listeners.on_close(handler)
    }

    pub fn on_status_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.listeners.on_status_change(handler)
    }
}

impl Drop for SubscriptionHub {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::MockConnector;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn hub(connector: &MockConnector) -> SubscriptionHub {
        SubscriptionHub::new(Arc::new(connector.clone()), ChannelConfig::default())
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_identity_returns_same_channel() {
        let connector = MockConnector::new();
        let hub = hub(&connector);
        let identity = ChannelIdentity::parse("ws://localhost:8000/ws/user-42").unwrap();

        let first = hub.get_or_create(&identity);
        let second = hub.get_or_create(&identity);
        settle().await;

        assert_eq!(first.identity(), second.identity());
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(hub.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_address_is_rejected() {
        let connector = MockConnector::new();
        let hub = hub(&connector);

        let result = hub.connect("http://localhost:8000/ws/user-42");
        assert!(matches!(result, Err(ChannelError::InvalidIdentity(_))));

        let result = hub.connect("");
        assert!(matches!(result, Err(ChannelError::InvalidIdentity(_))));

        settle().await;
        assert_eq!(connector.connect_count(), 0);
        assert!(hub.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_survive_identity_change() {
        let connector = MockConnector::new();
        let hub = hub(&connector);
        let received = Arc::new(AtomicUsize::new(0));
        let _messages = {
            let received = received.clone();
            hub.on_message(move |_| {
                received.fetch_add(1, Ordering::SeqCst);
            })
        };

        hub.connect("ws://localhost:8000/ws/user-42").unwrap();
        settle().await;
        hub.connect("ws://localhost:8000/ws/user-7").unwrap();
        settle().await;

        let old = connector.server(0).unwrap();
        let new = connector.server(1).unwrap();
        assert!(old.closed_by_client());
        old.push_text(r#"{"type":"connection_established"}"#);
        new.push_text(r#"{"type":"connection_established"}"#);
        settle().await;

        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(connector.live_sockets(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_drops_channel_and_reconnect_reports_missing() {
        let connector = MockConnector::new();
        let hub = hub(&connector);

        hub.connect("ws://localhost:8000/ws/user-42").unwrap();
        settle().await;
        hub.close();
        settle().await;

        assert!(hub.current().is_none());
        assert!(!hub.reconnect());
        assert!(!hub.send(&Envelope::ping()));
        assert_eq!(connector.live_sockets(), 0);
    }
}
