//! Mood updates consumer
//!
//! Binds the hub to the dashboard: derives the channel identity from the
//! session, narrows `mood_update` envelopes into [`MoodData`], and keeps a
//! [`MoodView`] with the latest snapshot, connection state and error text.

use super::endpoint::EndpointConfig;
use super::session::SessionProvider;
use crate::hub::SubscriptionHub;
use crate::protocol::{ChannelIdentity, Envelope, EnvelopeKind, IdentityError, MoodData};
use crate::transport::channel::{
    ChannelError, CloseEvent, ConnectionState, RetryState, Subscription, TransportChannel,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shown when the server reports an error without a message
pub const SERVER_ERROR_FALLBACK: &str = "Server error occurred.";
/// Shown after a transport error
pub const CONNECTION_ERROR: &str = "Connection error";
/// Shown once automatic reconnection has given up
pub const CONNECTION_LOST: &str = "Connection lost. Reconnect manually or reload.";
/// Shown while the transport waits to retry
pub const RECONNECTING_NOTICE: &str = "Disconnected. Attempting reconnection...";

/// Default delay of the adapter's own retry timer
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(3000);

/// What the dashboard renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodView {
    /// Latest mood snapshot
    pub mood: Option<MoodData>,
    /// Connection state is `Open`
    pub is_live: bool,
    /// Last error message
    pub error: Option<String>,
    pub state: ConnectionState,
    /// Local time the snapshot arrived
    pub received_at: Option<DateTime<Utc>>,
}

impl Default for MoodView {
    fn default() -> Self {
        Self {
            mood: None,
            is_live: false,
            error: None,
            state: ConnectionState::Closed,
            received_at: None,
        }
    }
}

/// Connection status texts the adapter writes itself
///
/// These describe the link, not a problem reported by the server, so they never
/// hold back the adapter's retry.
pub fn is_connection_notice(text: &str) -> bool {
    matches!(text, CONNECTION_ERROR | CONNECTION_LOST | RECONNECTING_NOTICE)
}

/// Whether the adapter should arm its own delayed reconnect
///
/// Only once the transport has given up, while no server error is showing,
/// and at most once per give-up streak. The transport keeps sole ownership of
/// backoff; the timer merely issues a manual reconnect, which restarts the
/// transport's schedule.
pub fn should_arm_retry(
    state: ConnectionState,
    server_error_pending: bool,
    retry: RetryState,
    permanently_closed: bool,
    retry_spent: bool,
) -> bool {
    state == ConnectionState::Closed
        && !server_error_pending
        && retry == RetryState::Exhausted
        && !permanently_closed
        && !retry_spent
}

struct Inner {
    hub: Arc<SubscriptionHub>,
    session: Arc<dyn SessionProvider>,
    endpoint: EndpointConfig,
    retry_delay: Duration,
    view: watch::Sender<MoodView>,
    retry_timer: Mutex<Option<JoinHandle<()>>>,
    /// The adapter already retried since the last open
    retry_spent: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Inner {
    fn channel(&self) -> Option<TransportChannel> {
        self.hub.current()
    }

    fn handle_message(&self, envelope: &Envelope) {
        match envelope.kind() {
            EnvelopeKind::MoodUpdate => match envelope.mood_data() {
                Some(Ok(mood)) => {
                    debug!(mood = %mood.mood, "Mood update received");
                    self.view.send_modify(|view| {
                        view.mood = Some(mood);
                        view.received_at = Some(Utc::now());
                        view.error = None;
                    });
                }
                Some(Err(e)) => warn!("Dropping malformed mood update: {}", e),
                None => warn!("Dropping mood update without data"),
            },
            EnvelopeKind::Error => {
                let message = envelope
                    .message
                    .clone()
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| SERVER_ERROR_FALLBACK.to_string());
                warn!(error = %message, "Server reported an error");
                self.set_error(Some(message));
            }
            EnvelopeKind::ConnectionEstablished => {
                info!("Server confirmed connection");
                self.set_error(None);
            }
            EnvelopeKind::Ping | EnvelopeKind::Pong | EnvelopeKind::Other => {
                debug!(message_type = %envelope.message_type, "Ignoring envelope");
            }
        }
    }

    fn handle_error(&self, error: &ChannelError) {
        let message = match error {
            ChannelError::RetriesExhausted { .. } if self.is_retry_armed() => RECONNECTING_NOTICE,
            ChannelError::RetriesExhausted { .. } => CONNECTION_LOST,
            _ => CONNECTION_ERROR,
        };
        warn!("Channel error: {}", error);
        self.set_connection_notice(message);
    }

    fn handle_close(&self, event: &CloseEvent) {
        debug!(reason = ?event.reason, retry_in = ?event.retry_in, "Channel closed");
    }

    fn handle_status(self: &Arc<Self>, state: ConnectionState) {
        self.cancel_retry_timer();

        let channel = self.channel();
        let retry = channel
            .as_ref()
            .map(TransportChannel::retry_state)
            .unwrap_or_default();
        let permanently_closed = channel
            .as_ref()
            .map_or(true, TransportChannel::is_permanently_closed);

        if state == ConnectionState::Open {
            self.retry_spent.store(false, Ordering::Release);
        }
        let retry_spent = self.retry_spent.load(Ordering::Acquire);

        let mut arm = false;
        self.view.send_modify(|view| {
            let server_error_pending = view
                .error
                .as_deref()
                .is_some_and(|text| !is_connection_notice(text));
            arm = should_arm_retry(
                state,
                server_error_pending,
                retry,
                permanently_closed,
                retry_spent,
            );

            view.state = state;
            view.is_live = state == ConnectionState::Open;
            match state {
                ConnectionState::Open => {
                    if view.error.as_deref() == Some(RECONNECTING_NOTICE) {
                        view.error = None;
                    }
                }
                ConnectionState::Closed
                    if !server_error_pending && (retry == RetryState::Scheduled || arm) =>
                {
                    view.error = Some(RECONNECTING_NOTICE.to_string());
                }
                _ => {}
            }
        });

        if arm {
            self.arm_retry_timer();
        }
    }

    fn is_retry_armed(&self) -> bool {
        lock(&self.retry_timer).is_some()
    }

    /// Connection notices never replace an error the server reported
    fn set_connection_notice(&self, notice: &str) {
        self.view.send_if_modified(|view| {
            let replaceable = view.error.as_deref().map_or(true, is_connection_notice);
            if !replaceable || view.error.as_deref() == Some(notice) {
                return false;
            }
            view.error = Some(notice.to_string());
            true
        });
    }

    fn set_error(&self, error: Option<String>) {
        self.view.send_if_modified(|view| {
            if view.error == error {
                return false;
            }
            view.error = error;
            true
        });
    }

    fn arm_retry_timer(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        let delay = self.retry_delay;
        self.retry_spent.store(true, Ordering::Release);
        debug!(?delay, "Transport gave up, arming adapter reconnect timer");
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                if let Some(channel) = inner.channel() {
                    info!("Adapter reconnect timer fired");
                    channel.reconnect();
                }
            }
        });
        if let Some(previous) = lock(&self.retry_timer).replace(timer) {
            previous.abort();
        }
    }

    fn cancel_retry_timer(&self) {
        if let Some(timer) = lock(&self.retry_timer).take() {
            timer.abort();
        }
    }
}

/// Typed mood feed for one dashboard session
///
/// Must be created inside a tokio runtime.
pub struct MoodUpdates {
    inner: Arc<Inner>,
    _subscriptions: Vec<Subscription>,
}

impl MoodUpdates {
    /// Register with the hub; call [`MoodUpdates::sync_identity`] to connect
    pub fn new(
        hub: Arc<SubscriptionHub>,
        session: Arc<dyn SessionProvider>,
        endpoint: EndpointConfig,
        retry_delay: Duration,
    ) -> Self {
        let (view, _) = watch::channel(MoodView::default());
        let inner = Arc::new(Inner {
            hub,
            session,
            endpoint,
            retry_delay,
            view,
            retry_timer: Mutex::new(None),
            retry_spent: AtomicBool::new(false),
        });

        let subscriptions = vec![
            {
                let weak = Arc::downgrade(&inner);
                inner.hub.on_message(move |envelope| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_message(envelope);
                    }
                })
            },
            {
                let weak = Arc::downgrade(&inner);
                inner.hub.on_error(move |error| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_error(error);
                    }
                })
            },
            {
                let weak: Weak<Inner> = Arc::downgrade(&inner);
                inner.hub.on_close(move |event| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_close(event);
                    }
                })
            },
            {
                let weak = Arc::downgrade(&inner);
                inner.hub.on_status_change(move |state| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_status(state);
                    }
                })
            },
        ];

        Self {
            inner,
            _subscriptions: subscriptions,
        }
    }

    /// Identity for the current session, `None` when nobody is signed in
    pub fn target_identity(&self) -> Result<Option<ChannelIdentity>, IdentityError> {
        match self.inner.session.subject_id() {
            Some(subject_id) => self.inner.endpoint.identity_for(&subject_id).map(Some),
            None => Ok(None),
        }
    }

    /// Point the hub at the current session's channel
    ///
    /// Without a subject id no connection is attempted and any existing
    /// channel is closed.
    pub fn sync_identity(&self) -> Result<Option<ChannelIdentity>, IdentityError> {
        let span = crate::adapter_span!(subject = ?self.inner.session.subject_id());
        let _entered = span.enter();

        let identity = match self.target_identity() {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Cannot derive channel identity: {}", e);
                return Err(e);
            }
        };

        match &identity {
            Some(identity) => {
                if self.inner.hub.current_identity().as_ref() != Some(identity) {
                    info!(channel = %identity, "Subscribing to mood updates");
                    self.inner.view.send_modify(|view| {
                        view.mood = None;
                        view.received_at = None;
                    });
                }
                let channel = self.inner.hub.get_or_create(identity);
                let state = channel.state();
                self.inner.view.send_if_modified(|view| {
                    let changed = view.state != state;
                    view.state = state;
                    view.is_live = state == ConnectionState::Open;
                    changed
                });
            }
            None => {
                info!("No subject id, not connecting");
                self.inner.cancel_retry_timer();
                self.inner.hub.close();
                self.inner.view.send_modify(|view| {
                    view.state = ConnectionState::Closed;
                    view.is_live = false;
                });
            }
        }

        Ok(identity)
    }

    /// Alias of [`MoodUpdates::sync_identity`] for the first call
    pub fn start(&self) -> Result<Option<ChannelIdentity>, IdentityError> {
        self.sync_identity()
    }

    /// Manual reconnect
    ///
    /// Reconnects the current channel, or creates it if none exists yet.
    pub fn reconnect(&self) {
        self.inner.cancel_retry_timer();
        self.inner.retry_spent.store(false, Ordering::Release);
        if !self.inner.hub.reconnect() {
            if let Err(e) = self.sync_identity() {
                warn!("Manual reconnect failed: {}", e);
            }
        }
    }

    pub fn view(&self) -> MoodView {
        self.inner.view.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<MoodView> {
        self.inner.view.subscribe()
    }

    pub fn mood(&self) -> Option<MoodData> {
        self.inner.view.borrow().mood.clone()
    }

    pub fn is_live(&self) -> bool {
        self.inner.view.borrow().is_live
    }

    pub fn error(&self) -> Option<String> {
        self.inner.view.borrow().error.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.view.borrow().state
    }

    pub fn is_retry_armed(&self) -> bool {
        self.inner.is_retry_armed()
    }
}

impl Drop for MoodUpdates {
    fn drop(&mut self) {
        self.inner.cancel_retry_timer();
    }
}
