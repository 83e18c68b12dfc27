//! Subscriber registry shared by the hub and its current channel
//!
//! Handlers are stored per event kind under a unique id. Dispatch snapshots the
//! handler list and invokes it with the lock released, so a handler may
//! register or unregister handlers (including itself) while being called.

use super::connection::{ChannelError, CloseEvent, ConnectionState};
use crate::protocol::Envelope;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Called for every inbound envelope except heartbeat pongs
pub type OnMessageCallback = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Called for transport errors and exhausted retries
pub type OnErrorCallback = Arc<dyn Fn(&ChannelError) + Send + Sync>;

/// Called after every close
pub type OnCloseCallback = Arc<dyn Fn(&CloseEvent) + Send + Sync>;

/// Called on every state transition
pub type OnStatusCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Event kind a handler is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    Message,
    Error,
    Close,
    Status,
}

struct HandlerSet<T> {
    entries: Mutex<Vec<(u64, T)>>,
}

impl<T: Clone> HandlerSet<T> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(u64, T)>> {
        // A panicking handler never runs under this lock, the data stays consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, id: u64, handler: T) {
        self.lock().push((id, handler));
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    fn snapshot(&self) -> Vec<T> {
        self.lock().iter().map(|(_, handler)| handler.clone()).collect()
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Per-kind handler registries
pub struct Listeners {
    next_id: AtomicU64,
    message: HandlerSet<OnMessageCallback>,
    error: HandlerSet<OnErrorCallback>,
    close: HandlerSet<OnCloseCallback>,
    status: HandlerSet<OnStatusCallback>,
}

impl Listeners {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            message: HandlerSet::new(),
            error: HandlerSet::new(),
            close: HandlerSet::new(),
            status: HandlerSet::new(),
        })
    }

    pub fn on_message<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.message.insert(id, Arc::new(handler));
        Subscription::new(self, ListenerKind::Message, id)
    }

    pub fn on_error<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&ChannelError) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.error.insert(id, Arc::new(handler));
        Subscription::new(self, ListenerKind::Error, id)
    }

    pub fn on_close<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(&CloseEvent) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.close.insert(id, Arc::new(handler));
        Subscription::new(self, ListenerKind::Close, id)
    }

    pub fn on_status_change<F>(self: &Arc<Self>, handler: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        let id = self.allocate_id();
        self.status.insert(id, Arc::new(handler));
        Subscription::new(self, ListenerKind::Status, id)
    }

    pub fn emit_message(&self, envelope: &Envelope) {
        for handler in self.message.snapshot() {
            handler(envelope);
        }
    }

    pub fn emit_error(&self, error: &ChannelError) {
        for handler in self.error.snapshot() {
            handler(error);
        }
    }

    pub fn emit_close(&self, event: &CloseEvent) {
        for handler in self.close.snapshot() {
            handler(event);
        }
    }

    pub fn emit_status(&self, state: ConnectionState) {
        for handler in self.status.snapshot() {
            handler(state);
        }
    }

    /// Number of handlers currently registered for `kind`
    pub fn count(&self, kind: ListenerKind) -> usize {
        match kind {
            ListenerKind::Message => self.message.len(),
            ListenerKind::Error => self.error.len(),
            ListenerKind::Close => self.close.len(),
            ListenerKind::Status => self.status.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        [
            ListenerKind::Message,
            ListenerKind::Error,
            ListenerKind::Close,
            ListenerKind::Status,
        ]
        .iter()
        .all(|kind| self.count(*kind) == 0)
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn remove(&self, kind: ListenerKind, id: u64) -> bool {
        match kind {
            ListenerKind::Message => self.message.remove(id),
            ListenerKind::Error => self.error.remove(id),
            ListenerKind::Close => self.close.remove(id),
            ListenerKind::Status => self.status.remove(id),
        }
    }
}

/// Registration guard returned by every `on_*` call
///
/// The handler stays registered until [`Subscription::unsubscribe`] is called
/// or the guard is dropped. Unsubscribing more than once is a no-op.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    registry: Weak<Listeners>,
    kind: ListenerKind,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    fn new(registry: &Arc<Listeners>, kind: ListenerKind, id: u64) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            kind,
            id,
            active: AtomicBool::new(true),
        }
    }

    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.kind, self.id);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::channel::connection::CloseReason;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_multiple_handlers_of_same_kind() {
        let listeners = Listeners::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let calls = calls.clone();
            listeners.on_message(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        };
        let second = {
            let calls = calls.clone();
            listeners.on_message(move |_| {
                calls.fetch_add(10, Ordering::SeqCst);
            })
        };

        listeners.emit_message(&Envelope::connection_established());
        assert_eq!(calls.load(Ordering::SeqCst), 11);
        assert_eq!(listeners.count(ListenerKind::Message), 2);

        first.unsubscribe();
        listeners.emit_message(&Envelope::connection_established());
        assert_eq!(calls.load(Ordering::SeqCst), 21);

        drop(second);
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let listeners = Listeners::new();
        let subscription = listeners.on_status_change(|_| {});
        let other = listeners.on_status_change(|_| {});

        subscription.unsubscribe();
        subscription.unsubscribe();
        assert!(!subscription.is_active());
        assert_eq!(listeners.count(ListenerKind::Status), 1);

        drop(subscription);
        assert_eq!(listeners.count(ListenerKind::Status), 1);
        assert!(other.is_active());
    }

    #[test]
    fn test_handler_can_unsubscribe_itself_during_dispatch() {
        let listeners = Listeners::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let subscription = {
            let slot = slot.clone();
            let calls = calls.clone();
            listeners.on_message(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(own) = slot.lock().unwrap().take() {
                    own.unsubscribe();
                }
            })
        };
        *slot.lock().unwrap() = Some(subscription);

        listeners.emit_message(&Envelope::ping());
        listeners.emit_message(&Envelope::ping());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(listeners.count(ListenerKind::Message), 0);
    }

    #[test]
    fn test_handler_can_register_during_dispatch() {
        let listeners = Listeners::new();
        let added: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));
        let inner_calls = Arc::new(AtomicUsize::new(0));

        let _outer = {
            let registry = listeners.clone();
            let added = added.clone();
            let inner_calls = inner_calls.clone();
            listeners.on_close(move |_| {
                let inner_calls = inner_calls.clone();
                let inner = registry.on_close(move |_| {
                    inner_calls.fetch_add(1, Ordering::SeqCst);
                });
                added.lock().unwrap().push(inner);
            })
        };

        let event = CloseEvent {
            reason: CloseReason::TransportError,
            retry_in: None,
        };

        // Handlers added mid-dispatch miss the dispatch that added them
        listeners.emit_close(&event);
        assert_eq!(listeners.count(ListenerKind::Close), 2);
        assert_eq!(inner_calls.load(Ordering::SeqCst), 0);

        // Snapshot is {outer, first inner}: one more handler is added
        listeners.emit_close(&event);
        assert_eq!(listeners.count(ListenerKind::Close), 3);
        assert_eq!(inner_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_outliving_registry() {
        let listeners = Listeners::new();
        let subscription = listeners.on_error(|_| {});
        drop(listeners);

        subscription.unsubscribe();
        assert!(!subscription.is_active());
    }

    #[test]
    fn test_kinds_are_independent() {
        let listeners = Listeners::new();
        let statuses = Arc::new(Mutex::new(Vec::new()));

        let _status = {
            let statuses = statuses.clone();
            listeners.on_status_change(move |state| statuses.lock().unwrap().push(state))
        };
        let _message = listeners.on_message(|_| panic!("no message expected"));

        listeners.emit_status(ConnectionState::Connecting);
        listeners.emit_status(ConnectionState::Open);
        listeners.emit_error(&ChannelError::RetriesExhausted { attempts: 5 });

        assert_eq!(
            *statuses.lock().unwrap(),
            vec![ConnectionState::Connecting, ConnectionState::Open]
        );
    }
}
