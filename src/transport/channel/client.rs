//! Supervised real-time channel
//!
//! A [`TransportChannel`] is a cheap handle to one background supervisor task.
//! The supervisor owns the socket, the heartbeat timers and the retry timer, and
//! performs every state transition. Handles only enqueue commands, so public
//! operations never block.

use super::connection::{
    ChannelConfig, ChannelError, CloseEvent, CloseReason, ConnectionState, RetryState,
};
use super::heartbeat::{HealthMetrics, HeartbeatMonitor, LivenessClock};
use super::listeners::{Listeners, Subscription};
use super::message_handler::{FrameRoute, MessageHandler};
use super::reconnect::{ReconnectPolicy, ReconnectionDecision};
use crate::protocol::{ChannelIdentity, Envelope};
use crate::transport::{Connector, Socket};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};

/// Requests from handles to the supervisor
#[derive(Debug)]
enum Command {
    Open,
    Send(String),
    Close { permanent: bool },
    Reconnect,
}

/// What the supervisor does next
#[derive(Debug, Clone, Copy, PartialEq)]
enum Phase {
    /// Closed, waiting for a command
    Idle,
    /// Start a connection attempt now
    ConnectNow,
    /// Closed, an automatic attempt is scheduled
    RetryAfter(Duration),
    /// Permanently closed or every handle is gone
    Stop,
}

/// State shared between handles and the supervisor
struct Shared {
    identity: ChannelIdentity,
    config: ChannelConfig,
    listeners: Arc<Listeners>,
    state: watch::Sender<ConnectionState>,
    detached: AtomicBool,
    permanently_closed: AtomicBool,
    attempts: AtomicU32,
    retry: Mutex<RetryState>,
    clock: Mutex<LivenessClock>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn transition(&self, to: ConnectionState) {
        let from = self.state.send_replace(to);
        if from == to {
            return;
        }
        HeartbeatMonitor::log_state_transition(&self.identity, from, to);
        if !self.is_detached() {
            self.listeners.emit_status(to);
        }
    }

    fn is_detached(&self) -> bool {
        self.detached.load(Ordering::Acquire)
    }

    fn set_retry(&self, retry: RetryState) {
        *lock(&self.retry) = retry;
    }

    fn retry(&self) -> RetryState {
        *lock(&self.retry)
    }

    fn deliver(&self, envelope: &Envelope) {
        if !self.is_detached() {
            self.listeners.emit_message(envelope);
        }
    }

    fn report_error(&self, error: &ChannelError) {
        if !self.is_detached() {
            self.listeners.emit_error(error);
        }
    }

    fn report_close(&self, event: &CloseEvent) {
        if !self.is_detached() {
            self.listeners.emit_close(event);
        }
    }
}

/// Handle to one supervised connection
///
/// Clones share the same connection. The channel starts `Closed`; call
/// [`TransportChannel::open`] to connect. Must be created inside a tokio
/// runtime. The supervisor drains already queued commands and exits once every
/// handle has been dropped.
#[derive(Clone)]
pub struct TransportChannel {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl TransportChannel {
    pub fn new(
        identity: ChannelIdentity,
        config: ChannelConfig,
        connector: Arc<dyn Connector>,
        listeners: Arc<Listeners>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Closed);
        let shared = Arc::new(Shared {
            identity,
            config,
            listeners,
            state: state_tx,
            detached: AtomicBool::new(false),
            permanently_closed: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            retry: Mutex::new(RetryState::Idle),
            clock: Mutex::new(LivenessClock::default()),
        });

        let (commands, command_rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor {
            shared: Arc::clone(&shared),
            connector,
            commands: command_rx,
        };
        let span = crate::channel_span!(channel = %shared.identity);
        tokio::spawn(supervisor.run().instrument(span));

        Self { shared, commands }
    }

    /// Start connecting unless already connecting or open
    ///
    /// A pending automatic retry is cancelled and replaced by an immediate
    /// attempt.
    pub fn open(&self) {
        if self.state().is_active() {
            debug!(channel = %self.shared.identity, "open() ignored, channel is {}", self.state());
            return;
        }
        self.command(Command::Open);
    }

    /// Queue an envelope for sending
    ///
    /// Returns false without sending when the channel is not open.
    pub fn send(&self, envelope: &Envelope) -> bool {
        let state = self.state();
        if state != ConnectionState::Open {
            warn!(
                channel = %self.shared.identity,
                message_type = %envelope.message_type,
                "Cannot send, channel is {}", state
            );
            return false;
        }

        let text = match MessageHandler::format_envelope(envelope) {
            Ok(text) => text,
            Err(e) => {
                warn!(channel = %self.shared.identity, "Dropping outbound envelope: {}", e);
                return false;
            }
        };
        self.command(Command::Send(text))
    }

    /// Close the connection
    ///
    /// A permanent close suppresses every future automatic reconnection and
    /// ends the supervisor. A non-permanent close is treated as an unplanned
    /// close and goes through the reconnection policy.
    pub fn close(&self, permanent: bool) {
        if permanent {
            self.shared.permanently_closed.store(true, Ordering::Release);
        }
        self.command(Command::Close { permanent });
    }

    /// Reset the attempt counter, cancel any pending retry and connect now
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Stop dispatching to the shared listeners
    ///
    /// Used by the hub before it closes a replaced channel, so the old
    /// connection's final events never reach subscribers of the new one.
    pub fn detach(&self) {
        self.shared.detached.store(true, Ordering::Release);
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn identity(&self) -> &ChannelIdentity {
        &self.shared.identity
    }

    /// Attempts scheduled since the last successful open
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::Acquire)
    }

    pub fn retry_state(&self) -> RetryState {
        self.shared.retry()
    }

    pub fn is_retry_pending(&self) -> bool {
        self.retry_state() == RetryState::Scheduled
    }

    pub fn is_permanently_closed(&self) -> bool {
        self.shared.permanently_closed.load(Ordering::Acquire)
    }

    pub fn health(&self) -> HealthMetrics {
        let clock = *lock(&self.shared.clock);
        HeartbeatMonitor::calculate_health_metrics(
            &clock,
            self.state(),
            self.reconnect_attempts(),
            self.shared.config.heartbeat.stale_after,
            Instant::now(),
        )
    }

    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.shared.listeners.on_message(handler)
    }

    pub fn on_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&ChannelError) + Send + Sync + 'static,
    {
        self.shared.listeners.on_error(handler)
    }

    pub fn on_close<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CloseEvent) + Send + Sync + 'static,
    {
        self.shared.listeners.on_close(handler)
    }

    pub fn on_status_change<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ConnectionState) + Send + Sync + 'static,
    {
        self.shared.listeners.on_status_change(handler)
    }

    fn command(&self, command: Command) -> bool {
        match self.commands.send(command) {
            Ok(()) => true,
            Err(mpsc::error::SendError(command)) => {
                debug!(
                    channel = %self.shared.identity,
                    "Supervisor has stopped, dropping {:?}", command
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for TransportChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportChannel")
            .field("identity", &self.shared.identity.as_str())
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

/// How a connect attempt ended
enum ConnectOutcome {
    Connected(Box<dyn Socket>),
    Failed(ChannelError),
    Abandoned(CloseReason),
}

struct Supervisor {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    commands: mpsc::UnboundedReceiver<Command>,
}

impl Supervisor {
    async fn run(mut self) {
        debug!("Channel supervisor started");
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => self.idle().await,
                Phase::RetryAfter(delay) => self.wait_for_retry(delay).await,
                Phase::ConnectNow => self.connect().await,
                Phase::Stop => break,
            };
        }
        debug!("Channel supervisor stopped");
    }

    async fn idle(&mut self) -> Phase {
        loop {
            match self.commands.recv().await {
                Some(Command::Open) => {
                    // Explicit open after exhaustion starts a fresh schedule
                    self.shared.attempts.store(0, Ordering::Release);
                    return Phase::ConnectNow;
                }
                Some(Command::Reconnect) => {
                    self.shared.attempts.store(0, Ordering::Release);
                    return Phase::ConnectNow;
                }
                Some(Command::Close { permanent: true }) | None => {
                    self.shared.set_retry(RetryState::Idle);
                    return Phase::Stop;
                }
                Some(Command::Close { permanent: false }) => {}
                Some(Command::Send(_)) => warn!("Dropping queued send, channel is closed"),
            }
        }
    }

    async fn wait_for_retry(&mut self, delay: Duration) -> Phase {
        debug!("Next connection attempt in {:?}", delay);
        let retry = tokio::time::sleep(delay);
        tokio::pin!(retry);

        loop {
            tokio::select! {
                _ = &mut retry => return Phase::ConnectNow,
                command = self.commands.recv() => match command {
                    Some(Command::Open) => {
                        info!("Pending retry replaced by explicit open");
                        return Phase::ConnectNow;
                    }
                    Some(Command::Reconnect) => {
                        info!("Pending retry cancelled by manual reconnect");
                        self.shared.attempts.store(0, Ordering::Release);
                        return Phase::ConnectNow;
                    }
                    Some(Command::Close { permanent: true }) | None => {
                        self.shared.set_retry(RetryState::Idle);
                        return Phase::Stop;
                    }
                    Some(Command::Close { permanent: false }) => {}
                    Some(Command::Send(_)) => warn!("Dropping queued send, channel is closed"),
                },
            }
        }
    }

    async fn connect(&mut self) -> Phase {
        self.shared.set_retry(RetryState::Idle);
        self.shared.transition(ConnectionState::Connecting);

        let connector = Arc::clone(&self.connector);
        let identity = self.shared.identity.clone();
        let timeout = self.shared.config.connect_timeout;
        let attempt =
            tokio::time::timeout(timeout, async move { connector.connect(&identity).await });
        tokio::pin!(attempt);

        let outcome = loop {
            tokio::select! {
                result = &mut attempt => break match result {
                    Ok(Ok(socket)) => ConnectOutcome::Connected(socket),
                    Ok(Err(e)) => ConnectOutcome::Failed(ChannelError::ConnectFailed(e)),
                    Err(_) => ConnectOutcome::Failed(ChannelError::ConnectTimeout(timeout)),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Open) => {}
                    Some(Command::Send(_)) => warn!("Dropping queued send, channel is connecting"),
                    Some(Command::Reconnect) => break ConnectOutcome::Abandoned(CloseReason::ManualReconnect),
                    Some(Command::Close { permanent }) => {
                        break ConnectOutcome::Abandoned(CloseReason::ClosedByClient { permanent })
                    }
                    None => return Phase::Stop,
                },
            }
        };

        match outcome {
            ConnectOutcome::Connected(socket) => self.run_session(socket).await,
            ConnectOutcome::Failed(error) => {
                warn!("Connection attempt failed: {}", error);
                self.finish(None, CloseReason::ConnectFailed, Some(error))
                    .await
            }
            ConnectOutcome::Abandoned(reason) => self.finish(None, reason, None).await,
        }
    }

    /// Drive one open connection until it ends
    async fn run_session(&mut self, mut socket: Box<dyn Socket>) -> Phase {
        let heartbeat = self.shared.config.heartbeat.clone();
        let opened_at = Instant::now();

        self.shared.attempts.store(0, Ordering::Release);
        lock(&self.shared.clock).opened(opened_at);
        self.shared.transition(ConnectionState::Open);

        let mut probe = interval_at(opened_at + heartbeat.probe_interval, heartbeat.probe_interval);
        probe.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut check = interval_at(opened_at + heartbeat.check_interval, heartbeat.check_interval);
        check.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let (reason, error) = loop {
            tokio::select! {
                frame = socket.recv() => match frame {
                    None => break (CloseReason::PeerClosed { reason: None }, None),
                    Some(Err(e)) => break (CloseReason::TransportError, Some(ChannelError::Transport(e))),
                    Some(Ok(frame)) => match MessageHandler::route_frame(frame) {
                        FrameRoute::Deliver(envelope) => {
                            debug!(message_type = %envelope.message_type, "Dispatching envelope");
                            self.shared.deliver(&envelope);
                        }
                        FrameRoute::Pong => lock(&self.shared.clock).pong(Instant::now()),
                        FrameRoute::PeerClosed(reason) => break (CloseReason::PeerClosed { reason }, None),
                        FrameRoute::DecodeFailed(reason) => warn!("Dropping undecodable frame: {}", reason),
                        FrameRoute::Ignored(what) => debug!("Ignored {}", what),
                    },
                },
                _ = probe.tick() => {
                    let ping = match MessageHandler::format_envelope(&Envelope::ping()) {
                        Ok(ping) => ping,
                        Err(e) => {
                            error!("Failed to encode heartbeat probe: {}", e);
                            continue;
                        }
                    };
                    debug!("Sending heartbeat probe");
                    if let Err(e) = socket.send_text(ping).await {
                        break (CloseReason::TransportError, Some(ChannelError::Transport(e)));
                    }
                }
                _ = check.tick() => {
                    let clock = *lock(&self.shared.clock);
                    if HeartbeatMonitor::is_stale(&clock, Instant::now(), heartbeat.stale_after) {
                        warn!(
                            stale_after = ?heartbeat.stale_after,
                            "No pong received in time, treating connection as dead"
                        );
                        break (CloseReason::HeartbeatTimeout, None);
                    }
                }
                command = self.commands.recv() => match command {
                    Some(Command::Send(text)) => {
                        if let Err(e) = socket.send_text(text).await {
                            break (CloseReason::TransportError, Some(ChannelError::Transport(e)));
                        }
                    }
                    Some(Command::Open) => {}
                    Some(Command::Reconnect) => break (CloseReason::ManualReconnect, None),
                    Some(Command::Close { permanent }) => {
                        break (CloseReason::ClosedByClient { permanent }, None)
                    }
                    None => {
                        let _ = socket.close().await;
                        return Phase::Stop;
                    }
                },
            }
        };

        self.finish(Some(socket), reason, error).await
    }

    /// Tear down the current attempt and plan the next phase
    ///
    /// Error handlers see the error before the close. The retry state is
    /// settled before `Closed` is published so status subscribers observe it.
    async fn finish(
        &mut self,
        socket: Option<Box<dyn Socket>>,
        reason: CloseReason,
        error: Option<ChannelError>,
    ) -> Phase {
        if let Some(error) = &error {
            self.shared.report_error(error);
        }

        if let Some(mut socket) = socket {
            self.shared.transition(ConnectionState::Closing);
            if let Err(e) = socket.close().await {
                debug!("Socket close failed: {}", e);
            }
        }
        lock(&self.shared.clock).closed();

        if matches!(reason, CloseReason::ClosedByClient { permanent: true }) {
            self.shared.permanently_closed.store(true, Ordering::Release);
        }

        let (next, retry_in, exhausted) = self.plan_next(&reason);

        self.shared.transition(ConnectionState::Closed);
        self.shared.report_close(&CloseEvent {
            reason: reason.clone(),
            retry_in,
        });

        if let Some(attempts) = exhausted {
            error!(attempts, "Reconnection attempts exhausted, giving up");
            self.shared
                .report_error(&ChannelError::RetriesExhausted { attempts });
        }

        next
    }

    /// Returns the next phase, the delay announced to close handlers, and the
    /// attempt count when the policy gave up
    fn plan_next(&self, reason: &CloseReason) -> (Phase, Option<Duration>, Option<u32>) {
        if !reason.is_unplanned() {
            self.shared.set_retry(RetryState::Idle);
            if *reason == CloseReason::ManualReconnect {
                self.shared.attempts.store(0, Ordering::Release);
                return (Phase::ConnectNow, Some(Duration::ZERO), None);
            }
            info!("Channel closed permanently");
            return (Phase::Stop, None, None);
        }

        let permanently_closed = self.shared.permanently_closed.load(Ordering::Acquire);
        let attempts = self.shared.attempts.load(Ordering::Acquire);
        match ReconnectPolicy::decide(attempts, &self.shared.config.reconnect, permanently_closed) {
            ReconnectionDecision::Proceed { attempt, delay } => {
                let delay = if *reason == CloseReason::HeartbeatTimeout {
                    Duration::ZERO
                } else {
                    delay
                };
                info!(attempt, ?delay, "Scheduling reconnection attempt");
                self.shared.attempts.store(attempt, Ordering::Release);
                self.shared.set_retry(RetryState::Scheduled);
                (Phase::RetryAfter(delay), Some(delay), None)
            }
            ReconnectionDecision::AbortMaxAttemptsExceeded { attempts } => {
                self.shared.set_retry(RetryState::Exhausted);
                (Phase::Idle, None, Some(attempts))
            }
            ReconnectionDecision::AbortPermanentlyClosed => {
                info!("Channel closed permanently");
                self.shared.set_retry(RetryState::Idle);
                (Phase::Stop, None, None)
            }
        }
    }
}
