//! Pure heartbeat and health monitoring logic
//!
//! The supervisor owns the probe and check timers; this module only tracks the
//! liveness clock and answers "is this connection stale?".

use super::connection::ConnectionState;
use crate::protocol::ChannelIdentity;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Heartbeat timing
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatConfig {
    /// How often a `ping` envelope is sent while open
    pub probe_interval: Duration,
    /// How often the liveness clock is checked
    pub check_interval: Duration,
    /// Silence after the last pong that marks the connection as dead
    pub stale_after: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            check_interval: Duration::from_secs(10),
            stale_after: Duration::from_secs(45),
        }
    }
}

impl HeartbeatConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.probe_interval.is_zero() || self.check_interval.is_zero() {
            return Err("heartbeat intervals must be greater than 0".to_string());
        }
        if self.check_interval >= self.stale_after {
            return Err("check_interval must be shorter than stale_after".to_string());
        }
        // A pong can only arrive after a probe went out
        if self.probe_interval >= self.stale_after {
            return Err("probe_interval must be shorter than stale_after".to_string());
        }
        Ok(())
    }
}

/// Liveness clock of the current connection
#[derive(Debug, Clone, Copy, Default)]
pub struct LivenessClock {
    /// When the current connection opened
    pub opened_at: Option<Instant>,
    /// Last pong, or the open time if none arrived yet
    pub last_pong: Option<Instant>,
}

impl LivenessClock {
    /// Restart the clock for a freshly opened connection
    pub fn opened(&mut self, now: Instant) {
        self.opened_at = Some(now);
        self.last_pong = Some(now);
    }

    pub fn pong(&mut self, now: Instant) {
        self.last_pong = Some(now);
    }

    pub fn closed(&mut self) {
        self.opened_at = None;
    }
}

/// Stateless heartbeat decisions
pub struct HeartbeatMonitor;

impl HeartbeatMonitor {
    /// True when more than `stale_after` has passed since the last pong
    pub fn is_stale(clock: &LivenessClock, now: Instant, stale_after: Duration) -> bool {
        match clock.last_pong {
            Some(last_pong) => now.saturating_duration_since(last_pong) > stale_after,
            None => false,
        }
    }

    /// Calculate health metrics for the channel
    pub fn calculate_health_metrics(
        clock: &LivenessClock,
        state: ConnectionState,
        reconnect_attempts: u32,
        stale_after: Duration,
        now: Instant,
    ) -> HealthMetrics {
        let uptime = match state {
            ConnectionState::Open => clock.opened_at.map(|t| now.saturating_duration_since(t)),
            _ => None,
        };
        let time_since_last_pong = clock.last_pong.map(|t| now.saturating_duration_since(t));

        HealthMetrics {
            uptime,
            time_since_last_pong,
            reconnect_attempts,
            is_healthy: Self::determine_health_status(uptime, time_since_last_pong, stale_after),
        }
    }

    fn determine_health_status(
        uptime: Option<Duration>,
        time_since_last_pong: Option<Duration>,
        stale_after: Duration,
    ) -> bool {
        match (uptime, time_since_last_pong) {
            (Some(_), None) => true,
            (Some(_), Some(silence)) => silence <= stale_after,
            _ => false,
        }
    }

    /// Log a connection state transition
    pub fn log_state_transition(
        identity: &ChannelIdentity,
        from: ConnectionState,
        to: ConnectionState,
    ) {
        match (from, to) {
            (ConnectionState::Connecting, ConnectionState::Open) => {
                info!(channel = %identity, "Channel connection established");
            }
            (ConnectionState::Open, ConnectionState::Closing) => {
                warn!(channel = %identity, "Channel connection closing");
            }
            (ConnectionState::Connecting, ConnectionState::Closed) => {
                error!(channel = %identity, "Channel connection attempt failed");
            }
            _ => {
                info!(channel = %identity, "Channel state: {} -> {}", from, to);
            }
        }
    }
}

/// Health metrics for connection monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct HealthMetrics {
    /// Time since the current connection opened
    pub uptime: Option<Duration>,
    /// Time since the last pong (or the open, if none yet)
    pub time_since_last_pong: Option<Duration>,
    /// Attempts scheduled since the last successful open
    pub reconnect_attempts: u32,
    pub is_healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_config_default() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.probe_interval, Duration::from_secs(30));
        assert_eq!(config.check_interval, Duration::from_secs(10));
        assert_eq!(config.stale_after, Duration::from_secs(45));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_heartbeat_config_validation() {
        let zero = HeartbeatConfig {
            check_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let slow_check = HeartbeatConfig {
            check_interval: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(slow_check.validate().is_err());

        let slow_probe = HeartbeatConfig {
            probe_interval: Duration::from_secs(60),
            ..Default::default()
        };
        assert!(slow_probe.validate().is_err());

        let probe_at_deadline = HeartbeatConfig {
            probe_interval: Duration::from_secs(45),
            ..Default::default()
        };
        assert!(probe_at_deadline.validate().is_err());
    }

    #[test]
    fn test_is_stale() {
        let start = Instant::now();
        let mut clock = LivenessClock::default();
        let deadline = Duration::from_secs(45);

        // Never opened
        assert!(!HeartbeatMonitor::is_stale(&clock, start, deadline));

        clock.opened(start);
        assert!(!HeartbeatMonitor::is_stale(&clock, start + Duration::from_secs(45), deadline));
        assert!(HeartbeatMonitor::is_stale(&clock, start + Duration::from_secs(46), deadline));

        clock.pong(start + Duration::from_secs(40));
        assert!(!HeartbeatMonitor::is_stale(&clock, start + Duration::from_secs(80), deadline));
        assert!(HeartbeatMonitor::is_stale(&clock, start + Duration::from_secs(86), deadline));
    }

    #[test]
    fn test_calculate_health_metrics() {
        let start = Instant::now();
        let mut clock = LivenessClock::default();
        clock.opened(start);
        clock.pong(start + Duration::from_secs(50));

        let now = start + Duration::from_secs(60);
        let metrics = HeartbeatMonitor::calculate_health_metrics(
            &clock,
            ConnectionState::Open,
            0,
            Duration::from_secs(45),
            now,
        );

        assert_eq!(metrics.uptime, Some(Duration::from_secs(60)));
        assert_eq!(metrics.time_since_last_pong, Some(Duration::from_secs(10)));
        assert!(metrics.is_healthy);
    }

    #[test]
    fn test_health_metrics_when_not_open() {
        let start = Instant::now();
        let mut clock = LivenessClock::default();
        clock.opened(start);
        clock.closed();

        let metrics = HeartbeatMonitor::calculate_health_metrics(
            &clock,
            ConnectionState::Closed,
            3,
            Duration::from_secs(45),
            start,
        );

        assert_eq!(metrics.uptime, None);
        assert_eq!(metrics.reconnect_attempts, 3);
        assert!(!metrics.is_healthy);
    }

    #[test]
    fn test_silent_connection_is_unhealthy() {
        let start = Instant::now();
        let mut clock = LivenessClock::default();
        clock.opened(start);

        let metrics = HeartbeatMonitor::calculate_health_metrics(
            &clock,
            ConnectionState::Open,
            0,
            Duration::from_secs(45),
            start + Duration::from_secs(46),
        );
        assert!(!metrics.is_healthy);
    }
}
