//! Connection state machine for the realtime channel.
//!
//! All reconnection, backoff and visibility logic lives here as a pure
//! transition function: `handle(event) -> effects`. The socket driver in
//! [`super::channel`] owns the I/O and timers and feeds events back in,
//! which keeps every policy decision testable without a live socket.
//!
//! Invariants enforced by the transitions:
//!
//! - at most one retry timer is pending at any time;
//! - retries are scheduled only while reconnection is enabled and the
//!   client is visible;
//! - the backoff delay doubles per scheduled retry, saturates at the
//!   ceiling, and resets to the floor on a successful open;
//! - `DisconnectRequested` deterministically cancels everything on every
//!   path, including mid-backoff.

use crate::constants::{RECONNECT_DELAY_CEILING_MS, RECONNECT_DELAY_FLOOR_MS};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected; no retry pending.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected and heartbeating.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Inputs to the machine: caller commands, socket callbacks, timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Caller asked to connect. Re-enables reconnection.
    ConnectRequested,
    /// The socket opened successfully.
    Opened,
    /// Transport-level error. Marks the connection dead but schedules
    /// nothing: the close that follows drives reconnection.
    SocketError,
    /// The socket closed (server close, network drop, failed attempt).
    Closed,
    /// The pending retry timer fired.
    RetryDue,
    /// Caller asked to disconnect. Disables reconnection until the next
    /// `ConnectRequested`.
    DisconnectRequested,
    /// The embedding UI became visible (`true`) or hidden (`false`).
    VisibilityChanged(bool),
}

/// Side effects for the driver to execute, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Open a new socket; report the outcome as `Opened` or `Closed`.
    OpenSocket,
    /// Close and drop the current socket, if any.
    CloseSocket,
    /// Start the periodic ping timer.
    StartHeartbeat,
    /// Stop the ping timer.
    StopHeartbeat,
    /// Arm the (single) retry timer for the given delay.
    ScheduleRetry(u64),
    /// Disarm the retry timer, if armed.
    CancelRetry,
}

/// The state machine proper.
#[derive(Debug)]
pub struct Machine {
    state: ConnectionState,
    reconnect_enabled: bool,
    visible: bool,
    attempts: u32,
    delay_ms: u64,
    retry_pending: bool,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    /// A fresh machine: disconnected, visible, backoff at the floor.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_enabled: false,
            visible: true,
            attempts: 0,
            delay_ms: RECONNECT_DELAY_FLOOR_MS,
            retry_pending: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of retries scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a retry timer is armed.
    pub fn retry_pending(&self) -> bool {
        self.retry_pending
    }

    /// Apply one event and return the effects to execute, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let mut effects = Vec::new();

        match event {
            Event::ConnectRequested => {
                self.reconnect_enabled = true;
                if self.retry_pending {
                    self.retry_pending = false;
                    effects.push(Effect::CancelRetry);
                }
                if matches!(self.state, ConnectionState::Connected | ConnectionState::Connecting) {
                    effects.push(Effect::StopHeartbeat);
                    effects.push(Effect::CloseSocket);
                }
                self.state = ConnectionState::Connecting;
                effects.push(Effect::OpenSocket);
            }

            Event::Opened => {
                self.state = ConnectionState::Connected;
                self.attempts = 0;
                self.delay_ms = RECONNECT_DELAY_FLOOR_MS;
                effects.push(Effect::StartHeartbeat);
            }

            Event::SocketError => {
                if self.state != ConnectionState::Reconnecting {
                    self.state = ConnectionState::Disconnected;
                }
            }

            Event::Closed => {
                effects.push(Effect::StopHeartbeat);
                self.state = ConnectionState::Disconnected;
                self.schedule_retry(self.delay_ms, true, &mut effects);
            }

            Event::RetryDue => {
                self.retry_pending = false;
                if self.reconnect_enabled && self.state != ConnectionState::Connected {
                    self.state = ConnectionState::Connecting;
                    effects.push(Effect::OpenSocket);
                }
            }

            Event::DisconnectRequested => {
                self.reconnect_enabled = false;
                self.retry_pending = false;
                self.state = ConnectionState::Disconnected;
                effects.push(Effect::CancelRetry);
                effects.push(Effect::StopHeartbeat);
                effects.push(Effect::CloseSocket);
            }

            Event::VisibilityChanged(visible) => {
                self.visible = visible;
                // Becoming hidden leaves in-flight work alone. Becoming
                // visible while down restarts the backoff from the floor.
                if visible
                    && self.reconnect_enabled
                    && !self.retry_pending
                    && !matches!(
                        self.state,
                        ConnectionState::Connected | ConnectionState::Connecting
                    )
                {
                    self.delay_ms = RECONNECT_DELAY_FLOOR_MS;
                    self.schedule_retry(0, false, &mut effects);
                }
            }
        }

        effects
    }

    /// Arm the retry timer if allowed: reconnection enabled, visible, and
    /// no timer already pending. `advance` controls whether the backoff
    /// delay doubles for the next round.
    fn schedule_retry(&mut self, delay_ms: u64, advance: bool, effects: &mut Vec<Effect>) {
        if self.retry_pending || !self.reconnect_enabled || !self.visible {
            return;
        }
        self.retry_pending = true;
        self.attempts += 1;
        self.state = ConnectionState::Reconnecting;
        effects.push(Effect::ScheduleRetry(delay_ms));
        if advance {
            self.delay_ms = (self.delay_ms * 2).min(RECONNECT_DELAY_CEILING_MS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected_machine() -> Machine {
        let mut m = Machine::new();
        m.handle(Event::ConnectRequested);
        m.handle(Event::Opened);
        assert_eq!(m.state(), ConnectionState::Connected);
        m
    }

    /// Drive one close → retry-fired cycle and return the scheduled delay.
    fn close_and_retry(m: &mut Machine) -> u64 {
        let effects = m.handle(Event::Closed);
        let delay = effects
            .iter()
            .find_map(|e| match e {
                Effect::ScheduleRetry(ms) => Some(*ms),
                _ => None,
            })
            .expect("close while enabled and visible must schedule a retry");
        let effects = m.handle(Event::RetryDue);
        assert!(effects.contains(&Effect::OpenSocket));
        delay
    }

    #[test]
    fn test_initial_state() {
        let m = Machine::new();
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.retry_pending());
    }

    #[test]
    fn test_connect_opens_socket() {
        let mut m = Machine::new();
        let effects = m.handle(Event::ConnectRequested);
        assert_eq!(effects, vec![Effect::OpenSocket]);
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_connect_while_connected_closes_first() {
        let mut m = connected_machine();
        let effects = m.handle(Event::ConnectRequested);
        assert_eq!(
            effects,
            vec![Effect::StopHeartbeat, Effect::CloseSocket, Effect::OpenSocket]
        );
    }

    #[test]
    fn test_open_starts_heartbeat_and_resets_backoff() {
        let mut m = Machine::new();
        m.handle(Event::ConnectRequested);
        let effects = m.handle(Event::Opened);
        assert_eq!(effects, vec![Effect::StartHeartbeat]);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert_eq!(m.attempts(), 0);
    }

    #[test]
    fn test_backoff_doubles_and_saturates() {
        let mut m = connected_machine();
        let delays: Vec<u64> = (0..5).map(|_| close_and_retry(&mut m)).collect();
        assert_eq!(delays, vec![3_000, 6_000, 12_000, 24_000, 30_000]);
        // Saturated: further closes stay at the ceiling.
        assert_eq!(close_and_retry(&mut m), 30_000);
    }

    #[test]
    fn test_successful_open_resets_delay_to_floor() {
        let mut m = connected_machine();
        assert_eq!(close_and_retry(&mut m), 3_000);
        assert_eq!(close_and_retry(&mut m), 6_000);
        m.handle(Event::Opened);
        assert_eq!(close_and_retry(&mut m), 3_000);
    }

    #[test]
    fn test_only_one_retry_pending() {
        let mut m = connected_machine();
        let first = m.handle(Event::Closed);
        assert!(first.iter().any(|e| matches!(e, Effect::ScheduleRetry(_))));
        // A second close while a retry is pending schedules nothing new.
        let second = m.handle(Event::Closed);
        assert!(!second.iter().any(|e| matches!(e, Effect::ScheduleRetry(_))));
    }

    #[test]
    fn test_close_while_hidden_schedules_nothing() {
        let mut m = connected_machine();
        m.handle(Event::VisibilityChanged(false));
        let effects = m.handle(Event::Closed);
        assert_eq!(effects, vec![Effect::StopHeartbeat]);
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.retry_pending());
    }

    #[test]
    fn test_becoming_visible_schedules_immediate_retry() {
        let mut m = connected_machine();
        // Push the delay up, then go hidden and drop the connection.
        close_and_retry(&mut m);
        m.handle(Event::Closed); // delay now past the floor, retry pending
        m.handle(Event::RetryDue);
        m.handle(Event::VisibilityChanged(false));
        m.handle(Event::Closed);
        assert!(!m.retry_pending());

        let effects = m.handle(Event::VisibilityChanged(true));
        assert!(effects.contains(&Effect::ScheduleRetry(0)));
        // Delay was reset: the next scheduled close-retry uses the floor.
        m.handle(Event::RetryDue);
        assert_eq!(close_and_retry(&mut m), 3_000);
    }

    #[test]
    fn test_becoming_visible_while_connected_is_inert() {
        let mut m = connected_machine();
        assert!(m.handle(Event::VisibilityChanged(true)).is_empty());
        assert!(m.handle(Event::VisibilityChanged(false)).is_empty());
    }

    #[test]
    fn test_becoming_visible_with_retry_pending_is_inert() {
        let mut m = connected_machine();
        m.handle(Event::Closed); // schedules, pending
        let effects = m.handle(Event::VisibilityChanged(true));
        assert!(effects.is_empty());
    }

    #[test]
    fn test_becoming_hidden_leaves_pending_retry_alone() {
        let mut m = connected_machine();
        m.handle(Event::Closed);
        assert!(m.retry_pending());
        let effects = m.handle(Event::VisibilityChanged(false));
        assert!(effects.is_empty());
        assert!(m.retry_pending(), "hidden must not cancel an armed timer");
    }

    #[test]
    fn test_disconnect_cancels_everything() {
        let mut m = connected_machine();
        m.handle(Event::Closed); // retry pending
        let effects = m.handle(Event::DisconnectRequested);
        assert_eq!(
            effects,
            vec![Effect::CancelRetry, Effect::StopHeartbeat, Effect::CloseSocket]
        );
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.retry_pending());

        // A stale RetryDue after disconnect must not reopen.
        assert!(m.handle(Event::RetryDue).is_empty());
        // A close after disconnect must not schedule.
        let effects = m.handle(Event::Closed);
        assert!(!effects.iter().any(|e| matches!(e, Effect::ScheduleRetry(_))));
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut m = connected_machine();
        m.handle(Event::DisconnectRequested);
        let effects = m.handle(Event::DisconnectRequested);
        assert_eq!(
            effects,
            vec![Effect::CancelRetry, Effect::StopHeartbeat, Effect::CloseSocket]
        );
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.retry_pending());
    }

    #[test]
    fn test_error_marks_disconnected_without_scheduling() {
        let mut m = connected_machine();
        let effects = m.handle(Event::SocketError);
        assert!(effects.is_empty());
        assert_eq!(m.state(), ConnectionState::Disconnected);
        assert!(!m.retry_pending());
    }

    #[test]
    fn test_connect_reenables_after_disconnect() {
        let mut m = connected_machine();
        m.handle(Event::DisconnectRequested);
        let effects = m.handle(Event::ConnectRequested);
        assert_eq!(effects, vec![Effect::OpenSocket]);
        // Reconnection is live again: a close schedules.
        let effects = m.handle(Event::Closed);
        assert!(effects.iter().any(|e| matches!(e, Effect::ScheduleRetry(_))));
    }
}
