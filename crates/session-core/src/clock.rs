//! Session duration and idle tracking.
//!
//! [`evaluate`] is the pure part: given the session start, the last activity and
//! the current instant it produces a [`SessionTimerState`]. [`SessionClock`] keeps
//! the previous state and reports the edges (warning raised or cleared, logout)
//! so side effects run once per transition rather than once per tick.

use std::time::Duration;

use fs_types::{config::SessionPolicy, session::SessionTimerState};
use tokio::time::Instant;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdleThresholds {
    pub idle_warning: Duration,
    pub auto_logout: Duration,
}

impl From<&SessionPolicy> for IdleThresholds {
    fn from(policy: &SessionPolicy) -> Self {
        Self {
            idle_warning: policy.idle_warning,
            auto_logout: policy.auto_logout,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockEdge {
    IdleWarningRaised,
    IdleWarningCleared,
    AutoLogout,
}

pub fn evaluate(session_start: Instant, last_activity: Instant, now: Instant, thresholds: IdleThresholds) -> SessionTimerState {
    let duration = now.saturating_duration_since(session_start);
    let idle = now.saturating_duration_since(last_activity);
    let show_idle_warning = idle > thresholds.idle_warning;
    let auto_logout_countdown = if show_idle_warning {
        thresholds.auto_logout.saturating_sub(idle)
    } else {
        Duration::ZERO
    };

    SessionTimerState {
        duration_ms: duration.as_millis() as u64,
        idle_ms: idle.as_millis() as u64,
        show_idle_warning,
        auto_logout_countdown_ms: auto_logout_countdown.as_millis() as u64,
    }
}

pub fn is_logout_due(state: &SessionTimerState, thresholds: IdleThresholds) -> bool {
    u128::from(state.idle_ms) > thresholds.auto_logout.as_millis()
}

/// Ticking state for one connected session. Stopped clocks report all zeros.
#[derive(Debug)]
pub struct SessionClock {
    thresholds: IdleThresholds,
    session_start: Option<Instant>,
    state: SessionTimerState,
    logout_fired: bool,
}

impl SessionClock {
    pub fn new(thresholds: IdleThresholds) -> Self {
        Self {
            thresholds,
            session_start: None,
            state: SessionTimerState::default(),
            logout_fired: false,
        }
    }

    pub fn thresholds(&self) -> IdleThresholds {
        self.thresholds
    }

    /// Begin timing a fresh session at `now`; a restart resets everything.
    pub fn start(&mut self, now: Instant) {
        self.session_start = Some(now);
        self.state = SessionTimerState::default();
        self.logout_fired = false;
        debug!("session clock started");
    }

    pub fn stop(&mut self) {
        if self.session_start.take().is_some() {
            debug!("session clock stopped");
        }
        self.state = SessionTimerState::default();
    }

    /// True while started and auto-logout has not fired.
    pub fn is_running(&self) -> bool {
        self.session_start.is_some() && !self.logout_fired
    }

    pub fn state(&self) -> SessionTimerState {
        self.state
    }

    /// Recompute the timer state. Returns the edges crossed since the previous tick;
    /// `AutoLogout` is reported at most once per start.
    pub fn tick(&mut self, now: Instant, last_activity: Instant) -> Vec<ClockEdge> {
        let Some(session_start) = self.session_start else {
            return Vec::new();
        };
        if self.logout_fired {
            return Vec::new();
        }

        let previous = self.state;
        let next = evaluate(session_start, last_activity, now, self.thresholds);
        self.state = next;

        let mut edges = Vec::new();
        match (previous.show_idle_warning, next.show_idle_warning) {
            (false, true) => edges.push(ClockEdge::IdleWarningRaised),
            (true, false) => edges.push(ClockEdge::IdleWarningCleared),
            _ => {}
        }
        if is_logout_due(&next, self.thresholds) {
            self.logout_fired = true;
            info!(idle_ms = next.idle_ms, "idle limit reached");
            edges.push(ClockEdge::AutoLogout);
        }
        edges
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
