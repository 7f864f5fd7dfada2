//! Derived per-session state exposed to hosts: timers and security advisories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timing of the live session, recomputed every clock tick.
///
/// All fields are zero unless the connection is `Connected`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimerState {
    pub duration_ms: u64,
    pub idle_ms: u64,
    pub show_idle_warning: bool,
    /// Time left before auto-logout; only meaningful while the idle warning is shown.
    pub auto_logout_countdown_ms: u64,
}

impl SessionTimerState {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Security banner data derived from the connection details and the client IP lookup.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityInfo {
    pub current_user: Option<String>,
    pub hostname: Option<String>,
    pub client_ip: Option<String>,
    /// Always equal to `current_user == Some("root")`.
    pub is_root_user: bool,
    pub session_start_time: Option<DateTime<Utc>>,
    pub show_root_warning: bool,
}

/// Why a terminal session ended; recorded in the audit log and the end notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionEndReason {
    /// Close button / `~.`.
    UserClosed,
    /// Idle past the auto-logout threshold.
    AutoLogout,
    /// The user chose "close" on the root-access warning.
    RootWarningDeclined,
    /// The host tore the session down (navigation to another server, exit).
    Unmounted,
}

/// Format a millisecond duration as `HH:MM:SS` (or `MM:SS` under an hour).
pub fn format_duration_ms(ms: u64) -> String {
    let total = ms / 1000;
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}
