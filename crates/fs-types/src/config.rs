//! Configuration structs for the console endpoint and the session policy.
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default port the console serves its terminal WebSocket on.
pub const DEFAULT_WS_PORT: u16 = 8000;

/// Where the console's REST API and terminal WebSocket live.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEndpoint {
    /// Base URL of the REST API, e.g. `https://console.example.com`.
    pub api_base_url: String,
    /// Host serving `/ws/servers/{id}/ssh`; usually the API host.
    pub ws_host: String,
    /// Fixed port of the WebSocket listener.
    pub ws_port: u16,
    /// Use `wss://` instead of `ws://`.
    pub secure: bool,
}

impl ConsoleEndpoint {
    pub fn ws_scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }
}

impl Default for ConsoleEndpoint {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            ws_host: "127.0.0.1".to_string(),
            ws_port: DEFAULT_WS_PORT,
            secure: false,
        }
    }
}

/// Timing and buffer policy for terminal sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPolicy {
    /// Idle time after which the "are you still there" warning is shown.
    #[serde(with = "duration_secs")]
    pub idle_warning: Duration,
    /// Idle time after which the session is closed.
    #[serde(with = "duration_secs")]
    pub auto_logout: Duration,
    /// Session clock period.
    #[serde(with = "duration_millis")]
    pub tick_interval: Duration,
    /// Delay between a layout change and refitting the terminal.
    #[serde(with = "duration_millis")]
    pub refit_delay: Duration,
    /// Lines kept in the emulator's scrollback.
    pub scrollback_lines: usize,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            idle_warning: Duration::from_secs(15 * 60),
            auto_logout: Duration::from_secs(20 * 60),
            tick_interval: Duration::from_secs(1),
            refit_delay: Duration::from_millis(100),
            scrollback_lines: 10_000,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
