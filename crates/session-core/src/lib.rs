//! Runtime for fleetssh terminal sessions.
//!
//! An [`SshTerminalSession`] resolves credentials through a [`ConsoleApi`], opens a
//! channel to the console's SSH bridge through a [`ConnectionManager`], renders into
//! a `term_core::TerminalSurface`, and closes itself after the idle limit. Hosts drive
//! it with [`SessionCommand`]s and draw their chrome from [`SessionSnapshot`]s.

pub mod activity;
pub mod api;
pub mod clock;
pub mod connection;
pub mod error;
pub mod host;
pub mod notify;
pub mod security;
pub mod session;

pub use activity::{ActivityKind, ActivityTracker, SharedActivity};
pub use api::{ConsoleApi, HttpConsoleApi, ResolvedTarget, StaticConsoleApi, resolve_target};
pub use clock::{ClockEdge, IdleThresholds, SessionClock};
pub use connection::{ConnectionEvent, ConnectionManager, Connector, WsConnector};
pub use error::{SessionError, SessionResult};
pub use host::{ChannelNavigator, Clipboard, MemoryClipboard, NavigateToServerList, Navigator, SystemClipboard};
pub use notify::{ChannelNotifier, LogNotifier, Notifier};
pub use security::SecurityAdvisoryState;
pub use session::{SessionCommand, SessionHost, SessionOptions, SessionSnapshot, SshTerminalSession};

/// `tracing` target for session-end audit records.
pub const AUDIT_TARGET: &str = "fleetssh::audit";
