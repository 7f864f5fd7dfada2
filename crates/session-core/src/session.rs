use std::{future, io::Write, sync::Arc};

use fs_types::{
    ConnectionDetails, ConnectionState, CustomerId, ServerId, config::SessionPolicy, notify::Notification, protocol::TerminalSize, session::{SecurityInfo, SessionEndReason, SessionTimerState, format_duration_ms}
};
use secrecy::SecretString;
use term_core::{Selection, TerminalSurface};
use tokio::{
    sync::{mpsc::UnboundedReceiver, watch},
    time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until},
};
use tracing::{debug, info, warn};

use crate::{
    AUDIT_TARGET, activity::{ActivityKind, ActivityTracker}, api::{ConsoleApi, resolve_target}, clock::{ClockEdge, IdleThresholds, SessionClock}, connection::{ConnectionEvent, ConnectionManager, Connector}, host::{Clipboard, Navigator}, notify::Notifier, security::SecurityAdvisoryState
};

/// Which server to open and under what policy.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub server_id: ServerId,
    /// Customer whose server list to return to; falls back to the server's owner.
    pub customer_id: Option<CustomerId>,
    pub token: Option<SecretString>,
    pub policy: SessionPolicy,
    /// Area the host gives the terminal, chrome included.
    pub container: TerminalSize,
    /// Rows of host chrome (status line) hidden in fullscreen.
    pub chrome_rows: u16,
}

impl SessionOptions {
    pub fn new(server_id: impl Into<ServerId>) -> Self {
        Self {
            server_id: server_id.into(),
            customer_id: None,
            token: None,
            policy: SessionPolicy::default(),
            container: TerminalSize::default(),
            chrome_rows: 0,
        }
    }
}

/// Capabilities borrowed from the host environment.
pub struct SessionHost {
    pub notifier: Arc<dyn Notifier>,
    pub navigator: Arc<dyn Navigator>,
    pub clipboard: Box<dyn Clipboard>,
    pub activity: Arc<dyn ActivityTracker>,
    /// Receives terminal output verbatim, for hosts that render through a real terminal.
    pub mirror: Option<Box<dyn Write + Send>>,
}

/// User actions and host events a running session accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    Input(String),
    Activity(ActivityKind),
    ContainerResized(TerminalSize),
    Reconnect,
    CopyOutput,
    ToggleFullscreen,
    ExitFullscreen,
    StayActive,
    DismissRootWarning,
    /// "Close" on the root access warning.
    DeclineRootAccess,
    Select(Selection),
    ClearSelection,
    Close,
}

/// What a host needs to draw its chrome.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub timer: SessionTimerState,
    pub security: SecurityInfo,
    /// `user@host` of the live connection.
    pub banner: Option<String>,
    /// Last connection message (close reason, error), cleared on open.
    pub status: Option<String>,
    pub fullscreen: bool,
    pub terminal_size: Option<TerminalSize>,
    pub ended: Option<SessionEndReason>,
}

/// The terminal page for one server.
///
/// Resolves credentials, then creates the terminal surface and opens the channel.
/// Keystrokes go straight to the [`ConnectionManager`], output goes into the
/// [`TerminalSurface`], and the [`SessionClock`] ticks beside both. A different
/// server means a new session; the old one is unmounted first.
pub struct SshTerminalSession {
    server_id: ServerId,
    customer_id: Option<CustomerId>,
    token: Option<SecretString>,
    policy: SessionPolicy,
    container: TerminalSize,
    chrome_rows: u16,

    api: Arc<dyn ConsoleApi>,
    connection: ConnectionManager,
    clock: SessionClock,
    security: SecurityAdvisoryState,
    terminal: Option<TerminalSurface>,
    details: Option<ConnectionDetails>,
    hostname: Option<String>,

    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    clipboard: Box<dyn Clipboard>,
    activity: Arc<dyn ActivityTracker>,
    mirror: Option<Box<dyn Write + Send>>,

    fullscreen: bool,
    refit_at: Option<Instant>,
    ticker: Option<Interval>,
    status: Option<String>,
    ended: Option<SessionEndReason>,
    unmounted: bool,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SshTerminalSession {
    pub fn new(api: Arc<dyn ConsoleApi>, connector: Arc<dyn Connector>, options: SessionOptions, host: SessionHost) -> Self {
        let SessionOptions {
            server_id,
            customer_id,
            token,
            policy,
            container,
            chrome_rows,
        } = options;
        let (snapshots, _) = watch::channel(SessionSnapshot::default());
        Self {
            connection: ConnectionManager::new(connector, server_id.clone()),
            clock: SessionClock::new(IdleThresholds::from(&policy)),
            server_id,
            customer_id,
            token,
            policy,
            container,
            chrome_rows,
            api,
            security: SecurityAdvisoryState::new(),
            terminal: None,
            details: None,
            hostname: None,
            notifier: host.notifier,
            navigator: host.navigator,
            clipboard: host.clipboard,
            activity: host.activity,
            mirror: host.mirror,
            fullscreen: false,
            refit_at: None,
            ticker: None,
            status: None,
            ended: None,
            unmounted: false,
            snapshots,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn terminal(&self) -> Option<&TerminalSurface> {
        self.terminal.as_ref()
    }

    pub fn terminal_mut(&mut self) -> Option<&mut TerminalSurface> {
        self.terminal.as_mut()
    }

    pub fn is_finished(&self) -> bool {
        self.ended.is_some() || self.unmounted
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.connection.state(),
            timer: self.clock.state(),
            security: self.security.info().clone(),
            banner: self.security.status_banner(),
            status: self.status.clone(),
            fullscreen: self.fullscreen,
            terminal_size: self.terminal.as_ref().map(TerminalSurface::size),
            ended: self.ended,
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    /// Resolve credentials, then create the terminal and open the channel. On failure
    /// the state becomes `Error`, the user is notified, and no terminal is created.
    pub async fn mount(&mut self) {
        if self.is_finished() || self.details.is_some() {
            return;
        }

        let target = match resolve_target(self.api.as_ref(), &self.server_id).await {
            Ok(target) => target,
            Err(err) => {
                self.fail_mount(err.to_string());
                return;
            }
        };
        let surface = match TerminalSurface::new(self.fit_target(), self.policy.scrollback_lines) {
            Ok(surface) => surface,
            Err(err) => {
                self.fail_mount(err.to_string());
                return;
            }
        };

        info!(server_id = %self.server_id, target = %target.details.authority(), "terminal target resolved");
        self.terminal = Some(match self.mirror.take() {
            Some(mirror) => surface.with_mirror(mirror),
            None => surface,
        });
        self.security.set_client_ip(Some(target.client_ip));
        self.hostname = target.hostname;
        if self.customer_id.is_none() {
            self.customer_id = target.customer_id;
        }
        self.connection.connect(target.details.clone(), self.token.clone());
        self.details = Some(target.details);
        self.publish();
    }

    fn fail_mount(&mut self, message: String) {
        self.connection.mark_failed(&message);
        self.notifier.notify(Notification::error("Unable to open terminal", message.clone()));
        self.status = Some(message);
        self.publish();
    }

    /// Wait for and handle one connection, clock or refit event. Returns `false`
    /// once the session has ended.
    pub async fn pump(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        tokio::select! {
            Some(event) = self.connection.next_event() => self.handle_event(event),
            _ = next_tick(self.ticker.as_mut()) => self.on_tick(),
            _ = refit_due(self.refit_at) => self.refit(),
        }
        self.publish();
        !self.is_finished()
    }

    /// Mount, then serve commands until the session ends or the command channel closes.
    pub async fn run(mut self, mut commands: UnboundedReceiver<SessionCommand>) -> SessionEndReason {
        self.mount().await;
        while !self.is_finished() {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.dispatch(command),
                    None => break,
                },
                Some(event) = self.connection.next_event() => self.handle_event(event),
                _ = next_tick(self.ticker.as_mut()) => self.on_tick(),
                _ = refit_due(self.refit_at) => self.refit(),
            }
            self.publish();
        }
        self.unmount();
        self.ended.unwrap_or(SessionEndReason::Unmounted)
    }

    pub fn dispatch(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Input(data) => self.input(&data),
            SessionCommand::Activity(kind) => self.activity.record(kind),
            SessionCommand::ContainerResized(size) => self.container_resized(size),
            SessionCommand::Reconnect => self.reconnect(),
            SessionCommand::CopyOutput => self.copy_output(),
            SessionCommand::ToggleFullscreen => self.toggle_fullscreen(),
            SessionCommand::ExitFullscreen => self.exit_fullscreen(),
            SessionCommand::StayActive => self.stay_active(),
            SessionCommand::DismissRootWarning => self.security.dismiss_root_warning(),
            SessionCommand::DeclineRootAccess => self.close_terminal(SessionEndReason::RootWarningDeclined),
            SessionCommand::Select(selection) => {
                if let Some(terminal) = self.terminal.as_mut() {
                    terminal.select(selection);
                }
            }
            SessionCommand::ClearSelection => {
                if let Some(terminal) = self.terminal.as_mut() {
                    terminal.clear_selection();
                }
            }
            SessionCommand::Close => self.close_terminal(SessionEndReason::UserClosed),
        }
        self.publish();
    }

    fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Opened { started_at } => {
                let now = Instant::now();
                self.activity.record_activity();
                self.clock.start(now);
                let mut ticker = interval_at(now + self.policy.tick_interval, self.policy.tick_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                self.ticker = Some(ticker);
                if let Some(details) = &self.details {
                    self.security.arm(details, self.hostname.clone(), started_at);
                }
                if self.security.info().show_root_warning {
                    self.notifier.notify(Notification::warning(
                        "Root access",
                        "You are logged in as root. Commands run with full privileges on this server.",
                    ));
                }
                self.status = None;
                if let Some(terminal) = &self.terminal {
                    self.connection.send_resize(terminal.size());
                }
            }
            ConnectionEvent::Output(output) => {
                if let Some(terminal) = self.terminal.as_mut() {
                    terminal.write(&output);
                }
            }
            ConnectionEvent::BackendError(message) => {
                if let Some(terminal) = self.terminal.as_mut() {
                    terminal.write_error_line(&message);
                }
                self.notifier.notify(Notification::error("SSH error", message.clone()));
                self.status = Some(message);
            }
            ConnectionEvent::Closed { code, message, .. } => {
                if let Some(terminal) = self.terminal.as_mut() {
                    terminal.write_session_ended(&message);
                }
                let notification = if code == 1000 {
                    Notification::info("Connection closed", message.clone())
                } else {
                    Notification::warning("Connection closed", message.clone())
                };
                self.notifier.notify(notification);
                self.status = Some(message);
            }
            ConnectionEvent::TransportError(message) => {
                if let Some(terminal) = self.terminal.as_mut() {
                    terminal.write_error_line(&message);
                }
                self.notifier.notify(Notification::error("Connection error", message.clone()));
                self.status = Some(message);
            }
        }
        self.sync_clock();
    }

    /// The clock only runs while the channel is connected.
    fn sync_clock(&mut self) {
        if !self.connection.state().is_connected() {
            self.clock.stop();
            self.ticker = None;
        }
    }

    fn on_tick(&mut self) {
        let edges = self.clock.tick(Instant::now(), self.activity.last_activity());
        for edge in edges {
            match edge {
                ClockEdge::IdleWarningRaised => {
                    let timer = self.clock.state();
                    self.notifier.notify(Notification::warning(
                        "Session idle",
                        format!(
                            "No activity for {}. The session closes in {} unless you stay active.",
                            format_duration_ms(timer.idle_ms),
                            format_duration_ms(timer.auto_logout_countdown_ms)
                        ),
                    ));
                }
                ClockEdge::IdleWarningCleared => debug!("idle warning cleared"),
                ClockEdge::AutoLogout => self.auto_logout(),
            }
        }
    }

    fn auto_logout(&mut self) {
        let target = self.security.status_banner().unwrap_or_else(|| self.server_id.clone());
        let minutes = self.policy.auto_logout.as_secs() / 60;
        self.notifier.notify(
            Notification::warning(
                "Session timed out",
                format!("SSH session to {target} was closed after {minutes} minutes of inactivity."),
            )
            .with_end_reason(SessionEndReason::AutoLogout),
        );
        self.close_terminal(SessionEndReason::AutoLogout);
    }

    pub fn input(&mut self, data: &str) {
        self.activity.record(ActivityKind::KeyPress);
        self.connection.send(data);
    }

    pub fn stay_active(&mut self) {
        self.activity.record(ActivityKind::Click);
        self.on_tick();
    }

    /// Open a fresh channel with the already-resolved details. Ignored before mount.
    pub fn reconnect(&mut self) {
        if self.is_finished() {
            return;
        }
        let Some(details) = self.details.clone() else {
            debug!(server_id = %self.server_id, "reconnect ignored; connection details not resolved");
            return;
        };
        self.security.reset_connection();
        self.clock.stop();
        self.ticker = None;
        self.status = None;
        if let Some(terminal) = self.terminal.as_mut() {
            terminal.write_notice("reconnecting...");
        }
        info!(server_id = %self.server_id, "reconnecting terminal");
        self.connection.connect(details, self.token.clone());
    }

    /// Copy the whole buffer (scrollback included) to the clipboard. When the
    /// buffer cannot be read, as after unmount, the selection is copied instead.
    pub fn copy_output(&mut self) {
        let Some(terminal) = self.terminal.as_mut() else {
            self.notifier.notify(Notification::error("Copy failed", "The terminal is not ready."));
            return;
        };
        let text = match terminal.scrollback_text() {
            Some(text) => text,
            None => {
                debug!("terminal buffer unavailable; copying the selection");
                terminal.selection_text().unwrap_or_default()
            }
        };
        if text.trim().is_empty() {
            self.notifier.notify(Notification::warning("Nothing to copy", "The terminal has no output yet."));
            return;
        }

        let lines = text.lines().count();
        match self.clipboard.set_text(text) {
            Ok(()) => self.notifier.notify(Notification::success(
                "Copied",
                format!("{lines} lines of terminal output copied to the clipboard."),
            )),
            Err(err) => {
                warn!(error = %err, "copying terminal output failed");
                self.notifier.notify(Notification::error("Copy failed", err.to_string()));
            }
        }
    }

    pub fn toggle_fullscreen(&mut self) {
        self.fullscreen = !self.fullscreen;
        self.schedule_refit();
    }

    pub fn exit_fullscreen(&mut self) {
        if self.fullscreen {
            self.toggle_fullscreen();
        }
    }

    pub fn is_fullscreen(&self) -> bool {
        self.fullscreen
    }

    pub fn container_resized(&mut self, size: TerminalSize) {
        self.container = size;
        self.schedule_refit();
    }

    fn schedule_refit(&mut self) {
        self.refit_at = Some(Instant::now() + self.policy.refit_delay);
    }

    fn fit_target(&self) -> TerminalSize {
        let rows = if self.fullscreen {
            self.container.rows
        } else {
            self.container.rows.saturating_sub(self.chrome_rows)
        };
        TerminalSize::new(self.container.cols, rows)
    }

    fn refit(&mut self) {
        self.refit_at = None;
        let target = self.fit_target();
        let Some(terminal) = self.terminal.as_mut() else {
            return;
        };
        match terminal.fit(target) {
            Ok(Some(size)) => self.connection.send_resize(size),
            Ok(None) => {}
            Err(err) => warn!(error = %err, cols = target.cols, rows = target.rows, "terminal fit failed"),
        }
    }

    /// The single exit path: close the channel and return to the server list.
    /// Later calls are ignored.
    pub fn close_terminal(&mut self, reason: SessionEndReason) {
        if self.ended.is_some() {
            return;
        }
        let duration_ms = self.clock.state().duration_ms;
        self.ended = Some(reason);
        self.connection.close();
        self.clock.stop();
        self.ticker = None;
        self.refit_at = None;
        info!(
            target: AUDIT_TARGET,
            server_id = %self.server_id,
            user = self.security.info().current_user.as_deref().unwrap_or("-"),
            %reason,
            duration_ms,
            "terminal session ended"
        );
        self.navigator.to_server_list(self.customer_id.as_ref());
        self.publish();
    }

    /// Tear down in order: terminal, refit timer, clock, channel. Idempotent.
    pub fn unmount(&mut self) {
        if self.unmounted {
            return;
        }
        self.unmounted = true;
        if let Some(terminal) = self.terminal.as_mut() {
            terminal.dispose();
        }
        self.refit_at = None;
        self.clock.stop();
        self.ticker = None;
        self.connection.close();
        if self.ended.is_none() {
            self.ended = Some(SessionEndReason::Unmounted);
            info!(target: AUDIT_TARGET, server_id = %self.server_id, reason = %SessionEndReason::Unmounted, "terminal session ended");
        }
        self.publish();
    }
}

impl Drop for SshTerminalSession {
    fn drop(&mut self) {
        self.unmount();
    }
}

async fn next_tick(ticker: Option<&mut Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => future::pending().await,
    }
}

async fn refit_due(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => future::pending().await,
    }
}
