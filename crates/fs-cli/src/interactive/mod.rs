//! Interactive host: runs one terminal session in the local terminal.

mod chrome;
mod escape;

use std::{
    io::{self, Read, Write},
    sync::Arc,
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, size as term_size};
use fs_types::{
    api::{RevealedCredential, ServerDetails}, notify::Notification, protocol::TerminalSize, session::SessionEndReason
};
use secrecy::ExposeSecret;
use session_core::{
    ActivityKind, ChannelNavigator, ChannelNotifier, ConsoleApi, HttpConsoleApi, NavigateToServerList, SessionCommand, SessionHost, SessionOptions, SharedActivity, SshTerminalSession, StaticConsoleApi, SystemClipboard, WsConnector
};
use signal_hook::iterator::Signals;
use term_core::marker::notice_line;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};

pub use chrome::status_text;
use chrome::{Chrome, STATUS_ROWS};
pub use escape::{EscapeAction, EscapeParser, escape_help_text};

use crate::{
    cli::{Config, DIRECT_CLIENT_IP, Target},
    logging,
};

/// Run the session until it ends, then restore the terminal.
pub async fn run_interactive(config: Config) -> Result<SessionEndReason> {
    let Config {
        server_id,
        customer_id,
        token,
        endpoint,
        policy,
        target,
        ..
    } = config;

    let api: Arc<dyn ConsoleApi> = match target {
        Target::Console => Arc::new(
            HttpConsoleApi::new(&endpoint.api_base_url, token.clone()).context("configuring the console API client")?,
        ),
        Target::Direct {
            host,
            port,
            username,
            password,
            hostname,
        } => {
            let server = ServerDetails {
                id: server_id.clone(),
                host,
                port: i64::from(port),
                hostname,
                customer_id: customer_id.clone(),
            };
            let credential = RevealedCredential {
                username,
                secret: password.map(|p| p.expose_secret().to_string()),
            };
            Arc::new(StaticConsoleApi::new(server, credential).with_client_ip(DIRECT_CLIENT_IP))
        }
    };
    let connector = Arc::new(WsConnector::new(endpoint));

    let (cols, rows) = term_size().unwrap_or((80, 24));
    let container = TerminalSize::new(cols.max(1), rows.max(1));

    let (notice_tx, mut notice_rx) = unbounded_channel::<Notification>();
    let (nav_tx, mut nav_rx) = unbounded_channel::<NavigateToServerList>();
    let (command_tx, command_rx) = unbounded_channel::<SessionCommand>();

    let host = SessionHost {
        notifier: Arc::new(ChannelNotifier::new(notice_tx)),
        navigator: Arc::new(ChannelNavigator::new(nav_tx)),
        clipboard: Box::new(SystemClipboard),
        activity: Arc::new(SharedActivity::new()),
        mirror: Some(Box::new(io::stdout())),
    };
    let mut options = SessionOptions::new(server_id.clone());
    options.customer_id = customer_id;
    options.token = token;
    options.policy = policy;
    options.container = container;
    options.chrome_rows = STATUS_ROWS;

    let session = SshTerminalSession::new(api, connector, options, host);
    let mut snapshots = session.subscribe();

    let raw_guard = RawModeGuard::activate()?;
    let mut chrome = Chrome::new(container);
    if let Err(err) = chrome.install() {
        warn!(?err, "status line unavailable");
    }

    let (tx, mut rx) = unbounded_channel::<InputEvent>();
    spawn_input_thread(tx.clone());
    spawn_resize_thread(tx.clone());
    spawn_signal_thread(tx);

    info!(%server_id, "starting terminal session");
    let mut session_task = tokio::spawn(session.run(command_rx));
    let mut esc = EscapeParser::default();
    let mut input_open = true;
    let mut navigation: Option<NavigateToServerList> = None;
    let mut last_notice: Option<Notification> = None;

    let send = |command: SessionCommand| {
        if command_tx.send(command).is_err() {
            debug!("session already finished; command dropped");
        }
    };

    let outcome = loop {
        tokio::select! {
            maybe_event = rx.recv(), if input_open => match maybe_event {
                Some(InputEvent::Data(data)) => {
                    if data.is_empty() {
                        continue;
                    }
                    let (actions, forwarded) = esc.process(&data);
                    for action in actions {
                        match action {
                            EscapeAction::Close => {
                                if chrome.snapshot().security.show_root_warning {
                                    send(SessionCommand::DeclineRootAccess);
                                } else {
                                    send(SessionCommand::Close);
                                }
                            }
                            EscapeAction::Reconnect => send(SessionCommand::Reconnect),
                            EscapeAction::Copy => send(SessionCommand::CopyOutput),
                            EscapeAction::ToggleFullscreen => send(SessionCommand::ToggleFullscreen),
                            EscapeAction::ExitFullscreen => send(SessionCommand::ExitFullscreen),
                            EscapeAction::StayActive => send(SessionCommand::StayActive),
                            EscapeAction::DismissRootWarning => send(SessionCommand::DismissRootWarning),
                            EscapeAction::VerbosityUp => {
                                if let Some(level) = logging::increase_verbosity() {
                                    print_notice(&format!("log level -> {level}"));
                                }
                            }
                            EscapeAction::VerbosityDown => {
                                if let Some(level) = logging::decrease_verbosity() {
                                    print_notice(&format!("log level -> {level}"));
                                }
                            }
                            EscapeAction::ShowMenu => {
                                let _ = io::stdout().write_all(escape_help_text().as_bytes());
                                let _ = io::stdout().write_all(b"\r\n");
                                let _ = io::stdout().flush();
                            }
                            EscapeAction::LiteralTilde => {}
                        }
                    }
                    if forwarded.is_empty() {
                        send(SessionCommand::Activity(ActivityKind::KeyPress));
                    } else {
                        send(SessionCommand::Input(String::from_utf8_lossy(&forwarded).into_owned()));
                    }
                }
                Some(InputEvent::Resize(cols, rows)) => resize(&mut chrome, cols, rows, &send),
                Some(InputEvent::OsSignal(code)) => {
                    if code == signal_hook::consts::SIGWINCH {
                        let (cols, rows) = term_size().unwrap_or((80, 24));
                        resize(&mut chrome, cols, rows, &send);
                    }
                    #[cfg(unix)]
                    if code == signal_hook::consts::SIGCONT {
                        esc.at_line_start = true;
                    }
                    if code == signal_hook::consts::SIGTERM || code == signal_hook::consts::SIGHUP {
                        info!(signal = code, "terminating session on signal");
                        send(SessionCommand::Close);
                    }
                }
                Some(InputEvent::Eof) | None => {
                    input_open = false;
                    send(SessionCommand::Close);
                }
            },
            Some(notification) = notice_rx.recv() => {
                last_notice = Some(notification.clone());
                if let Err(err) = chrome.notify(notification) {
                    debug!(?err, "status line draw failed");
                }
            }
            Some(request) = nav_rx.recv() => navigation = Some(request),
            Ok(()) = snapshots.changed() => {
                let snapshot = snapshots.borrow_and_update().clone();
                if let Err(err) = chrome.apply(snapshot) {
                    debug!(?err, "status line draw failed");
                }
            }
            joined = &mut session_task => break joined,
        }
    };

    // Notifications and navigation sent during the final teardown.
    while let Ok(notification) = notice_rx.try_recv() {
        last_notice = Some(notification);
    }
    while let Ok(request) = nav_rx.try_recv() {
        navigation = Some(request);
    }

    drop(chrome);
    drop(raw_guard);
    let outcome = outcome.context("terminal session task failed")?;

    if let Some(notice) = last_notice.filter(|n| n.end_reason.is_some()) {
        print_notice(&format!("{}: {}", notice.title, notice.message));
    }
    let ended = match outcome {
        SessionEndReason::UserClosed => "session closed",
        SessionEndReason::AutoLogout => "session closed after inactivity",
        SessionEndReason::RootWarningDeclined => "session closed at the root access warning",
        SessionEndReason::Unmounted => "session ended",
    };
    match navigation.and_then(|n| n.customer_id) {
        Some(customer) => print_notice(&format!("{ended}; back to the server list of customer {customer}")),
        None => print_notice(&format!("{ended}; back to the server list")),
    }
    Ok(outcome)
}

fn resize(chrome: &mut Chrome, cols: u16, rows: u16, send: &impl Fn(SessionCommand)) {
    let size = TerminalSize::new(cols.max(1), rows.max(1));
    if let Err(err) = chrome.resize(size) {
        debug!(?err, "status line redraw failed");
    }
    send(SessionCommand::ContainerResized(size));
}

fn print_notice(message: &str) {
    let _ = io::stdout().write_all(notice_line(message).as_bytes());
    let _ = io::stdout().flush();
}

enum InputEvent {
    Data(Vec<u8>),
    Resize(u16, u16),
    OsSignal(i32),
    Eof,
}

fn spawn_input_thread(tx: UnboundedSender<InputEvent>) {
    thread::spawn(move || {
        let stdin = io::stdin();
        let mut stdin = stdin.lock();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => {
                    let _ = tx.send(InputEvent::Eof);
                    break;
                }
                Ok(n) => {
                    if tx.send(InputEvent::Data(buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    let _ = tx.send(InputEvent::Eof);
                    break;
                }
            }
        }
    });
}

fn spawn_resize_thread(tx: UnboundedSender<InputEvent>) {
    thread::spawn(move || {
        let mut last_size = term_size().unwrap_or((80, 24));
        loop {
            thread::sleep(Duration::from_millis(200));
            if let Ok(size) = term_size()
                && size != last_size
            {
                last_size = size;
                if tx.send(InputEvent::Resize(size.0, size.1)).is_err() {
                    break;
                }
            }
        }
    });
}

fn spawn_signal_thread(tx: UnboundedSender<InputEvent>) {
    thread::spawn(move || {
        let signals = Signals::new([
            signal_hook::consts::SIGTERM,
            signal_hook::consts::SIGHUP,
            signal_hook::consts::SIGWINCH,
            #[cfg(unix)]
            signal_hook::consts::SIGCONT,
        ]);
        let mut signals = match signals {
            Ok(signals) => signals,
            Err(err) => {
                warn!(?err, "signal handlers unavailable");
                return;
            }
        };
        for signal in signals.forever() {
            if tx.send(InputEvent::OsSignal(signal)).is_err() {
                break;
            }
        }
    });
}

struct RawModeGuard;

impl RawModeGuard {
    fn activate() -> io::Result<Self> {
        enable_raw_mode().map_err(io::Error::other)?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}
