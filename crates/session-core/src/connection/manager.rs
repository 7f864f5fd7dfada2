use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use fs_types::{
    ConnectionDetails, ConnectionState, ServerId, protocol::{ClientFrame, ServerFrame, TerminalSize}
};
use secrecy::SecretString;
use tokio::{
    sync::{
        mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel}, oneshot
    },
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, info, trace, warn};

use super::transport::{ChannelRequest, Connector, FrameSink, TransportEvent};

/// Close code reported when the stream ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// How long a graceful close may take before the channel is dropped.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// How long a new channel waits for the previous driver before aborting it.
const RETIRE_GRACE: Duration = Duration::from_secs(3);

/// Typed events the manager hands to its owner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Bootstrap sent; the channel accepts keystrokes from now on.
    Opened { started_at: DateTime<Utc> },
    /// Bytes to render, from an `output` frame or unstructured text.
    Output(String),
    /// The bridge reported a fatal error.
    BackendError(String),
    /// The channel closed. `message` is the human-readable form.
    Closed { code: u16, reason: String, message: String },
    /// The transport failed to open or broke.
    TransportError(String),
}

/// `WebSocket closed (code 1008): policy violation`
pub fn close_message(code: u16, reason: &str) -> String {
    let reason = if reason.trim().is_empty() { "no reason provided" } else { reason };
    format!("WebSocket closed (code {code}): {reason}")
}

#[derive(Debug)]
enum DriverEvent {
    Opened,
    OpenFailed(String),
    Frame(String),
    Failed(String),
    Closed { code: u16, reason: String },
}

struct LiveChannel {
    outbound: UnboundedSender<ClientFrame>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Owns the single terminal channel of a session and turns its traffic into
/// [`ConnectionEvent`]s.
///
/// Every channel runs in its own driver task tagged with a generation number.
/// Events from an older generation are dropped, and a new driver waits for the
/// previous one to finish before opening, so at most one channel is ever live.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    server_id: ServerId,
    state: ConnectionState,
    generation: u64,
    channel: Option<LiveChannel>,
    retired: Option<JoinHandle<()>>,
    inbox_tx: UnboundedSender<(u64, DriverEvent)>,
    inbox_rx: UnboundedReceiver<(u64, DriverEvent)>,
    opened_at: Option<DateTime<Utc>>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>, server_id: impl Into<ServerId>) -> Self {
        let (inbox_tx, inbox_rx) = unbounded_channel();
        Self {
            connector,
            server_id: server_id.into(),
            state: ConnectionState::Disconnected,
            generation: 0,
            channel: None,
            retired: None,
            inbox_tx,
            inbox_rx,
            opened_at: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// When the current channel finished its handshake, if it has.
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Open a fresh channel, closing any existing one first. Never fails: transport
    /// problems arrive later as events and move the state to `Error`.
    pub fn connect(&mut self, details: ConnectionDetails, token: Option<SecretString>) {
        self.close();
        self.generation += 1;

        let (outbound, outbound_rx) = unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let driver = ChannelDriver {
            connector: Arc::clone(&self.connector),
            request: ChannelRequest {
                server_id: self.server_id.clone(),
                token,
            },
            bootstrap: ClientFrame::Bootstrap(details),
            generation: self.generation,
            inbox: self.inbox_tx.clone(),
        };
        let previous = self.retired.take();
        let task = tokio::spawn(driver.run(outbound_rx, shutdown_rx, previous));

        self.channel = Some(LiveChannel { outbound, shutdown, task });
        self.state = ConnectionState::Connecting;
        debug!(server_id = %self.server_id, generation = self.generation, "terminal channel connecting");
    }

    /// Forward keystrokes verbatim. Dropped unless the channel is connected.
    pub fn send(&self, data: &str) {
        self.send_frame(ClientFrame::Input(data.to_string()));
    }

    pub fn send_resize(&self, size: TerminalSize) {
        self.send_frame(ClientFrame::Resize(size));
    }

    fn send_frame(&self, frame: ClientFrame) {
        if self.state != ConnectionState::Connected {
            trace!(kind = frame.kind(), state = %self.state, "dropping frame; channel not connected");
            return;
        }
        if let Some(channel) = &self.channel
            && channel.outbound.send(frame).is_err()
        {
            trace!("driver already gone; frame dropped");
        }
    }

    /// Tear down the current channel. Safe to call at any time, any number of times.
    pub fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            let LiveChannel { outbound, shutdown, task } = channel;
            let _ = shutdown.send(());
            drop(outbound);
            self.retire(task);
            self.generation += 1;
            debug!(server_id = %self.server_id, "terminal channel closed by client");
        }
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Connected) {
            self.state = ConnectionState::Disconnected;
        }
        self.opened_at = None;
    }

    /// Force the `Error` state for failures that happen before any channel exists.
    pub fn mark_failed(&mut self, reason: &str) {
        warn!(server_id = %self.server_id, reason, "terminal connection failed");
        self.close();
        self.state = ConnectionState::Error;
    }

    /// Wait for the next event from the current channel, applying its state
    /// transition first. Cancel safe.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            let (generation, event) = self.inbox_rx.recv().await?;
            if generation != self.generation {
                trace!(generation, current = self.generation, ?event, "dropping event from stale channel");
                continue;
            }
            if let Some(event) = self.apply(event) {
                return Some(event);
            }
        }
    }

    fn apply(&mut self, event: DriverEvent) -> Option<ConnectionEvent> {
        match event {
            DriverEvent::Opened => {
                let started_at = Utc::now();
                self.state = ConnectionState::Connected;
                self.opened_at = Some(started_at);
                info!(server_id = %self.server_id, generation = self.generation, "terminal channel open");
                Some(ConnectionEvent::Opened { started_at })
            }
            DriverEvent::Frame(text) => match ServerFrame::parse(&text) {
                ServerFrame::Output(output) | ServerFrame::Raw(output) if self.state == ConnectionState::Error => {
                    trace!(len = output.len(), "dropping output after bridge error");
                    None
                }
                ServerFrame::Output(output) | ServerFrame::Raw(output) => Some(ConnectionEvent::Output(output)),
                ServerFrame::Error(message) => {
                    warn!(server_id = %self.server_id, %message, "bridge reported an error");
                    self.state = ConnectionState::Error;
                    Some(ConnectionEvent::BackendError(message))
                }
                ServerFrame::Unknown(text) => {
                    debug!(frame = %text, "ignoring unrecognised frame");
                    None
                }
            },
            DriverEvent::Failed(message) => {
                warn!(server_id = %self.server_id, %message, "terminal transport error");
                self.state = ConnectionState::Error;
                Some(ConnectionEvent::TransportError(message))
            }
            DriverEvent::OpenFailed(message) => {
                warn!(server_id = %self.server_id, %message, "terminal channel failed to open");
                self.drop_channel();
                self.state = ConnectionState::Error;
                Some(ConnectionEvent::TransportError(message))
            }
            DriverEvent::Closed { code, reason } => {
                let message = close_message(code, &reason);
                info!(server_id = %self.server_id, code, %reason, "terminal channel closed");
                self.drop_channel();
                // An error is final for this attempt; a close that follows it does not clear it.
                if self.state != ConnectionState::Error {
                    self.state = ConnectionState::Disconnected;
                }
                self.opened_at = None;
                Some(ConnectionEvent::Closed { code, reason, message })
            }
        }
    }

    /// The driver has ended on its own; keep its handle so the next one can wait on it.
    fn drop_channel(&mut self) {
        if let Some(channel) = self.channel.take() {
            self.retire(channel.task);
        }
    }

    fn retire(&mut self, task: JoinHandle<()>) {
        if let Some(older) = self.retired.replace(task)
            && !older.is_finished()
        {
            // nobody awaits it any more
            older.abort();
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close();
    }
}

struct ChannelDriver {
    connector: Arc<dyn Connector>,
    request: ChannelRequest,
    bootstrap: ClientFrame,
    generation: u64,
    inbox: UnboundedSender<(u64, DriverEvent)>,
}

impl ChannelDriver {
    fn report(&self, event: DriverEvent) {
        let _ = self.inbox.send((self.generation, event));
    }

    async fn close_sink(&self, sink: &mut Box<dyn FrameSink>) {
        if timeout(CLOSE_TIMEOUT, sink.close()).await.is_err() {
            warn!(generation = self.generation, "channel close timed out; dropping it");
        }
    }

    async fn run(
        self,
        mut outbound: UnboundedReceiver<ClientFrame>,
        mut shutdown: oneshot::Receiver<()>,
        previous: Option<JoinHandle<()>>,
    ) {
        if let Some(mut previous) = previous {
            let waited = tokio::select! {
                _ = &mut shutdown => None,
                finished = timeout(RETIRE_GRACE, &mut previous) => Some(finished.is_ok()),
            };
            match waited {
                Some(true) => {}
                Some(false) => {
                    warn!(generation = self.generation, "previous channel did not shut down in time; aborting it");
                    previous.abort();
                    let _ = previous.await;
                }
                None => {
                    trace!(generation = self.generation, "channel cancelled while the previous one was closing");
                    previous.abort();
                    let _ = previous.await;
                    return;
                }
            }
        }

        let opened = tokio::select! {
            _ = &mut shutdown => {
                trace!(generation = self.generation, "channel cancelled before open");
                return;
            }
            result = self.connector.open(&self.request) => result,
        };
        let (mut sink, mut stream) = match opened {
            Ok(pair) => pair,
            Err(err) => {
                self.report(DriverEvent::OpenFailed(err.to_string()));
                return;
            }
        };

        // Bootstrap goes out before the manager learns the channel is open, so no
        // keystroke can overtake it.
        if let Err(err) = sink.send_text(self.bootstrap.encode()).await {
            self.report(DriverEvent::OpenFailed(err.to_string()));
            self.close_sink(&mut sink).await;
            return;
        }
        self.report(DriverEvent::Opened);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    self.close_sink(&mut sink).await;
                    break;
                }
                frame = outbound.recv() => match frame {
                    Some(frame) => {
                        if let Err(err) = sink.send_text(frame.encode()).await {
                            self.report(DriverEvent::Failed(err.to_string()));
                            self.report(DriverEvent::Closed { code: ABNORMAL_CLOSURE, reason: String::new() });
                            break;
                        }
                    }
                    None => {
                        self.close_sink(&mut sink).await;
                        break;
                    }
                },
                event = stream.next_event() => match event {
                    Some(TransportEvent::Text(text)) => self.report(DriverEvent::Frame(text)),
                    Some(TransportEvent::Closed { code, reason }) => {
                        self.report(DriverEvent::Closed { code, reason });
                        break;
                    }
                    Some(TransportEvent::Error(message)) => {
                        self.report(DriverEvent::Failed(message));
                        self.report(DriverEvent::Closed { code: ABNORMAL_CLOSURE, reason: String::new() });
                        break;
                    }
                    None => {
                        self.report(DriverEvent::Closed { code: ABNORMAL_CLOSURE, reason: String::new() });
                        break;
                    }
                },
            }
        }
    }
}
