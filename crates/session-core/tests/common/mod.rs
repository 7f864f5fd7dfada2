//! Shared fixtures: an in-memory connector whose channels the test plays the
//! bridge side of, plus recording host capabilities.
#![allow(dead_code)]

use std::{
    sync::{
        Arc, Mutex, atomic::{AtomicBool, AtomicUsize, Ordering}
    },
    time::Duration,
};

use async_trait::async_trait;
use fs_types::{
    CustomerId, api::{RevealedCredential, ServerDetails}, notify::Notification, protocol::TerminalSize
};
use serde_json::Value;
use session_core::{
    MemoryClipboard, Navigator, Notifier, SessionError, SessionOptions, SessionResult, SessionSnapshot, SharedActivity, SshTerminalSession, StaticConsoleApi, connection::{ChannelPair, ChannelRequest, Connector, FrameSink, FrameStream, TransportEvent}, session::SessionHost
};
use tokio::{
    sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel},
    time::timeout,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// The bridge side of one fake channel.
pub struct FakeRemote {
    pub request: ChannelRequest,
    sent: UnboundedReceiver<String>,
    inbound: UnboundedSender<TransportEvent>,
}

impl FakeRemote {
    /// Next frame the client sent.
    pub async fn next_sent(&mut self) -> String {
        timeout(WAIT, self.sent.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client closed the channel")
    }

    pub async fn next_sent_json(&mut self) -> Value {
        serde_json::from_str(&self.next_sent().await).expect("client frame is JSON")
    }

    /// Wait until the client side has closed the channel.
    pub async fn wait_closed(&mut self) {
        loop {
            match timeout(WAIT, self.sent.recv()).await.expect("channel still open") {
                Some(_) => continue,
                None => return,
            }
        }
    }

    pub fn push(&self, event: TransportEvent) {
        let _ = self.inbound.send(event);
    }

    pub fn push_text(&self, text: &str) {
        self.push(TransportEvent::Text(text.to_string()));
    }

    pub fn push_output(&self, output: &str) {
        self.push_text(&serde_json::json!({ "type": "output", "output": output }).to_string());
    }
}

pub struct FakeConnector {
    remotes: UnboundedSender<FakeRemote>,
    live: Arc<AtomicUsize>,
    max_live: AtomicUsize,
    opened: AtomicUsize,
    fail_with: Mutex<Option<String>>,
    stall_close: AtomicBool,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<FakeRemote>) {
        let (remotes, rx) = unbounded_channel();
        let connector = Arc::new(Self {
            remotes,
            live: Arc::new(AtomicUsize::new(0)),
            max_live: AtomicUsize::new(0),
            opened: AtomicUsize::new(0),
            fail_with: Mutex::new(None),
            stall_close: AtomicBool::new(false),
        });
        (connector, rx)
    }

    pub fn fail_opens(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    /// Channels opened from now on never finish a graceful close; only dropping
    /// them releases the peer.
    pub fn stall_closes(&self, stall: bool) {
        self.stall_close.store(stall, Ordering::SeqCst);
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Wait (yielding) until no channel is live.
    pub async fn wait_idle(&self) {
        timeout(WAIT, async {
            while self.live() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("channel never closed");
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, request: &ChannelRequest) -> SessionResult<ChannelPair> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(SessionError::Transport(message));
        }
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);

        let (sent_tx, sent_rx) = unbounded_channel();
        let (inbound_tx, inbound_rx) = unbounded_channel();
        let _ = self.remotes.send(FakeRemote {
            request: request.clone(),
            sent: sent_rx,
            inbound: inbound_tx,
        });
        let sink = FakeSink {
            tx: Some(sent_tx),
            live: Arc::clone(&self.live),
            stall_close: self.stall_close.load(Ordering::SeqCst),
        };
        Ok((Box::new(sink), Box::new(FakeStream { rx: inbound_rx })))
    }
}

struct FakeSink {
    tx: Option<UnboundedSender<String>>,
    live: Arc<AtomicUsize>,
    stall_close: bool,
}

impl FakeSink {
    fn release(&mut self) {
        if self.tx.take().is_some() {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl FrameSink for FakeSink {
    async fn send_text(&mut self, text: String) -> SessionResult<()> {
        let tx = self.tx.as_ref().ok_or_else(|| SessionError::Transport("sink closed".into()))?;
        tx.send(text).map_err(|_| SessionError::Transport("peer gone".into()))
    }

    async fn close(&mut self) -> SessionResult<()> {
        if self.stall_close {
            std::future::pending::<()>().await;
        }
        self.release();
        Ok(())
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.release();
    }
}

struct FakeStream {
    rx: UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl FrameStream for FakeStream {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier(Arc<Mutex<Vec<Notification>>>);

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.0.lock().unwrap().clone()
    }

    pub fn titled(&self, title: &str) -> Vec<Notification> {
        self.all().into_iter().filter(|n| n.title == title).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.0.lock().unwrap().push(notification);
    }
}

#[derive(Clone, Default)]
pub struct RecordingNavigator(Arc<Mutex<Vec<Option<CustomerId>>>>);

impl RecordingNavigator {
    pub fn calls(&self) -> Vec<Option<CustomerId>> {
        self.0.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn to_server_list(&self, customer_id: Option<&CustomerId>) {
        self.0.lock().unwrap().push(customer_id.cloned());
    }
}

pub fn server_details(hostname: Option<&str>) -> ServerDetails {
    ServerDetails {
        id: "srv-1".into(),
        host: "10.0.0.5".into(),
        port: 22,
        hostname: hostname.map(str::to_string),
        customer_id: Some("acme".into()),
    }
}

pub fn static_api(username: &str, password: Option<&str>, hostname: Option<&str>) -> StaticConsoleApi {
    StaticConsoleApi::new(
        server_details(hostname),
        RevealedCredential {
            username: username.to_string(),
            secret: password.map(str::to_string),
        },
    )
    .with_client_ip("198.51.100.4")
}

pub struct Harness {
    pub session: SshTerminalSession,
    pub connector: Arc<FakeConnector>,
    pub remotes: UnboundedReceiver<FakeRemote>,
    pub notifier: RecordingNotifier,
    pub navigator: RecordingNavigator,
    pub clipboard: MemoryClipboard,
    pub activity: SharedActivity,
}

impl Harness {
    pub fn new(api: StaticConsoleApi) -> Self {
        let mut options = SessionOptions::new("srv-1");
        options.container = TerminalSize::new(80, 25);
        options.chrome_rows = 1;
        Self::with_options(api, options)
    }

    pub fn with_options(api: StaticConsoleApi, options: SessionOptions) -> Self {
        let (connector, remotes) = FakeConnector::new();
        Self::build(api, options, connector.clone(), connector, remotes)
    }

    /// A harness whose session opens channels through `session_connector`; the fake stays idle.
    pub fn with_connector(api: StaticConsoleApi, options: SessionOptions, session_connector: Arc<dyn Connector>) -> Self {
        let (connector, remotes) = FakeConnector::new();
        Self::build(api, options, session_connector, connector, remotes)
    }

    fn build(
        api: StaticConsoleApi,
        options: SessionOptions,
        session_connector: Arc<dyn Connector>,
        connector: Arc<FakeConnector>,
        remotes: UnboundedReceiver<FakeRemote>,
    ) -> Self {
        let notifier = RecordingNotifier::default();
        let navigator = RecordingNavigator::default();
        let clipboard = MemoryClipboard::default();
        let activity = SharedActivity::new();
        let host = SessionHost {
            notifier: Arc::new(notifier.clone()),
            navigator: Arc::new(navigator.clone()),
            clipboard: Box::new(clipboard.clone()),
            activity: Arc::new(activity.clone()),
            mirror: None,
        };
        let session = SshTerminalSession::new(Arc::new(api), session_connector, options, host);
        Self {
            session,
            connector,
            remotes,
            notifier,
            navigator,
            clipboard,
            activity,
        }
    }

    pub async fn next_remote(&mut self) -> FakeRemote {
        timeout(WAIT, self.remotes.recv())
            .await
            .expect("timed out waiting for a channel")
            .expect("connector dropped")
    }

    /// Pump the session until `done` holds for its snapshot.
    pub async fn pump_until(&mut self, done: impl Fn(&SessionSnapshot) -> bool) -> SessionSnapshot {
        for _ in 0..5_000 {
            let snapshot = self.session.snapshot();
            if done(&snapshot) {
                return snapshot;
            }
            assert!(self.session.pump().await, "session ended early: {snapshot:?}");
        }
        panic!("condition not reached: {:?}", self.session.snapshot());
    }

    pub async fn pump_until_screen_contains(&mut self, needle: &str) {
        for _ in 0..5_000 {
            if self.screen_text().contains(needle) {
                return;
            }
            assert!(self.session.pump().await, "session ended before {needle:?} appeared");
        }
        panic!("{needle:?} never appeared in:\n{}", self.screen_text());
    }

    /// Plain text of the terminal buffer.
    pub fn screen_text(&mut self) -> String {
        self.session.terminal_mut().and_then(|t| t.scrollback_text()).unwrap_or_default()
    }
}
