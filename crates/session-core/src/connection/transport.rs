use async_trait::async_trait;
use fs_types::ServerId;
use secrecy::SecretString;

use crate::SessionResult;

/// What a transport reports from the remote side of a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A text message.
    Text(String),
    /// The peer closed the channel with a close frame.
    Closed { code: u16, reason: String },
    /// The transport failed; the channel is unusable afterwards.
    Error(String),
}

/// Which terminal channel to open and how to authenticate it.
#[derive(Clone, Debug)]
pub struct ChannelRequest {
    pub server_id: ServerId,
    pub token: Option<SecretString>,
}

/// Outbound half of an open channel.
#[async_trait]
pub trait FrameSink: Send {
    async fn send_text(&mut self, text: String) -> SessionResult<()>;

    /// Start a graceful close. Errors are not interesting to callers.
    async fn close(&mut self) -> SessionResult<()>;
}

/// Inbound half of an open channel. `None` means the stream ended without a close frame.
#[async_trait]
pub trait FrameStream: Send {
    async fn next_event(&mut self) -> Option<TransportEvent>;
}

pub type ChannelPair = (Box<dyn FrameSink>, Box<dyn FrameStream>);

/// Opens terminal channels. The WebSocket implementation lives in [`super::ws`];
/// tests plug in in-memory transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, request: &ChannelRequest) -> SessionResult<ChannelPair>;
}
