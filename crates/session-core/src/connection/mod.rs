//! The terminal channel: transport traits, the WebSocket connector and the
//! connection manager state machine.

mod manager;
pub mod transport;
pub mod ws;

pub use manager::{ABNORMAL_CLOSURE, ConnectionEvent, ConnectionManager, close_message};
pub use transport::{ChannelPair, ChannelRequest, Connector, FrameSink, FrameStream, TransportEvent};
pub use ws::{WsConnector, channel_url};
