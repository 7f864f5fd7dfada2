//! WebSocket transport to the console's SSH bridge.

use async_trait::async_trait;
use fs_types::config::ConsoleEndpoint;
use futures::{
    SinkExt, StreamExt, stream::{SplitSink, SplitStream}
};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::{
        Message, client::IntoClientRequest, http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL}, protocol::frame::coding::CloseCode
    }
};
use tracing::{debug, trace};
use url::Url;

use super::transport::{ChannelPair, ChannelRequest, Connector, FrameSink, FrameStream, TransportEvent};
use crate::{SessionError, SessionResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Subprotocol name announced ahead of the token.
pub const TOKEN_SUBPROTOCOL: &str = "jwt";

/// Build `{ws|wss}://host:port/ws/servers/{id}/ssh[?token=...]`.
pub fn channel_url(endpoint: &ConsoleEndpoint, server_id: &str, token: Option<&SecretString>) -> SessionResult<Url> {
    let mut url = Url::parse(&format!("{}://{}:{}/", endpoint.ws_scheme(), endpoint.ws_host, endpoint.ws_port))?;
    url.path_segments_mut()
        .map_err(|_| SessionError::Transport(format!("{} cannot carry a path", endpoint.ws_host)))?
        .pop_if_empty()
        .extend(["ws", "servers", server_id, "ssh"]);
    if let Some(token) = token {
        url.query_pairs_mut().append_pair("token", token.expose_secret());
    }
    Ok(url)
}

/// Opens terminal channels with `tokio-tungstenite`. When a token is present it is
/// sent both as the `jwt, <token>` subprotocol list and as the `token` query parameter,
/// since bridge deployments differ in which one they read.
#[derive(Clone, Debug)]
pub struct WsConnector {
    endpoint: ConsoleEndpoint,
}

impl WsConnector {
    pub fn new(endpoint: ConsoleEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, request: &ChannelRequest) -> SessionResult<ChannelPair> {
        let url = channel_url(&self.endpoint, &request.server_id, request.token.as_ref())?;
        let mut ws_request = url.as_str().into_client_request()?;
        if let Some(token) = &request.token {
            let protocols = HeaderValue::from_str(&format!("{TOKEN_SUBPROTOCOL}, {}", token.expose_secret()))
                .map_err(|err| SessionError::Transport(format!("token is not a valid header value: {err}")))?;
            ws_request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, protocols);
        }

        debug!(server_id = %request.server_id, host = %self.endpoint.ws_host, port = self.endpoint.ws_port, "opening terminal websocket");
        let (stream, response) = connect_async(ws_request).await?;
        trace!(status = %response.status(), "websocket handshake complete");

        let (sink, stream) = stream.split();
        Ok((Box::new(WsFrameSink { sink }), Box::new(WsFrameStream { stream })))
    }
}

struct WsFrameSink {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send_text(&mut self, text: String) -> SessionResult<()> {
        self.sink.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) -> SessionResult<()> {
        self.sink.close().await?;
        Ok(())
    }
}

struct WsFrameStream {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next_event(&mut self) -> Option<TransportEvent> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(TransportEvent::Text(text)),
                Ok(Message::Binary(bytes)) => return Some(TransportEvent::Text(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(frame) => (u16::from(frame.code), frame.reason.into_owned()),
                        None => (u16::from(CloseCode::Status), String::new()),
                    };
                    return Some(TransportEvent::Closed { code, reason });
                }
                Ok(_) => continue,
                Err(err) => return Some(TransportEvent::Error(err.to_string())),
            }
        }
    }
}
