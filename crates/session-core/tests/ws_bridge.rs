//! The WebSocket connector against a real in-process bridge.

mod common;

use std::sync::Arc;

use common::{Harness, WAIT, static_api};
use fs_types::{ConnectionDetails, ConnectionState, config::ConsoleEndpoint, protocol::TerminalSize};
use futures::{SinkExt, StreamExt};
use secrecy::SecretString;
use serde_json::{Value, json};
use session_core::{ConnectionEvent, ConnectionManager, SessionCommand, SessionOptions, WsConnector};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async, tungstenite::{
        Message, handshake::server::{ErrorResponse, Request, Response}, http::{HeaderValue, header::SEC_WEBSOCKET_PROTOCOL}, protocol::{CloseFrame, frame::coding::CloseCode}
    }
};

#[derive(Debug)]
struct Handshake {
    path: String,
    query: Option<String>,
    protocols: Option<String>,
}

type Bridge = JoinHandle<(Handshake, WebSocketStream<TcpStream>)>;

/// Accept one terminal channel and hand back what the client asked for.
async fn bridge() -> (ConsoleEndpoint, Bridge) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (seen_tx, seen_rx) = oneshot::channel();
        let callback = move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let protocols = request
                .headers()
                .get(SEC_WEBSOCKET_PROTOCOL)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            if protocols.is_some() {
                response
                    .headers_mut()
                    .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static("jwt"));
            }
            let _ = seen_tx.send(Handshake {
                path: request.uri().path().to_string(),
                query: request.uri().query().map(str::to_string),
                protocols,
            });
            Ok(response)
        };
        let ws = accept_hdr_async(stream, callback).await.unwrap();
        (seen_rx.await.unwrap(), ws)
    });
    let endpoint = ConsoleEndpoint {
        api_base_url: "http://127.0.0.1:1".into(),
        ws_host: "127.0.0.1".into(),
        ws_port: port,
        secure: false,
    };
    (endpoint, task)
}

async fn recv_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match timeout(WAIT, ws.next()).await.expect("timed out").expect("stream ended").unwrap() {
            Message::Text(text) => return text,
            Message::Close(_) => panic!("client closed"),
            _ => continue,
        }
    }
}

async fn next(manager: &mut ConnectionManager) -> ConnectionEvent {
    timeout(WAIT, manager.next_event()).await.expect("timed out").expect("inbox closed")
}

fn details() -> ConnectionDetails {
    ConnectionDetails::new("10.0.0.5", 22, "deploy", Some(SecretString::from("pw".to_string()))).unwrap()
}

#[tokio::test]
async fn token_travels_as_subprotocol_and_query() {
    let (endpoint, bridge) = bridge().await;
    let mut manager = ConnectionManager::new(Arc::new(WsConnector::new(endpoint)), "srv-9");
    manager.connect(details(), Some(SecretString::from("t0k3n".to_string())));

    let (handshake, mut ws) = timeout(WAIT, bridge).await.unwrap().unwrap();
    assert_eq!(handshake.path, "/ws/servers/srv-9/ssh");
    assert_eq!(handshake.query.as_deref(), Some("token=t0k3n"));
    assert_eq!(handshake.protocols.as_deref(), Some("jwt, t0k3n"));

    let bootstrap: Value = serde_json::from_str(&recv_text(&mut ws).await).unwrap();
    assert_eq!(bootstrap, json!({"host": "10.0.0.5", "port": 22, "username": "deploy", "password": "pw"}));
    assert!(matches!(next(&mut manager).await, ConnectionEvent::Opened { .. }));
}

#[tokio::test]
async fn no_token_means_no_subprotocol() {
    let (endpoint, bridge) = bridge().await;
    let mut manager = ConnectionManager::new(Arc::new(WsConnector::new(endpoint)), "srv-9");
    manager.connect(details(), None);

    let (handshake, _ws) = timeout(WAIT, bridge).await.unwrap().unwrap();
    assert_eq!(handshake.query, None);
    assert_eq!(handshake.protocols, None);
    assert!(matches!(next(&mut manager).await, ConnectionEvent::Opened { .. }));
}

#[tokio::test]
async fn traffic_flows_both_ways() {
    let (endpoint, bridge) = bridge().await;
    let mut manager = ConnectionManager::new(Arc::new(WsConnector::new(endpoint)), "srv-9");
    manager.connect(details(), None);
    let (_, mut ws) = timeout(WAIT, bridge).await.unwrap().unwrap();
    let _bootstrap = recv_text(&mut ws).await;
    assert!(matches!(next(&mut manager).await, ConnectionEvent::Opened { .. }));

    manager.send("uptime\r");
    assert_eq!(recv_text(&mut ws).await, "uptime\r");

    ws.send(Message::Text(json!({"type": "output", "output": "\u{1b}[1m up 3 days\u{1b}[0m"}).to_string()))
        .await
        .unwrap();
    ws.send(Message::Text("hello\r\n".into())).await.unwrap();
    assert_eq!(next(&mut manager).await, ConnectionEvent::Output("\u{1b}[1m up 3 days\u{1b}[0m".into()));
    assert_eq!(next(&mut manager).await, ConnectionEvent::Output("hello\r\n".into()));
    assert_eq!(manager.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn bridge_close_frame_surfaces_code_and_reason() {
    let (endpoint, bridge) = bridge().await;
    let mut manager = ConnectionManager::new(Arc::new(WsConnector::new(endpoint)), "srv-9");
    manager.connect(details(), None);
    let (_, mut ws) = timeout(WAIT, bridge).await.unwrap().unwrap();
    let _bootstrap = recv_text(&mut ws).await;
    assert!(matches!(next(&mut manager).await, ConnectionEvent::Opened { .. }));

    ws.close(Some(CloseFrame {
        code: CloseCode::Policy,
        reason: "policy violation".into(),
    }))
    .await
    .unwrap();

    match next(&mut manager).await {
        ConnectionEvent::Closed { code, message, .. } => {
            assert_eq!(code, 1008);
            assert_eq!(message, "WebSocket closed (code 1008): policy violation");
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn full_session_over_websocket() {
    let (endpoint, bridge) = bridge().await;
    let mut options = SessionOptions::new("srv-1");
    options.container = TerminalSize::new(80, 25);
    options.chrome_rows = 1;
    let mut h = Harness::with_connector(
        static_api("deploy", Some("pw"), Some("web-01")),
        options,
        Arc::new(WsConnector::new(endpoint)),
    );

    h.session.mount().await;
    let (_, mut ws) = timeout(WAIT, bridge).await.unwrap().unwrap();
    let _bootstrap = recv_text(&mut ws).await;
    let snapshot = h.pump_until(|s| s.state == ConnectionState::Connected).await;
    assert_eq!(snapshot.banner.as_deref(), Some("deploy@web-01"));

    let resize: Value = serde_json::from_str(&recv_text(&mut ws).await).unwrap();
    assert_eq!(resize, json!({"action": "resize", "data": {"cols": 80, "rows": 24}}));

    ws.send(Message::Text(json!({"type": "output", "output": "build ok\r\n"}).to_string()))
        .await
        .unwrap();
    h.pump_until_screen_contains("build ok").await;
    h.session.dispatch(SessionCommand::CopyOutput);
    assert!(h.clipboard.contents().unwrap().contains("build ok"));

    h.session.dispatch(SessionCommand::Close);
    assert_eq!(h.navigator.calls(), vec![Some("acme".to_string())]);
    loop {
        match timeout(WAIT, ws.next()).await.expect("timed out") {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
            Some(Ok(_)) => continue,
        }
    }
}
