//! Frames exchanged with the console's SSH bridge over the terminal WebSocket.
//!
//! Outbound: one bootstrap object per channel, resize control objects, and raw
//! keystroke strings. Inbound: `output`/`error` objects, or unstructured text
//! which is rendered as-is.

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ssh::ConnectionDetails;

/// Character-grid dimensions of the terminal emulator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.cols == 0 || self.rows == 0
    }
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// A frame sent from the client to the bridge.
#[derive(Clone, Debug)]
pub enum ClientFrame {
    /// Credentials so the bridge can lazily open the real SSH connection.
    Bootstrap(ConnectionDetails),
    /// Terminal grid changed size.
    Resize(TerminalSize),
    /// Keystroke bytes, sent verbatim.
    Input(String),
}

impl ClientFrame {
    /// Encode to the text payload of a WebSocket message.
    pub fn encode(&self) -> String {
        match self {
            ClientFrame::Bootstrap(details) => {
                let mut frame = json!({
                    "host": details.host(),
                    "port": details.port(),
                    "username": details.username(),
                });
                if let Some(password) = details.password() {
                    frame["password"] = Value::String(password.expose_secret().to_string());
                }
                frame.to_string()
            }
            ClientFrame::Resize(size) => json!({
                "action": "resize",
                "data": { "cols": size.cols, "rows": size.rows },
            })
            .to_string(),
            ClientFrame::Input(data) => data.clone(),
        }
    }

    /// Short label for logs; never includes payload contents.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Bootstrap(_) => "bootstrap",
            ClientFrame::Resize(_) => "resize",
            ClientFrame::Input(_) => "input",
        }
    }
}

/// A frame received from the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerFrame {
    /// Terminal output, ANSI sequences included.
    Output(String),
    /// Fatal error reported by the bridge.
    Error(String),
    /// Text that is not a protocol object; rendered verbatim.
    Raw(String),
    /// A well-formed protocol object this client does not understand.
    Unknown(String),
}

impl ServerFrame {
    /// Classify an inbound text message. Never fails: anything that is not a JSON
    /// object is terminal output.
    pub fn parse(text: &str) -> ServerFrame {
        let value = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            _ => return ServerFrame::Raw(text.to_string()),
        };

        match value.get("type").and_then(Value::as_str) {
            Some("output") => match value.get("output").and_then(Value::as_str) {
                Some(output) => ServerFrame::Output(output.to_string()),
                None => ServerFrame::Unknown(text.to_string()),
            },
            Some("error") => {
                let message = value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error from SSH bridge");
                ServerFrame::Error(message.to_string())
            }
            _ => ServerFrame::Unknown(text.to_string()),
        }
    }
}
