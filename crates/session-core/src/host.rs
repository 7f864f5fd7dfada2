//! Capabilities the host environment lends to a session: navigation and the clipboard.

use std::sync::{Arc, Mutex};

use copypasta::{ClipboardContext, ClipboardProvider};
use fs_types::CustomerId;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::{SessionError, SessionResult};

pub trait Navigator: Send + Sync {
    /// Leave the terminal for the server list of `customer_id` (all servers if unknown).
    fn to_server_list(&self, customer_id: Option<&CustomerId>);
}

/// Navigation request forwarded to the host loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigateToServerList {
    pub customer_id: Option<CustomerId>,
}

#[derive(Clone, Debug)]
pub struct ChannelNavigator {
    tx: UnboundedSender<NavigateToServerList>,
}

impl ChannelNavigator {
    pub fn new(tx: UnboundedSender<NavigateToServerList>) -> Self {
        Self { tx }
    }
}

impl Navigator for ChannelNavigator {
    fn to_server_list(&self, customer_id: Option<&CustomerId>) {
        let request = NavigateToServerList {
            customer_id: customer_id.cloned(),
        };
        if self.tx.send(request).is_err() {
            debug!("navigation requested after host loop ended");
        }
    }
}

pub trait Clipboard: Send {
    fn set_text(&mut self, text: String) -> SessionResult<()>;
}

/// The desktop clipboard via `copypasta`. A context is opened per copy, so headless
/// hosts only fail when they actually copy.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: String) -> SessionResult<()> {
        let mut ctx = ClipboardContext::new().map_err(|err| SessionError::Clipboard(err.to_string()))?;
        ctx.set_contents(text).map_err(|err| SessionError::Clipboard(err.to_string()))
    }
}

/// In-process clipboard; clones share contents.
#[derive(Clone, Debug, Default)]
pub struct MemoryClipboard {
    contents: Arc<Mutex<Option<String>>>,
}

impl MemoryClipboard {
    pub fn contents(&self) -> Option<String> {
        self.contents.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Clipboard for MemoryClipboard {
    fn set_text(&mut self, text: String) -> SessionResult<()> {
        let mut guard = self
            .contents
            .lock()
            .map_err(|_| SessionError::Clipboard("clipboard lock poisoned".into()))?;
        *guard = Some(text);
        Ok(())
    }
}
