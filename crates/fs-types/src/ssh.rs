//! SSH target and connection-state types.
//!
//! These stay dependency-light so they can be shared by the session runtime,
//! the CLI argument parsing and test fixtures.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::validation::{ValidationError, require_non_empty, validate_host};

/// Credentials and address of the SSH target behind the console's bridge.
///
/// Built once per server navigation after the credential reveal and never
/// mutated afterwards; a different server means a new value.
#[derive(Clone, Debug)]
pub struct ConnectionDetails {
    host: String,
    port: u16,
    username: String,
    password: Option<SecretString>,
}

impl ConnectionDetails {
    /// Validate and build connection details.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: Option<SecretString>,
    ) -> Result<Self, ValidationError> {
        let host = host.into();
        let username = username.into();
        validate_host(&host)?;
        require_non_empty("username", &username)?;
        if port == 0 {
            return Err(ValidationError::InvalidPort(0));
        }
        // An empty secret is the same as no secret for the bridge.
        let password = password.filter(|secret| !secret.expose_secret().is_empty());
        Ok(Self {
            host,
            port,
            username,
            password,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> Option<&SecretString> {
        self.password.as_ref()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    /// True when the session logs in as the superuser.
    pub fn is_root(&self) -> bool {
        self.username == "root"
    }

    /// `user@host:port`, safe for logs.
    pub fn authority(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Lifecycle of the WebSocket channel to the SSH bridge.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Disconnected and Error both end an attempt; only an explicit reconnect leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Error)
    }
}
