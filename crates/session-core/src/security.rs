use chrono::{DateTime, Utc};
use fs_types::{ConnectionDetails, session::SecurityInfo};
use tracing::{info, warn};

/// Security banner state derived from the connection details.
///
/// There is no timer here; it only changes when a channel opens, when the user
/// dismisses the root warning, or when a reconnect clears the previous connection.
#[derive(Clone, Debug, Default)]
pub struct SecurityAdvisoryState {
    info: SecurityInfo,
    fallback_host: Option<String>,
}

impl SecurityAdvisoryState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self) -> &SecurityInfo {
        &self.info
    }

    /// Populate from a freshly opened channel. Root sessions re-arm the warning.
    pub fn arm(&mut self, details: &ConnectionDetails, hostname: Option<String>, started_at: DateTime<Utc>) {
        let is_root = details.is_root();
        self.info.current_user = Some(details.username().to_string());
        self.info.hostname = hostname.filter(|h| !h.trim().is_empty());
        self.info.is_root_user = is_root;
        self.info.session_start_time = Some(started_at);
        self.info.show_root_warning = is_root;
        self.fallback_host = Some(details.host().to_string());
        if is_root {
            warn!(host = %details.host(), "terminal session is logged in as root");
        }
    }

    pub fn set_client_ip(&mut self, ip: Option<String>) {
        self.info.client_ip = ip;
    }

    pub fn dismiss_root_warning(&mut self) {
        if self.info.show_root_warning {
            info!("root access warning dismissed");
        }
        self.info.show_root_warning = false;
    }

    /// Forget everything tied to the previous connection. The client IP survives.
    pub fn reset_connection(&mut self) {
        self.info = SecurityInfo {
            client_ip: self.info.client_ip.take(),
            ..SecurityInfo::default()
        };
        self.fallback_host = None;
    }

    /// `user@hostname`, or `user@host` when the hostname is unknown.
    pub fn status_banner(&self) -> Option<String> {
        let user = self.info.current_user.as_deref()?;
        let host = self.info.hostname.as_deref().or(self.fallback_host.as_deref())?;
        Some(format!("{user}@{host}"))
    }
}
