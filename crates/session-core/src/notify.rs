use fs_types::notify::{Notification, NotificationKind};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

/// Where user-facing notifications go (a toast area, a status line, a log).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log only.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, n: Notification) {
        match n.kind {
            NotificationKind::Error => error!(title = %n.title, "{}", n.message),
            NotificationKind::Warning => warn!(title = %n.title, "{}", n.message),
            NotificationKind::Success | NotificationKind::Info => info!(title = %n.title, "{}", n.message),
        }
    }
}

/// Hands notifications to a host task over a channel.
#[derive(Clone, Debug)]
pub struct ChannelNotifier {
    tx: UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: UnboundedSender<Notification>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(err) = self.tx.send(notification) {
            LogNotifier.notify(err.0);
        }
    }
}
