//! The status line drawn on the bottom row, outside the scroll region the
//! remote shell writes into. Fullscreen hands the row back to the shell.

use std::io::{self, Write};

use crossterm::{
    cursor::{MoveTo, RestorePosition, SavePosition}, queue, style::{Attribute, Print, SetAttribute}, terminal::{Clear, ClearType}
};
use fs_types::{
    ConnectionState, notify::{Notification, NotificationKind}, protocol::TerminalSize, session::format_duration_ms
};
use session_core::SessionSnapshot;
use tracing::debug;

pub const STATUS_ROWS: u16 = 1;

/// Owns the status row while installed. Dropping it gives the row back, so an
/// early return from the host loop cannot leave the scroll region behind.
pub struct Chrome {
    out: Box<dyn Write + Send>,
    size: TerminalSize,
    snapshot: SessionSnapshot,
    notice: Option<Notification>,
    installed: bool,
}

impl Chrome {
    pub fn new(size: TerminalSize) -> Self {
        Self::with_writer(size, Box::new(io::stdout()))
    }

    pub fn with_writer(size: TerminalSize, out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            size,
            snapshot: SessionSnapshot::default(),
            notice: None,
            installed: false,
        }
    }

    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.snapshot
    }

    fn shows_status(&self) -> bool {
        !self.snapshot.fullscreen && self.size.rows > STATUS_ROWS
    }

    /// Reserve the status row and draw it.
    pub fn install(&mut self) -> io::Result<()> {
        self.installed = true;
        self.write_region()?;
        self.out.flush()
    }

    pub fn resize(&mut self, size: TerminalSize) -> io::Result<()> {
        self.size = size;
        self.install()
    }

    pub fn apply(&mut self, snapshot: SessionSnapshot) -> io::Result<()> {
        let layout_changed = snapshot.fullscreen != self.snapshot.fullscreen;
        self.snapshot = snapshot;
        if layout_changed {
            self.install()
        } else {
            self.draw()
        }
    }

    pub fn notify(&mut self, notification: Notification) -> io::Result<()> {
        self.notice = Some(notification);
        self.draw()
    }

    /// Give the whole screen back to the local shell. Only the first call after
    /// [`install`](Self::install) writes anything.
    pub fn teardown(&mut self) -> io::Result<()> {
        if !self.installed {
            return Ok(());
        }
        self.installed = false;
        queue!(self.out, Print("\x1b[r"))?;
        self.clear_status_row()?;
        self.out.flush()
    }

    fn clear_status_row(&mut self) -> io::Result<()> {
        if self.size.rows > STATUS_ROWS {
            queue!(
                self.out,
                SavePosition,
                MoveTo(0, self.size.rows - 1),
                Clear(ClearType::CurrentLine),
                RestorePosition
            )?;
        }
        Ok(())
    }

    fn write_region(&mut self) -> io::Result<()> {
        if self.shows_status() {
            // DECSTBM moves the cursor home; keep it where the shell left it.
            queue!(self.out, SavePosition, Print(format!("\x1b[1;{}r", self.size.rows - STATUS_ROWS)), RestorePosition)?;
            self.write_status()
        } else {
            queue!(self.out, SavePosition, Print("\x1b[r"), RestorePosition)?;
            self.clear_status_row()
        }
    }

    fn draw(&mut self) -> io::Result<()> {
        if !self.installed || !self.shows_status() {
            return Ok(());
        }
        self.write_status()?;
        self.out.flush()
    }

    fn write_status(&mut self) -> io::Result<()> {
        let text = status_text(&self.snapshot, self.notice.as_ref(), usize::from(self.size.cols));
        queue!(
            self.out,
            SavePosition,
            MoveTo(0, self.size.rows - 1),
            Clear(ClearType::CurrentLine),
            SetAttribute(Attribute::Reverse),
            Print(text),
            SetAttribute(Attribute::Reset),
            RestorePosition
        )
    }
}

impl Drop for Chrome {
    fn drop(&mut self) {
        if let Err(err) = self.teardown() {
            debug!(?err, "status line teardown failed");
        }
    }
}

/// One line of chrome: connection, advisories, timer and the latest notification,
/// cut to `width` characters.
pub fn status_text(snapshot: &SessionSnapshot, notice: Option<&Notification>, width: usize) -> String {
    let mut parts: Vec<String> = Vec::new();

    if snapshot.security.show_root_warning {
        parts.push("ROOT ACCESS: ~d dismiss, ~. close".into());
    }
    let connection = match snapshot.state {
        ConnectionState::Connected => snapshot.banner.clone().unwrap_or_else(|| "connected".into()),
        ConnectionState::Connecting => "connecting...".into(),
        ConnectionState::Disconnected => "disconnected (~r reconnect)".into(),
        ConnectionState::Error => "error (~r reconnect)".into(),
    };
    parts.push(connection);
    if let Some(ip) = snapshot.security.client_ip.as_deref()
        && snapshot.state.is_connected()
    {
        parts.push(format!("from {ip}"));
    }
    if snapshot.state.is_connected() {
        parts.push(format!("up {}", format_duration_ms(snapshot.timer.duration_ms)));
    }
    if snapshot.timer.show_idle_warning {
        parts.push(format!(
            "IDLE: closing in {} (~a stay active)",
            format_duration_ms(snapshot.timer.auto_logout_countdown_ms)
        ));
    }
    if !snapshot.state.is_connected()
        && let Some(status) = snapshot.status.as_deref()
    {
        parts.push(status.to_string());
    }
    if let Some(notice) = notice {
        let label = match notice.kind {
            NotificationKind::Error => "!",
            NotificationKind::Warning => "*",
            NotificationKind::Success | NotificationKind::Info => "-",
        };
        parts.push(format!("{label} {}: {}", notice.title, notice.message));
    }
    parts.push("~? help".into());

    let line = format!(" {}", parts.join(" | "));
    let mut truncated: String = line.chars().take(width).collect();
    let len = truncated.chars().count();
    if len < width {
        truncated.extend(std::iter::repeat_n(' ', width - len));
    }
    truncated
}
