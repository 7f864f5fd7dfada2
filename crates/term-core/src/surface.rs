use std::io::Write;

use fs_types::protocol::TerminalSize;
use tracing::{debug, trace, warn};

use crate::{
    error::{TermError, TermResult},
    marker,
};

/// A cell position in the visible grid (zero-based).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CellPos {
    pub row: u16,
    pub col: u16,
}

impl CellPos {
    pub const fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }
}

/// A text selection over the visible grid. Endpoints may be given in either order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Selection {
    pub anchor: CellPos,
    pub head: CellPos,
}

impl Selection {
    pub fn new(anchor: CellPos, head: CellPos) -> Self {
        Self { anchor, head }
    }

    fn ordered(&self) -> (CellPos, CellPos) {
        if self.anchor <= self.head { (self.anchor, self.head) } else { (self.head, self.anchor) }
    }
}

/// Headless terminal emulator: ANSI interpretation, a fixed-size grid and scrollback.
///
/// Output written here can also be mirrored verbatim to a host writer (the real
/// terminal when running interactively). After [`dispose`](Self::dispose) every
/// write is dropped, so late frames from a closing channel are harmless.
pub struct TerminalSurface {
    parser: vt100::Parser,
    mirror: Option<Box<dyn Write + Send>>,
    selection: Option<Selection>,
    /// Selected text captured at dispose time.
    retained_selection: Option<String>,
    disposed: bool,
}

impl std::fmt::Debug for TerminalSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSurface")
            .field("size", &self.size())
            .field("mirrored", &self.mirror.is_some())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl TerminalSurface {
    pub fn new(size: TerminalSize, scrollback_lines: usize) -> TermResult<Self> {
        if size.is_empty() {
            return Err(TermError::ZeroSize {
                cols: size.cols,
                rows: size.rows,
            });
        }
        Ok(Self {
            parser: vt100::Parser::new(size.rows, size.cols, scrollback_lines),
            mirror: None,
            selection: None,
            retained_selection: None,
            disposed: false,
        })
    }

    /// Echo everything written to the surface into `writer` as well.
    pub fn with_mirror(mut self, writer: Box<dyn Write + Send>) -> Self {
        self.mirror = Some(writer);
        self
    }

    pub fn size(&self) -> TerminalSize {
        let (rows, cols) = self.parser.screen().size();
        TerminalSize::new(cols, rows)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Feed terminal output (ANSI sequences included) into the grid.
    pub fn write(&mut self, data: &str) {
        self.write_bytes(data.as_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.disposed {
            trace!(len = data.len(), "dropping write to disposed terminal surface");
            return;
        }
        self.parser.process(data);
        if let Some(mirror) = self.mirror.as_mut() {
            let result = mirror.write_all(data).and_then(|_| mirror.flush());
            if let Err(err) = result {
                warn!(?err, "terminal mirror write failed; detaching mirror");
                self.mirror = None;
            }
        }
    }

    pub fn write_error_line(&mut self, message: &str) {
        self.write(&marker::error_line(message));
    }

    pub fn write_notice(&mut self, message: &str) {
        self.write(&marker::notice_line(message));
    }

    pub fn write_session_ended(&mut self, detail: &str) {
        self.write(&marker::session_ended_line(detail));
    }

    /// Resize the grid to `size`. Returns the new size when it actually changed so
    /// the caller can tell the remote side; zero-sized targets are rejected.
    pub fn fit(&mut self, size: TerminalSize) -> TermResult<Option<TerminalSize>> {
        if self.disposed {
            return Err(TermError::Disposed);
        }
        if size.is_empty() {
            return Err(TermError::ZeroSize {
                cols: size.cols,
                rows: size.rows,
            });
        }
        if size == self.size() {
            return Ok(None);
        }
        self.parser.screen_mut().set_size(size.rows, size.cols);
        self.selection = None;
        debug!(cols = size.cols, rows = size.rows, "terminal surface resized");
        Ok(Some(size))
    }

    /// Plain text of the visible viewport.
    pub fn visible_text(&self) -> String {
        self.parser.screen().contents()
    }

    /// Plain text of the whole buffer, oldest scrollback line first, through the
    /// last non-blank line of the viewport. Lines are joined with `\n`.
    ///
    /// `None` once the surface is disposed: the buffer no longer tracks the session.
    pub fn scrollback_text(&mut self) -> Option<String> {
        if self.disposed {
            return None;
        }
        let screen = self.parser.screen_mut();
        let (rows, cols) = screen.size();
        let previous = screen.scrollback();

        screen.set_scrollback(usize::MAX);
        let depth = screen.scrollback();

        // At the deepest offset the viewport starts at the oldest line; every
        // step towards the live screen reveals one more line at the bottom.
        let mut lines: Vec<String> = screen.rows(0, cols).collect();
        let last_row = usize::from(rows.saturating_sub(1));
        for offset in (0..depth).rev() {
            screen.set_scrollback(offset);
            if let Some(line) = screen.rows(0, cols).nth(last_row) {
                lines.push(line);
            }
        }
        screen.set_scrollback(previous);

        while lines.last().is_some_and(|line| line.trim().is_empty()) {
            lines.pop();
        }
        let text = lines
            .iter()
            .map(|line| line.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
        Some(text)
    }

    pub fn select(&mut self, selection: Selection) {
        if self.disposed {
            trace!("ignoring selection on disposed terminal surface");
            return;
        }
        self.selection = Some(selection);
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    /// Text covered by the current selection, if any. After dispose this is the
    /// text that was selected at that moment.
    pub fn selection_text(&self) -> Option<String> {
        if self.disposed {
            return self.retained_selection.clone();
        }
        let (start, end) = self.selection?.ordered();
        let text = self
            .parser
            .screen()
            .contents_between(start.row, start.col, end.row, end.col.saturating_add(1));
        Some(text)
    }

    /// Stop accepting output. Safe to call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.retained_selection = self.selection_text().filter(|text| !text.is_empty());
        self.disposed = true;
        self.selection = None;
        if let Some(mut mirror) = self.mirror.take() {
            let _ = mirror.flush();
        }
        debug!("terminal surface disposed");
    }
}

#[cfg(test)]
#[path = "surface_tests.rs"]
mod tests;
