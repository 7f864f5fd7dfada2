use term_core::marker::tag;

const ESC: u8 = 0x1b;

/// Local commands typed as `~<key>` at the start of a line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscapeAction {
    Close,
    Reconnect,
    Copy,
    ToggleFullscreen,
    ExitFullscreen,
    StayActive,
    DismissRootWarning,
    VerbosityUp,
    VerbosityDown,
    LiteralTilde,
    ShowMenu,
}

pub struct EscapeParser {
    pub at_line_start: bool,
    in_escape: bool,
    escape: u8,
}

impl Default for EscapeParser {
    fn default() -> Self {
        Self {
            at_line_start: true,
            in_escape: false,
            escape: b'~',
        }
    }
}

impl EscapeParser {
    /// Split keyboard input into escape actions and the bytes to forward.
    pub fn process(&mut self, data: &[u8]) -> (Vec<EscapeAction>, Vec<u8>) {
        let mut actions = Vec::new();
        let mut out = Vec::with_capacity(data.len());
        for &b in data {
            if self.in_escape {
                self.in_escape = false;
                match b {
                    b'.' => actions.push(EscapeAction::Close),
                    b'r' | b'R' => actions.push(EscapeAction::Reconnect),
                    b'c' | b'C' => actions.push(EscapeAction::Copy),
                    b'f' | b'F' => actions.push(EscapeAction::ToggleFullscreen),
                    ESC => actions.push(EscapeAction::ExitFullscreen),
                    b'a' | b'A' => actions.push(EscapeAction::StayActive),
                    b'd' | b'D' => actions.push(EscapeAction::DismissRootWarning),
                    b'V' => actions.push(EscapeAction::VerbosityUp),
                    b'v' => actions.push(EscapeAction::VerbosityDown),
                    b'?' | b'h' => actions.push(EscapeAction::ShowMenu),
                    x if x == self.escape => {
                        out.push(self.escape);
                        actions.push(EscapeAction::LiteralTilde);
                        self.at_line_start = false;
                        continue;
                    }
                    _ => {}
                }
                self.at_line_start = true;
                continue;
            }

            if self.at_line_start && b == self.escape {
                self.in_escape = true;
                continue;
            }

            out.push(b);
            self.at_line_start = matches!(b, b'\n' | b'\r');
        }
        (actions, out)
    }
}

pub fn escape_help_text() -> String {
    let lines = [
        format!("\r\n{} escape commands (type at start of line):", tag()),
        "  ~.     Close the session (declines root access when warned)".into(),
        "  ~r     Reconnect".into(),
        "  ~c     Copy the terminal output to the clipboard".into(),
        "  ~f     Toggle fullscreen".into(),
        "  ~<Esc> Leave fullscreen".into(),
        "  ~a     Stay active (dismiss the idle warning)".into(),
        "  ~d     Dismiss the root access warning".into(),
        "  ~V     Increase client verbosity".into(),
        "  ~v     Decrease client verbosity".into(),
        "  ~?     This help".into(),
        "  ~~     Send a literal ~".into(),
    ];
    lines.join("\r\n")
}

#[cfg(test)]
#[path = "escape_tests.rs"]
mod tests;
