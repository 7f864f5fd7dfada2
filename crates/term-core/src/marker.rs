//! Tagged lines the client writes into the terminal stream itself.
//!
//! Every client-originated line starts with a coloured tag so it cannot be confused
//! with output from the remote shell.

pub fn tag() -> &'static str {
    "\x1b[97;44m [fleetssh] \x1b[0m"
}

pub fn error_tag() -> &'static str {
    "\x1b[97;41m [fleetssh] \x1b[0m"
}

/// A highlighted error line: tag, red text, CRLF framing.
pub fn error_line(message: &str) -> String {
    format!("\r\n{} \x1b[1;31m{message}\x1b[0m\r\n", error_tag())
}

/// An informational line from the client.
pub fn notice_line(message: &str) -> String {
    format!("\r\n{} {message}\r\n", tag())
}

/// Written once when a channel ends, whatever the cause.
pub fn session_ended_line(detail: &str) -> String {
    format!("\r\n{} \x1b[33m*** session ended: {detail} ***\x1b[0m\r\n", tag())
}

/// Remove the SGR sequences the markers add; used by hosts and tests that
/// need the plain text of a marker.
pub fn strip_sgr(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}
