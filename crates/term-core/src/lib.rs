//! Terminal surface used by fleetssh sessions.
//!
//! [`TerminalSurface`] wraps a `vt100` parser: a fixed-size character grid that
//! interprets ANSI sequences and keeps a scrollback buffer. It has no knowledge of
//! the connection; the session writes already-decoded output into it and reads the
//! buffer back for copy operations.

pub mod error;
pub mod marker;
pub mod surface;

pub use error::{TermError, TermResult};
pub use surface::{CellPos, Selection, TerminalSurface};
