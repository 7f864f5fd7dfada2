use thiserror::Error;

/// Errors raised by the terminal surface
#[derive(Error, Debug)]
pub enum TermError {
    /// A grid needs at least one row and one column
    #[error("terminal size must be non-zero (got {cols}x{rows})")]
    ZeroSize { cols: u16, rows: u16 },

    /// The surface was disposed and can no longer be resized
    #[error("terminal surface has been disposed")]
    Disposed,

    /// Mirror output failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for terminal surface operations
pub type TermResult<T> = Result<T, TermError>;
