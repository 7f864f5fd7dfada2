use thiserror::Error;

/// Errors that can occur while resolving, opening or driving a terminal session
#[derive(Error, Debug)]
pub enum SessionError {
    /// WebSocket handshake or transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Console API request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint could not be turned into a URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Payload was not the JSON we expected
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection details failed validation
    #[error(transparent)]
    Validation(#[from] fs_types::ValidationError),

    /// Terminal surface rejected an operation
    #[error(transparent)]
    Terminal(#[from] term_core::TermError),

    /// The server has no credential the terminal could use
    #[error("no credentials available for server {0}")]
    NoCredentials(String),

    /// Credential or client metadata lookup failed
    #[error("credential resolution failed: {0}")]
    Credentials(String),

    /// Clipboard unavailable or write rejected
    #[error("clipboard error: {0}")]
    Clipboard(String),

    /// Transport-level failure without a more specific cause
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;
