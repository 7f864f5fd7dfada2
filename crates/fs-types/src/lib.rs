//! Shared type definitions for fleetssh
//!
//! This crate contains lightweight type definitions shared by the session runtime,
//! the terminal host and the tests: connection details, connection/timer state,
//! the WebSocket frame protocol spoken with the console's SSH bridge, and the
//! payloads returned by the console's credential API.

pub mod api;
pub mod config;
pub mod notify;
pub mod protocol;
pub mod session;
pub mod ssh;
pub mod validation;

pub use ssh::{ConnectionDetails, ConnectionState};
pub use validation::ValidationError;

/// Identifier of a managed server as used in console URLs.
pub type ServerId = String;

/// Identifier of the customer that owns a server.
pub type CustomerId = String;
