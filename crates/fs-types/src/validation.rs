use thiserror::Error;

/// Validation errors raised when building connection details from user or API input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("port must be between 1 and 65535, got {0}")]
    InvalidPort(i64),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

/// Check that a string field carries something other than whitespace.
pub fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}

/// Narrow a port as returned by an API (often a signed integer) to a valid TCP port.
pub fn validate_port(value: i64) -> Result<u16, ValidationError> {
    match u16::try_from(value) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(ValidationError::InvalidPort(value)),
    }
}

/// Host names may not carry whitespace or URL delimiters; they end up inside the bootstrap frame.
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    require_non_empty("host", host)?;
    if host.chars().any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#')) {
        return Err(ValidationError::InvalidFormat(format!("host '{host}' contains illegal characters")));
    }
    Ok(())
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
