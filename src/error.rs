//! Error types for the self-check engine.
//!
//! Test outcomes are never reported through these types. They are used by
//! constructors, configuration loading and request building; the executor
//! converts them into [`ErrorDetails`](crate::domain::ErrorDetails) data.

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while configuring the engine or preparing a request.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration could not be parsed
    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration parsed but holds invalid values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A test case could not be turned into an HTTP request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl EngineError {
    /// Short stable name used when the error is recorded as result data.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::ConfigParse(_) => "CONFIG_PARSE",
            EngineError::InvalidConfig(_) => "INVALID_CONFIG",
            EngineError::InvalidRequest(_) => "INVALID_REQUEST",
            EngineError::Client(_) => "CLIENT",
        }
    }
}

/// Classified transport failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("TLS handshake failed: {0}")]
    Tls(String),

    #[error("Failed to read response: {0}")]
    Read(String),

    #[error("Request failed: {0}")]
    Request(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Dns(_) => "DNS_ERROR",
            TransportError::Connect(_) => "CONNECT_ERROR",
            TransportError::Tls(_) => "TLS_ERROR",
            TransportError::Read(_) => "READ_ERROR",
            TransportError::Request(_) => "REQUEST_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_kinds_are_stable() {
        assert_eq!(TransportError::Dns("x".into()).kind(), "DNS_ERROR");
        assert_eq!(TransportError::Connect("x".into()).kind(), "CONNECT_ERROR");
        assert_eq!(
            TransportError::Read("eof".into()).to_string(),
            "Failed to read response: eof"
        );
    }

    #[test]
    fn engine_error_wraps_toml_errors() {
        let err: EngineError = toml::from_str::<toml::Value>("= broken")
            .map_err(EngineError::from)
            .unwrap_err();
        assert_eq!(err.kind(), "CONFIG_PARSE");
    }
}
