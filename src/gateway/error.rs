//! Error types for cloud gateway operations

use std::fmt;

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors that can occur while talking to the cloud provider
#[derive(Debug)]
pub enum GatewayError {
    /// The HTTP request itself failed (connect, timeout, TLS, ...)
    Request(reqwest::Error),

    /// The provider answered with an error code
    Api { code: String, message: String },

    /// The provider answered 2xx but the body did not have the
    /// expected shape
    MalformedResponse(String),

    /// The queried instance id does not exist in this account/region
    InstanceNotFound(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Request(err) => write!(f, "cloud API request failed: {}", err),
            GatewayError::Api { code, message } => {
                write!(f, "cloud API returned an error: {} ({})", message, code)
            }
            GatewayError::MalformedResponse(msg) => {
                write!(f, "unexpected cloud API response: {}", msg)
            }
            GatewayError::InstanceNotFound(id) => write!(f, "instance not found: {}", id),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GatewayError::Request(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Request(err)
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::MalformedResponse(err.to_string())
    }
}
