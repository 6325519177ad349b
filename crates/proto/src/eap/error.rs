//! Error types for the EAP engine
//!
//! Two failure classes matter to callers:
//!
//! - **Silent** errors are parse-level problems inside a method
//!   conversation. They are answered on the wire (client-error attribute,
//!   Nak) and never propagate to the containing IKE exchange.
//! - **InvalidRequest** errors are protocol-ordering violations; they
//!   surface as an error result to the containing exchange.

use std::fmt;

/// Result type for EAP operations
pub type Result<T> = std::result::Result<T, EapError>;

/// EAP engine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EapError {
    /// Parse-level failure; answered in-band, not propagated
    Silent(String),

    /// Protocol ordering violation (wrong code, stale identifier, wrong
    /// state for the request)
    InvalidRequest(String),

    /// SIM/UICC failure
    Sim(String),

    /// Injected TLS session failure
    Tls(String),

    /// Configuration problem
    Config(String),

    /// Internal error (should not happen)
    Internal(String),
}

impl fmt::Display for EapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EapError::Silent(msg) => write!(f, "EAP parse error: {}", msg),
            EapError::InvalidRequest(msg) => write!(f, "Invalid EAP request: {}", msg),
            EapError::Sim(msg) => write!(f, "EAP SIM error: {}", msg),
            EapError::Tls(msg) => write!(f, "EAP TLS error: {}", msg),
            EapError::Config(msg) => write!(f, "EAP configuration error: {}", msg),
            EapError::Internal(msg) => write!(f, "EAP internal error: {}", msg),
        }
    }
}

impl std::error::Error for EapError {}

impl From<carrick_platform::PlatformError> for EapError {
    fn from(err: carrick_platform::PlatformError) -> Self {
        use carrick_platform::PlatformError;
        match err {
            PlatformError::Sim(msg) => EapError::Sim(msg),
            PlatformError::Tls(msg) => EapError::Tls(msg),
            PlatformError::Config(msg) => EapError::Config(msg),
            other => EapError::Internal(other.to_string()),
        }
    }
}
