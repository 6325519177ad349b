//! Error types for Carrick

use std::fmt;

/// Unified error type for platform-facing operations
#[derive(Debug)]
pub enum PlatformError {
    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Transport failure (send/receive path)
    Transport(String),

    /// SIM/UICC authentication failure
    Sim(String),

    /// TLS session failure
    Tls(String),

    /// Kernel SA installation failure
    SaInstall(String),

    /// Other error
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::Io(e) => write!(f, "IO error: {}", e),
            PlatformError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PlatformError::Transport(msg) => write!(f, "Transport error: {}", msg),
            PlatformError::Sim(msg) => write!(f, "SIM authentication error: {}", msg),
            PlatformError::Tls(msg) => write!(f, "TLS session error: {}", msg),
            PlatformError::SaInstall(msg) => write!(f, "SA installation error: {}", msg),
            PlatformError::Other(e) => write!(f, "Error: {}", e),
        }
    }
}

impl std::error::Error for PlatformError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PlatformError::Io(e) => Some(e),
            PlatformError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PlatformError {
    fn from(err: std::io::Error) -> Self {
        PlatformError::Io(err)
    }
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlatformError::Config("missing peer address".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing peer address");

        let err = PlatformError::Sim("no vector".to_string());
        assert_eq!(err.to_string(), "SIM authentication error: no vector");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlatformError = io_err.into();
        assert!(matches!(err, PlatformError::Io(_)));
    }

    #[test]
    fn test_result_type() {
        fn example() -> PlatformResult<i32> {
            Ok(42)
        }

        assert_eq!(example().unwrap(), 42);
    }
}
