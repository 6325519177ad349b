//! Error types for the IKEv2 engine
//!
//! Wire-facing protocol errors carry their notify-payload mapping so the
//! session can both consume them internally and emit them to the peer.
//! Internal errors (crypto, SIM, TLS, SA installation) are never put on the
//! wire; they tear the session down instead.

use super::payload::NotifyType;
use std::fmt;

/// Result type for IKEv2 operations
pub type Result<T> = std::result::Result<T, IkeError>;

/// IKEv2 engine errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IkeError {
    /// Message or payload violates RFC 7296 framing rules
    InvalidSyntax(String),

    /// A critical payload with an unrecognized type was received
    UnsupportedCriticalPayload {
        /// Raw payload type values that were not understood
        payload_types: Vec<u8>,
    },

    /// Message ID outside the allowed window
    InvalidMessageId {
        /// Message ID we expected
        expected: u32,
        /// Message ID actually received
        received: u32,
    },

    /// No acceptable proposal found during negotiation
    NoProposalChosen,

    /// KE payload carried the wrong DH group
    InvalidKePayload {
        /// Group the peer wants us to use instead
        preferred_group: u16,
    },

    /// Peer authentication failed
    AuthenticationFailed(String),

    /// Peer refuses to create more SAs on this IKE SA
    NoAdditionalSas,

    /// Traffic selectors were not acceptable
    TsUnacceptable,

    /// Buffer too short for the requested read
    BufferTooShort {
        /// Required length
        required: usize,
        /// Available length
        available: usize,
    },

    /// Declared length disagrees with actual data
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Message exceeds the maximum IKE message size
    MessageTooLarge(u32),

    /// Unsupported protocol version
    UnsupportedVersion(u8),

    /// Unsupported exchange type
    UnsupportedExchangeType(u8),

    /// Payload-level validation failure
    InvalidPayload(String),

    /// Operation not legal in the current session state
    InvalidState(String),

    /// Invalid caller-supplied parameter
    InvalidParameter(String),

    /// Cryptographic operation failed
    Crypto(String),

    /// SIM/UICC authentication failure
    Sim(String),

    /// Injected TLS session failure
    Tls(String),

    /// Kernel SA installation failure
    SaInstall(String),

    /// Transport I/O error
    Io(String),

    /// Peer declared dead after retransmission exhaustion
    PeerDead,

    /// Handshake or exchange deadline expired
    Timeout(String),

    /// Internal error (should not happen)
    Internal(String),
}

impl IkeError {
    /// Notify payload type this error maps to, if it is wire-facing.
    ///
    /// Codec-level failures all collapse to INVALID_SYNTAX; internal errors
    /// return `None` and must never be echoed to the peer.
    pub fn notify_type(&self) -> Option<NotifyType> {
        match self {
            IkeError::UnsupportedCriticalPayload { .. } => {
                Some(NotifyType::UnsupportedCriticalPayload)
            }
            IkeError::InvalidSyntax(_)
            | IkeError::BufferTooShort { .. }
            | IkeError::InvalidLength { .. }
            | IkeError::MessageTooLarge(_)
            | IkeError::InvalidPayload(_) => Some(NotifyType::InvalidSyntax),
            IkeError::InvalidMessageId { .. } => Some(NotifyType::InvalidMessageId),
            IkeError::NoProposalChosen => Some(NotifyType::NoProposalChosen),
            IkeError::InvalidKePayload { .. } => Some(NotifyType::InvalidKePayload),
            IkeError::AuthenticationFailed(_) => Some(NotifyType::AuthenticationFailed),
            IkeError::NoAdditionalSas => Some(NotifyType::NoAdditionalSas),
            IkeError::TsUnacceptable => Some(NotifyType::TsUnacceptable),
            _ => None,
        }
    }

    /// Whether this error is fatal for the whole IKE SA
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            IkeError::NoAdditionalSas | IkeError::TsUnacceptable | IkeError::Timeout(_)
        )
    }
}

impl fmt::Display for IkeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IkeError::InvalidSyntax(msg) => write!(f, "Invalid syntax: {}", msg),
            IkeError::UnsupportedCriticalPayload { payload_types } => {
                write!(f, "Unsupported critical payload(s): {:?}", payload_types)
            }
            IkeError::InvalidMessageId { expected, received } => {
                write!(
                    f,
                    "Invalid message ID: expected {}, received {}",
                    expected, received
                )
            }
            IkeError::NoProposalChosen => {
                write!(f, "No acceptable proposal found in negotiation")
            }
            IkeError::InvalidKePayload { preferred_group } => {
                write!(f, "Invalid KE payload, peer prefers group {}", preferred_group)
            }
            IkeError::AuthenticationFailed(msg) => {
                write!(f, "Authentication failed: {}", msg)
            }
            IkeError::NoAdditionalSas => write!(f, "Peer allows no additional SAs"),
            IkeError::TsUnacceptable => write!(f, "Traffic selectors not acceptable"),
            IkeError::BufferTooShort {
                required,
                available,
            } => {
                write!(
                    f,
                    "Buffer too short: need {} bytes, have {}",
                    required, available
                )
            }
            IkeError::InvalidLength { expected, actual } => {
                write!(f, "Invalid length: expected {}, got {}", expected, actual)
            }
            IkeError::MessageTooLarge(size) => {
                write!(f, "IKE message too large: {} bytes", size)
            }
            IkeError::UnsupportedVersion(v) => {
                write!(f, "Unsupported IKE version: 0x{:02x}", v)
            }
            IkeError::UnsupportedExchangeType(t) => {
                write!(f, "Unsupported exchange type: {}", t)
            }
            IkeError::InvalidPayload(msg) => write!(f, "Invalid IKE payload: {}", msg),
            IkeError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            IkeError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            IkeError::Crypto(msg) => write!(f, "Cryptographic error: {}", msg),
            IkeError::Sim(msg) => write!(f, "SIM authentication error: {}", msg),
            IkeError::Tls(msg) => write!(f, "TLS session error: {}", msg),
            IkeError::SaInstall(msg) => write!(f, "SA installation error: {}", msg),
            IkeError::Io(msg) => write!(f, "I/O error: {}", msg),
            IkeError::PeerDead => write!(f, "Peer dead: retransmissions exhausted"),
            IkeError::Timeout(msg) => write!(f, "Timed out: {}", msg),
            IkeError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for IkeError {}

impl From<std::io::Error> for IkeError {
    fn from(err: std::io::Error) -> Self {
        IkeError::Io(err.to_string())
    }
}

impl From<carrick_platform::PlatformError> for IkeError {
    fn from(err: carrick_platform::PlatformError) -> Self {
        use carrick_platform::PlatformError;
        match err {
            PlatformError::Io(e) => IkeError::Io(e.to_string()),
            PlatformError::Transport(msg) => IkeError::Io(msg),
            PlatformError::Sim(msg) => IkeError::Sim(msg),
            PlatformError::Tls(msg) => IkeError::Tls(msg),
            PlatformError::SaInstall(msg) => IkeError::SaInstall(msg),
            PlatformError::Config(msg) => IkeError::InvalidParameter(msg),
            PlatformError::Other(e) => IkeError::Internal(e.to_string()),
        }
    }
}
