//! EAP engine: message codec and method state machines
//!
//! Implements the supplicant side of EAP (RFC 3748) with the methods a
//! mobile IPsec stack needs: SIM (RFC 4186), AKA (RFC 4187), AKA'
//! (RFC 5448), MSCHAPv2 (RFC 2759) and TTLS (RFC 5281).
//!
//! # Architecture
//!
//! ```text
//! EAP payload bytes
//!   -> EapSession (identity / notification / Nak / Success / Failure)
//!        '-> EapMethod state machine (one per conversation)
//!              SIM / AKA / AKA' ... simaka attribute + key schedule
//!              MSCHAPv2 ............ RFC 2759 challenge/response
//!              TTLS ................ TLS tunnel + inner EapSession
//!   -> EapResult (response bytes, success keys, failure, or error)
//! ```
//!
//! The containing IKE exchange consumes `EapResult` values; no exceptions
//! or callbacks cross that boundary.

pub mod aka;
pub mod aka_prime;
pub mod config;
pub mod error;
pub mod message;
pub mod method;
pub mod mschapv2;
pub mod session;
pub mod sim;
pub mod simaka;
pub mod ttls;

pub use config::EapSessionConfig;
pub use error::{EapError, Result};
pub use message::{EapCode, EapMessage, EapMethodType};
pub use method::EapMethod;
pub use session::{EapSession, EapSessionDeps};
pub use ttls::TlsSessionFactory;

/// Outcome of processing one inbound EAP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EapResult {
    /// Response packet to send to the peer
    Response(Vec<u8>),

    /// Conversation succeeded; keys are empty when the method derives none
    Success {
        /// Master session key
        msk: Vec<u8>,
        /// Extended master session key
        emsk: Vec<u8>,
    },

    /// Conversation failed
    Failure,

    /// Protocol violation or internal failure, surfaced to the container
    Error(EapError),
}

impl EapResult {
    /// Whether this result ends the conversation
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EapResult::Success { .. } | EapResult::Failure | EapResult::Error(_)
        )
    }
}
