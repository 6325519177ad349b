//! Protocol engine for the Carrick mobile IPsec stack.
//!
//! This crate implements the control plane that establishes IPsec security
//! associations for a mobile device:
//!
//! - **IKEv2** (initiator role) - RFC 7296, with message fragmentation per
//!   RFC 7383
//! - **EAP** inner authentication - SIM (RFC 4186), AKA (RFC 4187), AKA'
//!   (RFC 5448), MSCHAPv2 (RFC 2759), TTLS (RFC 5281)
//!
//! # Architecture
//!
//! ```text
//! inbound bytes
//!   -> SK/SKF envelope (decrypt, reassemble)      ike::sk
//!   -> payload decode                              ike::message, ike::payload
//!   -> session state machine                       ike::session
//!        |-> Child SA negotiation                  ike::child
//!        '-> EAP method state machines             eap::*
//!   -> envelope encrypt/fragment -> transport
//! ```
//!
//! The engine is initiator-only. Sockets, the UICC, kernel SA programming,
//! and TLS are injected through the traits in `carrick-platform`.
//!
//! # Security
//!
//! - No unsafe code
//! - Constant-time integrity verification
//! - Key material zeroized on drop
//! - Decryption failures are silently discarded, never echoed to the peer

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod eap;
pub mod ike;
