//! # Carrick Platform
//!
//! Collaborator interfaces and unified error types for the Carrick IKEv2/EAP
//! engine.
//!
//! This crate provides:
//! - Unified error types (`PlatformError`, `PlatformResult`)
//! - The interfaces the engine consumes but does not implement:
//!   `PacketTransport`, `SimAuthenticator`, `SaInstaller`, `TlsSession`
//!
//! # Examples
//!
//! ```
//! use carrick_platform::{PlatformError, PlatformResult};
//!
//! fn example_function() -> PlatformResult<String> {
//!     Ok("Hello, Carrick!".to_string())
//! }
//!
//! # fn main() -> PlatformResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, Carrick!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;
pub mod traits;

pub use error::{PlatformError, PlatformResult};
pub use traits::{
    AkaChallengeResult, AkaResponse, ChildSaInstall, ChildSaKeys, GsmTriplet, PacketTransport,
    SaInstaller, SelectorRange, SimAppType, SimAuthenticator, TlsOutput, TlsSession, TlsStatus,
};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
