//! IKEv2 engine (initiator role)
//!
//! Implements the control plane of RFC 7296 with message fragmentation per
//! RFC 7383:
//!
//! - **Codec**: message header, payload chain, proposals, traffic
//!   selectors
//! - **Crypto transforms**: AES-CBC/CTR/GCM, HMAC and AES-XCBC/CMAC MACs
//!   and PRFs, MODP Diffie-Hellman groups
//! - **Envelope**: SK/SKF encryption, fragmentation, reassembly
//! - **Exchanges**: IKE_SA_INIT (cookie and INVALID_KE retries), IKE_AUTH
//!   (PSK or EAP), CREATE_CHILD_SA, INFORMATIONAL
//! - **Session driver**: retransmission, exchange discipline, Child SA
//!   installation via the injected platform services
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use carrick_proto::ike::config::IkeSessionConfig;
//! use carrick_proto::ike::session::{IkeSession, SessionServices};
//! # async fn run(services: SessionServices) -> Result<(), Box<dyn std::error::Error>> {
//! let config = IkeSessionConfig::builder("203.0.113.1:500".parse()?)
//!     .with_local_id("device@example.org")
//!     .with_remote_id("gateway.example.org")
//!     .with_psk(b"not-a-real-key".to_vec())
//!     .build()?;
//!
//! let mut session = IkeSession::new(config, services);
//! session.connect().await?;
//! session.check_liveness().await?;
//! session.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - Integrity/decryption failures discard the packet without response
//! - Constant-time comparison for checksums and AUTH values
//! - IKE SA key material zeroized on drop

pub mod auth;
pub mod child;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod exchange;
pub mod informational;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod payload;
pub mod proposal;
pub mod registry;
pub mod retransmit;
pub mod session;
pub mod sk;
pub mod state;

pub use config::{AuthConfig, ChildSessionConfig, IkeSessionConfig};
pub use error::{IkeError, Result};
pub use session::{IkeSession, SessionServices};
pub use state::IkeState;
