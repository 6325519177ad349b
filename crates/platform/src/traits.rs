//! Collaborator interfaces consumed by the Carrick protocol engine
//!
//! The engine never touches sockets, the UICC, or the kernel directly. Each
//! of those subsystems is injected through one of the traits below, so the
//! protocol code stays testable and host-independent.

use crate::PlatformResult;
use std::net::{IpAddr, SocketAddr};

/// Datagram transport for IKE messages
///
/// Implementations own the UDP sockets (ports 500 and 4500) and the NAT-T
/// encapsulation details: packets sent through port 4500 carry a four-byte
/// zero non-ESP marker that must be stripped before delivery and prepended
/// on send. The engine only ever sees raw IKE message bytes.
#[async_trait::async_trait]
pub trait PacketTransport: Send + Sync {
    /// Send one IKE message toward the peer. Must not block the session
    /// worker beyond enqueueing the datagram.
    async fn send(&self, data: &[u8], peer: SocketAddr) -> PlatformResult<()>;

    /// Receive the next inbound datagram addressed to this session.
    async fn recv(&self) -> PlatformResult<(Vec<u8>, SocketAddr)>;
}

/// UICC application type used for SIM/AKA challenges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SimAppType {
    /// 2G SIM application
    Sim,
    /// USIM application (3G and later)
    Usim,
    /// ISIM application
    Isim,
}

/// Result of a GSM authentication run on the SIM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsmTriplet {
    /// Signed response (4 bytes)
    pub sres: [u8; 4],
    /// Ciphering key (8 bytes)
    pub kc: [u8; 8],
}

/// Successful UMTS AKA challenge output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AkaResponse {
    /// RES value (4-16 bytes)
    pub res: Vec<u8>,
    /// Ciphering key (16 bytes)
    pub ck: Vec<u8>,
    /// Integrity key (16 bytes)
    pub ik: Vec<u8>,
}

/// Outcome of running an AKA challenge against the UICC
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AkaChallengeResult {
    /// Network authenticated, RES/CK/IK available
    Success(AkaResponse),

    /// Sequence number out of range; AUTS carries the resync token
    SyncFailure {
        /// AUTS value to return to the network
        auts: Vec<u8>,
    },

    /// AUTN MAC verification failed on the card
    AuthReject,
}

/// Access to SIM/USIM authentication vectors
///
/// Backed by telephony/UICC services on a real device. Challenges complete
/// asynchronously; the session worker suspends until the card answers.
#[async_trait::async_trait]
pub trait SimAuthenticator: Send + Sync {
    /// Run a GSM authentication (RAND -> SRES, Kc).
    async fn gsm_auth(&self, app_type: SimAppType, rand: &[u8; 16]) -> PlatformResult<GsmTriplet>;

    /// Run a UMTS AKA authentication (RAND, AUTN -> RES, CK, IK).
    async fn aka_auth(
        &self,
        app_type: SimAppType,
        rand: &[u8; 16],
        autn: &[u8; 16],
    ) -> PlatformResult<AkaChallengeResult>;
}

/// One address/port range protected by a Child SA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorRange {
    /// First address in the range
    pub start_addr: IpAddr,
    /// Last address in the range (inclusive)
    pub end_addr: IpAddr,
    /// First port in the range
    pub start_port: u16,
    /// Last port in the range (inclusive)
    pub end_port: u16,
}

/// Keys for one direction of a Child SA
#[derive(Debug, Clone)]
pub struct ChildSaKeys {
    /// Encryption key
    pub encryption: Vec<u8>,
    /// Integrity key (empty for combined-mode ciphers)
    pub integrity: Vec<u8>,
}

/// Everything the kernel needs to program one Child SA pair
#[derive(Debug, Clone)]
pub struct ChildSaInstall {
    /// Inbound SPI (chosen locally)
    pub inbound_spi: u32,
    /// Outbound SPI (chosen by the peer)
    pub outbound_spi: u32,
    /// Keys protecting inbound traffic
    pub inbound_keys: ChildSaKeys,
    /// Keys protecting outbound traffic
    pub outbound_keys: ChildSaKeys,
    /// Local traffic selectors
    pub local_selectors: Vec<SelectorRange>,
    /// Remote traffic selectors
    pub remote_selectors: Vec<SelectorRange>,
    /// Transport mode instead of tunnel mode
    pub is_transport: bool,
}

/// Kernel IPsec SA programming
#[async_trait::async_trait]
pub trait SaInstaller: Send + Sync {
    /// Install a negotiated Child SA pair.
    async fn install_child_sa(&self, sa: ChildSaInstall) -> PlatformResult<()>;

    /// Remove a Child SA pair by its inbound SPI.
    async fn delete_child_sa(&self, inbound_spi: u32) -> PlatformResult<()>;
}

/// Handshake progress reported by the injected TLS implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsStatus {
    /// More handshake records are expected
    HandshakeInProgress,
    /// Handshake finished, tunnel keys available
    HandshakeComplete,
    /// Session closed by the peer
    Closed,
    /// Unrecoverable TLS failure
    Failure,
}

/// Records produced by one TLS operation
#[derive(Debug, Clone)]
pub struct TlsOutput {
    /// Current handshake status
    pub status: TlsStatus,
    /// Outbound TLS records to hand to the peer (may be empty)
    pub records: Vec<u8>,
}

/// Client-side TLS session driven by EAP-TTLS
///
/// The engine feeds inbound TLS records in and ships the produced records
/// out through the EAP tunnel; it never interprets record contents itself.
#[async_trait::async_trait]
pub trait TlsSession: Send + Sync {
    /// Begin the handshake, producing the ClientHello record(s).
    async fn start_handshake(&mut self) -> PlatformResult<TlsOutput>;

    /// Process inbound handshake records, producing the next flight.
    async fn process_handshake_records(&mut self, records: &[u8]) -> PlatformResult<TlsOutput>;

    /// Encrypt application data into TLS records (post-handshake).
    async fn encrypt(&mut self, plaintext: &[u8]) -> PlatformResult<Vec<u8>>;

    /// Decrypt inbound TLS records into application data (post-handshake).
    async fn decrypt(&mut self, records: &[u8]) -> PlatformResult<Vec<u8>>;

    /// Export keying material bound to this session (RFC 5705 style).
    /// EAP-TTLS derives the MSK/EMSK from the first 128 bytes.
    fn export_key_material(&self, length: usize) -> PlatformResult<Vec<u8>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PlatformError;

    struct RejectingSim;

    #[async_trait::async_trait]
    impl SimAuthenticator for RejectingSim {
        async fn gsm_auth(
            &self,
            _app_type: SimAppType,
            _rand: &[u8; 16],
        ) -> PlatformResult<GsmTriplet> {
            Err(PlatformError::Sim("no card".into()))
        }

        async fn aka_auth(
            &self,
            _app_type: SimAppType,
            _rand: &[u8; 16],
            _autn: &[u8; 16],
        ) -> PlatformResult<AkaChallengeResult> {
            Ok(AkaChallengeResult::AuthReject)
        }
    }

    #[tokio::test]
    async fn test_sim_authenticator_object_safety() {
        let sim: Box<dyn SimAuthenticator> = Box::new(RejectingSim);

        let gsm = sim.gsm_auth(SimAppType::Sim, &[0u8; 16]).await;
        assert!(gsm.is_err());

        let aka = sim.aka_auth(SimAppType::Usim, &[0u8; 16], &[0u8; 16]).await;
        assert_eq!(aka.unwrap(), AkaChallengeResult::AuthReject);
    }

    #[test]
    fn test_selector_range_equality() {
        let a = SelectorRange {
            start_addr: "0.0.0.0".parse().unwrap(),
            end_addr: "255.255.255.255".parse().unwrap(),
            start_port: 0,
            end_port: 65535,
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}
