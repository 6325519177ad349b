//! IKE and Child session configuration
//!
//! Builder-style configuration for one IKE session and the Child sessions
//! negotiated under it. Tunnel-mode Child sessions built without explicit
//! traffic selectors default to the full IPv4 and IPv6 address/port space.

use super::payload::{IdPayload, IdType, TrafficSelector};
use super::proposal::{
    DhTransformId, EncrTransformId, EsnTransformId, PrfTransformId, Proposal, ProtocolId,
    Transform,
};
use crate::eap::config::EapSessionConfig;
use crate::ike::{IkeError, Result};
use std::net::SocketAddr;
use std::time::Duration;

/// Peer authentication configuration
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// Pre-shared key on both sides
    Psk(Vec<u8>),
    /// EAP inner authentication (this side), MSK-keyed AUTH exchange
    Eap(EapSessionConfig),
}

/// Configuration for one Child session
#[derive(Debug, Clone)]
pub struct ChildSessionConfig {
    /// ESP proposals offered, in preference order
    pub proposals: Vec<Proposal>,

    /// Local (initiator) traffic selectors
    pub local_ts: Vec<TrafficSelector>,

    /// Remote (responder) traffic selectors
    pub remote_ts: Vec<TrafficSelector>,

    /// Transport mode instead of tunnel mode
    pub is_transport: bool,
}

impl ChildSessionConfig {
    /// Create builder for a tunnel mode Child session
    pub fn tunnel_builder() -> ChildSessionBuilder {
        ChildSessionBuilder::new(false)
    }

    /// Create builder for a transport mode Child session
    pub fn transport_builder() -> ChildSessionBuilder {
        ChildSessionBuilder::new(true)
    }
}

/// Builder for ChildSessionConfig
pub struct ChildSessionBuilder {
    proposals: Vec<Proposal>,
    local_ts: Vec<TrafficSelector>,
    remote_ts: Vec<TrafficSelector>,
    is_transport: bool,
}

impl ChildSessionBuilder {
    fn new(is_transport: bool) -> Self {
        ChildSessionBuilder {
            proposals: Vec::new(),
            local_ts: Vec::new(),
            remote_ts: Vec::new(),
            is_transport,
        }
    }

    /// Add an ESP proposal
    pub fn add_proposal(mut self, proposal: Proposal) -> Self {
        self.proposals.push(proposal);
        self
    }

    /// Add a local traffic selector
    pub fn add_local_ts(mut self, ts: TrafficSelector) -> Self {
        self.local_ts.push(ts);
        self
    }

    /// Add a remote traffic selector
    pub fn add_remote_ts(mut self, ts: TrafficSelector) -> Self {
        self.remote_ts.push(ts);
        self
    }

    /// Validate and build
    ///
    /// Selector lists left empty default to the full IPv4 + IPv6 ranges.
    pub fn build(self) -> Result<ChildSessionConfig> {
        if self.proposals.is_empty() {
            return Err(IkeError::InvalidParameter(
                "At least one Child SA proposal required".into(),
            ));
        }
        for proposal in &self.proposals {
            if proposal.protocol_id != ProtocolId::Esp {
                return Err(IkeError::InvalidParameter(
                    "Child SA proposals must use the ESP protocol".into(),
                ));
            }
        }

        let default_ts = || vec![TrafficSelector::ipv4_any(), TrafficSelector::ipv6_any()];

        Ok(ChildSessionConfig {
            proposals: self.proposals,
            local_ts: if self.local_ts.is_empty() {
                default_ts()
            } else {
                self.local_ts
            },
            remote_ts: if self.remote_ts.is_empty() {
                default_ts()
            } else {
                self.remote_ts
            },
            is_transport: self.is_transport,
        })
    }
}

/// Configuration for one IKE session
#[derive(Debug, Clone)]
pub struct IkeSessionConfig {
    /// Peer address and port
    pub peer_addr: SocketAddr,

    /// Local identification
    pub local_id: IdPayload,

    /// Expected remote identification (None accepts the peer's IDr)
    pub remote_id: Option<IdPayload>,

    /// How we authenticate
    pub auth: AuthConfig,

    /// IKE SA proposals offered, in preference order
    pub ike_proposals: Vec<Proposal>,

    /// First Child session, negotiated during IKE_AUTH
    pub child: ChildSessionConfig,

    /// Soft deadline for handshake completion
    pub handshake_timeout: Duration,

    /// Largest datagram to emit before fragmenting
    pub max_message_len: usize,

    /// Discard deadline for partially reassembled messages
    pub fragment_timeout: Duration,
}

impl IkeSessionConfig {
    /// Create builder
    pub fn builder(peer_addr: SocketAddr) -> IkeSessionBuilder {
        IkeSessionBuilder::new(peer_addr)
    }

    /// Default IKE proposals: AES-GCM-16 and AES-CBC-256/HMAC-SHA256
    pub fn default_ike_proposals() -> Vec<Proposal> {
        vec![
            Proposal::new(1, ProtocolId::Ike)
                .add_transform(Transform::encr_with_key_len(EncrTransformId::AesGcm16, 128))
                .add_transform(Transform::prf(PrfTransformId::HmacSha256))
                .add_transform(Transform::dh(DhTransformId::Modp2048)),
            Proposal::new(2, ProtocolId::Ike)
                .add_transform(Transform::encr_with_key_len(EncrTransformId::AesCbc, 256))
                .add_transform(Transform::integ(crate::ike::proposal::IntegTransformId::HmacSha256_128))
                .add_transform(Transform::prf(PrfTransformId::HmacSha256))
                .add_transform(Transform::dh(DhTransformId::Modp2048)),
        ]
    }

    /// Default ESP proposal: AES-GCM-16-128, no extended sequence numbers
    pub fn default_esp_proposal(spi: u32) -> Proposal {
        Proposal::new(1, ProtocolId::Esp)
            .with_spi(spi.to_be_bytes().to_vec())
            .add_transform(Transform::encr_with_key_len(EncrTransformId::AesGcm16, 128))
            .add_transform(Transform::esn(EsnTransformId::None))
    }
}

/// Builder for IkeSessionConfig
pub struct IkeSessionBuilder {
    peer_addr: SocketAddr,
    local_id: Option<IdPayload>,
    remote_id: Option<IdPayload>,
    auth: Option<AuthConfig>,
    ike_proposals: Option<Vec<Proposal>>,
    child: Option<ChildSessionConfig>,
    handshake_timeout: Duration,
    max_message_len: usize,
    fragment_timeout: Duration,
}

impl IkeSessionBuilder {
    fn new(peer_addr: SocketAddr) -> Self {
        IkeSessionBuilder {
            peer_addr,
            local_id: None,
            remote_id: None,
            auth: None,
            ike_proposals: None,
            child: None,
            handshake_timeout: Duration::from_secs(30),
            max_message_len: 1280,
            fragment_timeout: Duration::from_secs(60),
        }
    }

    /// Set local identity from an email-style identifier
    pub fn with_local_id(mut self, id: impl Into<String>) -> Self {
        self.local_id = Some(IdPayload {
            id_type: IdType::Rfc822Addr,
            data: id.into().into_bytes(),
        });
        self
    }

    /// Set local identity payload directly
    pub fn with_local_id_payload(mut self, id: IdPayload) -> Self {
        self.local_id = Some(id);
        self
    }

    /// Set expected remote identity from a FQDN
    pub fn with_remote_id(mut self, id: impl Into<String>) -> Self {
        self.remote_id = Some(IdPayload {
            id_type: IdType::Fqdn,
            data: id.into().into_bytes(),
        });
        self
    }

    /// Authenticate with a pre-shared key
    pub fn with_psk(mut self, psk: impl Into<Vec<u8>>) -> Self {
        self.auth = Some(AuthConfig::Psk(psk.into()));
        self
    }

    /// Authenticate with EAP
    pub fn with_eap(mut self, eap: EapSessionConfig) -> Self {
        self.auth = Some(AuthConfig::Eap(eap));
        self
    }

    /// Set IKE proposals
    pub fn with_ike_proposals(mut self, proposals: Vec<Proposal>) -> Self {
        self.ike_proposals = Some(proposals);
        self
    }

    /// Set the first Child session configuration
    pub fn with_child(mut self, child: ChildSessionConfig) -> Self {
        self.child = Some(child);
        self
    }

    /// Set the handshake soft deadline
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the fragmentation threshold
    pub fn with_max_message_len(mut self, len: usize) -> Self {
        self.max_message_len = len;
        self
    }

    /// Build with validation
    pub fn build(self) -> Result<IkeSessionConfig> {
        let local_id = self
            .local_id
            .ok_or_else(|| IkeError::InvalidParameter("local_id is required".into()))?;
        let auth = self
            .auth
            .ok_or_else(|| IkeError::InvalidParameter("authentication method is required".into()))?;

        if let AuthConfig::Psk(psk) = &auth {
            if psk.is_empty() {
                return Err(IkeError::InvalidParameter("PSK cannot be empty".into()));
            }
        }

        let ike_proposals = self
            .ike_proposals
            .unwrap_or_else(IkeSessionConfig::default_ike_proposals);
        if ike_proposals.is_empty() {
            return Err(IkeError::InvalidParameter(
                "At least one IKE proposal required".into(),
            ));
        }

        let child = match self.child {
            Some(child) => child,
            None => ChildSessionConfig::tunnel_builder()
                .add_proposal(IkeSessionConfig::default_esp_proposal(0))
                .build()?,
        };

        Ok(IkeSessionConfig {
            peer_addr: self.peer_addr,
            local_id,
            remote_id: self.remote_id,
            auth,
            ike_proposals,
            child,
            handshake_timeout: self.handshake_timeout,
            max_message_len: self.max_message_len,
            fragment_timeout: self.fragment_timeout,
        })
    }
}
