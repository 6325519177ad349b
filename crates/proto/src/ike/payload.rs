//! IKEv2 Payload structures and parsing
//!
//! Implements IKE payloads as defined in RFC 7296 Section 3.2 and the
//! fragment payload from RFC 7383.

use super::constants::{AuthMethod, PayloadType, GENERIC_HEADER_SIZE};
use super::proposal::Proposal;
use crate::ike::{IkeError, Result};
use std::net::IpAddr;

/// Generic IKE payload header (4 bytes)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C|  RESERVED   |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Next payload type (raw value; unknown types are preserved)
    pub next_payload: u8,

    /// Critical bit (if set, must understand this payload)
    pub critical: bool,

    /// Total payload length including header (4 bytes + data)
    pub length: u16,
}

impl PayloadHeader {
    /// Minimum payload header size
    pub const SIZE: usize = GENERIC_HEADER_SIZE;

    /// Parse payload header from bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(IkeError::BufferTooShort {
                required: Self::SIZE,
                available: data.len(),
            });
        }

        let next_payload = data[0];
        let critical = (data[1] & 0x80) != 0;
        let length = u16::from_be_bytes([data[2], data[3]]);

        // A payload can never be shorter than its own header
        if (length as usize) <= Self::SIZE {
            return Err(IkeError::InvalidSyntax(format!(
                "Payload length {} does not exceed generic header",
                length
            )));
        }

        Ok(PayloadHeader {
            next_payload,
            critical,
            length,
        })
    }

    /// Serialize payload header to bytes
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[0] = self.next_payload;
        bytes[1] = if self.critical { 0x80 } else { 0x00 };
        bytes[2..4].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }
}

/// Notify message types (RFC 7296 Section 3.10.1)
///
/// Values below 16384 are errors; the rest are status notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NotifyType {
    /// UNSUPPORTED_CRITICAL_PAYLOAD (1)
    UnsupportedCriticalPayload = 1,
    /// INVALID_IKE_SPI (4)
    InvalidIkeSpi = 4,
    /// INVALID_MAJOR_VERSION (5)
    InvalidMajorVersion = 5,
    /// INVALID_SYNTAX (7)
    InvalidSyntax = 7,
    /// INVALID_MESSAGE_ID (9)
    InvalidMessageId = 9,
    /// INVALID_SPI (11)
    InvalidSpi = 11,
    /// NO_PROPOSAL_CHOSEN (14)
    NoProposalChosen = 14,
    /// INVALID_KE_PAYLOAD (17)
    InvalidKePayload = 17,
    /// AUTHENTICATION_FAILED (24)
    AuthenticationFailed = 24,
    /// SINGLE_PAIR_REQUIRED (34)
    SinglePairRequired = 34,
    /// NO_ADDITIONAL_SAS (35)
    NoAdditionalSas = 35,
    /// INTERNAL_ADDRESS_FAILURE (36)
    InternalAddressFailure = 36,
    /// FAILED_CP_REQUIRED (37)
    FailedCpRequired = 37,
    /// TS_UNACCEPTABLE (38)
    TsUnacceptable = 38,
    /// INVALID_SELECTORS (39)
    InvalidSelectors = 39,
    /// TEMPORARY_FAILURE (43)
    TemporaryFailure = 43,
    /// CHILD_SA_NOT_FOUND (44)
    ChildSaNotFound = 44,
    /// INITIAL_CONTACT (16384)
    InitialContact = 16384,
    /// SET_WINDOW_SIZE (16385)
    SetWindowSize = 16385,
    /// NAT_DETECTION_SOURCE_IP (16388)
    NatDetectionSourceIp = 16388,
    /// NAT_DETECTION_DESTINATION_IP (16389)
    NatDetectionDestinationIp = 16389,
    /// COOKIE (16390)
    Cookie = 16390,
    /// USE_TRANSPORT_MODE (16391)
    UseTransportMode = 16391,
    /// REKEY_SA (16393)
    RekeySa = 16393,
    /// EAP_ONLY_AUTHENTICATION (16417)
    EapOnlyAuthentication = 16417,
    /// IKEV2_FRAGMENTATION_SUPPORTED (16430)
    FragmentationSupported = 16430,
}

impl NotifyType {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(NotifyType::UnsupportedCriticalPayload),
            4 => Some(NotifyType::InvalidIkeSpi),
            5 => Some(NotifyType::InvalidMajorVersion),
            7 => Some(NotifyType::InvalidSyntax),
            9 => Some(NotifyType::InvalidMessageId),
            11 => Some(NotifyType::InvalidSpi),
            14 => Some(NotifyType::NoProposalChosen),
            17 => Some(NotifyType::InvalidKePayload),
            24 => Some(NotifyType::AuthenticationFailed),
            34 => Some(NotifyType::SinglePairRequired),
            35 => Some(NotifyType::NoAdditionalSas),
            36 => Some(NotifyType::InternalAddressFailure),
            37 => Some(NotifyType::FailedCpRequired),
            38 => Some(NotifyType::TsUnacceptable),
            39 => Some(NotifyType::InvalidSelectors),
            43 => Some(NotifyType::TemporaryFailure),
            44 => Some(NotifyType::ChildSaNotFound),
            16384 => Some(NotifyType::InitialContact),
            16385 => Some(NotifyType::SetWindowSize),
            16388 => Some(NotifyType::NatDetectionSourceIp),
            16389 => Some(NotifyType::NatDetectionDestinationIp),
            16390 => Some(NotifyType::Cookie),
            16391 => Some(NotifyType::UseTransportMode),
            16393 => Some(NotifyType::RekeySa),
            16417 => Some(NotifyType::EapOnlyAuthentication),
            16430 => Some(NotifyType::FragmentationSupported),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Whether this is an error notification (types below 16384)
    pub fn is_error(self) -> bool {
        self.to_u16() < 16384
    }
}

/// Protocol ID carried in Notify and Delete payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NotifyProtocolId {
    /// No protocol (notification is about the message itself)
    None = 0,
    /// IKE SA
    Ike = 1,
    /// AH
    Ah = 2,
    /// ESP
    Esp = 3,
}

impl NotifyProtocolId {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(NotifyProtocolId::None),
            1 => Some(NotifyProtocolId::Ike),
            2 => Some(NotifyProtocolId::Ah),
            3 => Some(NotifyProtocolId::Esp),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// IKE Payload variants
#[derive(Debug, Clone, PartialEq)]
pub enum IkePayload {
    /// Security Association payload
    SA(SaPayload),
    /// Key Exchange payload
    KE(KePayload),
    /// Identification - Initiator
    IDi(IdPayload),
    /// Identification - Responder
    IDr(IdPayload),
    /// Certificate payload
    CERT(CertPayload),
    /// Certificate Request payload
    CERTREQ(CertReqPayload),
    /// Authentication payload
    AUTH(AuthPayload),
    /// Nonce payload
    Nonce(NoncePayload),
    /// Notify payload
    N(NotifyPayload),
    /// Delete payload
    D(DeletePayload),
    /// Vendor ID payload
    V(VendorPayload),
    /// Traffic Selector - Initiator
    TSi(TrafficSelectorsPayload),
    /// Traffic Selector - Responder
    TSr(TrafficSelectorsPayload),
    /// Encrypted and Authenticated payload (raw, pre-decryption)
    SK(RawEncryptedPayload),
    /// Encrypted and Authenticated Fragment payload (raw, pre-decryption)
    SKF(RawFragmentPayload),
    /// Configuration payload
    CP(ConfigPayload),
    /// EAP payload (raw EAP message bytes)
    EAP(EapPayload),
    /// Unrecognized payload, preserved for re-encoding
    Unsupported {
        /// Raw payload type value
        payload_type: u8,
        /// Critical bit from the generic header
        critical: bool,
        /// Raw payload data (excluding header)
        data: Vec<u8>,
    },
}

impl IkePayload {
    /// Get the raw payload type value
    pub fn payload_type(&self) -> u8 {
        match self {
            IkePayload::SA(_) => PayloadType::SA.to_u8(),
            IkePayload::KE(_) => PayloadType::KE.to_u8(),
            IkePayload::IDi(_) => PayloadType::IDi.to_u8(),
            IkePayload::IDr(_) => PayloadType::IDr.to_u8(),
            IkePayload::CERT(_) => PayloadType::CERT.to_u8(),
            IkePayload::CERTREQ(_) => PayloadType::CERTREQ.to_u8(),
            IkePayload::AUTH(_) => PayloadType::AUTH.to_u8(),
            IkePayload::Nonce(_) => PayloadType::Nonce.to_u8(),
            IkePayload::N(_) => PayloadType::N.to_u8(),
            IkePayload::D(_) => PayloadType::D.to_u8(),
            IkePayload::V(_) => PayloadType::V.to_u8(),
            IkePayload::TSi(_) => PayloadType::TSi.to_u8(),
            IkePayload::TSr(_) => PayloadType::TSr.to_u8(),
            IkePayload::SK(_) => PayloadType::SK.to_u8(),
            IkePayload::SKF(_) => PayloadType::SKF.to_u8(),
            IkePayload::CP(_) => PayloadType::CP.to_u8(),
            IkePayload::EAP(_) => PayloadType::EAP.to_u8(),
            IkePayload::Unsupported { payload_type, .. } => *payload_type,
        }
    }

    /// Parse a payload body of the given type
    ///
    /// Unknown payload types are preserved as `Unsupported`; enforcement of
    /// the critical bit happens after the whole payload list is collected.
    pub fn parse(payload_type: u8, critical: bool, data: &[u8]) -> Result<Self> {
        let typed = PayloadType::from_u8(payload_type);
        let payload = match typed {
            Some(PayloadType::SA) => IkePayload::SA(SaPayload::from_payload_data(data)?),
            Some(PayloadType::KE) => IkePayload::KE(KePayload::from_payload_data(data)?),
            Some(PayloadType::IDi) => IkePayload::IDi(IdPayload::from_payload_data(data)?),
            Some(PayloadType::IDr) => IkePayload::IDr(IdPayload::from_payload_data(data)?),
            Some(PayloadType::CERT) => IkePayload::CERT(CertPayload::from_payload_data(data)?),
            Some(PayloadType::CERTREQ) => {
                IkePayload::CERTREQ(CertReqPayload::from_payload_data(data)?)
            }
            Some(PayloadType::AUTH) => IkePayload::AUTH(AuthPayload::from_payload_data(data)?),
            Some(PayloadType::Nonce) => IkePayload::Nonce(NoncePayload::from_payload_data(data)?),
            Some(PayloadType::N) => IkePayload::N(NotifyPayload::from_payload_data(data)?),
            Some(PayloadType::D) => IkePayload::D(DeletePayload::from_payload_data(data)?),
            Some(PayloadType::V) => IkePayload::V(VendorPayload::from_payload_data(data)?),
            Some(PayloadType::TSi) => {
                IkePayload::TSi(TrafficSelectorsPayload::from_payload_data(data)?)
            }
            Some(PayloadType::TSr) => {
                IkePayload::TSr(TrafficSelectorsPayload::from_payload_data(data)?)
            }
            Some(PayloadType::SK) => IkePayload::SK(RawEncryptedPayload {
                data: data.to_vec(),
            }),
            Some(PayloadType::SKF) => IkePayload::SKF(RawFragmentPayload::from_payload_data(data)?),
            Some(PayloadType::CP) => IkePayload::CP(ConfigPayload::from_payload_data(data)?),
            Some(PayloadType::EAP) => IkePayload::EAP(EapPayload {
                data: data.to_vec(),
            }),
            Some(PayloadType::None) => {
                return Err(IkeError::InvalidSyntax(
                    "Payload type 0 cannot appear as a payload".into(),
                ))
            }
            None => IkePayload::Unsupported {
                payload_type,
                critical,
                data: data.to_vec(),
            },
        };
        Ok(payload)
    }

    /// Serialize the payload body (without the generic header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        match self {
            IkePayload::SA(p) => p.to_payload_data(),
            IkePayload::KE(p) => p.to_payload_data(),
            IkePayload::IDi(p) | IkePayload::IDr(p) => p.to_payload_data(),
            IkePayload::CERT(p) => p.to_payload_data(),
            IkePayload::CERTREQ(p) => p.to_payload_data(),
            IkePayload::AUTH(p) => p.to_payload_data(),
            IkePayload::Nonce(p) => p.to_payload_data(),
            IkePayload::N(p) => p.to_payload_data(),
            IkePayload::D(p) => p.to_payload_data(),
            IkePayload::V(p) => p.to_payload_data(),
            IkePayload::TSi(p) | IkePayload::TSr(p) => p.to_payload_data(),
            IkePayload::SK(p) => p.data.clone(),
            IkePayload::SKF(p) => p.to_payload_data(),
            IkePayload::CP(p) => p.to_payload_data(),
            IkePayload::EAP(p) => p.data.clone(),
            IkePayload::Unsupported { data, .. } => data.clone(),
        }
    }

    /// Whether the payload carries the critical bit when encoded
    pub fn is_critical(&self) -> bool {
        matches!(self, IkePayload::Unsupported { critical: true, .. })
    }
}

/// Security Association Payload (RFC 7296 Section 3.3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaPayload {
    /// Proposals, in preference order
    pub proposals: Vec<Proposal>,
}

impl SaPayload {
    /// Create new SA payload
    pub fn new(proposals: Vec<Proposal>) -> Self {
        SaPayload { proposals }
    }

    /// Parse SA payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        let proposals = Proposal::decode_list(data)?;
        Ok(SaPayload { proposals })
    }

    /// Serialize SA payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        Proposal::encode_list(&self.proposals)
    }
}

/// Key Exchange Payload (RFC 7296 Section 3.4)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KePayload {
    /// Diffie-Hellman group number
    pub dh_group: u16,

    /// Key exchange data (public value)
    pub key_data: Vec<u8>,
}

impl KePayload {
    /// Create new KE payload
    pub fn new(dh_group: u16, key_data: Vec<u8>) -> Self {
        KePayload { dh_group, key_data }
    }

    /// Parse KE payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(IkeError::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }

        let dh_group = u16::from_be_bytes([data[0], data[1]]);
        // bytes 2-3 reserved
        let key_data = data[4..].to_vec();

        Ok(KePayload { dh_group, key_data })
    }

    /// Serialize KE payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + self.key_data.len());
        data.extend_from_slice(&self.dh_group.to_be_bytes());
        data.extend_from_slice(&[0u8, 0u8]);
        data.extend_from_slice(&self.key_data);
        data
    }
}

/// Identification types (RFC 7296 Section 3.5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum IdType {
    /// IPv4 address (1)
    Ipv4Addr = 1,
    /// Fully qualified domain name (2)
    Fqdn = 2,
    /// RFC 822 email address (3)
    Rfc822Addr = 3,
    /// IPv6 address (5)
    Ipv6Addr = 5,
    /// DER-encoded ASN.1 X.500 DN (9)
    DerAsn1Dn = 9,
    /// DER-encoded ASN.1 X.509 GeneralName (10)
    DerAsn1Gn = 10,
    /// Opaque key ID (11)
    KeyId = 11,
}

impl IdType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(IdType::Ipv4Addr),
            2 => Some(IdType::Fqdn),
            3 => Some(IdType::Rfc822Addr),
            5 => Some(IdType::Ipv6Addr),
            9 => Some(IdType::DerAsn1Dn),
            10 => Some(IdType::DerAsn1Gn),
            11 => Some(IdType::KeyId),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Identification Payload (RFC 7296 Section 3.5)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdPayload {
    /// Identification type
    pub id_type: IdType,
    /// Identification data
    pub data: Vec<u8>,
}

impl IdPayload {
    /// Parse ID payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(IkeError::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }

        let id_type = IdType::from_u8(data[0])
            .ok_or_else(|| IkeError::InvalidPayload(format!("Unknown ID type: {}", data[0])))?;
        // bytes 1-3 reserved
        Ok(IdPayload {
            id_type,
            data: data[4..].to_vec(),
        })
    }

    /// Serialize ID payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.data.len());
        out.push(self.id_type.to_u8());
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Certificate Payload (RFC 7296 Section 3.6)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertPayload {
    /// Certificate encoding (4 = X.509 signature)
    pub encoding: u8,
    /// Certificate data
    pub data: Vec<u8>,
}

impl CertPayload {
    /// X.509 Certificate - Signature encoding
    pub const ENCODING_X509_SIGNATURE: u8 = 4;

    /// Parse CERT payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(IkeError::BufferTooShort {
                required: 1,
                available: 0,
            });
        }
        Ok(CertPayload {
            encoding: data[0],
            data: data[1..].to_vec(),
        })
    }

    /// Serialize CERT payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.data.len());
        out.push(self.encoding);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Certificate Request Payload (RFC 7296 Section 3.7)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertReqPayload {
    /// Certificate encoding being requested
    pub encoding: u8,
    /// Concatenated SHA-1 hashes of trusted CA certificates
    pub authorities: Vec<u8>,
}

impl CertReqPayload {
    /// Parse CERTREQ payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(IkeError::BufferTooShort {
                required: 1,
                available: 0,
            });
        }
        Ok(CertReqPayload {
            encoding: data[0],
            authorities: data[1..].to_vec(),
        })
    }

    /// Serialize CERTREQ payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.authorities.len());
        out.push(self.encoding);
        out.extend_from_slice(&self.authorities);
        out
    }
}

/// Authentication Payload (RFC 7296 Section 3.8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPayload {
    /// Authentication method
    pub auth_method: AuthMethod,
    /// Authentication data
    pub auth_data: Vec<u8>,
}

impl AuthPayload {
    /// Create new AUTH payload
    pub fn new(auth_method: AuthMethod, auth_data: Vec<u8>) -> Self {
        AuthPayload {
            auth_method,
            auth_data,
        }
    }

    /// Parse AUTH payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(IkeError::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }

        let auth_method = AuthMethod::from_u8(data[0]).ok_or_else(|| {
            IkeError::InvalidPayload(format!("Unknown auth method: {}", data[0]))
        })?;
        // bytes 1-3 reserved
        Ok(AuthPayload {
            auth_method,
            auth_data: data[4..].to_vec(),
        })
    }

    /// Serialize AUTH payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.auth_data.len());
        out.push(self.auth_method.to_u8());
        out.extend_from_slice(&[0u8; 3]);
        out.extend_from_slice(&self.auth_data);
        out
    }
}

/// Nonce Payload (RFC 7296 Section 3.9)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoncePayload {
    /// Nonce data (16-256 bytes of random data)
    pub nonce: Vec<u8>,
}

impl NoncePayload {
    /// Minimum nonce size (16 bytes)
    pub const MIN_SIZE: usize = 16;

    /// Maximum nonce size (256 bytes)
    pub const MAX_SIZE: usize = 256;

    /// Create new nonce payload
    pub fn new(nonce: Vec<u8>) -> Result<Self> {
        if nonce.len() < Self::MIN_SIZE {
            return Err(IkeError::InvalidPayload(format!(
                "Nonce too short: {} bytes (minimum {})",
                nonce.len(),
                Self::MIN_SIZE
            )));
        }

        if nonce.len() > Self::MAX_SIZE {
            return Err(IkeError::InvalidPayload(format!(
                "Nonce too long: {} bytes (maximum {})",
                nonce.len(),
                Self::MAX_SIZE
            )));
        }

        Ok(NoncePayload { nonce })
    }

    /// Parse nonce payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        Self::new(data.to_vec())
    }

    /// Serialize nonce payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        self.nonce.clone()
    }
}

/// Notify Payload (RFC 7296 Section 3.10)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Next Payload  |C|  RESERVED   |         Payload Length        |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Protocol ID  |   SPI Size    |      Notify Message Type      |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                Security Parameter Index (SPI)                 ~
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ~                       Notification Data                       ~
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyPayload {
    /// Protocol this notification concerns
    pub protocol_id: NotifyProtocolId,
    /// SPI of the concerned SA (empty when SPI size is 0)
    pub spi: Vec<u8>,
    /// Raw notify message type (unknown values preserved)
    pub notify_type_raw: u16,
    /// Notification data
    pub data: Vec<u8>,
}

impl NotifyPayload {
    /// Create a status notification without SPI
    pub fn status(notify_type: NotifyType, data: Vec<u8>) -> Self {
        NotifyPayload {
            protocol_id: NotifyProtocolId::None,
            spi: Vec::new(),
            notify_type_raw: notify_type.to_u16(),
            data,
        }
    }

    /// Create an error notification without SPI or data
    pub fn error(notify_type: NotifyType) -> Self {
        NotifyPayload {
            protocol_id: NotifyProtocolId::None,
            spi: Vec::new(),
            notify_type_raw: notify_type.to_u16(),
            data: Vec::new(),
        }
    }

    /// Recognized notify type, if any
    pub fn notify_type(&self) -> Option<NotifyType> {
        NotifyType::from_u16(self.notify_type_raw)
    }

    /// Parse notify payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(IkeError::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }

        let protocol_id = NotifyProtocolId::from_u8(data[0]).ok_or_else(|| {
            IkeError::InvalidPayload(format!("Unknown notify protocol ID: {}", data[0]))
        })?;
        let spi_size = data[1] as usize;
        let notify_type_raw = u16::from_be_bytes([data[2], data[3]]);

        if data.len() < 4 + spi_size {
            return Err(IkeError::InvalidSyntax(format!(
                "Notify SPI size {} exceeds payload",
                spi_size
            )));
        }

        Ok(NotifyPayload {
            protocol_id,
            spi: data[4..4 + spi_size].to_vec(),
            notify_type_raw,
            data: data[4 + spi_size..].to_vec(),
        })
    }

    /// Serialize notify payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.spi.len() + self.data.len());
        out.push(self.protocol_id.to_u8());
        out.push(self.spi.len() as u8);
        out.extend_from_slice(&self.notify_type_raw.to_be_bytes());
        out.extend_from_slice(&self.spi);
        out.extend_from_slice(&self.data);
        out
    }
}

/// Delete Payload (RFC 7296 Section 3.11)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePayload {
    /// Protocol of the SAs being deleted
    pub protocol_id: NotifyProtocolId,
    /// SPI size in bytes (0 for IKE, 4 for ESP/AH)
    pub spi_size: u8,
    /// SPIs being deleted
    pub spis: Vec<Vec<u8>>,
}

impl DeletePayload {
    /// Create delete payload for the IKE SA itself
    pub fn delete_ike_sa() -> Self {
        DeletePayload {
            protocol_id: NotifyProtocolId::Ike,
            spi_size: 0,
            spis: Vec::new(),
        }
    }

    /// Create delete payload for ESP Child SAs
    pub fn delete_child_sas(spis: Vec<u32>) -> Self {
        DeletePayload {
            protocol_id: NotifyProtocolId::Esp,
            spi_size: 4,
            spis: spis.into_iter().map(|s| s.to_be_bytes().to_vec()).collect(),
        }
    }

    /// Parse delete payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(IkeError::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }

        let protocol_id = NotifyProtocolId::from_u8(data[0]).ok_or_else(|| {
            IkeError::InvalidPayload(format!("Unknown delete protocol ID: {}", data[0]))
        })?;
        let spi_size = data[1];
        let num_spis = u16::from_be_bytes([data[2], data[3]]) as usize;

        let expected = 4 + num_spis * spi_size as usize;
        if data.len() != expected {
            return Err(IkeError::InvalidSyntax(format!(
                "Delete payload length {} does not match {} SPIs of size {}",
                data.len(),
                num_spis,
                spi_size
            )));
        }

        let mut spis = Vec::with_capacity(num_spis);
        let mut offset = 4;
        for _ in 0..num_spis {
            spis.push(data[offset..offset + spi_size as usize].to_vec());
            offset += spi_size as usize;
        }

        Ok(DeletePayload {
            protocol_id,
            spi_size,
            spis,
        })
    }

    /// Serialize delete payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.spis.len() * self.spi_size as usize);
        out.push(self.protocol_id.to_u8());
        out.push(self.spi_size);
        out.extend_from_slice(&(self.spis.len() as u16).to_be_bytes());
        for spi in &self.spis {
            out.extend_from_slice(spi);
        }
        out
    }
}

/// Vendor ID Payload (RFC 7296 Section 3.12)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorPayload {
    /// Opaque vendor data
    pub data: Vec<u8>,
}

impl VendorPayload {
    /// Parse vendor payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        Ok(VendorPayload {
            data: data.to_vec(),
        })
    }

    /// Serialize vendor payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        self.data.clone()
    }
}

/// Traffic selector types (RFC 7296 Section 3.13.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TsType {
    /// IPv4 address range (7)
    Ipv4AddrRange = 7,
    /// IPv6 address range (8)
    Ipv6AddrRange = 8,
}

impl TsType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            7 => Some(TsType::Ipv4AddrRange),
            8 => Some(TsType::Ipv6AddrRange),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Encoded selector length for this type
    pub fn selector_length(self) -> usize {
        match self {
            TsType::Ipv4AddrRange => TrafficSelector::IPV4_LEN,
            TsType::Ipv6AddrRange => TrafficSelector::IPV6_LEN,
        }
    }
}

/// One traffic selector: an address range plus a port range
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   TS Type     |IP Protocol ID*|       Selector Length         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |           Start Port*         |           End Port*           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Starting Address*                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Ending Address*                       |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficSelector {
    /// Selector type
    pub ts_type: TsType,
    /// IP protocol ID (0 = any)
    pub protocol_id: u8,
    /// First port in range
    pub start_port: u16,
    /// Last port in range (inclusive)
    pub end_port: u16,
    /// First address in range
    pub start_addr: IpAddr,
    /// Last address in range (inclusive)
    pub end_addr: IpAddr,
}

impl TrafficSelector {
    /// Encoded length of an IPv4 selector
    pub const IPV4_LEN: usize = 16;

    /// Encoded length of an IPv6 selector
    pub const IPV6_LEN: usize = 40;

    /// Create a traffic selector, validating all range invariants
    pub fn new(
        ts_type: TsType,
        protocol_id: u8,
        start_port: u16,
        end_port: u16,
        start_addr: IpAddr,
        end_addr: IpAddr,
    ) -> Result<Self> {
        if start_port > end_port {
            return Err(IkeError::InvalidParameter(format!(
                "Invalid port range: {} > {}",
                start_port, end_port
            )));
        }

        match (ts_type, start_addr, end_addr) {
            (TsType::Ipv4AddrRange, IpAddr::V4(s), IpAddr::V4(e)) => {
                if s.octets() > e.octets() {
                    return Err(IkeError::InvalidParameter(
                        "Starting address is larger than ending address".into(),
                    ));
                }
            }
            (TsType::Ipv6AddrRange, IpAddr::V6(s), IpAddr::V6(e)) => {
                if s.octets() > e.octets() {
                    return Err(IkeError::InvalidParameter(
                        "Starting address is larger than ending address".into(),
                    ));
                }
            }
            _ => {
                return Err(IkeError::InvalidParameter(
                    "Address family does not match selector type".into(),
                ))
            }
        }

        Ok(TrafficSelector {
            ts_type,
            protocol_id,
            start_port,
            end_port,
            start_addr,
            end_addr,
        })
    }

    /// Selector covering all IPv4 addresses and ports
    pub fn ipv4_any() -> Self {
        TrafficSelector {
            ts_type: TsType::Ipv4AddrRange,
            protocol_id: 0,
            start_port: 0,
            end_port: 65535,
            start_addr: IpAddr::V4([0, 0, 0, 0].into()),
            end_addr: IpAddr::V4([255, 255, 255, 255].into()),
        }
    }

    /// Selector covering all IPv6 addresses and ports
    pub fn ipv6_any() -> Self {
        TrafficSelector {
            ts_type: TsType::Ipv6AddrRange,
            protocol_id: 0,
            start_port: 0,
            end_port: 65535,
            start_addr: IpAddr::V6([0u8; 16].into()),
            end_addr: IpAddr::V6([0xFFu8; 16].into()),
        }
    }

    /// Encoded length of this selector
    pub fn selector_length(&self) -> usize {
        self.ts_type.selector_length()
    }

    /// Whether this selector fully covers `other`
    pub fn contains(&self, other: &TrafficSelector) -> bool {
        if self.ts_type != other.ts_type || self.protocol_id != other.protocol_id {
            return false;
        }
        if self.start_port > other.start_port || self.end_port < other.end_port {
            return false;
        }
        match (
            &self.start_addr,
            &self.end_addr,
            &other.start_addr,
            &other.end_addr,
        ) {
            (IpAddr::V4(s1), IpAddr::V4(e1), IpAddr::V4(s2), IpAddr::V4(e2)) => {
                s1.octets() <= s2.octets() && e1.octets() >= e2.octets()
            }
            (IpAddr::V6(s1), IpAddr::V6(e1), IpAddr::V6(s2), IpAddr::V6(e2)) => {
                s1.octets() <= s2.octets() && e1.octets() >= e2.octets()
            }
            _ => false,
        }
    }

    /// Parse one selector, returning it and the bytes consumed
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 8 {
            return Err(IkeError::BufferTooShort {
                required: 8,
                available: data.len(),
            });
        }

        let ts_type = TsType::from_u8(data[0]).ok_or_else(|| {
            IkeError::InvalidSyntax(format!("Unknown traffic selector type: {}", data[0]))
        })?;
        let protocol_id = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;

        if length != ts_type.selector_length() {
            return Err(IkeError::InvalidSyntax(format!(
                "Traffic selector length {} invalid for type {:?}",
                length, ts_type
            )));
        }
        if data.len() < length {
            return Err(IkeError::InvalidSyntax(format!(
                "Traffic selector length {} exceeds remaining {} bytes",
                length,
                data.len()
            )));
        }

        let start_port = u16::from_be_bytes([data[4], data[5]]);
        let end_port = u16::from_be_bytes([data[6], data[7]]);

        let (start_addr, end_addr) = match ts_type {
            TsType::Ipv4AddrRange => {
                let mut s = [0u8; 4];
                let mut e = [0u8; 4];
                s.copy_from_slice(&data[8..12]);
                e.copy_from_slice(&data[12..16]);
                (IpAddr::V4(s.into()), IpAddr::V4(e.into()))
            }
            TsType::Ipv6AddrRange => {
                let mut s = [0u8; 16];
                let mut e = [0u8; 16];
                s.copy_from_slice(&data[8..24]);
                e.copy_from_slice(&data[24..40]);
                (IpAddr::V6(s.into()), IpAddr::V6(e.into()))
            }
        };

        let ts = Self::new(ts_type, protocol_id, start_port, end_port, start_addr, end_addr)
            .map_err(|_| IkeError::InvalidSyntax("Traffic selector range invalid".into()))?;

        Ok((ts, length))
    }

    /// Serialize this selector
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.selector_length());
        out.push(self.ts_type.to_u8());
        out.push(self.protocol_id);
        out.extend_from_slice(&(self.selector_length() as u16).to_be_bytes());
        out.extend_from_slice(&self.start_port.to_be_bytes());
        out.extend_from_slice(&self.end_port.to_be_bytes());
        match (&self.start_addr, &self.end_addr) {
            (IpAddr::V4(s), IpAddr::V4(e)) => {
                out.extend_from_slice(&s.octets());
                out.extend_from_slice(&e.octets());
            }
            (IpAddr::V6(s), IpAddr::V6(e)) => {
                out.extend_from_slice(&s.octets());
                out.extend_from_slice(&e.octets());
            }
            _ => unreachable!("constructor enforces matching families"),
        }
        out
    }
}

/// Traffic Selector Payload (RFC 7296 Section 3.13)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficSelectorsPayload {
    /// Selectors in this payload
    pub selectors: Vec<TrafficSelector>,
}

impl TrafficSelectorsPayload {
    /// Create new TS payload
    pub fn new(selectors: Vec<TrafficSelector>) -> Self {
        TrafficSelectorsPayload { selectors }
    }

    /// Parse TS payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(IkeError::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }

        let num_ts = data[0] as usize;
        // bytes 1-3 reserved
        let selectors = decode_traffic_selectors(num_ts, &data[4..])?;
        Ok(TrafficSelectorsPayload { selectors })
    }

    /// Serialize TS payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = vec![self.selectors.len() as u8, 0, 0, 0];
        for ts in &self.selectors {
            out.extend_from_slice(&ts.to_bytes());
        }
        out
    }
}

/// Decode exactly `num_ts` selectors from `data`
///
/// Trailing bytes after the last selector are a syntax error.
pub fn decode_traffic_selectors(num_ts: usize, data: &[u8]) -> Result<Vec<TrafficSelector>> {
    let mut selectors = Vec::with_capacity(num_ts);
    let mut offset = 0;

    for _ in 0..num_ts {
        let (ts, consumed) = TrafficSelector::from_bytes(&data[offset..])?;
        selectors.push(ts);
        offset += consumed;
    }

    if offset != data.len() {
        return Err(IkeError::InvalidSyntax(format!(
            "{} trailing bytes after traffic selectors",
            data.len() - offset
        )));
    }

    Ok(selectors)
}

/// Raw Encrypted payload (RFC 7296 Section 3.14) before decryption
///
/// The IV/ciphertext/checksum split depends on the negotiated algorithms,
/// so the wire codec keeps the body opaque; the envelope layer interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEncryptedPayload {
    /// IV || ciphertext || integrity checksum
    pub data: Vec<u8>,
}

/// Raw Encrypted Fragment payload (RFC 7383 Section 2.5) before decryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFragmentPayload {
    /// Fragment number, starting from 1
    pub fragment_num: u16,
    /// Total number of fragments
    pub total_fragments: u16,
    /// IV || ciphertext || integrity checksum
    pub data: Vec<u8>,
}

impl RawFragmentPayload {
    /// Parse SKF payload from data (without generic header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(IkeError::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }

        let fragment_num = u16::from_be_bytes([data[0], data[1]]);
        let total_fragments = u16::from_be_bytes([data[2], data[3]]);

        if fragment_num < 1 || total_fragments < 1 || fragment_num > total_fragments {
            return Err(IkeError::InvalidSyntax(format!(
                "Invalid fragment numbering: {}/{}",
                fragment_num, total_fragments
            )));
        }

        Ok(RawFragmentPayload {
            fragment_num,
            total_fragments,
            data: data[4..].to_vec(),
        })
    }

    /// Serialize SKF payload to bytes (without generic header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.data.len());
        out.extend_from_slice(&self.fragment_num.to_be_bytes());
        out.extend_from_slice(&self.total_fragments.to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Configuration attribute inside a CP payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigAttribute {
    /// Attribute type (e.g. 1 = INTERNAL_IP4_ADDRESS)
    pub attr_type: u16,
    /// Attribute value (may be empty for requests)
    pub value: Vec<u8>,
}

/// Configuration Payload (RFC 7296 Section 3.15)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPayload {
    /// CFG type (1 = request, 2 = reply)
    pub cfg_type: u8,
    /// Attributes
    pub attributes: Vec<ConfigAttribute>,
}

impl ConfigPayload {
    /// CFG_REQUEST
    pub const CFG_REQUEST: u8 = 1;
    /// CFG_REPLY
    pub const CFG_REPLY: u8 = 2;

    /// Parse CP payload from data (without header)
    pub fn from_payload_data(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(IkeError::BufferTooShort {
                required: 4,
                available: data.len(),
            });
        }

        let cfg_type = data[0];
        // bytes 1-3 reserved
        let mut attributes = Vec::new();
        let mut offset = 4;

        while offset < data.len() {
            if data.len() - offset < 4 {
                return Err(IkeError::InvalidSyntax(
                    "Truncated configuration attribute header".into(),
                ));
            }
            // High bit of the attribute type is reserved
            let attr_type = u16::from_be_bytes([data[offset] & 0x7F, data[offset + 1]]);
            let length = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4;

            if data.len() - offset < length {
                return Err(IkeError::InvalidSyntax(format!(
                    "Configuration attribute length {} exceeds payload",
                    length
                )));
            }
            attributes.push(ConfigAttribute {
                attr_type,
                value: data[offset..offset + length].to_vec(),
            });
            offset += length;
        }

        Ok(ConfigPayload {
            cfg_type,
            attributes,
        })
    }

    /// Serialize CP payload to bytes (without header)
    pub fn to_payload_data(&self) -> Vec<u8> {
        let mut out = vec![self.cfg_type, 0, 0, 0];
        for attr in &self.attributes {
            out.extend_from_slice(&attr.attr_type.to_be_bytes());
            out.extend_from_slice(&(attr.value.len() as u16).to_be_bytes());
            out.extend_from_slice(&attr.value);
        }
        out
    }
}

/// EAP Payload (RFC 7296 Section 3.16)
///
/// The body is a complete EAP message; the EAP module owns its codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPayload {
    /// Raw EAP message bytes
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        ::hex::decode(s).unwrap()
    }

    #[test]
    fn test_payload_header_parse() {
        let data = [33, 0x80, 0, 50];

        let header = PayloadHeader::from_bytes(&data).unwrap();
        assert_eq!(header.next_payload, 33);
        assert!(header.critical);
        assert_eq!(header.length, 50);
    }

    #[test]
    fn test_payload_header_length_must_exceed_header() {
        // Declared length equal to the generic header is invalid
        let data = [33, 0, 0, 4];
        assert!(matches!(
            PayloadHeader::from_bytes(&data),
            Err(IkeError::InvalidSyntax(_))
        ));

        let data = [33, 0, 0, 2];
        assert!(PayloadHeader::from_bytes(&data).is_err());
    }

    #[test]
    fn test_nonce_payload_limits() {
        assert!(NoncePayload::new(vec![1u8; 16]).is_ok());
        assert!(NoncePayload::new(vec![1u8; 10]).is_err());
        assert!(NoncePayload::new(vec![1u8; 300]).is_err());
    }

    #[test]
    fn test_ke_payload_roundtrip() {
        let ke = KePayload::new(14, vec![0xAA; 256]);
        let data = ke.to_payload_data();
        assert_eq!(&data[0..2], &14u16.to_be_bytes());
        assert_eq!(&data[2..4], &[0, 0]);

        let parsed = KePayload::from_payload_data(&data).unwrap();
        assert_eq!(parsed, ke);
    }

    #[test]
    fn test_id_payload_roundtrip() {
        let id = IdPayload {
            id_type: IdType::Rfc822Addr,
            data: b"0123456789@example.org".to_vec(),
        };
        let parsed = IdPayload::from_payload_data(&id.to_payload_data()).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_auth_payload_roundtrip() {
        let auth = AuthPayload::new(AuthMethod::SharedKeyMic, vec![0xAB; 32]);
        let data = auth.to_payload_data();
        assert_eq!(data[0], 2);
        let parsed = AuthPayload::from_payload_data(&data).unwrap();
        assert_eq!(parsed, auth);
    }

    #[test]
    fn test_notify_payload_roundtrip() {
        let notify = NotifyPayload::status(NotifyType::Cookie, vec![0xC0; 16]);
        let data = notify.to_payload_data();
        let parsed = NotifyPayload::from_payload_data(&data).unwrap();
        assert_eq!(parsed, notify);
        assert_eq!(parsed.notify_type(), Some(NotifyType::Cookie));
        assert!(!NotifyType::Cookie.is_error());
        assert!(NotifyType::InvalidSyntax.is_error());
    }

    #[test]
    fn test_notify_payload_unknown_type_preserved() {
        // Unknown notify types are surfaced but not fatal
        let raw = [0u8, 0, 0xAB, 0xCD, 0x01, 0x02];
        let parsed = NotifyPayload::from_payload_data(&raw).unwrap();
        assert_eq!(parsed.notify_type_raw, 0xABCD);
        assert_eq!(parsed.notify_type(), None);
        assert_eq!(parsed.to_payload_data(), raw);
    }

    #[test]
    fn test_delete_payload_roundtrip() {
        let del = DeletePayload::delete_child_sas(vec![0x11223344, 0x55667788]);
        let data = del.to_payload_data();
        let parsed = DeletePayload::from_payload_data(&data).unwrap();
        assert_eq!(parsed, del);
        assert_eq!(parsed.spis.len(), 2);

        let del_ike = DeletePayload::delete_ike_sa();
        let parsed = DeletePayload::from_payload_data(&del_ike.to_payload_data()).unwrap();
        assert_eq!(parsed.protocol_id, NotifyProtocolId::Ike);
        assert!(parsed.spis.is_empty());
    }

    #[test]
    fn test_delete_payload_length_mismatch() {
        // Claims 2 SPIs of 4 bytes but carries only one
        let raw = [3u8, 4, 0, 2, 1, 2, 3, 4];
        assert!(matches!(
            DeletePayload::from_payload_data(&raw),
            Err(IkeError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_traffic_selector_decode_ipv4() {
        let (ts, consumed) =
            TrafficSelector::from_bytes(&hex("070000100010fff0c0000264c0000365")).unwrap();

        assert_eq!(consumed, 16);
        assert_eq!(ts.ts_type, TsType::Ipv4AddrRange);
        assert_eq!(ts.protocol_id, 0);
        assert_eq!(ts.selector_length(), 16);
        assert_eq!(ts.start_port, 16);
        assert_eq!(ts.end_port, 65520);
        assert_eq!(ts.start_addr, "192.0.2.100".parse::<IpAddr>().unwrap());
        assert_eq!(ts.end_addr, "192.0.3.101".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_traffic_selector_encode_ipv4() {
        let ts = TrafficSelector::new(
            TsType::Ipv4AddrRange,
            0,
            16,
            65520,
            "192.0.2.100".parse().unwrap(),
            "192.0.3.101".parse().unwrap(),
        )
        .unwrap();

        assert_eq!(ts.to_bytes(), hex("070000100010fff0c0000264c0000365"));
    }

    #[test]
    fn test_traffic_selector_invalid_port_range() {
        let result = decode_traffic_selectors(1, &hex("0700001022221111c0000464c0000466"));
        assert!(matches!(result, Err(IkeError::InvalidSyntax(_))));
    }

    #[test]
    fn test_traffic_selector_invalid_address_range() {
        let result = decode_traffic_selectors(1, &hex("070000100000ffffc0000466c0000366"));
        assert!(matches!(result, Err(IkeError::InvalidSyntax(_))));
    }

    #[test]
    fn test_traffic_selector_trailing_bytes() {
        let result = decode_traffic_selectors(1, &hex("070000100010fff0c0000264c0000365FFFF"));
        assert!(matches!(result, Err(IkeError::InvalidSyntax(_))));
    }

    #[test]
    fn test_traffic_selector_invalid_type() {
        let mut data = hex("070000100010fff0c0000264c0000365");
        data[0] = 0xFF;
        assert!(matches!(
            decode_traffic_selectors(1, &data),
            Err(IkeError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_traffic_selector_invalid_length_field() {
        let mut data = hex("070000100010fff0c0000264c0000365");
        data[2] = 0;
        data[3] = 0;
        assert!(matches!(
            decode_traffic_selectors(1, &data),
            Err(IkeError::InvalidSyntax(_))
        ));
    }

    #[test]
    fn test_traffic_selector_contains() {
        let outer = TrafficSelector::new(
            TsType::Ipv4AddrRange,
            0,
            16,
            65520,
            "192.0.2.100".parse().unwrap(),
            "192.0.3.101".parse().unwrap(),
        )
        .unwrap();

        let inner = TrafficSelector::new(
            TsType::Ipv4AddrRange,
            0,
            17,
            65520,
            "192.0.2.100".parse().unwrap(),
            "192.0.3.101".parse().unwrap(),
        )
        .unwrap();

        assert!(outer.contains(&outer));
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&TrafficSelector::ipv6_any()));
        assert!(TrafficSelector::ipv4_any().contains(&outer));
    }

    #[test]
    fn test_traffic_selector_constructor_rejects_mixed_families() {
        let result = TrafficSelector::new(
            TsType::Ipv4AddrRange,
            0,
            0,
            65535,
            "::1".parse().unwrap(),
            "192.0.2.1".parse().unwrap(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_traffic_selector_constructor_rejects_bad_ranges() {
        assert!(TrafficSelector::new(
            TsType::Ipv4AddrRange,
            0,
            100,
            10,
            "192.0.2.1".parse().unwrap(),
            "192.0.2.2".parse().unwrap(),
        )
        .is_err());

        assert!(TrafficSelector::new(
            TsType::Ipv4AddrRange,
            0,
            0,
            65535,
            "192.0.2.2".parse().unwrap(),
            "192.0.2.1".parse().unwrap(),
        )
        .is_err());
    }

    #[test]
    fn test_ts_payload_roundtrip() {
        let payload = TrafficSelectorsPayload::new(vec![
            TrafficSelector::ipv4_any(),
            TrafficSelector::ipv6_any(),
        ]);
        let data = payload.to_payload_data();
        let parsed = TrafficSelectorsPayload::from_payload_data(&data).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_skf_payload_fragment_validation() {
        // fragment_num 0 is invalid
        let raw = [0u8, 0, 0, 2, 1, 2, 3];
        assert!(RawFragmentPayload::from_payload_data(&raw).is_err());

        // fragment_num > total_fragments is invalid
        let raw = [0u8, 3, 0, 2, 1, 2, 3];
        assert!(RawFragmentPayload::from_payload_data(&raw).is_err());

        let raw = [0u8, 1, 0, 2, 1, 2, 3];
        let parsed = RawFragmentPayload::from_payload_data(&raw).unwrap();
        assert_eq!(parsed.fragment_num, 1);
        assert_eq!(parsed.total_fragments, 2);
        assert_eq!(parsed.data, vec![1, 2, 3]);
        assert_eq!(parsed.to_payload_data(), raw);
    }

    #[test]
    fn test_config_payload_roundtrip() {
        let cp = ConfigPayload {
            cfg_type: ConfigPayload::CFG_REQUEST,
            attributes: vec![
                ConfigAttribute {
                    attr_type: 1,
                    value: Vec::new(),
                },
                ConfigAttribute {
                    attr_type: 3,
                    value: vec![8, 8, 8, 8],
                },
            ],
        };
        let parsed = ConfigPayload::from_payload_data(&cp.to_payload_data()).unwrap();
        assert_eq!(parsed, cp);
    }

    #[test]
    fn test_unknown_payload_preserved() {
        let payload = IkePayload::parse(200, false, &[1, 2, 3]).unwrap();
        match &payload {
            IkePayload::Unsupported {
                payload_type,
                critical,
                data,
            } => {
                assert_eq!(*payload_type, 200);
                assert!(!critical);
                assert_eq!(data, &vec![1, 2, 3]);
            }
            other => panic!("Expected Unsupported, got {:?}", other),
        }
        assert_eq!(payload.payload_type(), 200);
        assert!(!payload.is_critical());

        let critical = IkePayload::parse(201, true, &[]).unwrap();
        assert!(critical.is_critical());
    }
}
