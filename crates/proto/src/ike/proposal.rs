//! IKEv2 Proposal and Transform structures
//!
//! Implements SA proposal negotiation as defined in RFC 7296 Section 3.3.
//!
//! # Structure
//!
//! ```text
//! SA Payload
//!   └── Proposal(s)
//!         └── Transform(s)
//!               └── Attribute(s)
//! ```

use crate::ike::{IkeError, Result};

/// Transform Type (RFC 7296 Section 3.3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransformType {
    /// Encryption Algorithm (ENCR)
    Encr = 1,
    /// Pseudo-random Function (PRF)
    Prf = 2,
    /// Integrity Algorithm (INTEG)
    Integ = 3,
    /// Diffie-Hellman Group (D-H)
    Dh = 4,
    /// Extended Sequence Numbers (ESN)
    Esn = 5,
}

impl TransformType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(TransformType::Encr),
            2 => Some(TransformType::Prf),
            3 => Some(TransformType::Integ),
            4 => Some(TransformType::Dh),
            5 => Some(TransformType::Esn),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Transform ID for Encryption (ENCR) algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EncrTransformId {
    /// AES-CBC (key length attribute required)
    AesCbc = 12,
    /// AES-CTR (key length attribute required)
    AesCtr = 13,
    /// AES-GCM with 8-byte ICV
    AesGcm8 = 18,
    /// AES-GCM with 12-byte ICV
    AesGcm12 = 19,
    /// AES-GCM with 16-byte ICV
    AesGcm16 = 20,
}

impl EncrTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            12 => Some(EncrTransformId::AesCbc),
            13 => Some(EncrTransformId::AesCtr),
            18 => Some(EncrTransformId::AesGcm8),
            19 => Some(EncrTransformId::AesGcm12),
            20 => Some(EncrTransformId::AesGcm16),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }

    /// Check if this is a combined-mode (AEAD) cipher
    pub fn is_aead(self) -> bool {
        matches!(
            self,
            EncrTransformId::AesGcm8 | EncrTransformId::AesGcm12 | EncrTransformId::AesGcm16
        )
    }
}

/// Transform ID for PRF algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum PrfTransformId {
    /// HMAC-SHA1
    HmacSha1 = 2,
    /// AES128-XCBC
    AesXcbc = 4,
    /// HMAC-SHA2-256
    HmacSha256 = 5,
    /// HMAC-SHA2-384
    HmacSha384 = 6,
    /// HMAC-SHA2-512
    HmacSha512 = 7,
    /// AES128-CMAC
    AesCmac = 8,
}

impl PrfTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            2 => Some(PrfTransformId::HmacSha1),
            4 => Some(PrfTransformId::AesXcbc),
            5 => Some(PrfTransformId::HmacSha256),
            6 => Some(PrfTransformId::HmacSha384),
            7 => Some(PrfTransformId::HmacSha512),
            8 => Some(PrfTransformId::AesCmac),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Transform ID for Integrity algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum IntegTransformId {
    /// HMAC-SHA1-96
    HmacSha1_96 = 2,
    /// AES-XCBC-96
    AesXcbc96 = 5,
    /// AES-CMAC-96
    AesCmac96 = 8,
    /// HMAC-SHA2-256-128
    HmacSha256_128 = 12,
    /// HMAC-SHA2-384-192
    HmacSha384_192 = 13,
    /// HMAC-SHA2-512-256
    HmacSha512_256 = 14,
}

impl IntegTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            2 => Some(IntegTransformId::HmacSha1_96),
            5 => Some(IntegTransformId::AesXcbc96),
            8 => Some(IntegTransformId::AesCmac96),
            12 => Some(IntegTransformId::HmacSha256_128),
            13 => Some(IntegTransformId::HmacSha384_192),
            14 => Some(IntegTransformId::HmacSha512_256),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Transform ID for Diffie-Hellman groups (RFC 3526 MODP groups)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum DhTransformId {
    /// 1024-bit MODP Group
    Modp1024 = 2,
    /// 1536-bit MODP Group
    Modp1536 = 5,
    /// 2048-bit MODP Group
    Modp2048 = 14,
    /// 3072-bit MODP Group
    Modp3072 = 15,
    /// 4096-bit MODP Group
    Modp4096 = 16,
}

impl DhTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            2 => Some(DhTransformId::Modp1024),
            5 => Some(DhTransformId::Modp1536),
            14 => Some(DhTransformId::Modp2048),
            15 => Some(DhTransformId::Modp3072),
            16 => Some(DhTransformId::Modp4096),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Transform ID for Extended Sequence Numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EsnTransformId {
    /// No extended sequence numbers
    None = 0,
    /// Extended (64-bit) sequence numbers
    Esn = 1,
}

impl EsnTransformId {
    /// Convert from u16
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(EsnTransformId::None),
            1 => Some(EsnTransformId::Esn),
            _ => None,
        }
    }

    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// Transform attribute (RFC 7296 Section 3.3.5)
///
/// Only the Key Length attribute (type 14, TV format) is defined for the
/// transforms this engine negotiates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformAttribute {
    /// Attribute type (without the AF bit)
    pub attr_type: u16,
    /// Attribute value
    pub value: Vec<u8>,
}

impl TransformAttribute {
    /// Key Length attribute type
    pub const KEY_LENGTH: u16 = 14;

    /// Attribute Format bit: set = TV (shorthand) format
    const AF_BIT: u16 = 0x8000;

    /// Create a key-length attribute (value in bits)
    pub fn key_length(bits: u16) -> Self {
        TransformAttribute {
            attr_type: Self::KEY_LENGTH,
            value: bits.to_be_bytes().to_vec(),
        }
    }

    /// Key length in bits, if this is a key-length attribute
    pub fn key_length_bits(&self) -> Option<u16> {
        if self.attr_type == Self::KEY_LENGTH && self.value.len() == 2 {
            Some(u16::from_be_bytes([self.value[0], self.value[1]]))
        } else {
            None
        }
    }

    fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(IkeError::InvalidSyntax(
                "Truncated transform attribute".into(),
            ));
        }

        let type_field = u16::from_be_bytes([data[0], data[1]]);
        let attr_type = type_field & !Self::AF_BIT;

        if type_field & Self::AF_BIT != 0 {
            // TV format: two-byte value lives in the length field
            Ok((
                TransformAttribute {
                    attr_type,
                    value: data[2..4].to_vec(),
                },
                4,
            ))
        } else {
            let length = u16::from_be_bytes([data[2], data[3]]) as usize;
            if data.len() < 4 + length {
                return Err(IkeError::InvalidSyntax(
                    "Transform attribute length exceeds data".into(),
                ));
            }
            Ok((
                TransformAttribute {
                    attr_type,
                    value: data[4..4 + length].to_vec(),
                },
                4 + length,
            ))
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        if self.value.len() == 2 {
            out.extend_from_slice(&(self.attr_type | Self::AF_BIT).to_be_bytes());
            out.extend_from_slice(&self.value);
        } else {
            out.extend_from_slice(&self.attr_type.to_be_bytes());
            out.extend_from_slice(&(self.value.len() as u16).to_be_bytes());
            out.extend_from_slice(&self.value);
        }
    }
}

/// IKE Transform
///
/// Represents a single cryptographic algorithm choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transform {
    /// Transform type
    pub transform_type: TransformType,

    /// Transform ID
    pub transform_id: u16,

    /// Attributes (key length for variable-key ciphers)
    pub attributes: Vec<TransformAttribute>,
}

impl Transform {
    /// Substructure encoding: 3 means another transform follows
    const MORE: u8 = 3;
    /// Substructure encoding: 0 means this is the last transform
    const LAST: u8 = 0;

    /// Create new transform
    pub fn new(transform_type: TransformType, transform_id: u16) -> Self {
        Transform {
            transform_type,
            transform_id,
            attributes: Vec::new(),
        }
    }

    /// Create encryption transform
    pub fn encr(id: EncrTransformId) -> Self {
        Transform::new(TransformType::Encr, id.to_u16())
    }

    /// Create encryption transform with explicit key length in bits
    pub fn encr_with_key_len(id: EncrTransformId, bits: u16) -> Self {
        Transform::new(TransformType::Encr, id.to_u16())
            .with_attribute(TransformAttribute::key_length(bits))
    }

    /// Create PRF transform
    pub fn prf(id: PrfTransformId) -> Self {
        Transform::new(TransformType::Prf, id.to_u16())
    }

    /// Create integrity transform
    pub fn integ(id: IntegTransformId) -> Self {
        Transform::new(TransformType::Integ, id.to_u16())
    }

    /// Create DH group transform
    pub fn dh(id: DhTransformId) -> Self {
        Transform::new(TransformType::Dh, id.to_u16())
    }

    /// Create ESN transform
    pub fn esn(id: EsnTransformId) -> Self {
        Transform::new(TransformType::Esn, id.to_u16())
    }

    /// Add attribute
    pub fn with_attribute(mut self, attribute: TransformAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Negotiated key length in bits, if present
    pub fn key_length_bits(&self) -> Option<u16> {
        self.attributes.iter().find_map(|a| a.key_length_bits())
    }

    /// Check if this transform is compatible with another
    ///
    /// Key lengths must match exactly when either side specifies one.
    pub fn is_compatible_with(&self, other: &Transform) -> bool {
        self.transform_type == other.transform_type
            && self.transform_id == other.transform_id
            && self.key_length_bits() == other.key_length_bits()
    }

    fn decode(data: &[u8]) -> Result<(Self, usize, bool)> {
        if data.len() < 8 {
            return Err(IkeError::InvalidSyntax("Truncated transform".into()));
        }

        let more = match data[0] {
            Self::LAST => false,
            Self::MORE => true,
            other => {
                return Err(IkeError::InvalidSyntax(format!(
                    "Invalid transform continuation byte: {}",
                    other
                )))
            }
        };
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;
        if length < 8 || length > data.len() {
            return Err(IkeError::InvalidSyntax(format!(
                "Invalid transform length: {}",
                length
            )));
        }

        let transform_type = TransformType::from_u8(data[4]).ok_or_else(|| {
            IkeError::InvalidSyntax(format!("Unknown transform type: {}", data[4]))
        })?;
        let transform_id = u16::from_be_bytes([data[6], data[7]]);

        let mut attributes = Vec::new();
        let mut offset = 8;
        while offset < length {
            let (attr, consumed) = TransformAttribute::decode(&data[offset..length])?;
            attributes.push(attr);
            offset += consumed;
        }
        if offset != length {
            return Err(IkeError::InvalidSyntax(
                "Transform attribute overruns transform length".into(),
            ));
        }

        Ok((
            Transform {
                transform_type,
                transform_id,
                attributes,
            },
            length,
            more,
        ))
    }

    fn encode(&self, is_last: bool, out: &mut Vec<u8>) {
        let mut attr_bytes = Vec::new();
        for attr in &self.attributes {
            attr.encode(&mut attr_bytes);
        }

        out.push(if is_last { Self::LAST } else { Self::MORE });
        out.push(0);
        out.extend_from_slice(&((8 + attr_bytes.len()) as u16).to_be_bytes());
        out.push(self.transform_type.to_u8());
        out.push(0);
        out.extend_from_slice(&self.transform_id.to_be_bytes());
        out.extend_from_slice(&attr_bytes);
    }
}

/// Protocol ID for proposals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProtocolId {
    /// IKE SA
    Ike = 1,
    /// AH (not negotiated by this engine)
    Ah = 2,
    /// ESP
    Esp = 3,
}

impl ProtocolId {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ProtocolId::Ike),
            2 => Some(ProtocolId::Ah),
            3 => Some(ProtocolId::Esp),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// IKE Proposal
///
/// Represents a single proposal containing one or more transforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Proposal number (1-based)
    pub proposal_num: u8,

    /// Protocol ID (IKE, ESP)
    pub protocol_id: ProtocolId,

    /// SPI - empty for the initial IKE SA negotiation
    pub spi: Vec<u8>,

    /// List of transforms
    pub transforms: Vec<Transform>,
}

impl Proposal {
    /// Substructure encoding: 2 means another proposal follows
    const MORE: u8 = 2;
    /// Substructure encoding: 0 means this is the last proposal
    const LAST: u8 = 0;

    /// Create new proposal
    pub fn new(proposal_num: u8, protocol_id: ProtocolId) -> Self {
        Proposal {
            proposal_num,
            protocol_id,
            spi: Vec::new(),
            transforms: Vec::new(),
        }
    }

    /// Add transform to proposal
    pub fn add_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Set SPI
    pub fn with_spi(mut self, spi: Vec<u8>) -> Self {
        self.spi = spi;
        self
    }

    /// Get transform by type
    pub fn get_transform(&self, transform_type: TransformType) -> Option<&Transform> {
        self.transforms
            .iter()
            .find(|t| t.transform_type == transform_type)
    }

    /// Negotiated encryption transform ID
    pub fn encr_id(&self) -> Option<EncrTransformId> {
        self.get_transform(TransformType::Encr)
            .and_then(|t| EncrTransformId::from_u16(t.transform_id))
    }

    /// Negotiated encryption key length in bits (128 when unspecified)
    pub fn encr_key_bits(&self) -> u16 {
        self.get_transform(TransformType::Encr)
            .and_then(|t| t.key_length_bits())
            .unwrap_or(128)
    }

    /// Negotiated PRF transform ID
    pub fn prf_id(&self) -> Option<PrfTransformId> {
        self.get_transform(TransformType::Prf)
            .and_then(|t| PrfTransformId::from_u16(t.transform_id))
    }

    /// Negotiated integrity transform ID
    pub fn integ_id(&self) -> Option<IntegTransformId> {
        self.get_transform(TransformType::Integ)
            .and_then(|t| IntegTransformId::from_u16(t.transform_id))
    }

    /// Negotiated DH group transform ID
    pub fn dh_id(&self) -> Option<DhTransformId> {
        self.get_transform(TransformType::Dh)
            .and_then(|t| DhTransformId::from_u16(t.transform_id))
    }

    /// Check if proposal is acceptable given a list of configured proposals
    ///
    /// Returns true if all transforms in this proposal match at least one
    /// configured proposal for the same protocol.
    pub fn is_acceptable(&self, configured: &[Proposal]) -> bool {
        for config in configured {
            if config.protocol_id != self.protocol_id {
                continue;
            }

            let all_match = self.transforms.iter().all(|our_transform| {
                config
                    .transforms
                    .iter()
                    .any(|config_transform| our_transform.is_compatible_with(config_transform))
            });

            if all_match {
                return true;
            }
        }

        false
    }

    /// Decode a proposal list from SA payload data
    ///
    /// Validates interior lengths, continuation bytes, and trailing data.
    pub fn decode_list(data: &[u8]) -> Result<Vec<Proposal>> {
        let mut proposals = Vec::new();
        let mut offset = 0;
        let mut expect_more = true;

        while expect_more {
            if data.len() - offset < 8 {
                return Err(IkeError::InvalidSyntax("Truncated proposal".into()));
            }
            let chunk = &data[offset..];

            expect_more = match chunk[0] {
                Self::LAST => false,
                Self::MORE => true,
                other => {
                    return Err(IkeError::InvalidSyntax(format!(
                        "Invalid proposal continuation byte: {}",
                        other
                    )))
                }
            };

            let length = u16::from_be_bytes([chunk[2], chunk[3]]) as usize;
            if length < 8 || length > chunk.len() {
                return Err(IkeError::InvalidSyntax(format!(
                    "Invalid proposal length: {}",
                    length
                )));
            }

            let proposal_num = chunk[4];
            let protocol_id = ProtocolId::from_u8(chunk[5]).ok_or_else(|| {
                IkeError::InvalidSyntax(format!("Unknown protocol ID: {}", chunk[5]))
            })?;
            let spi_size = chunk[6] as usize;
            let num_transforms = chunk[7] as usize;

            if length < 8 + spi_size {
                return Err(IkeError::InvalidSyntax(
                    "Proposal SPI overruns proposal length".into(),
                ));
            }
            let spi = chunk[8..8 + spi_size].to_vec();

            let mut transforms = Vec::with_capacity(num_transforms);
            let mut t_offset = 8 + spi_size;
            let mut t_more = num_transforms > 0;
            while t_more {
                let (transform, consumed, more) = Transform::decode(&chunk[t_offset..length])?;
                transforms.push(transform);
                t_offset += consumed;
                t_more = more;
            }

            if t_offset != length {
                return Err(IkeError::InvalidSyntax(
                    "Transform list does not fill proposal length".into(),
                ));
            }
            if transforms.len() != num_transforms {
                return Err(IkeError::InvalidSyntax(format!(
                    "Proposal declares {} transforms but carries {}",
                    num_transforms,
                    transforms.len()
                )));
            }

            proposals.push(Proposal {
                proposal_num,
                protocol_id,
                spi,
                transforms,
            });
            offset += length;
        }

        if offset != data.len() {
            return Err(IkeError::InvalidSyntax(format!(
                "{} trailing bytes after proposal list",
                data.len() - offset
            )));
        }
        if proposals.is_empty() {
            return Err(IkeError::InvalidSyntax("Empty proposal list".into()));
        }

        Ok(proposals)
    }

    /// Encode a proposal list into SA payload data
    pub fn encode_list(proposals: &[Proposal]) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, proposal) in proposals.iter().enumerate() {
            let is_last = i + 1 == proposals.len();

            let mut transform_bytes = Vec::new();
            for (j, transform) in proposal.transforms.iter().enumerate() {
                transform.encode(j + 1 == proposal.transforms.len(), &mut transform_bytes);
            }

            let length = 8 + proposal.spi.len() + transform_bytes.len();
            out.push(if is_last { Self::LAST } else { Self::MORE });
            out.push(0);
            out.extend_from_slice(&(length as u16).to_be_bytes());
            out.push(proposal.proposal_num);
            out.push(proposal.protocol_id.to_u8());
            out.push(proposal.spi.len() as u8);
            out.push(proposal.transforms.len() as u8);
            out.extend_from_slice(&proposal.spi);
            out.extend_from_slice(&transform_bytes);
        }
        out
    }
}

/// Select first acceptable proposal from a list
///
/// This implements the proposal selection algorithm from RFC 7296
/// Section 2.7.
pub fn select_proposal<'a>(
    offered: &'a [Proposal],
    configured: &[Proposal],
) -> Result<&'a Proposal> {
    for proposal in offered {
        if proposal.is_acceptable(configured) {
            return Ok(proposal);
        }
    }

    Err(IkeError::NoProposalChosen)
}
