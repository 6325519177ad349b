//! IKEv2 message structures and parsing
//!
//! Implements the IKE message format defined in RFC 7296 Section 3.1 and the
//! next-payload chain walking shared by plaintext messages and decrypted
//! SK/SKF bodies.

use super::constants::*;
use super::payload::{IkePayload, PayloadHeader};
use crate::ike::{IkeError, Result};

/// IKE message header (28 bytes)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       IKE SA Initiator's SPI                  |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       IKE SA Responder's SPI                  |
/// |                                                               |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Next Payload | MjVer | MnVer | Exchange Type |     Flags     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          Message ID                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                            Length                             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IkeHeader {
    /// Initiator's Security Parameter Index (8 bytes)
    pub initiator_spi: [u8; 8],

    /// Responder's Security Parameter Index (8 bytes, zero in the first
    /// IKE_SA_INIT request)
    pub responder_spi: [u8; 8],

    /// First payload type in the chain (raw value)
    pub next_payload: u8,

    /// Protocol version (must be 0x20 for IKEv2)
    pub version: u8,

    /// Exchange type
    pub exchange_type: ExchangeType,

    /// Message flags
    pub flags: IkeFlags,

    /// Message ID (request/response matching and replay protection)
    pub message_id: u32,

    /// Total message length in bytes (including header)
    pub length: u32,
}

impl IkeHeader {
    /// Create a new IKE header
    pub fn new(
        initiator_spi: [u8; 8],
        responder_spi: [u8; 8],
        next_payload: PayloadType,
        exchange_type: ExchangeType,
        flags: IkeFlags,
        message_id: u32,
        length: u32,
    ) -> Self {
        IkeHeader {
            initiator_spi,
            responder_spi,
            next_payload: next_payload.to_u8(),
            version: IKE_VERSION,
            exchange_type,
            flags,
            message_id,
            length,
        }
    }

    /// Parse IKE header from bytes
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Buffer is too short (< 28 bytes)
    /// - Protocol version is not 0x20
    /// - Exchange type is unknown
    /// - Declared length is out of range
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < IKE_HEADER_SIZE {
            return Err(IkeError::BufferTooShort {
                required: IKE_HEADER_SIZE,
                available: data.len(),
            });
        }

        let mut initiator_spi = [0u8; 8];
        let mut responder_spi = [0u8; 8];
        initiator_spi.copy_from_slice(&data[0..8]);
        responder_spi.copy_from_slice(&data[8..16]);

        let next_payload = data[16];

        let version = data[17];
        if version != IKE_VERSION {
            return Err(IkeError::UnsupportedVersion(version));
        }

        let exchange_type = ExchangeType::from_u8(data[18])
            .ok_or(IkeError::UnsupportedExchangeType(data[18]))?;

        let flags = IkeFlags::new(data[19]);
        let message_id = u32::from_be_bytes([data[20], data[21], data[22], data[23]]);
        let length = u32::from_be_bytes([data[24], data[25], data[26], data[27]]);

        if length > MAX_IKE_MESSAGE_SIZE {
            return Err(IkeError::MessageTooLarge(length));
        }
        if length < IKE_HEADER_SIZE as u32 {
            return Err(IkeError::InvalidLength {
                expected: IKE_HEADER_SIZE,
                actual: length as usize,
            });
        }

        Ok(IkeHeader {
            initiator_spi,
            responder_spi,
            next_payload,
            version,
            exchange_type,
            flags,
            message_id,
            length,
        })
    }

    /// Serialize IKE header to bytes
    pub fn to_bytes(&self) -> [u8; IKE_HEADER_SIZE] {
        let mut bytes = [0u8; IKE_HEADER_SIZE];
        bytes[0..8].copy_from_slice(&self.initiator_spi);
        bytes[8..16].copy_from_slice(&self.responder_spi);
        bytes[16] = self.next_payload;
        bytes[17] = self.version;
        bytes[18] = self.exchange_type.to_u8();
        bytes[19] = self.flags.value();
        bytes[20..24].copy_from_slice(&self.message_id.to_be_bytes());
        bytes[24..28].copy_from_slice(&self.length.to_be_bytes());
        bytes
    }
}

/// Decode a next-payload chain
///
/// Walks the chain starting at `first_type` until the NO_NEXT sentinel.
/// Fails with invalid-syntax when a declared payload length does not exceed
/// the generic header, exceeds the remaining bytes, or when bytes remain
/// after the chain ends. After the whole list is collected, any critical
/// payload with an unrecognized type fails the decode with the list of
/// offending payload types.
pub fn decode_payload_list(first_type: u8, data: &[u8]) -> Result<Vec<IkePayload>> {
    let mut payloads = Vec::new();
    let mut current_type = first_type;
    let mut offset = 0;

    while current_type != PayloadType::None.to_u8() {
        if offset >= data.len() {
            return Err(IkeError::InvalidSyntax(
                "Payload chain continues past end of data".into(),
            ));
        }

        let header = PayloadHeader::from_bytes(&data[offset..])?;
        let total = header.length as usize;
        if total > data.len() - offset {
            return Err(IkeError::InvalidSyntax(format!(
                "Payload length {} exceeds remaining {} bytes",
                total,
                data.len() - offset
            )));
        }

        let body = &data[offset + PayloadHeader::SIZE..offset + total];
        payloads.push(IkePayload::parse(current_type, header.critical, body)?);

        offset += total;
        current_type = header.next_payload;
    }

    if offset != data.len() {
        return Err(IkeError::InvalidSyntax(format!(
            "{} trailing bytes after last payload",
            data.len() - offset
        )));
    }

    let unsupported_critical: Vec<u8> = payloads
        .iter()
        .filter(|p| p.is_critical())
        .map(|p| p.payload_type())
        .collect();
    if !unsupported_critical.is_empty() {
        return Err(IkeError::UnsupportedCriticalPayload {
            payload_types: unsupported_critical,
        });
    }

    Ok(payloads)
}

/// Encode a payload chain
///
/// The next-payload field of each payload is taken from the following
/// payload's type; the last payload uses the NO_NEXT sentinel.
pub fn encode_payload_list(payloads: &[IkePayload]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, payload) in payloads.iter().enumerate() {
        let next_payload = if i + 1 < payloads.len() {
            payloads[i + 1].payload_type()
        } else {
            PayloadType::None.to_u8()
        };

        let body = payload.to_payload_data();
        let header = PayloadHeader {
            next_payload,
            critical: payload.is_critical(),
            length: (PayloadHeader::SIZE + body.len()) as u16,
        };
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&body);
    }
    out
}

/// A complete IKE message: header plus decoded payload list
#[derive(Debug, Clone, PartialEq)]
pub struct IkeMessage {
    /// Message header
    pub header: IkeHeader,

    /// Decoded payloads, in wire order
    pub payloads: Vec<IkePayload>,
}

impl IkeMessage {
    /// Create a new message
    pub fn new(header: IkeHeader, payloads: Vec<IkePayload>) -> Self {
        IkeMessage { header, payloads }
    }

    /// Parse a complete IKE message from a datagram
    ///
    /// The declared header length must match the datagram exactly.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = IkeHeader::from_bytes(data)?;

        if header.length as usize != data.len() {
            return Err(IkeError::InvalidSyntax(format!(
                "Header length {} does not match datagram length {}",
                header.length,
                data.len()
            )));
        }

        let payloads = decode_payload_list(header.next_payload, &data[IKE_HEADER_SIZE..])?;

        Ok(IkeMessage { header, payloads })
    }

    /// Serialize to wire format, computing the chain and total length
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = encode_payload_list(&self.payloads);

        let mut header = self.header.clone();
        header.next_payload = self
            .payloads
            .first()
            .map(|p| p.payload_type())
            .unwrap_or(PayloadType::None.to_u8());
        header.length = (IKE_HEADER_SIZE + body.len()) as u32;

        let mut out = Vec::with_capacity(header.length as usize);
        out.extend_from_slice(&header.to_bytes());
        out.extend_from_slice(&body);
        out
    }

    /// Find the first payload matching the predicate
    pub fn find_payload<F>(&self, predicate: F) -> Option<&IkePayload>
    where
        F: Fn(&IkePayload) -> bool,
    {
        self.payloads.iter().find(|p| predicate(p))
    }

    /// All notify payloads in this message
    pub fn notifications(&self) -> impl Iterator<Item = &super::payload::NotifyPayload> {
        self.payloads.iter().filter_map(|p| match p {
            IkePayload::N(n) => Some(n),
            _ => None,
        })
    }
}
