//! EAP message codec
//!
//! Implements the EAP packet format from RFC 3748 Section 4.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |  Type-Data ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The declared length governs: trailing bytes beyond it, or Success/
//! Failure packets longer than the bare header, are malformed.

use crate::eap::{EapError, Result};

/// EAP packet code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EapCode {
    /// Request (1)
    Request = 1,
    /// Response (2)
    Response = 2,
    /// Success (3)
    Success = 3,
    /// Failure (4)
    Failure = 4,
}

impl EapCode {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapCode::Request),
            2 => Some(EapCode::Response),
            3 => Some(EapCode::Success),
            4 => Some(EapCode::Failure),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// EAP method types (RFC 3748 and IANA registry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EapMethodType {
    /// Identity (1)
    Identity = 1,
    /// Notification (2)
    Notification = 2,
    /// Nak (3), response only
    Nak = 3,
    /// EAP-SIM (18) - RFC 4186
    Sim = 18,
    /// EAP-TTLS (21) - RFC 5281
    Ttls = 21,
    /// EAP-AKA (23) - RFC 4187
    Aka = 23,
    /// EAP-MSCHAPv2 (26)
    MsChapV2 = 26,
    /// EAP-AKA' (50) - RFC 5448
    AkaPrime = 50,
}

impl EapMethodType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapMethodType::Identity),
            2 => Some(EapMethodType::Notification),
            3 => Some(EapMethodType::Nak),
            18 => Some(EapMethodType::Sim),
            21 => Some(EapMethodType::Ttls),
            23 => Some(EapMethodType::Aka),
            26 => Some(EapMethodType::MsChapV2),
            50 => Some(EapMethodType::AkaPrime),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Whether this type identifies an authentication method (as opposed
    /// to the Identity/Notification/Nak control types)
    pub fn is_auth_method(self) -> bool {
        !matches!(
            self,
            EapMethodType::Identity | EapMethodType::Notification | EapMethodType::Nak
        )
    }
}

/// Type and type-data of a Request/Response packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapData {
    /// Raw type value (unknown method types are preserved)
    pub type_raw: u8,
    /// Type-specific data
    pub type_data: Vec<u8>,
}

impl EapData {
    /// Create from a known method type
    pub fn new(method: EapMethodType, type_data: Vec<u8>) -> Self {
        EapData {
            type_raw: method.to_u8(),
            type_data,
        }
    }

    /// Recognized method type, if any
    pub fn method_type(&self) -> Option<EapMethodType> {
        EapMethodType::from_u8(self.type_raw)
    }
}

/// One EAP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapMessage {
    /// Packet code
    pub code: EapCode,
    /// Identifier matching requests to responses
    pub identifier: u8,
    /// Type and data; None for Success/Failure
    pub data: Option<EapData>,
}

impl EapMessage {
    /// Header length (code, identifier, length)
    pub const HEADER_LEN: usize = 4;

    /// Create a Request packet
    pub fn request(identifier: u8, method: EapMethodType, type_data: Vec<u8>) -> Self {
        EapMessage {
            code: EapCode::Request,
            identifier,
            data: Some(EapData::new(method, type_data)),
        }
    }

    /// Create a Response packet
    pub fn response(identifier: u8, method: EapMethodType, type_data: Vec<u8>) -> Self {
        EapMessage {
            code: EapCode::Response,
            identifier,
            data: Some(EapData::new(method, type_data)),
        }
    }

    /// Create the canonical Notification response (empty data)
    pub fn notification_response(identifier: u8) -> Self {
        Self::response(identifier, EapMethodType::Notification, Vec::new())
    }

    /// Create a Nak response advertising the methods we support
    pub fn nak_response(identifier: u8, supported: &[EapMethodType]) -> Self {
        Self::response(
            identifier,
            EapMethodType::Nak,
            supported.iter().map(|m| m.to_u8()).collect(),
        )
    }

    /// Parse an EAP packet
    ///
    /// The declared length must cover the full buffer exactly;
    /// Success/Failure packets must be exactly 4 bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(EapError::Silent(format!(
                "EAP packet too short: {} bytes",
                bytes.len()
            )));
        }

        let code = EapCode::from_u8(bytes[0])
            .ok_or_else(|| EapError::Silent(format!("Unknown EAP code: {}", bytes[0])))?;
        let identifier = bytes[1];
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;

        if length < Self::HEADER_LEN {
            return Err(EapError::Silent(format!(
                "Declared EAP length {} below header size",
                length
            )));
        }
        if length != bytes.len() {
            return Err(EapError::Silent(format!(
                "Declared EAP length {} does not match {} buffered bytes",
                length,
                bytes.len()
            )));
        }

        let data = match code {
            EapCode::Request | EapCode::Response => {
                if length < Self::HEADER_LEN + 1 {
                    return Err(EapError::Silent(
                        "Request/Response packet missing type octet".into(),
                    ));
                }
                Some(EapData {
                    type_raw: bytes[4],
                    type_data: bytes[5..length].to_vec(),
                })
            }
            EapCode::Success | EapCode::Failure => {
                if length != Self::HEADER_LEN {
                    return Err(EapError::Silent(format!(
                        "Success/Failure packet must be 4 bytes, got {}",
                        length
                    )));
                }
                None
            }
        };

        Ok(EapMessage {
            code,
            identifier,
            data,
        })
    }

    /// Serialize to wire format
    pub fn encode(&self) -> Vec<u8> {
        let length = match &self.data {
            Some(data) => Self::HEADER_LEN + 1 + data.type_data.len(),
            None => Self::HEADER_LEN,
        };

        let mut out = Vec::with_capacity(length);
        out.push(self.code.to_u8());
        out.push(self.identifier);
        out.extend_from_slice(&(length as u16).to_be_bytes());
        if let Some(data) = &self.data {
            out.push(data.type_raw);
            out.extend_from_slice(&data.type_data);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        ::hex::decode(s).unwrap()
    }

    #[test]
    fn test_decode_identity_request() {
        let message = EapMessage::decode(&hex("0110000501")).unwrap();
        assert_eq!(message.code, EapCode::Request);
        assert_eq!(message.identifier, 0x10);
        let data = message.data.unwrap();
        assert_eq!(data.method_type(), Some(EapMethodType::Identity));
        assert!(data.type_data.is_empty());
    }

    #[test]
    fn test_decode_aka_identity_request() {
        let message = EapMessage::decode(&hex("0110000A17050C010000")).unwrap();
        assert_eq!(message.code, EapCode::Request);
        let data = message.data.unwrap();
        assert_eq!(data.method_type(), Some(EapMethodType::Aka));
        assert_eq!(data.type_data, hex("050C010000"));
    }

    #[test]
    fn test_success_and_failure_are_four_bytes() {
        let success = EapMessage::decode(&hex("03100004")).unwrap();
        assert_eq!(success.code, EapCode::Success);
        assert_eq!(success.data, None);
        assert_eq!(success.encode(), hex("03100004"));

        let failure = EapMessage {
            code: EapCode::Failure,
            identifier: 0x22,
            data: None,
        };
        assert_eq!(failure.encode().len(), 4);
    }

    #[test]
    fn test_long_success_rejected() {
        // Success with declared length 5
        assert!(EapMessage::decode(&hex("0310000500")).is_err());
    }

    #[test]
    fn test_short_packets_rejected() {
        // Incomplete header
        assert!(EapMessage::decode(&hex("0310")).is_err());
        // Declared length 5 but no type octet present
        assert!(EapMessage::decode(&hex("01100005")).is_err());
        // Declared length 4 on a request (type octet required)
        assert!(EapMessage::decode(&hex("01100004")).is_err());
    }

    #[test]
    fn test_invalid_code_rejected() {
        assert!(EapMessage::decode(&hex("F0100004")).is_err());
    }

    #[test]
    fn test_declared_length_governs() {
        // Trailing bytes beyond the declared length are malformed
        assert!(EapMessage::decode(&hex("03100004FF")).is_err());
        // Declared length beyond the buffer is malformed
        assert!(EapMessage::decode(&hex("0110000A01")).is_err());
    }

    #[test]
    fn test_notification_response_canonical_bytes() {
        let response = EapMessage::notification_response(0x10);
        assert_eq!(response.encode(), hex("0210000502"));
    }

    #[test]
    fn test_nak_response_lists_methods() {
        let nak = EapMessage::nak_response(
            0x10,
            &[EapMethodType::Aka, EapMethodType::Sim, EapMethodType::Ttls],
        );
        assert_eq!(nak.encode(), hex("0210000803171215"));
        let decoded = EapMessage::decode(&nak.encode()).unwrap();
        assert_eq!(
            decoded.data.unwrap().type_data,
            vec![23, 18, 21] // AKA, SIM, TTLS
        );
    }

    #[test]
    fn test_unknown_method_type_preserved() {
        let message = EapMessage::decode(&hex("01100005FF")).unwrap();
        let data = message.data.unwrap();
        assert_eq!(data.method_type(), None);
        assert_eq!(data.type_raw, 0xFF);
    }

    #[test]
    fn test_roundtrip() {
        let message = EapMessage::response(
            0x42,
            EapMethodType::Sim,
            hex("0A00000F02000200010000"),
        );
        let decoded = EapMessage::decode(&message.encode()).unwrap();
        assert_eq!(decoded, message);
    }
}
