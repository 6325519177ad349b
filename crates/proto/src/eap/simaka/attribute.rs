//! EAP-SIM/AKA attribute codec
//!
//! Implements the attribute TLVs shared by EAP-SIM (RFC 4186 Section 10),
//! EAP-AKA (RFC 4187 Section 10) and EAP-AKA' (RFC 5448). Every attribute
//! is 4-byte aligned; the length octet counts 4-byte units including the
//! two-octet header.

use crate::eap::{EapError, Result};

/// AT_RAND
pub const AT_RAND: u8 = 1;
/// AT_AUTN
pub const AT_AUTN: u8 = 2;
/// AT_RES
pub const AT_RES: u8 = 3;
/// AT_AUTS
pub const AT_AUTS: u8 = 4;
/// AT_PADDING
pub const AT_PADDING: u8 = 6;
/// AT_NONCE_MT
pub const AT_NONCE_MT: u8 = 7;
/// AT_PERMANENT_ID_REQ
pub const AT_PERMANENT_ID_REQ: u8 = 10;
/// AT_MAC
pub const AT_MAC: u8 = 11;
/// AT_NOTIFICATION
pub const AT_NOTIFICATION: u8 = 12;
/// AT_ANY_ID_REQ
pub const AT_ANY_ID_REQ: u8 = 13;
/// AT_IDENTITY
pub const AT_IDENTITY: u8 = 14;
/// AT_VERSION_LIST
pub const AT_VERSION_LIST: u8 = 15;
/// AT_SELECTED_VERSION
pub const AT_SELECTED_VERSION: u8 = 16;
/// AT_FULLAUTH_ID_REQ
pub const AT_FULLAUTH_ID_REQ: u8 = 17;
/// AT_COUNTER
pub const AT_COUNTER: u8 = 19;
/// AT_CLIENT_ERROR_CODE
pub const AT_CLIENT_ERROR_CODE: u8 = 22;
/// AT_KDF_INPUT (EAP-AKA')
pub const AT_KDF_INPUT: u8 = 23;
/// AT_KDF (EAP-AKA')
pub const AT_KDF: u8 = 24;

/// Client error codes (RFC 4186 Section 10.19)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ClientErrorCode {
    /// Unable to process the packet
    UnableToProcess = 0,
    /// Unsupported version
    UnsupportedVersion = 1,
    /// Insufficient number of challenges
    InsufficientChallenges = 2,
    /// RANDs are not fresh
    RandsNotFresh = 3,
}

impl ClientErrorCode {
    /// Convert to u16
    pub fn to_u16(self) -> u16 {
        self as u16
    }
}

/// One SIM/AKA attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EapSimAkaAttribute {
    /// AT_RAND: one (AKA) or more (SIM) 16-byte challenges
    Rand(Vec<[u8; 16]>),

    /// AT_AUTN: network authentication token
    Autn([u8; 16]),

    /// AT_RES: authentication result, length in bits
    Res {
        /// RES length in bits
        bits: u16,
        /// RES value
        res: Vec<u8>,
    },

    /// AT_AUTS: synchronization failure token
    Auts([u8; 14]),

    /// AT_PADDING: zero filler
    Padding(usize),

    /// AT_NONCE_MT: peer nonce for EAP-SIM
    NonceMt([u8; 16]),

    /// AT_PERMANENT_ID_REQ
    PermanentIdReq,

    /// AT_ANY_ID_REQ
    AnyIdReq,

    /// AT_FULLAUTH_ID_REQ
    FullAuthIdReq,

    /// AT_MAC: message authentication code (zeroed during computation)
    Mac([u8; 16]),

    /// AT_NOTIFICATION code
    Notification(u16),

    /// AT_IDENTITY
    Identity(Vec<u8>),

    /// AT_VERSION_LIST (EAP-SIM)
    VersionList(Vec<u16>),

    /// AT_SELECTED_VERSION (EAP-SIM)
    SelectedVersion(u16),

    /// AT_COUNTER (reauthentication)
    Counter(u16),

    /// AT_CLIENT_ERROR_CODE
    ClientErrorCode(u16),

    /// AT_KDF_INPUT: network name (EAP-AKA')
    KdfInput(Vec<u8>),

    /// AT_KDF: key derivation function number (EAP-AKA')
    Kdf(u16),

    /// Unrecognized attribute, preserved for re-encoding
    Unknown {
        /// Raw attribute type
        attr_type: u8,
        /// Raw value bytes (excluding the two-octet header)
        value: Vec<u8>,
    },
}

impl EapSimAkaAttribute {
    /// Raw attribute type value
    pub fn attr_type(&self) -> u8 {
        match self {
            EapSimAkaAttribute::Rand(_) => AT_RAND,
            EapSimAkaAttribute::Autn(_) => AT_AUTN,
            EapSimAkaAttribute::Res { .. } => AT_RES,
            EapSimAkaAttribute::Auts(_) => AT_AUTS,
            EapSimAkaAttribute::Padding(_) => AT_PADDING,
            EapSimAkaAttribute::NonceMt(_) => AT_NONCE_MT,
            EapSimAkaAttribute::PermanentIdReq => AT_PERMANENT_ID_REQ,
            EapSimAkaAttribute::AnyIdReq => AT_ANY_ID_REQ,
            EapSimAkaAttribute::FullAuthIdReq => AT_FULLAUTH_ID_REQ,
            EapSimAkaAttribute::Mac(_) => AT_MAC,
            EapSimAkaAttribute::Notification(_) => AT_NOTIFICATION,
            EapSimAkaAttribute::Identity(_) => AT_IDENTITY,
            EapSimAkaAttribute::VersionList(_) => AT_VERSION_LIST,
            EapSimAkaAttribute::SelectedVersion(_) => AT_SELECTED_VERSION,
            EapSimAkaAttribute::Counter(_) => AT_COUNTER,
            EapSimAkaAttribute::ClientErrorCode(_) => AT_CLIENT_ERROR_CODE,
            EapSimAkaAttribute::KdfInput(_) => AT_KDF_INPUT,
            EapSimAkaAttribute::Kdf(_) => AT_KDF,
            EapSimAkaAttribute::Unknown { attr_type, .. } => *attr_type,
        }
    }

    /// Whether an unrecognized attribute of this type may be ignored
    /// (types 128-255 are skippable)
    pub fn is_skippable(attr_type: u8) -> bool {
        attr_type >= 128
    }

    /// Decode one attribute, returning it and the bytes consumed
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 2 {
            return Err(EapError::Silent("Truncated attribute header".into()));
        }

        let attr_type = data[0];
        let length = data[1] as usize * 4;
        if length < 4 {
            return Err(EapError::Silent(format!(
                "Attribute length {} below minimum",
                length
            )));
        }
        if length > data.len() {
            return Err(EapError::Silent(format!(
                "Attribute length {} exceeds remaining {} bytes",
                length,
                data.len()
            )));
        }
        let value = &data[2..length];

        let attribute = match attr_type {
            AT_RAND => {
                if value.len() < 2 || (value.len() - 2) % 16 != 0 || value.len() == 2 {
                    return Err(EapError::Silent("Malformed AT_RAND".into()));
                }
                let rands = value[2..]
                    .chunks_exact(16)
                    .map(|c| {
                        let mut rand = [0u8; 16];
                        rand.copy_from_slice(c);
                        rand
                    })
                    .collect();
                EapSimAkaAttribute::Rand(rands)
            }
            AT_AUTN => {
                if value.len() != 18 {
                    return Err(EapError::Silent("Malformed AT_AUTN".into()));
                }
                let mut autn = [0u8; 16];
                autn.copy_from_slice(&value[2..]);
                EapSimAkaAttribute::Autn(autn)
            }
            AT_RES => {
                if value.len() < 2 {
                    return Err(EapError::Silent("Malformed AT_RES".into()));
                }
                let bits = u16::from_be_bytes([value[0], value[1]]);
                let byte_len = (bits as usize + 7) / 8;
                if byte_len > value.len() - 2 {
                    return Err(EapError::Silent("AT_RES bit length exceeds data".into()));
                }
                EapSimAkaAttribute::Res {
                    bits,
                    res: value[2..2 + byte_len].to_vec(),
                }
            }
            AT_AUTS => {
                if value.len() != 14 {
                    return Err(EapError::Silent("Malformed AT_AUTS".into()));
                }
                let mut auts = [0u8; 14];
                auts.copy_from_slice(value);
                EapSimAkaAttribute::Auts(auts)
            }
            AT_PADDING => {
                if value.iter().any(|&b| b != 0) {
                    return Err(EapError::Silent("AT_PADDING carries nonzero bytes".into()));
                }
                EapSimAkaAttribute::Padding(value.len())
            }
            AT_NONCE_MT => {
                if value.len() != 18 {
                    return Err(EapError::Silent("Malformed AT_NONCE_MT".into()));
                }
                let mut nonce = [0u8; 16];
                nonce.copy_from_slice(&value[2..]);
                EapSimAkaAttribute::NonceMt(nonce)
            }
            AT_PERMANENT_ID_REQ => EapSimAkaAttribute::PermanentIdReq,
            AT_ANY_ID_REQ => EapSimAkaAttribute::AnyIdReq,
            AT_FULLAUTH_ID_REQ => EapSimAkaAttribute::FullAuthIdReq,
            AT_MAC => {
                if value.len() != 18 {
                    return Err(EapError::Silent("Malformed AT_MAC".into()));
                }
                let mut mac = [0u8; 16];
                mac.copy_from_slice(&value[2..]);
                EapSimAkaAttribute::Mac(mac)
            }
            AT_NOTIFICATION => {
                if value.len() != 2 {
                    return Err(EapError::Silent("Malformed AT_NOTIFICATION".into()));
                }
                EapSimAkaAttribute::Notification(u16::from_be_bytes([value[0], value[1]]))
            }
            AT_IDENTITY => {
                if value.len() < 2 {
                    return Err(EapError::Silent("Malformed AT_IDENTITY".into()));
                }
                let actual = u16::from_be_bytes([value[0], value[1]]) as usize;
                if actual > value.len() - 2 {
                    return Err(EapError::Silent("AT_IDENTITY length exceeds data".into()));
                }
                EapSimAkaAttribute::Identity(value[2..2 + actual].to_vec())
            }
            AT_VERSION_LIST => {
                if value.len() < 2 {
                    return Err(EapError::Silent("Malformed AT_VERSION_LIST".into()));
                }
                let actual = u16::from_be_bytes([value[0], value[1]]) as usize;
                if actual % 2 != 0 || actual > value.len() - 2 {
                    return Err(EapError::Silent("AT_VERSION_LIST length invalid".into()));
                }
                let versions = value[2..2 + actual]
                    .chunks_exact(2)
                    .map(|c| u16::from_be_bytes([c[0], c[1]]))
                    .collect();
                EapSimAkaAttribute::VersionList(versions)
            }
            AT_SELECTED_VERSION => {
                if value.len() != 2 {
                    return Err(EapError::Silent("Malformed AT_SELECTED_VERSION".into()));
                }
                EapSimAkaAttribute::SelectedVersion(u16::from_be_bytes([value[0], value[1]]))
            }
            AT_COUNTER => {
                if value.len() != 2 {
                    return Err(EapError::Silent("Malformed AT_COUNTER".into()));
                }
                EapSimAkaAttribute::Counter(u16::from_be_bytes([value[0], value[1]]))
            }
            AT_CLIENT_ERROR_CODE => {
                if value.len() != 2 {
                    return Err(EapError::Silent("Malformed AT_CLIENT_ERROR_CODE".into()));
                }
                EapSimAkaAttribute::ClientErrorCode(u16::from_be_bytes([value[0], value[1]]))
            }
            AT_KDF_INPUT => {
                if value.len() < 2 {
                    return Err(EapError::Silent("Malformed AT_KDF_INPUT".into()));
                }
                let actual = u16::from_be_bytes([value[0], value[1]]) as usize;
                if actual > value.len() - 2 {
                    return Err(EapError::Silent("AT_KDF_INPUT length exceeds data".into()));
                }
                EapSimAkaAttribute::KdfInput(value[2..2 + actual].to_vec())
            }
            AT_KDF => {
                if value.len() != 2 {
                    return Err(EapError::Silent("Malformed AT_KDF".into()));
                }
                EapSimAkaAttribute::Kdf(u16::from_be_bytes([value[0], value[1]]))
            }
            other => EapSimAkaAttribute::Unknown {
                attr_type: other,
                value: value.to_vec(),
            },
        };

        Ok((attribute, length))
    }

    /// Serialize this attribute (4-byte aligned)
    pub fn encode(&self) -> Vec<u8> {
        let value = self.encode_value();
        debug_assert_eq!((value.len() + 2) % 4, 0, "attribute must be aligned");

        let mut out = Vec::with_capacity(2 + value.len());
        out.push(self.attr_type());
        out.push(((value.len() + 2) / 4) as u8);
        out.extend_from_slice(&value);
        out
    }

    fn encode_value(&self) -> Vec<u8> {
        match self {
            EapSimAkaAttribute::Rand(rands) => {
                let mut v = vec![0u8, 0];
                for rand in rands {
                    v.extend_from_slice(rand);
                }
                v
            }
            EapSimAkaAttribute::Autn(autn) => {
                let mut v = vec![0u8, 0];
                v.extend_from_slice(autn);
                v
            }
            EapSimAkaAttribute::Res { bits, res } => {
                let mut v = bits.to_be_bytes().to_vec();
                v.extend_from_slice(res);
                while (v.len() + 2) % 4 != 0 {
                    v.push(0);
                }
                v
            }
            EapSimAkaAttribute::Auts(auts) => auts.to_vec(),
            EapSimAkaAttribute::Padding(len) => vec![0u8; *len],
            EapSimAkaAttribute::NonceMt(nonce) => {
                let mut v = vec![0u8, 0];
                v.extend_from_slice(nonce);
                v
            }
            EapSimAkaAttribute::PermanentIdReq
            | EapSimAkaAttribute::AnyIdReq
            | EapSimAkaAttribute::FullAuthIdReq => vec![0u8, 0],
            EapSimAkaAttribute::Mac(mac) => {
                let mut v = vec![0u8, 0];
                v.extend_from_slice(mac);
                v
            }
            EapSimAkaAttribute::Notification(code)
            | EapSimAkaAttribute::SelectedVersion(code)
            | EapSimAkaAttribute::Counter(code)
            | EapSimAkaAttribute::ClientErrorCode(code)
            | EapSimAkaAttribute::Kdf(code) => code.to_be_bytes().to_vec(),
            EapSimAkaAttribute::Identity(identity) => {
                let mut v = (identity.len() as u16).to_be_bytes().to_vec();
                v.extend_from_slice(identity);
                while (v.len() + 2) % 4 != 0 {
                    v.push(0);
                }
                v
            }
            EapSimAkaAttribute::VersionList(versions) => {
                let mut v = ((versions.len() * 2) as u16).to_be_bytes().to_vec();
                for version in versions {
                    v.extend_from_slice(&version.to_be_bytes());
                }
                while (v.len() + 2) % 4 != 0 {
                    v.push(0);
                }
                v
            }
            EapSimAkaAttribute::KdfInput(input) => {
                let mut v = (input.len() as u16).to_be_bytes().to_vec();
                v.extend_from_slice(input);
                while (v.len() + 2) % 4 != 0 {
                    v.push(0);
                }
                v
            }
            EapSimAkaAttribute::Unknown { value, .. } => value.clone(),
        }
    }
}

/// Decode a full attribute list
pub fn decode_attributes(data: &[u8]) -> Result<Vec<EapSimAkaAttribute>> {
    let mut attributes = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        let (attribute, consumed) = EapSimAkaAttribute::decode(&data[offset..])?;
        attributes.push(attribute);
        offset += consumed;
    }
    Ok(attributes)
}

/// Encode a full attribute list
pub fn encode_attributes(attributes: &[EapSimAkaAttribute]) -> Vec<u8> {
    let mut out = Vec::new();
    for attribute in attributes {
        out.extend_from_slice(&attribute.encode());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        ::hex::decode(s).unwrap()
    }

    #[test]
    fn test_client_error_code_decode_encode() {
        // 4-byte attribute: type 22, length 1 unit, error code 0x0001
        let raw = hex("16010001");
        let (attribute, consumed) = EapSimAkaAttribute::decode(&raw).unwrap();

        assert_eq!(consumed, 4);
        assert_eq!(attribute.attr_type(), AT_CLIENT_ERROR_CODE);
        assert_eq!(
            attribute,
            EapSimAkaAttribute::ClientErrorCode(ClientErrorCode::UnsupportedVersion.to_u16())
        );
        assert_eq!(attribute.encode(), raw);
    }

    #[test]
    fn test_client_error_code_invalid_length() {
        // Length claims 2 units (8 bytes) but only 4 are present
        let raw = hex("16020001");
        assert!(EapSimAkaAttribute::decode(&raw).is_err());
    }

    #[test]
    fn test_version_list_roundtrip() {
        // From the EAP-SIM Start request: version list [1]
        let attribute = EapSimAkaAttribute::VersionList(vec![1]);
        let encoded = attribute.encode();
        assert_eq!(encoded, hex("0f02000200010000"));

        let (decoded, consumed) = EapSimAkaAttribute::decode(&encoded).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(decoded, attribute);
    }

    #[test]
    fn test_rand_multiple_challenges() {
        let rands = vec![[0xAA; 16], [0xBB; 16], [0xCC; 16]];
        let attribute = EapSimAkaAttribute::Rand(rands.clone());
        let encoded = attribute.encode();
        assert_eq!(encoded.len(), 4 + 48);
        assert_eq!(encoded[1] as usize * 4, encoded.len());

        let (decoded, _) = EapSimAkaAttribute::decode(&encoded).unwrap();
        assert_eq!(decoded, EapSimAkaAttribute::Rand(rands));
    }

    #[test]
    fn test_mac_roundtrip() {
        let attribute = EapSimAkaAttribute::Mac([0x5A; 16]);
        let encoded = attribute.encode();
        assert_eq!(encoded.len(), 20);
        let (decoded, _) = EapSimAkaAttribute::decode(&encoded).unwrap();
        assert_eq!(decoded, attribute);
    }

    #[test]
    fn test_res_padding() {
        // 8-byte RES = 64 bits; value = 2 (bits) + 8 (res) = 10, padded to 14
        let attribute = EapSimAkaAttribute::Res {
            bits: 64,
            res: vec![0x11; 8],
        };
        let encoded = attribute.encode();
        assert_eq!(encoded.len() % 4, 0);

        let (decoded, _) = EapSimAkaAttribute::decode(&encoded).unwrap();
        assert_eq!(decoded, attribute);
    }

    #[test]
    fn test_identity_roundtrip() {
        let attribute = EapSimAkaAttribute::Identity(b"1234567890@example".to_vec());
        let encoded = attribute.encode();
        assert_eq!(encoded.len() % 4, 0);
        let (decoded, _) = EapSimAkaAttribute::decode(&encoded).unwrap();
        assert_eq!(decoded, attribute);
    }

    #[test]
    fn test_auts_roundtrip() {
        let attribute = EapSimAkaAttribute::Auts([0x77; 14]);
        let encoded = attribute.encode();
        assert_eq!(encoded.len(), 16);
        assert_eq!(encoded[1], 4);
        let (decoded, _) = EapSimAkaAttribute::decode(&encoded).unwrap();
        assert_eq!(decoded, attribute);
    }

    #[test]
    fn test_kdf_input_roundtrip() {
        let attribute = EapSimAkaAttribute::KdfInput(b"WLAN".to_vec());
        let encoded = attribute.encode();
        assert_eq!(encoded.len() % 4, 0);
        let (decoded, _) = EapSimAkaAttribute::decode(&encoded).unwrap();
        assert_eq!(decoded, attribute);
    }

    #[test]
    fn test_unknown_attribute_preserved() {
        let raw = hex("8a02deadbeef0000");
        let (decoded, consumed) = EapSimAkaAttribute::decode(&raw).unwrap();
        assert_eq!(consumed, 8);
        match &decoded {
            EapSimAkaAttribute::Unknown { attr_type, value } => {
                assert_eq!(*attr_type, 0x8A);
                assert_eq!(value, &hex("deadbeef0000"));
            }
            other => panic!("expected Unknown, got {:?}", other),
        }
        assert!(EapSimAkaAttribute::is_skippable(0x8A));
        assert!(!EapSimAkaAttribute::is_skippable(0x16));
        assert_eq!(decoded.encode(), raw);
    }

    #[test]
    fn test_attribute_list_roundtrip() {
        let attributes = vec![
            EapSimAkaAttribute::VersionList(vec![1]),
            EapSimAkaAttribute::NonceMt([0x42; 16]),
            EapSimAkaAttribute::SelectedVersion(1),
        ];
        let encoded = encode_attributes(&attributes);
        let decoded = decode_attributes(&encoded).unwrap();
        assert_eq!(decoded, attributes);
    }

    #[test]
    fn test_attribute_list_truncated() {
        let mut encoded = encode_attributes(&[EapSimAkaAttribute::NonceMt([0x42; 16])]);
        encoded.truncate(encoded.len() - 2);
        assert!(decode_attributes(&encoded).is_err());
    }
}
