//! Shared message layer for EAP-SIM, EAP-AKA and EAP-AKA'
//!
//! Type data layout (RFC 4186/4187 Section 8.1):
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Subtype    |           Reserved            |  Attributes...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

pub mod attribute;
pub mod crypto;

pub use attribute::{ClientErrorCode, EapSimAkaAttribute};

use crate::eap::message::{EapMessage, EapMethodType};
use crate::eap::{EapError, EapResult, Result};

/// EAP-SIM/AKA subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Subtype {
    /// AKA-Challenge (1)
    AkaChallenge = 1,
    /// AKA-Authentication-Reject (2)
    AkaAuthReject = 2,
    /// AKA-Synchronization-Failure (4)
    AkaSyncFailure = 4,
    /// AKA-Identity (5)
    AkaIdentity = 5,
    /// SIM-Start (10)
    SimStart = 10,
    /// SIM-Challenge (11)
    SimChallenge = 11,
    /// Notification (12)
    Notification = 12,
    /// Re-authentication (13)
    Reauthentication = 13,
    /// Client-Error (14)
    ClientError = 14,
}

impl Subtype {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Subtype::AkaChallenge),
            2 => Some(Subtype::AkaAuthReject),
            4 => Some(Subtype::AkaSyncFailure),
            5 => Some(Subtype::AkaIdentity),
            10 => Some(Subtype::SimStart),
            11 => Some(Subtype::SimChallenge),
            12 => Some(Subtype::Notification),
            13 => Some(Subtype::Reauthentication),
            14 => Some(Subtype::ClientError),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Decoded SIM/AKA type data: subtype plus attribute list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapSimAkaTypeData {
    /// Message subtype
    pub subtype: Subtype,
    /// Attributes, in wire order
    pub attributes: Vec<EapSimAkaAttribute>,
}

impl EapSimAkaTypeData {
    /// Create new type data
    pub fn new(subtype: Subtype, attributes: Vec<EapSimAkaAttribute>) -> Self {
        EapSimAkaTypeData {
            subtype,
            attributes,
        }
    }

    /// Decode type data (subtype, reserved, aligned attributes)
    ///
    /// Failures here are silent: the method answers with
    /// AT_CLIENT_ERROR_CODE instead of aborting the session.
    pub fn decode(type_data: &[u8]) -> Result<Self> {
        if type_data.len() < 3 {
            return Err(EapError::Silent("Truncated SIM/AKA type data".into()));
        }

        let subtype = Subtype::from_u8(type_data[0])
            .ok_or_else(|| EapError::Silent(format!("Unknown subtype: {}", type_data[0])))?;
        // bytes 1-2 reserved
        let attributes = attribute::decode_attributes(&type_data[3..])?;

        Ok(EapSimAkaTypeData {
            subtype,
            attributes,
        })
    }

    /// Serialize type data
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.subtype.to_u8(), 0, 0];
        out.extend_from_slice(&attribute::encode_attributes(&self.attributes));
        out
    }

    /// First attribute matching the predicate
    pub fn find<F>(&self, predicate: F) -> Option<&EapSimAkaAttribute>
    where
        F: Fn(&EapSimAkaAttribute) -> bool,
    {
        self.attributes.iter().find(|a| predicate(a))
    }

    /// Fail when any non-skippable unknown attribute is present
    pub fn reject_unknown_mandatory(&self) -> Result<()> {
        for attribute in &self.attributes {
            if let EapSimAkaAttribute::Unknown { attr_type, .. } = attribute {
                if !EapSimAkaAttribute::is_skippable(*attr_type) {
                    return Err(EapError::Silent(format!(
                        "Unrecognized non-skippable attribute {}",
                        attr_type
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Build the Client-Error response used for parse-level failures
///
/// The session keeps running; the server decides whether to fail the
/// conversation.
pub fn client_error_response(
    identifier: u8,
    method: EapMethodType,
    code: ClientErrorCode,
) -> EapResult {
    let response = EapMessage::response(
        identifier,
        method,
        EapSimAkaTypeData::new(
            Subtype::ClientError,
            vec![EapSimAkaAttribute::ClientErrorCode(code.to_u16())],
        )
        .encode(),
    );
    EapResult::Response(response.encode())
}
