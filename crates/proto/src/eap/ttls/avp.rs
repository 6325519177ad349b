//! EAP-TTLS AVP codec (RFC 5281 Section 10.1)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           AVP Code                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V M r r r r r r|                 AVP Length                    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Vendor-ID (if V set)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Data ... (zero padded to a 4-byte boundary)
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The 3-byte length covers code, flags, length, the optional vendor ID
//! and the data, but not the trailing padding.

use crate::eap::{EapError, Result};

/// EAP-Message AVP code (RFC 3579 Section 3.1)
pub const EAP_MESSAGE_AVP_CODE: u32 = 79;

const FLAG_VENDOR: u8 = 0x80;
const FLAG_MANDATORY: u8 = 0x40;

const HEADER_LEN: usize = 8;
const VENDOR_ID_LEN: usize = 4;

/// One AVP inside the TTLS tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapTtlsAvp {
    /// AVP code
    pub avp_code: u32,
    /// Vendor ID (0 when the V flag is absent)
    pub vendor_id: u32,
    /// Mandatory bit
    pub is_mandatory: bool,
    /// Whether the vendor ID is present on the wire
    pub is_vendor_id_present: bool,
    /// Payload data (without padding)
    pub data: Vec<u8>,
}

impl EapTtlsAvp {
    /// Wrap an EAP message in the mandatory EAP-Message AVP
    pub fn eap_message(data: Vec<u8>) -> Self {
        EapTtlsAvp {
            avp_code: EAP_MESSAGE_AVP_CODE,
            vendor_id: 0,
            is_mandatory: true,
            is_vendor_id_present: false,
            data,
        }
    }

    /// Padding bytes required after an AVP of the given length
    pub fn padding_for(avp_length: usize) -> usize {
        (4 - avp_length % 4) % 4
    }

    /// Declared AVP length (header + optional vendor ID + data)
    pub fn avp_length(&self) -> usize {
        let vendor = if self.is_vendor_id_present {
            VENDOR_ID_LEN
        } else {
            0
        };
        HEADER_LEN + vendor + self.data.len()
    }

    /// Decode one AVP, returning it and the bytes consumed (including
    /// padding)
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < HEADER_LEN {
            return Err(EapError::Silent("Truncated AVP header".into()));
        }

        let avp_code = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let flags = bytes[4];
        let is_vendor_id_present = flags & FLAG_VENDOR != 0;
        let is_mandatory = flags & FLAG_MANDATORY != 0;

        // 3-byte big-endian length
        let avp_length =
            ((bytes[5] as usize) << 16) | ((bytes[6] as usize) << 8) | bytes[7] as usize;

        let mut header = HEADER_LEN;
        let vendor_id = if is_vendor_id_present {
            if bytes.len() < HEADER_LEN + VENDOR_ID_LEN {
                return Err(EapError::Silent("Truncated AVP vendor ID".into()));
            }
            header += VENDOR_ID_LEN;
            u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]])
        } else {
            // No vendor ID is equivalent to a vendor ID of 0
            0
        };

        if avp_length < header {
            return Err(EapError::Silent(format!(
                "AVP length {} below header size {}",
                avp_length, header
            )));
        }
        if avp_length > bytes.len() {
            return Err(EapError::Silent(format!(
                "AVP length {} exceeds {} buffered bytes",
                avp_length,
                bytes.len()
            )));
        }

        let data = bytes[header..avp_length].to_vec();

        // Consume the alignment padding too
        let padding = Self::padding_for(avp_length);
        let consumed = avp_length + padding;
        if consumed > bytes.len() {
            return Err(EapError::Silent("AVP padding exceeds buffer".into()));
        }

        Ok((
            EapTtlsAvp {
                avp_code,
                vendor_id,
                is_mandatory,
                is_vendor_id_present,
                data,
            },
            consumed,
        ))
    }

    /// Serialize this AVP with trailing padding
    pub fn encode(&self) -> Vec<u8> {
        let length = self.avp_length();
        let padding = Self::padding_for(length);

        let mut out = Vec::with_capacity(length + padding);
        out.extend_from_slice(&self.avp_code.to_be_bytes());

        let mut flags = 0u8;
        if self.is_vendor_id_present {
            flags |= FLAG_VENDOR;
        }
        if self.is_mandatory {
            flags |= FLAG_MANDATORY;
        }
        out.push(flags);
        out.push(((length >> 16) & 0xFF) as u8);
        out.push(((length >> 8) & 0xFF) as u8);
        out.push((length & 0xFF) as u8);

        if self.is_vendor_id_present {
            out.extend_from_slice(&self.vendor_id.to_be_bytes());
        }
        out.extend_from_slice(&self.data);
        out.extend(std::iter::repeat(0u8).take(padding));
        out
    }
}
