//! Encrypted message envelope: SK and SKF payloads
//!
//! Implements RFC 7296 Section 3.14 (Encrypted payload) and RFC 7383
//! (message fragmentation).
//!
//! For CBC/CTR suites the integrity checksum is computed over the whole
//! message from the first header octet through the ciphertext and verified
//! in constant time before any decryption. For combined-mode suites the
//! header and payload header form the associated data.
//!
//! ```text
//! SK body:  IV | ciphertext(inner payloads | padding | pad length) | ICV
//! SKF body: fragment number (2) | total fragments (2) | SK body
//! ```

use super::constants::{PayloadType, IKE_HEADER_SIZE};
use super::crypto::CryptoSuite;
use super::message::{decode_payload_list, encode_payload_list, IkeHeader};
use super::payload::{IkePayload, PayloadHeader};
use crate::ike::{IkeError, Result};
use rand::RngCore;
use std::time::{Duration, Instant};

/// Generic header plus SKF fragment header
const SKF_SUB_HEADER: usize = 4;

/// Directional keys for sealing or opening one message
#[derive(Debug, Clone, Copy)]
pub struct SkKeys<'a> {
    /// Encryption key material (key + salt for CTR/GCM)
    pub encr: &'a [u8],
    /// Integrity key (empty for AEAD suites)
    pub integ: &'a [u8],
}

/// Append RFC 7296 padding and the pad-length octet
fn pad_plaintext(mut plaintext: Vec<u8>, block_size: usize) -> Vec<u8> {
    let pad_len = if block_size > 1 {
        (block_size - ((plaintext.len() + 1) % block_size)) % block_size
    } else {
        0
    };
    plaintext.extend(std::iter::repeat(0u8).take(pad_len));
    plaintext.push(pad_len as u8);
    plaintext
}

/// Strip padding after decryption
fn unpad_plaintext(mut plaintext: Vec<u8>) -> Result<Vec<u8>> {
    let pad_len = *plaintext
        .last()
        .ok_or_else(|| IkeError::InvalidSyntax("Empty decrypted payload".into()))?
        as usize;
    if pad_len + 1 > plaintext.len() {
        return Err(IkeError::InvalidSyntax("Invalid pad length".into()));
    }
    plaintext.truncate(plaintext.len() - pad_len - 1);
    Ok(plaintext)
}

fn checksum_len(suite: &CryptoSuite) -> usize {
    if suite.cipher.is_aead() {
        suite.cipher.tag_len()
    } else {
        suite
            .integrity
            .map(|i| i.checksum_len())
            .unwrap_or_default()
    }
}

/// Total envelope overhead of one sealed message (header through ICV,
/// excluding plaintext and its padding)
pub fn sk_overhead(suite: &CryptoSuite, fragmented: bool) -> usize {
    let sub = if fragmented { SKF_SUB_HEADER } else { 0 };
    IKE_HEADER_SIZE + PayloadHeader::SIZE + sub + suite.cipher.iv_len() + checksum_len(suite)
}

/// Seal inner payloads into a single SK message
///
/// `header` provides SPIs, exchange type, flags, and message ID; the next
/// payload and length fields are computed here.
pub fn seal_payloads(
    suite: &CryptoSuite,
    keys: &SkKeys<'_>,
    header: &IkeHeader,
    inner: &[IkePayload],
) -> Result<Vec<u8>> {
    let first_inner = inner
        .first()
        .map(|p| p.payload_type())
        .unwrap_or(PayloadType::None.to_u8());
    seal_body(suite, keys, header, first_inner, encode_payload_list(inner))
}

/// Seal an already-encoded plaintext body into a single SK message
pub fn seal_body(
    suite: &CryptoSuite,
    keys: &SkKeys<'_>,
    header: &IkeHeader,
    first_inner: u8,
    plaintext: Vec<u8>,
) -> Result<Vec<u8>> {
    let padded = pad_plaintext(plaintext, suite.cipher.pad_block_size());

    let mut iv = vec![0u8; suite.cipher.iv_len()];
    rand::thread_rng().fill_bytes(&mut iv);

    let ct_len = padded.len() + suite.cipher.tag_len();
    let sk_len = PayloadHeader::SIZE + iv.len() + ct_len + integrity_only_len(suite);
    let total_len = IKE_HEADER_SIZE + sk_len;

    let mut hdr = header.clone();
    hdr.next_payload = PayloadType::SK.to_u8();
    hdr.length = total_len as u32;

    let sk_header = PayloadHeader {
        next_payload: first_inner,
        critical: false,
        length: sk_len as u16,
    };

    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&hdr.to_bytes());
    out.extend_from_slice(&sk_header.to_bytes());

    if suite.cipher.is_aead() {
        // Associated data: IKE header through the SK payload header
        let aad = out.clone();
        let ciphertext = suite.cipher.encrypt(keys.encr, &iv, &padded, &aad)?;
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
    } else {
        let integrity = suite
            .integrity
            .ok_or_else(|| IkeError::Internal("Non-AEAD suite without integrity".into()))?;
        let ciphertext = suite.cipher.encrypt(keys.encr, &iv, &padded, &[])?;
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        let checksum = integrity.compute(keys.integ, &out)?;
        out.extend_from_slice(&checksum);
    }

    debug_assert_eq!(out.len(), total_len);
    Ok(out)
}

fn integrity_only_len(suite: &CryptoSuite) -> usize {
    if suite.cipher.is_aead() {
        0
    } else {
        checksum_len(suite)
    }
}

/// One decrypted fragment, or a whole decrypted SK body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedEnvelope {
    /// First inner payload type (0 on non-first fragments)
    pub first_payload: u8,
    /// Fragment number (1 for unfragmented messages)
    pub fragment_num: u16,
    /// Total fragments (1 for unfragmented messages)
    pub total_fragments: u16,
    /// Decrypted, unpadded plaintext
    pub plaintext: Vec<u8>,
}

/// Authenticate and decrypt an SK or SKF message
///
/// `message` is the complete datagram. Integrity failure, decryption
/// failure, and framing errors all surface as errors; the caller discards
/// the packet silently in every such case.
pub fn open(suite: &CryptoSuite, keys: &SkKeys<'_>, message: &[u8]) -> Result<OpenedEnvelope> {
    let header = IkeHeader::from_bytes(message)?;
    if header.length as usize != message.len() {
        return Err(IkeError::InvalidSyntax(
            "Header length does not match datagram".into(),
        ));
    }

    let is_fragment = match PayloadType::from_u8(header.next_payload) {
        Some(PayloadType::SK) => false,
        Some(PayloadType::SKF) => true,
        _ => {
            return Err(IkeError::InvalidSyntax(
                "Message does not start with an encrypted payload".into(),
            ))
        }
    };

    let body = &message[IKE_HEADER_SIZE..];
    let sk_header = PayloadHeader::from_bytes(body)?;
    if sk_header.length as usize != body.len() {
        return Err(IkeError::InvalidSyntax(
            "Encrypted payload does not span the whole message".into(),
        ));
    }

    let sub_header = if is_fragment { SKF_SUB_HEADER } else { 0 };
    let iv_len = suite.cipher.iv_len();
    let ck_len = checksum_len(suite);
    let min_len = PayloadHeader::SIZE + sub_header + iv_len + ck_len + 1;
    if body.len() < min_len {
        return Err(IkeError::InvalidSyntax("Encrypted payload too short".into()));
    }

    let (fragment_num, total_fragments) = if is_fragment {
        let num = u16::from_be_bytes([body[4], body[5]]);
        let total = u16::from_be_bytes([body[6], body[7]]);
        if num < 1 || total < 1 || num > total {
            return Err(IkeError::InvalidSyntax(format!(
                "Invalid fragment numbering: {}/{}",
                num, total
            )));
        }
        (num, total)
    } else {
        (1, 1)
    };

    let data_start = IKE_HEADER_SIZE + PayloadHeader::SIZE + sub_header;
    let iv = &message[data_start..data_start + iv_len];

    let padded = if suite.cipher.is_aead() {
        let ciphertext = &message[data_start + iv_len..];
        let aad = &message[..data_start];
        suite.cipher.decrypt(keys.encr, iv, ciphertext, aad)?
    } else {
        let integrity = suite
            .integrity
            .ok_or_else(|| IkeError::Internal("Non-AEAD suite without integrity".into()))?;
        let checksum_start = message.len() - ck_len;
        integrity.verify(
            keys.integ,
            &message[..checksum_start],
            &message[checksum_start..],
        )?;
        let ciphertext = &message[data_start + iv_len..checksum_start];
        suite.cipher.decrypt(keys.encr, iv, ciphertext, &[])?
    };

    Ok(OpenedEnvelope {
        first_payload: sk_header.next_payload,
        fragment_num,
        total_fragments,
        plaintext: unpad_plaintext(padded)?,
    })
}

/// Decode the inner payload chain of an unfragmented opened envelope
pub fn decode_inner(envelope: &OpenedEnvelope) -> Result<Vec<IkePayload>> {
    decode_payload_list(envelope.first_payload, &envelope.plaintext)
}

/// Seal a plaintext body, fragmenting when the sealed message would exceed
/// `max_message_len`
///
/// Returns the datagrams to transmit, in fragment order.
pub fn seal_fragmented(
    suite: &CryptoSuite,
    keys: &SkKeys<'_>,
    header: &IkeHeader,
    inner: &[IkePayload],
    max_message_len: usize,
) -> Result<Vec<Vec<u8>>> {
    let first_inner = inner
        .first()
        .map(|p| p.payload_type())
        .unwrap_or(PayloadType::None.to_u8());
    let plaintext = encode_payload_list(inner);

    let single_overhead = sk_overhead(suite, false);
    let block = suite.cipher.pad_block_size();
    if single_overhead + plaintext.len() + block <= max_message_len {
        return Ok(vec![seal_body(suite, keys, header, first_inner, plaintext)?]);
    }

    // Usable plaintext per fragment, accounting for worst-case padding
    let frag_overhead = sk_overhead(suite, true);
    if max_message_len <= frag_overhead + block {
        return Err(IkeError::InvalidParameter(format!(
            "Maximum message length {} cannot fit a fragment",
            max_message_len
        )));
    }
    let chunk_size = max_message_len - frag_overhead - block;

    let chunks: Vec<&[u8]> = plaintext.chunks(chunk_size).collect();
    let total = chunks.len() as u16;

    let mut messages = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let fragment_num = (i + 1) as u16;
        // Only the first fragment names the first inner payload type
        let frag_first = if fragment_num == 1 {
            first_inner
        } else {
            PayloadType::None.to_u8()
        };
        messages.push(seal_fragment_body(
            suite,
            keys,
            header,
            frag_first,
            fragment_num,
            total,
            chunk.to_vec(),
        )?);
    }
    Ok(messages)
}

fn seal_fragment_body(
    suite: &CryptoSuite,
    keys: &SkKeys<'_>,
    header: &IkeHeader,
    first_inner: u8,
    fragment_num: u16,
    total_fragments: u16,
    plaintext: Vec<u8>,
) -> Result<Vec<u8>> {
    let padded = pad_plaintext(plaintext, suite.cipher.pad_block_size());

    let mut iv = vec![0u8; suite.cipher.iv_len()];
    rand::thread_rng().fill_bytes(&mut iv);

    let ct_len = padded.len() + suite.cipher.tag_len();
    let skf_len =
        PayloadHeader::SIZE + SKF_SUB_HEADER + iv.len() + ct_len + integrity_only_len(suite);
    let total_len = IKE_HEADER_SIZE + skf_len;

    let mut hdr = header.clone();
    hdr.next_payload = PayloadType::SKF.to_u8();
    hdr.length = total_len as u32;

    let skf_header = PayloadHeader {
        next_payload: first_inner,
        critical: false,
        length: skf_len as u16,
    };

    let mut out = Vec::with_capacity(total_len);
    out.extend_from_slice(&hdr.to_bytes());
    out.extend_from_slice(&skf_header.to_bytes());
    out.extend_from_slice(&fragment_num.to_be_bytes());
    out.extend_from_slice(&total_fragments.to_be_bytes());

    if suite.cipher.is_aead() {
        let aad = out.clone();
        let ciphertext = suite.cipher.encrypt(keys.encr, &iv, &padded, &aad)?;
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
    } else {
        let integrity = suite
            .integrity
            .ok_or_else(|| IkeError::Internal("Non-AEAD suite without integrity".into()))?;
        let ciphertext = suite.cipher.encrypt(keys.encr, &iv, &padded, &[])?;
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        let checksum = integrity.compute(keys.integ, &out)?;
        out.extend_from_slice(&checksum);
    }

    debug_assert_eq!(out.len(), total_len);
    Ok(out)
}

/// Inbound fragment reassembly buffer for one message ID
///
/// Fragments are buffered until the set is complete; a missing fragment
/// past the discard deadline drops the whole message. Duplicate fragment
/// numbers are ignored without overwriting, so retransmitted fragments are
/// idempotent.
#[derive(Debug)]
pub struct FragmentReassembler {
    message_id: u32,
    total_fragments: u16,
    first_payload: u8,
    slots: Vec<Option<Vec<u8>>>,
    received: usize,
    started_at: Instant,
}

impl FragmentReassembler {
    /// Default discard deadline, chosen above the retransmission worst case
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

    /// Start a buffer for `message_id` from the first fragment seen
    pub fn new(message_id: u32, total_fragments: u16) -> Self {
        FragmentReassembler {
            message_id,
            total_fragments,
            first_payload: PayloadType::None.to_u8(),
            slots: vec![None; total_fragments as usize],
            received: 0,
            started_at: Instant::now(),
        }
    }

    /// Message ID this buffer reassembles
    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    /// Whether the discard deadline has passed
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.started_at.elapsed() >= timeout
    }

    /// Insert one decrypted fragment
    ///
    /// Returns the reassembled `(first_payload, plaintext)` once every
    /// fragment has arrived. Fragments whose total disagrees with the set
    /// are rejected; duplicates are accepted and ignored.
    pub fn insert(&mut self, envelope: OpenedEnvelope) -> Result<Option<(u8, Vec<u8>)>> {
        if envelope.total_fragments != self.total_fragments {
            return Err(IkeError::InvalidSyntax(format!(
                "Fragment total {} disagrees with buffered total {}",
                envelope.total_fragments, self.total_fragments
            )));
        }
        if envelope.fragment_num < 1 || envelope.fragment_num > self.total_fragments {
            return Err(IkeError::InvalidSyntax(format!(
                "Fragment number {} out of range 1..={}",
                envelope.fragment_num, self.total_fragments
            )));
        }

        let slot = &mut self.slots[(envelope.fragment_num - 1) as usize];
        if slot.is_some() {
            // Retransmitted fragment: keep the first copy
            return Ok(None);
        }
        if envelope.fragment_num == 1 {
            self.first_payload = envelope.first_payload;
        }
        *slot = Some(envelope.plaintext);
        self.received += 1;

        if self.received < self.total_fragments as usize {
            return Ok(None);
        }

        let mut plaintext = Vec::new();
        for slot in &self.slots {
            plaintext.extend_from_slice(slot.as_ref().expect("all slots filled"));
        }
        Ok(Some((self.first_payload, plaintext)))
    }
}
