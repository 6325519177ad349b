//! Key derivation and message authentication for EAP-SIM/AKA/AKA'
//!
//! - EAP-SIM/AKA expand their master key through the FIPS 186-2 pseudo
//!   random generator (SHA-1 G function without message padding), as
//!   required by RFC 4186 Section 7 and RFC 4187 Section 7.
//! - EAP-AKA' replaces that schedule with the HMAC-SHA-256 PRF' and binds
//!   CK'/IK' to the network name (RFC 5448, 3GPP TS 33.402).
//! - AT_MAC covers the whole EAP packet with the MAC field zeroed,
//!   optionally concatenated with method-specific extra data.

use super::attribute::EapSimAkaAttribute;
use super::EapSimAkaTypeData;
use crate::eap::message::{EapCode, EapData, EapMessage};
use crate::eap::{EapError, Result};

use hmac::{Hmac, Mac};
use sha1::digest::core_api::Block;
use sha1::{Digest, Sha1, Sha1Core};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha1 = Hmac<Sha1>;
type HmacSha256 = Hmac<Sha256>;

/// AT_MAC length in bytes
pub const MAC_LEN: usize = 16;

/// FIPS 186-2 G function: one SHA-1 compression over the 20-byte input
/// zero-padded to a block, starting from the standard initial state
fn g_function(xval: &[u8; 20]) -> [u8; 20] {
    let mut state: [u32; 5] = [0x67452301, 0xEFCDAB89, 0x98BADCFE, 0x10325476, 0xC3D2E1F0];

    let mut block_bytes = [0u8; 64];
    block_bytes[..20].copy_from_slice(xval);
    let block = Block::<Sha1Core>::clone_from_slice(&block_bytes);
    sha1::compress(&mut state, &[block]);

    let mut out = [0u8; 20];
    for (i, word) in state.iter().enumerate() {
        out[i * 4..(i + 1) * 4].copy_from_slice(&word.to_be_bytes());
    }
    out
}

/// FIPS 186-2 pseudo random generator keyed with the 20-byte master key
///
/// ```text
/// XKEY = MK
/// for each round:
///   w = G(t, XKEY)
///   XKEY = (1 + XKEY + w) mod 2^160
/// output = w_0 | w_1 | ...
/// ```
pub fn fips186_2_prf(mk: &[u8; 20], output_len: usize) -> Vec<u8> {
    let mut xkey = *mk;
    let mut out = Vec::with_capacity(output_len);

    while out.len() < output_len {
        let w = g_function(&xkey);
        out.extend_from_slice(&w);

        // XKEY = (1 + XKEY + w) mod 2^160
        let mut carry = 1u16;
        for k in (0..20).rev() {
            let sum = xkey[k] as u16 + w[k] as u16 + carry;
            xkey[k] = (sum & 0xFF) as u8;
            carry = sum >> 8;
        }
    }

    out.truncate(output_len);
    out
}

/// Keys derived by EAP-SIM and EAP-AKA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimAkaKeys {
    /// Encryption key for AT_ENCR_DATA (16 bytes)
    pub k_encr: Vec<u8>,
    /// AT_MAC key (16 bytes)
    pub k_aut: Vec<u8>,
    /// Master session key (64 bytes)
    pub msk: Vec<u8>,
    /// Extended master session key (64 bytes)
    pub emsk: Vec<u8>,
}

/// Expand a SIM/AKA master key into the session keys
pub fn expand_master_key(mk: &[u8; 20]) -> SimAkaKeys {
    let keymat = fips186_2_prf(mk, 16 + 16 + 64 + 64);
    SimAkaKeys {
        k_encr: keymat[0..16].to_vec(),
        k_aut: keymat[16..32].to_vec(),
        msk: keymat[32..96].to_vec(),
        emsk: keymat[96..160].to_vec(),
    }
}

/// EAP-SIM master key (RFC 4186 Section 7)
///
/// ```text
/// MK = SHA1(Identity | n*Kc | NONCE_MT | Version List | Selected Version)
/// ```
pub fn sim_master_key(
    identity: &[u8],
    kcs: &[[u8; 8]],
    nonce_mt: &[u8; 16],
    version_list: &[u16],
    selected_version: u16,
) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(identity);
    for kc in kcs {
        hasher.update(kc);
    }
    hasher.update(nonce_mt);
    for version in version_list {
        hasher.update(version.to_be_bytes());
    }
    hasher.update(selected_version.to_be_bytes());
    hasher.finalize().into()
}

/// EAP-AKA master key (RFC 4187 Section 7)
///
/// ```text
/// MK = SHA1(Identity | IK | CK)
/// ```
pub fn aka_master_key(identity: &[u8], ik: &[u8], ck: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(identity);
    hasher.update(ik);
    hasher.update(ck);
    hasher.finalize().into()
}

/// Keys derived by EAP-AKA' (RFC 5448 Section 3.3)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AkaPrimeKeys {
    /// Encryption key (16 bytes)
    pub k_encr: Vec<u8>,
    /// AT_MAC key (32 bytes, used with HMAC-SHA-256)
    pub k_aut: Vec<u8>,
    /// Re-authentication key (32 bytes)
    pub k_re: Vec<u8>,
    /// Master session key (64 bytes)
    pub msk: Vec<u8>,
    /// Extended master session key (64 bytes)
    pub emsk: Vec<u8>,
}

/// CK'/IK' derivation binding the keys to the access network name
/// (3GPP TS 33.402 Annex A.2, FC = 0x20)
pub fn derive_ck_ik_prime(
    ck: &[u8],
    ik: &[u8],
    network_name: &[u8],
    sqn_xor_ak: &[u8; 6],
) -> (Vec<u8>, Vec<u8>) {
    let mut key = Vec::with_capacity(ck.len() + ik.len());
    key.extend_from_slice(ck);
    key.extend_from_slice(ik);

    let mut s = Vec::new();
    s.push(0x20);
    s.extend_from_slice(network_name);
    s.extend_from_slice(&(network_name.len() as u16).to_be_bytes());
    s.extend_from_slice(sqn_xor_ak);
    s.extend_from_slice(&6u16.to_be_bytes());

    let mut mac = HmacSha256::new_from_slice(&key).expect("HMAC accepts any key size");
    mac.update(&s);
    let out = mac.finalize().into_bytes();

    (out[0..16].to_vec(), out[16..32].to_vec())
}

/// PRF' from RFC 5448 Section 3.4
///
/// ```text
/// PRF'(K,S) = T1 | T2 | ... where
/// T1 = HMAC-SHA-256(K, S | 0x01)
/// Tn = HMAC-SHA-256(K, Tn-1 | S | n)
/// ```
pub fn prf_prime(key: &[u8], s: &[u8], output_len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(output_len);
    let mut t: Vec<u8> = Vec::new();
    let mut counter: u8 = 1;

    while out.len() < output_len {
        let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key size");
        mac.update(&t);
        mac.update(s);
        mac.update(&[counter]);
        t = mac.finalize().into_bytes().to_vec();
        out.extend_from_slice(&t);
        counter = counter.wrapping_add(1);
    }

    out.truncate(output_len);
    out
}

/// Full EAP-AKA' key schedule
pub fn derive_aka_prime_keys(ck_prime: &[u8], ik_prime: &[u8], identity: &[u8]) -> AkaPrimeKeys {
    let mut key = Vec::with_capacity(ik_prime.len() + ck_prime.len());
    key.extend_from_slice(ik_prime);
    key.extend_from_slice(ck_prime);

    let mut s = b"EAP-AKA'".to_vec();
    s.extend_from_slice(identity);

    let keymat = prf_prime(&key, &s, 16 + 32 + 32 + 64 + 64);
    AkaPrimeKeys {
        k_encr: keymat[0..16].to_vec(),
        k_aut: keymat[16..48].to_vec(),
        k_re: keymat[48..80].to_vec(),
        msk: keymat[80..144].to_vec(),
        emsk: keymat[144..208].to_vec(),
    }
}

/// MAC flavor selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacAlgorithm {
    /// HMAC-SHA1-128 (EAP-SIM, EAP-AKA)
    HmacSha1,
    /// HMAC-SHA256-128 (EAP-AKA')
    HmacSha256,
}

fn raw_mac(algorithm: MacAlgorithm, k_aut: &[u8], data: &[u8], extra: &[u8]) -> [u8; MAC_LEN] {
    let digest = match algorithm {
        MacAlgorithm::HmacSha1 => {
            let mut mac = HmacSha1::new_from_slice(k_aut).expect("HMAC accepts any key size");
            mac.update(data);
            mac.update(extra);
            mac.finalize().into_bytes().to_vec()
        }
        MacAlgorithm::HmacSha256 => {
            let mut mac = HmacSha256::new_from_slice(k_aut).expect("HMAC accepts any key size");
            mac.update(data);
            mac.update(extra);
            mac.finalize().into_bytes().to_vec()
        }
    };
    let mut out = [0u8; MAC_LEN];
    out.copy_from_slice(&digest[..MAC_LEN]);
    out
}

fn with_zeroed_mac(type_data: &EapSimAkaTypeData) -> EapSimAkaTypeData {
    let attributes = type_data
        .attributes
        .iter()
        .map(|a| match a {
            EapSimAkaAttribute::Mac(_) => EapSimAkaAttribute::Mac([0u8; MAC_LEN]),
            other => other.clone(),
        })
        .collect();
    EapSimAkaTypeData::new(type_data.subtype, attributes)
}

/// Verify the AT_MAC of a received request
///
/// The MAC covers the whole EAP packet with the MAC value zeroed, followed
/// by `extra` (empty for AKA; NONCE_MT for the SIM challenge).
pub fn verify_at_mac(
    algorithm: MacAlgorithm,
    k_aut: &[u8],
    message: &EapMessage,
    type_data: &EapSimAkaTypeData,
    extra: &[u8],
) -> Result<()> {
    let received = type_data
        .find(|a| matches!(a, EapSimAkaAttribute::Mac(_)))
        .and_then(|a| match a {
            EapSimAkaAttribute::Mac(mac) => Some(*mac),
            _ => None,
        })
        .ok_or_else(|| EapError::Silent("Request missing AT_MAC".into()))?;

    let zeroed = with_zeroed_mac(type_data);
    let mut packet = message.clone();
    let type_raw = packet
        .data
        .as_ref()
        .map(|d| d.type_raw)
        .ok_or_else(|| EapError::Silent("Packet carries no type data".into()))?;
    packet.data = Some(EapData {
        type_raw,
        type_data: zeroed.encode(),
    });

    let expected = raw_mac(algorithm, k_aut, &packet.encode(), extra);
    if expected.ct_eq(&received).unwrap_u8() != 1 {
        return Err(EapError::Silent("AT_MAC verification failed".into()));
    }
    Ok(())
}

/// Build a response whose AT_MAC covers the final packet
///
/// `type_data` must contain a zeroed `Mac` placeholder; it is replaced with
/// the computed value.
pub fn seal_response(
    algorithm: MacAlgorithm,
    k_aut: &[u8],
    identifier: u8,
    method_type: u8,
    type_data: EapSimAkaTypeData,
    extra: &[u8],
) -> EapMessage {
    let zeroed = with_zeroed_mac(&type_data);
    let template = EapMessage {
        code: EapCode::Response,
        identifier,
        data: Some(EapData {
            type_raw: method_type,
            type_data: zeroed.encode(),
        }),
    };

    let mac = raw_mac(algorithm, k_aut, &template.encode(), extra);

    let attributes = type_data
        .attributes
        .into_iter()
        .map(|a| match a {
            EapSimAkaAttribute::Mac(_) => EapSimAkaAttribute::Mac(mac),
            other => other,
        })
        .collect();
    EapMessage {
        code: EapCode::Response,
        identifier,
        data: Some(EapData {
            type_raw: method_type,
            type_data: EapSimAkaTypeData::new(type_data.subtype, attributes).encode(),
        }),
    }
}
