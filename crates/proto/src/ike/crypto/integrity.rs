//! Integrity MAC implementations for the SK payload
//!
//! Implements the integrity transforms negotiable by this engine, each
//! truncated to its RFC-defined checksum length: HMAC-SHA1-96 (RFC 2404),
//! HMAC-SHA2 truncated to half the digest (RFC 4868), AES-XCBC-96
//! (RFC 3566) and AES-CMAC-96 (RFC 4494).

use crate::ike::proposal::IntegTransformId;
use crate::ike::{IkeError, Result};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit as BlockKeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use hmac::Hmac;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

/// Integrity MAC algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityAlgorithm {
    /// HMAC-SHA1 truncated to 96 bits
    HmacSha1_96,
    /// HMAC-SHA2-256 truncated to 128 bits
    HmacSha256_128,
    /// HMAC-SHA2-384 truncated to 192 bits
    HmacSha384_192,
    /// HMAC-SHA2-512 truncated to 256 bits
    HmacSha512_256,
    /// AES-XCBC-MAC truncated to 96 bits
    AesXcbc96,
    /// AES-CMAC truncated to 96 bits
    AesCmac96,
}

impl IntegrityAlgorithm {
    /// Build from a negotiated transform ID
    pub fn from_transform(id: IntegTransformId) -> Self {
        match id {
            IntegTransformId::HmacSha1_96 => IntegrityAlgorithm::HmacSha1_96,
            IntegTransformId::AesXcbc96 => IntegrityAlgorithm::AesXcbc96,
            IntegTransformId::AesCmac96 => IntegrityAlgorithm::AesCmac96,
            IntegTransformId::HmacSha256_128 => IntegrityAlgorithm::HmacSha256_128,
            IntegTransformId::HmacSha384_192 => IntegrityAlgorithm::HmacSha384_192,
            IntegTransformId::HmacSha512_256 => IntegrityAlgorithm::HmacSha512_256,
        }
    }

    /// Key length in bytes
    pub fn key_len(self) -> usize {
        match self {
            IntegrityAlgorithm::HmacSha1_96 => 20,
            IntegrityAlgorithm::HmacSha256_128 => 32,
            IntegrityAlgorithm::HmacSha384_192 => 48,
            IntegrityAlgorithm::HmacSha512_256 => 64,
            IntegrityAlgorithm::AesXcbc96 | IntegrityAlgorithm::AesCmac96 => 16,
        }
    }

    /// Truncated checksum length in bytes
    pub fn checksum_len(self) -> usize {
        match self {
            IntegrityAlgorithm::HmacSha1_96 => 12,
            IntegrityAlgorithm::HmacSha256_128 => 16,
            IntegrityAlgorithm::HmacSha384_192 => 24,
            IntegrityAlgorithm::HmacSha512_256 => 32,
            IntegrityAlgorithm::AesXcbc96 | IntegrityAlgorithm::AesCmac96 => 12,
        }
    }

    /// Compute the truncated checksum over `data`
    pub fn compute(self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        if key.len() != self.key_len() {
            return Err(IkeError::Crypto(format!(
                "Invalid integrity key length: expected {}, got {}",
                self.key_len(),
                key.len()
            )));
        }

        let mut full = match self {
            IntegrityAlgorithm::HmacSha1_96 => hmac_digest::<Hmac<Sha1>>(key, data)?,
            IntegrityAlgorithm::HmacSha256_128 => hmac_digest::<Hmac<Sha256>>(key, data)?,
            IntegrityAlgorithm::HmacSha384_192 => hmac_digest::<Hmac<Sha384>>(key, data)?,
            IntegrityAlgorithm::HmacSha512_256 => hmac_digest::<Hmac<Sha512>>(key, data)?,
            IntegrityAlgorithm::AesXcbc96 => xcbc_mac(key, data)?.to_vec(),
            IntegrityAlgorithm::AesCmac96 => {
                let mut mac = <Cmac<Aes128> as cmac::Mac>::new_from_slice(key)
                    .map_err(|_| IkeError::Crypto("Failed to initialize AES-CMAC".into()))?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        };

        full.truncate(self.checksum_len());
        Ok(full)
    }

    /// Verify a received checksum in constant time
    pub fn verify(self, key: &[u8], data: &[u8], checksum: &[u8]) -> Result<()> {
        let expected = self.compute(key, data)?;
        if expected.len() != checksum.len() {
            return Err(IkeError::Crypto("Integrity checksum length mismatch".into()));
        }
        if expected.ct_eq(checksum).unwrap_u8() != 1 {
            return Err(IkeError::Crypto("Integrity checksum mismatch".into()));
        }
        Ok(())
    }
}

fn hmac_digest<M: Mac + hmac::digest::KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = <M as Mac>::new_from_slice(key)
        .map_err(|_| IkeError::Crypto("Failed to initialize HMAC".into()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Full 16-byte AES-XCBC-MAC (RFC 3566)
///
/// Also used by the AES-XCBC PRF (RFC 4434), which needs the untruncated
/// output.
pub(crate) fn xcbc_mac(key: &[u8], data: &[u8]) -> Result<[u8; 16]> {
    if key.len() != 16 {
        return Err(IkeError::Crypto("AES-XCBC requires a 16-byte key".into()));
    }
    let cipher = Aes128::new_from_slice(key)
        .map_err(|_| IkeError::Crypto("Failed to initialize AES-XCBC".into()))?;

    let derive = |fill: u8| -> [u8; 16] {
        let mut block = GenericArray::clone_from_slice(&[fill; 16]);
        cipher.encrypt_block(&mut block);
        block.into()
    };
    let k1 = derive(0x01);
    let k2 = derive(0x02);
    let k3 = derive(0x03);

    let k1_cipher = Aes128::new_from_slice(&k1)
        .map_err(|_| IkeError::Crypto("Failed to initialize AES-XCBC".into()))?;

    let mut e = [0u8; 16];
    let full_blocks = if data.is_empty() {
        0
    } else {
        (data.len() - 1) / 16
    };

    for i in 0..full_blocks {
        let block = &data[i * 16..(i + 1) * 16];
        for (e_byte, b) in e.iter_mut().zip(block) {
            *e_byte ^= b;
        }
        let mut ga = GenericArray::clone_from_slice(&e);
        k1_cipher.encrypt_block(&mut ga);
        e = ga.into();
    }

    let rest = &data[full_blocks * 16..];
    let mut last = [0u8; 16];
    if rest.len() == 16 {
        last.copy_from_slice(rest);
        for ((l, e_byte), k) in last.iter_mut().zip(&e).zip(&k2) {
            *l ^= e_byte ^ k;
        }
    } else {
        last[..rest.len()].copy_from_slice(rest);
        last[rest.len()] = 0x80;
        for ((l, e_byte), k) in last.iter_mut().zip(&e).zip(&k3) {
            *l ^= e_byte ^ k;
        }
    }

    let mut ga = GenericArray::clone_from_slice(&last);
    k1_cipher.encrypt_block(&mut ga);
    Ok(ga.into())
}
