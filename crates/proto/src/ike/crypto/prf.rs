//! Pseudo-Random Function (PRF) implementations
//!
//! Implements the PRF transforms and the `prf+` key expansion from
//! RFC 7296 Section 2.13, plus the IKE SA and Child SA key derivations
//! from Sections 2.14 and 2.17.

use super::integrity::xcbc_mac;
use crate::ike::proposal::PrfTransformId;
use crate::ike::{IkeError, Result};

use aes::Aes128;
use cmac::{Cmac, Mac};
use hmac::Hmac;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroize;

/// PRF algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrfAlgorithm {
    /// HMAC-SHA1
    HmacSha1,
    /// HMAC-SHA2-256
    HmacSha256,
    /// HMAC-SHA2-384
    HmacSha384,
    /// HMAC-SHA2-512
    HmacSha512,
    /// AES128-XCBC (RFC 4434)
    AesXcbc,
    /// AES128-CMAC (RFC 4615)
    AesCmac,
}

impl PrfAlgorithm {
    /// Build from a negotiated transform ID
    pub fn from_transform(id: PrfTransformId) -> Self {
        match id {
            PrfTransformId::HmacSha1 => PrfAlgorithm::HmacSha1,
            PrfTransformId::AesXcbc => PrfAlgorithm::AesXcbc,
            PrfTransformId::HmacSha256 => PrfAlgorithm::HmacSha256,
            PrfTransformId::HmacSha384 => PrfAlgorithm::HmacSha384,
            PrfTransformId::HmacSha512 => PrfAlgorithm::HmacSha512,
            PrfTransformId::AesCmac => PrfAlgorithm::AesCmac,
        }
    }

    /// PRF output length in bytes
    pub fn output_len(self) -> usize {
        match self {
            PrfAlgorithm::HmacSha1 => 20,
            PrfAlgorithm::HmacSha256 => 32,
            PrfAlgorithm::HmacSha384 => 48,
            PrfAlgorithm::HmacSha512 => 64,
            PrfAlgorithm::AesXcbc | PrfAlgorithm::AesCmac => 16,
        }
    }

    /// Preferred key length in bytes (sizes SK_d/SK_pi/SK_pr)
    pub fn key_len(self) -> usize {
        self.output_len()
    }

    /// Compute the PRF
    pub fn compute(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        match self {
            PrfAlgorithm::HmacSha1 => hmac_compute::<Hmac<Sha1>>(key, data),
            PrfAlgorithm::HmacSha256 => hmac_compute::<Hmac<Sha256>>(key, data),
            PrfAlgorithm::HmacSha384 => hmac_compute::<Hmac<Sha384>>(key, data),
            PrfAlgorithm::HmacSha512 => hmac_compute::<Hmac<Sha512>>(key, data),
            PrfAlgorithm::AesXcbc => {
                let key = normalize_block_key(key, |k, d| {
                    xcbc_mac(k, d).expect("16-byte key").to_vec()
                });
                xcbc_mac(&key, data).expect("16-byte key").to_vec()
            }
            PrfAlgorithm::AesCmac => {
                let key = normalize_block_key(key, cmac_compute);
                cmac_compute(&key, data)
            }
        }
    }

    /// Compute prf+ (key expansion function)
    ///
    /// Defined in RFC 7296 Section 2.13:
    /// ```text
    /// prf+ (K,S) = T1 | T2 | T3 | T4 | ...
    ///
    /// where:
    /// T1 = prf (K, S | 0x01)
    /// T2 = prf (K, T1 | S | 0x02)
    /// T3 = prf (K, T2 | S | 0x03)
    /// ...
    /// ```
    pub fn prf_plus(self, key: &[u8], seed: &[u8], output_len: usize) -> Result<Vec<u8>> {
        // The iteration counter is a single octet
        if output_len > 255 * self.output_len() {
            return Err(IkeError::Crypto(format!(
                "prf+ cannot produce {} bytes",
                output_len
            )));
        }

        let mut output = Vec::with_capacity(output_len);
        let mut t = Vec::new();
        let mut counter: u8 = 1;

        while output.len() < output_len {
            let mut input = Vec::with_capacity(t.len() + seed.len() + 1);
            input.extend_from_slice(&t);
            input.extend_from_slice(seed);
            input.push(counter);

            t = self.compute(key, &input);
            output.extend_from_slice(&t);

            counter = counter.wrapping_add(1);
        }

        output.truncate(output_len);
        Ok(output)
    }
}

fn hmac_compute<M: Mac + hmac::digest::KeyInit>(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = <M as Mac>::new_from_slice(key).expect("HMAC accepts any key size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn cmac_compute(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Cmac::<Aes128>::new_from_slice(key).expect("16-byte key");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Key fixup shared by the fixed-key block-cipher PRFs
///
/// RFC 4434 / RFC 4615: keys shorter than 16 bytes are zero padded, longer
/// keys are compressed through the MAC keyed with all zeros.
fn normalize_block_key(key: &[u8], mac: impl Fn(&[u8], &[u8]) -> Vec<u8>) -> Vec<u8> {
    use std::cmp::Ordering;

    match key.len().cmp(&16) {
        Ordering::Equal => key.to_vec(),
        Ordering::Less => {
            let mut padded = key.to_vec();
            padded.resize(16, 0);
            padded
        }
        Ordering::Greater => mac(&[0u8; 16], key),
    }
}

/// IKE SA key material derived from SKEYSEED
///
/// Contains all keys derived during the IKE_SA_INIT exchange
/// (RFC 7296 Section 2.14). Zeroized on drop.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    /// SK_d - key derivation key for Child SAs
    pub sk_d: Vec<u8>,

    /// SK_ai - initiator's integrity key
    pub sk_ai: Vec<u8>,

    /// SK_ar - responder's integrity key
    pub sk_ar: Vec<u8>,

    /// SK_ei - initiator's encryption key material
    pub sk_ei: Vec<u8>,

    /// SK_er - responder's encryption key material
    pub sk_er: Vec<u8>,

    /// SK_pi - initiator's AUTH payload key
    pub sk_pi: Vec<u8>,

    /// SK_pr - responder's AUTH payload key
    pub sk_pr: Vec<u8>,
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.sk_d.zeroize();
        self.sk_ai.zeroize();
        self.sk_ar.zeroize();
        self.sk_ei.zeroize();
        self.sk_er.zeroize();
        self.sk_pi.zeroize();
        self.sk_pr.zeroize();
    }
}

impl KeyMaterial {
    /// Derive IKE SA keys
    ///
    /// ```text
    /// SKEYSEED = prf(Ni | Nr, g^ir)
    /// {SK_d | SK_ai | SK_ar | SK_ei | SK_er | SK_pi | SK_pr}
    ///     = prf+ (SKEYSEED, Ni | Nr | SPIi | SPIr)
    /// ```
    #[allow(clippy::too_many_arguments)]
    pub fn derive(
        prf: PrfAlgorithm,
        nonce_i: &[u8],
        nonce_r: &[u8],
        shared_secret: &[u8],
        spi_i: &[u8; 8],
        spi_r: &[u8; 8],
        encr_key_len: usize,
        integ_key_len: usize,
    ) -> Result<Self> {
        let mut prf_key = Vec::with_capacity(nonce_i.len() + nonce_r.len());
        prf_key.extend_from_slice(nonce_i);
        prf_key.extend_from_slice(nonce_r);

        let skeyseed = prf.compute(&prf_key, shared_secret);

        let mut seed = Vec::new();
        seed.extend_from_slice(nonce_i);
        seed.extend_from_slice(nonce_r);
        seed.extend_from_slice(spi_i);
        seed.extend_from_slice(spi_r);

        let prf_len = prf.key_len();
        let total_len = prf_len + 2 * integ_key_len + 2 * encr_key_len + 2 * prf_len;

        let keymat = prf.prf_plus(&skeyseed, &seed, total_len)?;

        let mut offset = 0;
        let mut take = |len: usize| {
            let slice = keymat[offset..offset + len].to_vec();
            offset += len;
            slice
        };

        Ok(KeyMaterial {
            sk_d: take(prf_len),
            sk_ai: take(integ_key_len),
            sk_ar: take(integ_key_len),
            sk_ei: take(encr_key_len),
            sk_er: take(encr_key_len),
            sk_pi: take(prf_len),
            sk_pr: take(prf_len),
        })
    }

    /// Derive keys for a rekeyed IKE SA (RFC 7296 Section 2.18)
    ///
    /// ```text
    /// SKEYSEED = prf(SK_d (old), g^ir (new) | Ni | Nr)
    /// ```
    #[allow(clippy::too_many_arguments)]
    pub fn derive_rekeyed(
        prf: PrfAlgorithm,
        old_sk_d: &[u8],
        nonce_i: &[u8],
        nonce_r: &[u8],
        shared_secret: &[u8],
        spi_i: &[u8; 8],
        spi_r: &[u8; 8],
        encr_key_len: usize,
        integ_key_len: usize,
    ) -> Result<Self> {
        let mut data = Vec::new();
        data.extend_from_slice(shared_secret);
        data.extend_from_slice(nonce_i);
        data.extend_from_slice(nonce_r);
        let skeyseed = prf.compute(old_sk_d, &data);

        let mut seed = Vec::new();
        seed.extend_from_slice(nonce_i);
        seed.extend_from_slice(nonce_r);
        seed.extend_from_slice(spi_i);
        seed.extend_from_slice(spi_r);

        let prf_len = prf.key_len();
        let total_len = prf_len + 2 * integ_key_len + 2 * encr_key_len + 2 * prf_len;
        let keymat = prf.prf_plus(&skeyseed, &seed, total_len)?;

        let mut offset = 0;
        let mut take = |len: usize| {
            let slice = keymat[offset..offset + len].to_vec();
            offset += len;
            slice
        };

        Ok(KeyMaterial {
            sk_d: take(prf_len),
            sk_ai: take(integ_key_len),
            sk_ar: take(integ_key_len),
            sk_ei: take(encr_key_len),
            sk_er: take(encr_key_len),
            sk_pi: take(prf_len),
            sk_pr: take(prf_len),
        })
    }
}

/// Child SA key material (RFC 7296 Section 2.17)
#[derive(Debug, Clone)]
pub struct ChildKeyMaterial {
    /// Initiator-to-responder encryption key material
    pub sk_ei: Vec<u8>,
    /// Initiator-to-responder integrity key
    pub sk_ai: Vec<u8>,
    /// Responder-to-initiator encryption key material
    pub sk_er: Vec<u8>,
    /// Responder-to-initiator integrity key
    pub sk_ar: Vec<u8>,
}

impl Drop for ChildKeyMaterial {
    fn drop(&mut self) {
        self.sk_ei.zeroize();
        self.sk_ai.zeroize();
        self.sk_er.zeroize();
        self.sk_ar.zeroize();
    }
}

impl ChildKeyMaterial {
    /// Derive Child SA keys from SK_d
    ///
    /// ```text
    /// KEYMAT = prf+(SK_d, Ni | Nr)
    /// ```
    ///
    /// Sliced as initiator encryption, initiator integrity, responder
    /// encryption, responder integrity.
    pub fn derive(
        prf: PrfAlgorithm,
        sk_d: &[u8],
        nonce_i: &[u8],
        nonce_r: &[u8],
        encr_key_len: usize,
        integ_key_len: usize,
    ) -> Result<Self> {
        let mut seed = Vec::with_capacity(nonce_i.len() + nonce_r.len());
        seed.extend_from_slice(nonce_i);
        seed.extend_from_slice(nonce_r);

        let total_len = 2 * encr_key_len + 2 * integ_key_len;
        let keymat = prf.prf_plus(sk_d, &seed, total_len)?;

        let mut offset = 0;
        let mut take = |len: usize| {
            let slice = keymat[offset..offset + len].to_vec();
            offset += len;
            slice
        };

        Ok(ChildKeyMaterial {
            sk_ei: take(encr_key_len),
            sk_ai: take(integ_key_len),
            sk_er: take(encr_key_len),
            sk_ar: take(integ_key_len),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prf_output_len() {
        assert_eq!(PrfAlgorithm::HmacSha1.output_len(), 20);
        assert_eq!(PrfAlgorithm::HmacSha256.output_len(), 32);
        assert_eq!(PrfAlgorithm::HmacSha384.output_len(), 48);
        assert_eq!(PrfAlgorithm::HmacSha512.output_len(), 64);
        assert_eq!(PrfAlgorithm::AesXcbc.output_len(), 16);
        assert_eq!(PrfAlgorithm::AesCmac.output_len(), 16);
    }

    #[test]
    fn test_prf_deterministic() {
        for alg in [
            PrfAlgorithm::HmacSha1,
            PrfAlgorithm::HmacSha256,
            PrfAlgorithm::AesXcbc,
            PrfAlgorithm::AesCmac,
        ] {
            let a = alg.compute(b"test key padding", b"test data");
            let b = alg.compute(b"test key padding", b"test data");
            assert_eq!(a, b);
            assert_eq!(a.len(), alg.output_len());
        }
    }

    // RFC 4434 test vectors: PRF-AES128-XCBC with non-16-byte keys
    #[test]
    fn test_xcbc_prf_key_fixup_vectors() {
        let msg = hex::decode("000102030405060708090a0b0c0d0e0f10111213").unwrap();

        // 10-byte key, zero padded
        let key = hex::decode("00010203040506070809").unwrap();
        let out = PrfAlgorithm::AesXcbc.compute(&key, &msg);
        assert_eq!(hex::encode(&out), "0fa087af7d866e7653434e602fdde835");

        // 18-byte key, compressed through the MAC
        let key = hex::decode("000102030405060708090a0b0c0d0e0fedcb").unwrap();
        let out = PrfAlgorithm::AesXcbc.compute(&key, &msg);
        assert_eq!(hex::encode(&out), "8cd3c93ae598a9803006ffb67c40e9e4");
    }

    #[test]
    fn test_prf_plus_expansion() {
        let key = b"secret key";
        let seed = b"seed data";

        let long = PrfAlgorithm::HmacSha256.prf_plus(key, seed, 100).unwrap();
        assert_eq!(long.len(), 100);

        // Shorter requests are prefixes of longer ones
        let short = PrfAlgorithm::HmacSha256.prf_plus(key, seed, 32).unwrap();
        assert_eq!(&short[..], &long[0..32]);
    }

    #[test]
    fn test_prf_plus_output_limit() {
        let result = PrfAlgorithm::AesXcbc.prf_plus(b"k", b"s", 255 * 16 + 1);
        assert!(result.is_err());
    }

    #[test]
    fn test_key_material_lengths() {
        let keymat = KeyMaterial::derive(
            PrfAlgorithm::HmacSha256,
            &[0x01; 32],
            &[0x02; 32],
            &[0x03; 256],
            &[0x04; 8],
            &[0x05; 8],
            36, // AES-GCM-256 key + salt
            0,
        )
        .unwrap();

        assert_eq!(keymat.sk_d.len(), 32);
        assert_eq!(keymat.sk_ai.len(), 0);
        assert_eq!(keymat.sk_ar.len(), 0);
        assert_eq!(keymat.sk_ei.len(), 36);
        assert_eq!(keymat.sk_er.len(), 36);
        assert_eq!(keymat.sk_pi.len(), 32);
        assert_eq!(keymat.sk_pr.len(), 32);

        assert_ne!(keymat.sk_ei, keymat.sk_er);
        assert_ne!(keymat.sk_pi, keymat.sk_pr);
    }

    #[test]
    fn test_key_material_deterministic() {
        let derive = || {
            KeyMaterial::derive(
                PrfAlgorithm::HmacSha256,
                &[0x01; 32],
                &[0x02; 32],
                &[0x03; 256],
                &[0x04; 8],
                &[0x05; 8],
                32,
                32,
            )
            .unwrap()
        };
        let a = derive();
        let b = derive();
        assert_eq!(a.sk_d, b.sk_d);
        assert_eq!(a.sk_ei, b.sk_ei);
    }

    #[test]
    fn test_key_material_depends_on_nonces() {
        let derive = |ni: u8| {
            KeyMaterial::derive(
                PrfAlgorithm::HmacSha256,
                &[ni; 32],
                &[0x02; 32],
                &[0x03; 256],
                &[0x04; 8],
                &[0x05; 8],
                32,
                32,
            )
            .unwrap()
        };
        assert_ne!(derive(0x01).sk_d, derive(0x09).sk_d);
    }

    #[test]
    fn test_rekeyed_key_material_differs() {
        let original = KeyMaterial::derive(
            PrfAlgorithm::HmacSha256,
            &[0x01; 32],
            &[0x02; 32],
            &[0x03; 256],
            &[0x04; 8],
            &[0x05; 8],
            32,
            32,
        )
        .unwrap();

        let rekeyed = KeyMaterial::derive_rekeyed(
            PrfAlgorithm::HmacSha256,
            &original.sk_d,
            &[0x06; 32],
            &[0x07; 32],
            &[0x08; 256],
            &[0x04; 8],
            &[0x09; 8],
            32,
            32,
        )
        .unwrap();

        assert_ne!(original.sk_d, rekeyed.sk_d);
        assert_ne!(original.sk_ei, rekeyed.sk_ei);
    }

    #[test]
    fn test_child_key_material() {
        let child = ChildKeyMaterial::derive(
            PrfAlgorithm::HmacSha256,
            &[0x0A; 32],
            &[0x01; 32],
            &[0x02; 32],
            20, // AES-GCM-128 key + salt
            0,
        )
        .unwrap();

        assert_eq!(child.sk_ei.len(), 20);
        assert_eq!(child.sk_ai.len(), 0);
        assert_eq!(child.sk_er.len(), 20);
        assert_eq!(child.sk_ar.len(), 0);
        assert_ne!(child.sk_ei, child.sk_er);
    }
}
