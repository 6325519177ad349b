//! Cipher implementations for the SK payload
//!
//! Implements the encryption transforms negotiable by this engine:
//! AES-CBC (RFC 3602), AES-CTR (RFC 5930), and AES-GCM with 8/12/16 byte
//! ICV (RFC 5282). CBC and CTR require an external integrity MAC; GCM is a
//! combined mode.
//!
//! Key material layout follows the ESP conventions reused by IKEv2: CTR and
//! GCM carry a 4-byte salt after the key, so `key_material_len()` exceeds
//! `key_len()` for those modes.

use crate::ike::proposal::EncrTransformId;
use crate::ike::{IkeError, Result};

use aes::{Aes128, Aes192, Aes256};
use aes_gcm::aead::generic_array::typenum::{U12, U16, U8};
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{AesGcm, KeyInit};
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, StreamCipher};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes192CbcEnc = cbc::Encryptor<Aes192>;
type Aes192CbcDec = cbc::Decryptor<Aes192>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

type Aes128Ctr = ctr::Ctr32BE<Aes128>;
type Aes192Ctr = ctr::Ctr32BE<Aes192>;
type Aes256Ctr = ctr::Ctr32BE<Aes256>;

/// AES key length selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesKeyLen {
    /// 128-bit key
    Len128,
    /// 192-bit key
    Len192,
    /// 256-bit key
    Len256,
}

impl AesKeyLen {
    /// Key length in bytes
    pub fn bytes(self) -> usize {
        match self {
            AesKeyLen::Len128 => 16,
            AesKeyLen::Len192 => 24,
            AesKeyLen::Len256 => 32,
        }
    }

    fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            128 => Ok(AesKeyLen::Len128),
            192 => Ok(AesKeyLen::Len192),
            256 => Ok(AesKeyLen::Len256),
            other => Err(IkeError::InvalidParameter(format!(
                "Unsupported AES key length: {} bits",
                other
            ))),
        }
    }
}

/// GCM authentication tag length selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcmTagLen {
    /// 8-byte ICV
    Tag8,
    /// 12-byte ICV
    Tag12,
    /// 16-byte ICV
    Tag16,
}

impl GcmTagLen {
    /// Tag length in bytes
    pub fn bytes(self) -> usize {
        match self {
            GcmTagLen::Tag8 => 8,
            GcmTagLen::Tag12 => 12,
            GcmTagLen::Tag16 => 16,
        }
    }
}

/// Cipher algorithm for SK payload encryption
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherAlgorithm {
    /// AES-CBC, external integrity MAC required
    AesCbc(AesKeyLen),
    /// AES-CTR, external integrity MAC required
    AesCtr(AesKeyLen),
    /// AES-GCM combined mode
    AesGcm(AesKeyLen, GcmTagLen),
}

impl CipherAlgorithm {
    /// Build from a negotiated transform ID and key-length attribute
    pub fn from_transform(id: EncrTransformId, key_bits: u16) -> Result<Self> {
        let key_len = AesKeyLen::from_bits(key_bits)?;
        Ok(match id {
            EncrTransformId::AesCbc => CipherAlgorithm::AesCbc(key_len),
            EncrTransformId::AesCtr => CipherAlgorithm::AesCtr(key_len),
            EncrTransformId::AesGcm8 => CipherAlgorithm::AesGcm(key_len, GcmTagLen::Tag8),
            EncrTransformId::AesGcm12 => CipherAlgorithm::AesGcm(key_len, GcmTagLen::Tag12),
            EncrTransformId::AesGcm16 => CipherAlgorithm::AesGcm(key_len, GcmTagLen::Tag16),
        })
    }

    /// Cipher key length in bytes (excluding salt)
    pub fn key_len(self) -> usize {
        match self {
            CipherAlgorithm::AesCbc(k) | CipherAlgorithm::AesCtr(k) | CipherAlgorithm::AesGcm(k, _) => {
                k.bytes()
            }
        }
    }

    /// Salt length carried after the key in the keying material
    pub fn salt_len(self) -> usize {
        match self {
            CipherAlgorithm::AesCbc(_) => 0,
            CipherAlgorithm::AesCtr(_) | CipherAlgorithm::AesGcm(_, _) => 4,
        }
    }

    /// Total keying material length (key + salt)
    pub fn key_material_len(self) -> usize {
        self.key_len() + self.salt_len()
    }

    /// IV length on the wire
    pub fn iv_len(self) -> usize {
        match self {
            CipherAlgorithm::AesCbc(_) => 16,
            CipherAlgorithm::AesCtr(_) | CipherAlgorithm::AesGcm(_, _) => 8,
        }
    }

    /// Block size plaintext must be padded to
    pub fn pad_block_size(self) -> usize {
        match self {
            CipherAlgorithm::AesCbc(_) => 16,
            // Stream and combined modes need no alignment padding
            CipherAlgorithm::AesCtr(_) | CipherAlgorithm::AesGcm(_, _) => 1,
        }
    }

    /// Authentication tag length (0 for non-AEAD ciphers)
    pub fn tag_len(self) -> usize {
        match self {
            CipherAlgorithm::AesGcm(_, t) => t.bytes(),
            _ => 0,
        }
    }

    /// Check if this is a combined-mode cipher
    pub fn is_aead(self) -> bool {
        matches!(self, CipherAlgorithm::AesGcm(_, _))
    }

    fn check_lengths(self, key_material: &[u8], iv: &[u8]) -> Result<()> {
        if key_material.len() != self.key_material_len() {
            return Err(IkeError::Crypto(format!(
                "Invalid key material length: expected {}, got {}",
                self.key_material_len(),
                key_material.len()
            )));
        }
        if iv.len() != self.iv_len() {
            return Err(IkeError::Crypto(format!(
                "Invalid IV length: expected {}, got {}",
                self.iv_len(),
                iv.len()
            )));
        }
        Ok(())
    }

    /// Encrypt plaintext
    ///
    /// For CBC the plaintext must already be padded to the block size; the
    /// caller appends the integrity checksum separately. For GCM the
    /// associated data is authenticated and the tag is appended to the
    /// returned ciphertext.
    pub fn encrypt(
        self,
        key_material: &[u8],
        iv: &[u8],
        plaintext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        self.check_lengths(key_material, iv)?;

        match self {
            CipherAlgorithm::AesCbc(key_len) => {
                if plaintext.len() % 16 != 0 {
                    return Err(IkeError::Crypto(
                        "CBC plaintext not padded to block size".into(),
                    ));
                }
                let mut buf = plaintext.to_vec();
                match key_len {
                    AesKeyLen::Len128 => {
                        cbc_encrypt::<Aes128CbcEnc>(key_material, iv, &mut buf)?
                    }
                    AesKeyLen::Len192 => {
                        cbc_encrypt::<Aes192CbcEnc>(key_material, iv, &mut buf)?
                    }
                    AesKeyLen::Len256 => {
                        cbc_encrypt::<Aes256CbcEnc>(key_material, iv, &mut buf)?
                    }
                }
                Ok(buf)
            }
            CipherAlgorithm::AesCtr(key_len) => {
                let mut buf = plaintext.to_vec();
                let (key, salt) = key_material.split_at(self.key_len());
                let nonce = ctr_nonce(salt, iv);
                match key_len {
                    AesKeyLen::Len128 => ctr_apply::<Aes128Ctr>(key, &nonce, &mut buf)?,
                    AesKeyLen::Len192 => ctr_apply::<Aes192Ctr>(key, &nonce, &mut buf)?,
                    AesKeyLen::Len256 => ctr_apply::<Aes256Ctr>(key, &nonce, &mut buf)?,
                }
                Ok(buf)
            }
            CipherAlgorithm::AesGcm(key_len, tag_len) => {
                let (key, salt) = key_material.split_at(self.key_len());
                let nonce = gcm_nonce(salt, iv);
                gcm_dispatch(key_len, tag_len, key, &nonce, plaintext, aad, true)
            }
        }
    }

    /// Decrypt ciphertext
    ///
    /// For GCM the tag is expected at the end of `ciphertext` and verified
    /// against the associated data before any plaintext is returned.
    pub fn decrypt(
        self,
        key_material: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        self.check_lengths(key_material, iv)?;

        match self {
            CipherAlgorithm::AesCbc(key_len) => {
                if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
                    return Err(IkeError::Crypto(
                        "CBC ciphertext not a multiple of block size".into(),
                    ));
                }
                let mut buf = ciphertext.to_vec();
                match key_len {
                    AesKeyLen::Len128 => {
                        cbc_decrypt::<Aes128CbcDec>(key_material, iv, &mut buf)?
                    }
                    AesKeyLen::Len192 => {
                        cbc_decrypt::<Aes192CbcDec>(key_material, iv, &mut buf)?
                    }
                    AesKeyLen::Len256 => {
                        cbc_decrypt::<Aes256CbcDec>(key_material, iv, &mut buf)?
                    }
                }
                Ok(buf)
            }
            CipherAlgorithm::AesCtr(_) => {
                // CTR encryption is its own inverse
                self.encrypt(key_material, iv, ciphertext, aad)
            }
            CipherAlgorithm::AesGcm(key_len, tag_len) => {
                if ciphertext.len() < tag_len.bytes() {
                    return Err(IkeError::Crypto("GCM ciphertext shorter than tag".into()));
                }
                let (key, salt) = key_material.split_at(self.key_len());
                let nonce = gcm_nonce(salt, iv);
                gcm_dispatch(key_len, tag_len, key, &nonce, ciphertext, aad, false)
            }
        }
    }
}

fn cbc_encrypt<E>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
where
    E: KeyIvInit + BlockEncryptMut,
{
    let mut enc = E::new_from_slices(key, iv)
        .map_err(|_| IkeError::Crypto("Failed to initialize AES-CBC".into()))?;
    for block in buf.chunks_exact_mut(16) {
        enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

fn cbc_decrypt<D>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<()>
where
    D: KeyIvInit + BlockDecryptMut,
{
    let mut dec = D::new_from_slices(key, iv)
        .map_err(|_| IkeError::Crypto("Failed to initialize AES-CBC".into()))?;
    for block in buf.chunks_exact_mut(16) {
        dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Ok(())
}

/// Counter-mode block: salt (4) || IV (8) || counter starting at 1 (RFC 5930)
fn ctr_nonce(salt: &[u8], iv: &[u8]) -> [u8; 16] {
    let mut nonce = [0u8; 16];
    nonce[..4].copy_from_slice(salt);
    nonce[4..12].copy_from_slice(iv);
    nonce[15] = 1;
    nonce
}

fn ctr_apply<C>(key: &[u8], nonce: &[u8; 16], buf: &mut [u8]) -> Result<()>
where
    C: KeyIvInit + StreamCipher,
{
    let mut ctr = C::new_from_slices(key, nonce)
        .map_err(|_| IkeError::Crypto("Failed to initialize AES-CTR".into()))?;
    ctr.apply_keystream(buf);
    Ok(())
}

/// GCM nonce: salt (4) || IV (8) (RFC 5282)
fn gcm_nonce(salt: &[u8], iv: &[u8]) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..4].copy_from_slice(salt);
    nonce[4..].copy_from_slice(iv);
    nonce
}

fn gcm_run<C>(key: &[u8], nonce: &[u8; 12], data: &[u8], aad: &[u8], seal: bool) -> Result<Vec<u8>>
where
    C: Aead + KeyInit,
{
    let cipher =
        C::new_from_slice(key).map_err(|_| IkeError::Crypto("Failed to initialize AES-GCM".into()))?;
    let payload = Payload { msg: data, aad };
    let nonce = aes_gcm::Nonce::from_slice(nonce);
    if seal {
        cipher
            .encrypt(nonce, payload)
            .map_err(|_| IkeError::Crypto("AES-GCM encryption failed".into()))
    } else {
        cipher
            .decrypt(nonce, payload)
            .map_err(|_| IkeError::Crypto("AES-GCM authentication failed".into()))
    }
}

fn gcm_dispatch(
    key_len: AesKeyLen,
    tag_len: GcmTagLen,
    key: &[u8],
    nonce: &[u8; 12],
    data: &[u8],
    aad: &[u8],
    seal: bool,
) -> Result<Vec<u8>> {
    use AesKeyLen::*;
    use GcmTagLen::*;
    match (key_len, tag_len) {
        (Len128, Tag8) => gcm_run::<AesGcm<Aes128, U12, U8>>(key, nonce, data, aad, seal),
        (Len128, Tag12) => gcm_run::<AesGcm<Aes128, U12, U12>>(key, nonce, data, aad, seal),
        (Len128, Tag16) => gcm_run::<AesGcm<Aes128, U12, U16>>(key, nonce, data, aad, seal),
        (Len192, Tag8) => gcm_run::<AesGcm<Aes192, U12, U8>>(key, nonce, data, aad, seal),
        (Len192, Tag12) => gcm_run::<AesGcm<Aes192, U12, U12>>(key, nonce, data, aad, seal),
        (Len192, Tag16) => gcm_run::<AesGcm<Aes192, U12, U16>>(key, nonce, data, aad, seal),
        (Len256, Tag8) => gcm_run::<AesGcm<Aes256, U12, U8>>(key, nonce, data, aad, seal),
        (Len256, Tag12) => gcm_run::<AesGcm<Aes256, U12, U12>>(key, nonce, data, aad, seal),
        (Len256, Tag16) => gcm_run::<AesGcm<Aes256, U12, U16>>(key, nonce, data, aad, seal),
    }
}
