//! Cryptographic transforms for IKEv2
//!
//! All algorithms are runtime-selectable, driven by the transform IDs
//! negotiated in the SA payload. A `CryptoSuite` bundles the negotiated
//! primitives; sessions receive one from a factory at construction so no
//! process-wide crypto state exists.

pub mod cipher;
pub mod dh;
pub mod integrity;
pub mod prf;

pub use cipher::{AesKeyLen, CipherAlgorithm, GcmTagLen};
pub use dh::{DhExchange, DhGroup};
pub use integrity::IntegrityAlgorithm;
pub use prf::{ChildKeyMaterial, KeyMaterial, PrfAlgorithm};

use super::proposal::Proposal;
use crate::ike::{IkeError, Result};

/// Negotiated cryptographic primitives for one IKE SA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CryptoSuite {
    /// SK payload cipher
    pub cipher: CipherAlgorithm,
    /// SK payload integrity MAC (None for combined-mode ciphers)
    pub integrity: Option<IntegrityAlgorithm>,
    /// PRF for key derivation and AUTH
    pub prf: PrfAlgorithm,
    /// DH group for the key exchange
    pub dh_group: DhGroup,
}

impl CryptoSuite {
    /// Build a suite from a negotiated IKE proposal
    ///
    /// Fails when the proposal is missing a required transform, or pairs a
    /// non-AEAD cipher with no integrity transform.
    pub fn from_proposal(proposal: &Proposal) -> Result<Self> {
        let encr_id = proposal
            .encr_id()
            .ok_or_else(|| IkeError::InvalidParameter("Proposal missing ENCR transform".into()))?;
        let cipher = CipherAlgorithm::from_transform(encr_id, proposal.encr_key_bits())?;

        let integrity = match proposal.integ_id() {
            Some(id) => Some(IntegrityAlgorithm::from_transform(id)),
            None => None,
        };
        if !cipher.is_aead() && integrity.is_none() {
            return Err(IkeError::InvalidParameter(
                "Non-AEAD cipher requires an integrity transform".into(),
            ));
        }

        let prf_id = proposal
            .prf_id()
            .ok_or_else(|| IkeError::InvalidParameter("Proposal missing PRF transform".into()))?;
        let prf = PrfAlgorithm::from_transform(prf_id);

        let dh_id = proposal
            .dh_id()
            .ok_or_else(|| IkeError::InvalidParameter("Proposal missing DH transform".into()))?;
        let dh_group = DhGroup::from_transform(dh_id);

        Ok(CryptoSuite {
            cipher,
            integrity,
            prf,
            dh_group,
        })
    }

    /// Integrity key length in bytes (0 for AEAD suites)
    pub fn integ_key_len(&self) -> usize {
        self.integrity.map(|i| i.key_len()).unwrap_or(0)
    }
}
