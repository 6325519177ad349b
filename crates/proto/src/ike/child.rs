//! Child SA management
//!
//! Derives Child SA keys from the IKE SA's SK_d (RFC 7296 Section 2.17) and
//! packages them for the injected SA installer. The engine never programs
//! the kernel itself; it only tracks the negotiated state.
//!
//! # Key Derivation
//!
//! ```text
//! KEYMAT = prf+(SK_d, Ni | Nr)
//! SK_ei | SK_ai | SK_er | SK_ar = KEYMAT
//! ```

use super::crypto::{ChildKeyMaterial, CipherAlgorithm, IntegrityAlgorithm, PrfAlgorithm};
use super::payload::{TrafficSelector, TrafficSelectorsPayload};
use super::proposal::Proposal;
use crate::ike::{IkeError, Result};
use carrick_platform::{ChildSaInstall, ChildSaKeys, SelectorRange};

/// Child SA lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildSaState {
    /// SA is installed and protecting traffic
    Active,

    /// A rekey for this SA is outstanding
    Rekeying,

    /// Replaced by a rekeyed SA, awaiting deletion
    Rekeyed,

    /// Removed from the kernel; terminal
    Deleted,
}

/// One negotiated Child SA pair (inbound + outbound)
#[derive(Debug, Clone)]
pub struct ChildSa {
    /// SPI we chose (identifies our inbound SA)
    pub inbound_spi: u32,

    /// SPI the peer chose (identifies our outbound SA)
    pub outbound_spi: u32,

    /// Negotiated ESP proposal
    pub proposal: Proposal,

    /// Negotiated initiator traffic selectors
    pub ts_i: TrafficSelectorsPayload,

    /// Negotiated responder traffic selectors
    pub ts_r: TrafficSelectorsPayload,

    /// Transport mode instead of tunnel mode
    pub is_transport: bool,

    /// Current lifecycle state
    pub state: ChildSaState,
}

impl ChildSa {
    /// Derive keys and build the installer request for a negotiated pair
    ///
    /// `proposal` is the responder's selection and carries the peer SPI;
    /// `local_spi` is the SPI we advertised in our own proposal.
    #[allow(clippy::too_many_arguments)]
    pub fn negotiate(
        prf: PrfAlgorithm,
        sk_d: &[u8],
        nonce_i: &[u8],
        nonce_r: &[u8],
        proposal: Proposal,
        local_spi: u32,
        ts_i: TrafficSelectorsPayload,
        ts_r: TrafficSelectorsPayload,
        is_transport: bool,
    ) -> Result<(ChildSa, ChildSaInstall)> {
        if proposal.spi.len() != 4 {
            return Err(IkeError::InvalidSyntax(format!(
                "Child proposal SPI must be 4 bytes, got {}",
                proposal.spi.len()
            )));
        }
        let outbound_spi = u32::from_be_bytes([
            proposal.spi[0],
            proposal.spi[1],
            proposal.spi[2],
            proposal.spi[3],
        ]);

        let encr_id = proposal.encr_id().ok_or_else(|| {
            IkeError::InvalidParameter("Child proposal missing ENCR transform".into())
        })?;
        let cipher = CipherAlgorithm::from_transform(encr_id, proposal.encr_key_bits())?;
        let integrity = proposal.integ_id().map(IntegrityAlgorithm::from_transform);
        if !cipher.is_aead() && integrity.is_none() {
            return Err(IkeError::InvalidParameter(
                "Non-AEAD child cipher requires an integrity transform".into(),
            ));
        }
        let integ_key_len = integrity.map(|i| i.key_len()).unwrap_or(0);

        let keymat = ChildKeyMaterial::derive(
            prf,
            sk_d,
            nonce_i,
            nonce_r,
            cipher.key_material_len(),
            integ_key_len,
        )?;

        let install = ChildSaInstall {
            inbound_spi: local_spi,
            outbound_spi,
            inbound_keys: ChildSaKeys {
                encryption: keymat.sk_er.clone(),
                integrity: keymat.sk_ar.clone(),
            },
            outbound_keys: ChildSaKeys {
                encryption: keymat.sk_ei.clone(),
                integrity: keymat.sk_ai.clone(),
            },
            local_selectors: selector_ranges(&ts_i),
            remote_selectors: selector_ranges(&ts_r),
            is_transport,
        };

        let child = ChildSa {
            inbound_spi: local_spi,
            outbound_spi,
            proposal,
            ts_i,
            ts_r,
            is_transport,
            state: ChildSaState::Active,
        };

        Ok((child, install))
    }

    /// Begin rekeying this SA
    pub fn initiate_rekey(&mut self) -> Result<()> {
        if self.state != ChildSaState::Active {
            return Err(IkeError::InvalidState(format!(
                "Cannot initiate rekey from state {:?}",
                self.state
            )));
        }
        self.state = ChildSaState::Rekeying;
        Ok(())
    }

    /// Mark this SA as replaced by its rekeyed successor
    pub fn mark_rekeyed(&mut self) -> Result<()> {
        if self.state != ChildSaState::Rekeying {
            return Err(IkeError::InvalidState(format!(
                "Cannot mark rekeyed from state {:?}",
                self.state
            )));
        }
        self.state = ChildSaState::Rekeyed;
        Ok(())
    }

    /// Mark this SA as removed
    pub fn mark_deleted(&mut self) {
        self.state = ChildSaState::Deleted;
    }

    /// Whether the SA can still carry traffic
    pub fn can_use(&self) -> bool {
        matches!(self.state, ChildSaState::Active | ChildSaState::Rekeying)
    }
}

fn selector_ranges(payload: &TrafficSelectorsPayload) -> Vec<SelectorRange> {
    payload.selectors.iter().map(selector_range).collect()
}

fn selector_range(ts: &TrafficSelector) -> SelectorRange {
    SelectorRange {
        start_addr: ts.start_addr,
        end_addr: ts.end_addr,
        start_port: ts.start_port,
        end_port: ts.end_port,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ike::proposal::{
        EncrTransformId, EsnTransformId, IntegTransformId, ProtocolId, Transform,
    };

    fn gcm_proposal() -> Proposal {
        Proposal::new(1, ProtocolId::Esp)
            .with_spi(vec![0xAA, 0xBB, 0xCC, 0xDD])
            .add_transform(Transform::encr_with_key_len(EncrTransformId::AesGcm16, 128))
            .add_transform(Transform::esn(EsnTransformId::None))
    }

    fn cbc_proposal() -> Proposal {
        Proposal::new(1, ProtocolId::Esp)
            .with_spi(vec![0x01, 0x02, 0x03, 0x04])
            .add_transform(Transform::encr_with_key_len(EncrTransformId::AesCbc, 256))
            .add_transform(Transform::integ(IntegTransformId::HmacSha256_128))
            .add_transform(Transform::esn(EsnTransformId::None))
    }

    fn ts_any() -> TrafficSelectorsPayload {
        TrafficSelectorsPayload::new(vec![TrafficSelector::ipv4_any()])
    }

    #[test]
    fn test_negotiate_gcm_child() {
        let (child, install) = ChildSa::negotiate(
            PrfAlgorithm::HmacSha256,
            &[0x0D; 32],
            &[0x01; 32],
            &[0x02; 32],
            gcm_proposal(),
            0x11223344,
            ts_any(),
            ts_any(),
            false,
        )
        .unwrap();

        assert_eq!(child.inbound_spi, 0x11223344);
        assert_eq!(child.outbound_spi, 0xAABBCCDD);
        assert_eq!(child.state, ChildSaState::Active);
        assert!(!child.is_transport);

        // AES-GCM-128: 20 bytes of key material, no integrity key
        assert_eq!(install.outbound_keys.encryption.len(), 20);
        assert_eq!(install.outbound_keys.integrity.len(), 0);
        assert_eq!(install.inbound_keys.encryption.len(), 20);
        assert_ne!(
            install.inbound_keys.encryption,
            install.outbound_keys.encryption
        );
        assert_eq!(install.local_selectors.len(), 1);
    }

    #[test]
    fn test_negotiate_cbc_child_has_integrity_keys() {
        let (_, install) = ChildSa::negotiate(
            PrfAlgorithm::HmacSha256,
            &[0x0D; 32],
            &[0x01; 32],
            &[0x02; 32],
            cbc_proposal(),
            1,
            ts_any(),
            ts_any(),
            true,
        )
        .unwrap();

        assert_eq!(install.outbound_keys.encryption.len(), 32);
        assert_eq!(install.outbound_keys.integrity.len(), 32);
        assert!(install.is_transport);
    }

    #[test]
    fn test_negotiate_rejects_bad_spi() {
        let mut proposal = gcm_proposal();
        proposal.spi = vec![0x01];

        let result = ChildSa::negotiate(
            PrfAlgorithm::HmacSha256,
            &[0x0D; 32],
            &[0x01; 32],
            &[0x02; 32],
            proposal,
            1,
            ts_any(),
            ts_any(),
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_child_lifecycle() {
        let (mut child, _) = ChildSa::negotiate(
            PrfAlgorithm::HmacSha256,
            &[0x0D; 32],
            &[0x01; 32],
            &[0x02; 32],
            gcm_proposal(),
            1,
            ts_any(),
            ts_any(),
            false,
        )
        .unwrap();

        assert!(child.can_use());
        child.initiate_rekey().unwrap();
        assert!(child.can_use());
        assert!(child.initiate_rekey().is_err());

        child.mark_rekeyed().unwrap();
        assert!(!child.can_use());
        child.mark_deleted();
        assert_eq!(child.state, ChildSaState::Deleted);
    }
}
