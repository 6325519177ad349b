//! INFORMATIONAL Exchange Implementation
//!
//! Implements the INFORMATIONAL exchange (RFC 7296 Section 1.4), used for:
//! - Liveness checks (empty request/response)
//! - Deleting the IKE SA or Child SAs
//! - Error notifications
//!
//! ```text
//! Initiator                    Responder
//! ---------                    ---------
//! HDR, SK {[N+], [D+]}  -->
//!                        <--  HDR, SK {[N+], [D+]}
//! ```

use super::payload::{DeletePayload, IkePayload, NotifyPayload, NotifyProtocolId, NotifyType};
use crate::ike::{IkeError, Result};

/// Classified content of a peer-initiated INFORMATIONAL request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerInformational {
    /// Empty request: liveness check
    Liveness,
    /// Peer is deleting the IKE SA
    DeleteIke,
    /// Peer is deleting Child SAs (their outbound SPIs)
    DeleteChild(Vec<u32>),
    /// Peer reported a fatal error notification
    Error(NotifyType),
}

/// INFORMATIONAL exchange handler
pub struct InformationalExchange;

impl InformationalExchange {
    /// Inner payloads for a liveness check (empty)
    pub fn liveness_payloads() -> Vec<IkePayload> {
        Vec::new()
    }

    /// Inner payloads deleting the IKE SA itself
    pub fn delete_ike_payloads() -> Vec<IkePayload> {
        vec![IkePayload::D(DeletePayload::delete_ike_sa())]
    }

    /// Inner payloads deleting Child SAs by our inbound SPIs
    pub fn delete_child_payloads(spis: Vec<u32>) -> Result<Vec<IkePayload>> {
        if spis.is_empty() {
            return Err(IkeError::InvalidParameter("SPI list cannot be empty".into()));
        }
        Ok(vec![IkePayload::D(DeletePayload::delete_child_sas(spis))])
    }

    /// Inner payloads carrying an error notification
    pub fn error_notify_payloads(notify_type: NotifyType, data: Vec<u8>) -> Vec<IkePayload> {
        vec![IkePayload::N(NotifyPayload {
            protocol_id: NotifyProtocolId::None,
            spi: Vec::new(),
            notify_type_raw: notify_type.to_u16(),
            data,
        })]
    }

    /// Classify a peer-initiated INFORMATIONAL request
    pub fn classify_request(inner: &[IkePayload]) -> PeerInformational {
        for payload in inner {
            match payload {
                IkePayload::D(delete) => match delete.protocol_id {
                    NotifyProtocolId::Ike => return PeerInformational::DeleteIke,
                    NotifyProtocolId::Esp | NotifyProtocolId::Ah => {
                        let spis = delete
                            .spis
                            .iter()
                            .filter(|s| s.len() == 4)
                            .map(|s| u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
                            .collect();
                        return PeerInformational::DeleteChild(spis);
                    }
                    NotifyProtocolId::None => {}
                },
                IkePayload::N(notify) => {
                    if let Some(t) = notify.notify_type() {
                        if t.is_error() {
                            return PeerInformational::Error(t);
                        }
                    }
                }
                _ => {}
            }
        }
        PeerInformational::Liveness
    }

    /// Response payloads acknowledging a Child SA delete
    ///
    /// The response carries the delete payload for our paired inbound SPIs.
    pub fn delete_child_response_payloads(local_spis: Vec<u32>) -> Vec<IkePayload> {
        if local_spis.is_empty() {
            Vec::new()
        } else {
            vec![IkePayload::D(DeletePayload::delete_child_sas(local_spis))]
        }
    }
}
