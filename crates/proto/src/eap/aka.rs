//! EAP-AKA method state machine (RFC 4187)
//!
//! ```text
//! Created --(AKA-Identity)--> Identity --(AKA-Challenge)--> Challenge --> Final
//! ```
//!
//! The identity round may request the permanent, pseudonym or fast
//! re-authentication identity. The challenge round hands AT_RAND/AT_AUTN to
//! the SIM authenticator; a synchronization failure answers with AT_AUTS, a
//! card-side AUTN rejection with AKA-Authentication-Reject, and a packet
//! MAC failure with AT_CLIENT_ERROR_CODE.

use super::config::EapAkaConfig;
use super::message::{EapMessage, EapMethodType};
use super::method::EapMethod;
use super::simaka::attribute::EapSimAkaAttribute;
use super::simaka::crypto::{self, MacAlgorithm, SimAkaKeys};
use super::simaka::{client_error_response, ClientErrorCode, EapSimAkaTypeData, Subtype};
use super::EapResult;
use crate::eap::EapError;
use carrick_platform::{AkaChallengeResult, SimAuthenticator};
use std::sync::Arc;

#[derive(Debug)]
enum AkaState {
    Created,
    Identity { identity_used: Vec<u8> },
    Complete { keys: SimAkaKeys },
    Final,
}

/// EAP-AKA method state machine
pub struct EapAkaMethod {
    config: EapAkaConfig,
    identity: Vec<u8>,
    sim: Arc<dyn SimAuthenticator>,
    state: AkaState,
}

impl EapAkaMethod {
    /// Create the method in its initial state
    pub fn new(config: EapAkaConfig, identity: Vec<u8>, sim: Arc<dyn SimAuthenticator>) -> Self {
        EapAkaMethod {
            config,
            identity,
            sim,
            state: AkaState::Created,
        }
    }

    fn identity_used(&self) -> Vec<u8> {
        match &self.state {
            AkaState::Identity { identity_used } => identity_used.clone(),
            _ => self.identity.clone(),
        }
    }

    fn process_identity(
        &mut self,
        message: &EapMessage,
        type_data: &EapSimAkaTypeData,
    ) -> EapResult {
        let requested = type_data
            .find(|a| {
                matches!(
                    a,
                    EapSimAkaAttribute::AnyIdReq
                        | EapSimAkaAttribute::PermanentIdReq
                        | EapSimAkaAttribute::FullAuthIdReq
                )
            })
            .is_some();
        if !requested {
            return client_error_response(
                message.identifier,
                EapMethodType::Aka,
                ClientErrorCode::UnableToProcess,
            );
        }

        let response = EapMessage::response(
            message.identifier,
            EapMethodType::Aka,
            EapSimAkaTypeData::new(
                Subtype::AkaIdentity,
                vec![EapSimAkaAttribute::Identity(self.identity.clone())],
            )
            .encode(),
        );

        self.state = AkaState::Identity {
            identity_used: self.identity.clone(),
        };
        EapResult::Response(response.encode())
    }

    async fn process_challenge(
        &mut self,
        message: &EapMessage,
        type_data: &EapSimAkaTypeData,
    ) -> EapResult {
        let rand = match type_data.find(|a| matches!(a, EapSimAkaAttribute::Rand(_))) {
            Some(EapSimAkaAttribute::Rand(rands)) if rands.len() == 1 => rands[0],
            _ => {
                return client_error_response(
                    message.identifier,
                    EapMethodType::Aka,
                    ClientErrorCode::UnableToProcess,
                )
            }
        };
        let autn = match type_data.find(|a| matches!(a, EapSimAkaAttribute::Autn(_))) {
            Some(EapSimAkaAttribute::Autn(autn)) => *autn,
            _ => {
                return client_error_response(
                    message.identifier,
                    EapMethodType::Aka,
                    ClientErrorCode::UnableToProcess,
                )
            }
        };

        let outcome = match self
            .sim
            .aka_auth(self.config.app_type, &rand, &autn)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return EapResult::Error(EapError::Sim(e.to_string())),
        };

        match outcome {
            AkaChallengeResult::SyncFailure { auts } => {
                // Sequence resync: reply with AT_AUTS and await a fresh
                // challenge
                if auts.len() != 14 {
                    return EapResult::Error(EapError::Sim(format!(
                        "AUTS must be 14 bytes, got {}",
                        auts.len()
                    )));
                }
                let mut auts_arr = [0u8; 14];
                auts_arr.copy_from_slice(&auts);

                let response = EapMessage::response(
                    message.identifier,
                    EapMethodType::Aka,
                    EapSimAkaTypeData::new(
                        Subtype::AkaSyncFailure,
                        vec![EapSimAkaAttribute::Auts(auts_arr)],
                    )
                    .encode(),
                );
                EapResult::Response(response.encode())
            }
            AkaChallengeResult::AuthReject => {
                let response = EapMessage::response(
                    message.identifier,
                    EapMethodType::Aka,
                    EapSimAkaTypeData::new(Subtype::AkaAuthReject, Vec::new()).encode(),
                );
                EapResult::Response(response.encode())
            }
            AkaChallengeResult::Success(aka) => {
                let identity = self.identity_used();
                let mk = crypto::aka_master_key(&identity, &aka.ik, &aka.ck);
                let keys = crypto::expand_master_key(&mk);

                if crypto::verify_at_mac(
                    MacAlgorithm::HmacSha1,
                    &keys.k_aut,
                    message,
                    type_data,
                    &[],
                )
                .is_err()
                {
                    return client_error_response(
                        message.identifier,
                        EapMethodType::Aka,
                        ClientErrorCode::UnableToProcess,
                    );
                }

                let response = crypto::seal_response(
                    MacAlgorithm::HmacSha1,
                    &keys.k_aut,
                    message.identifier,
                    EapMethodType::Aka.to_u8(),
                    EapSimAkaTypeData::new(
                        Subtype::AkaChallenge,
                        vec![
                            EapSimAkaAttribute::Res {
                                bits: (aka.res.len() * 8) as u16,
                                res: aka.res.clone(),
                            },
                            EapSimAkaAttribute::Mac([0u8; 16]),
                        ],
                    ),
                    &[],
                );

                self.state = AkaState::Complete { keys };
                EapResult::Response(response.encode())
            }
        }
    }

    fn process_notification(&self, message: &EapMessage) -> EapResult {
        let response = EapMessage::response(
            message.identifier,
            EapMethodType::Aka,
            EapSimAkaTypeData::new(Subtype::Notification, Vec::new()).encode(),
        );
        EapResult::Response(response.encode())
    }
}

#[async_trait::async_trait]
impl EapMethod for EapAkaMethod {
    fn method_type(&self) -> EapMethodType {
        EapMethodType::Aka
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            AkaState::Created => "Created",
            AkaState::Identity { .. } => "Identity",
            AkaState::Complete { .. } => "Challenge",
            AkaState::Final => "Final",
        }
    }

    fn pending_keys(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        match &self.state {
            AkaState::Complete { keys } => Some((keys.msk.clone(), keys.emsk.clone())),
            _ => None,
        }
    }

    fn mark_final(&mut self) {
        self.state = AkaState::Final;
    }

    async fn process(&mut self, message: &EapMessage) -> EapResult {
        let data = match &message.data {
            Some(data) => data,
            None => {
                return EapResult::Error(EapError::InvalidRequest(
                    "AKA request without type data".into(),
                ))
            }
        };
        if data.method_type() != Some(EapMethodType::Aka) {
            return EapResult::Error(EapError::InvalidRequest(format!(
                "Expected EAP-AKA request, got type {}",
                data.type_raw
            )));
        }

        let type_data = match EapSimAkaTypeData::decode(&data.type_data)
            .and_then(|td| td.reject_unknown_mandatory().map(|_| td))
        {
            Ok(td) => td,
            Err(_) => {
                return client_error_response(
                    message.identifier,
                    EapMethodType::Aka,
                    ClientErrorCode::UnableToProcess,
                )
            }
        };

        match type_data.subtype {
            Subtype::AkaIdentity => self.process_identity(message, &type_data),
            Subtype::AkaChallenge => self.process_challenge(message, &type_data).await,
            Subtype::Notification => self.process_notification(message),
            other => EapResult::Error(EapError::InvalidRequest(format!(
                "Unexpected EAP-AKA subtype {:?} in state {}",
                other,
                self.state_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrick_platform::{AkaResponse, GsmTriplet, PlatformResult, SimAppType};

    /// SIM authenticator scripted per test
    struct ScriptedSim {
        outcome: AkaChallengeResult,
    }

    #[async_trait::async_trait]
    impl SimAuthenticator for ScriptedSim {
        async fn gsm_auth(
            &self,
            _app_type: SimAppType,
            _rand: &[u8; 16],
        ) -> PlatformResult<GsmTriplet> {
            Ok(GsmTriplet {
                sres: [0; 4],
                kc: [0; 8],
            })
        }

        async fn aka_auth(
            &self,
            _app_type: SimAppType,
            _rand: &[u8; 16],
            _autn: &[u8; 16],
        ) -> PlatformResult<AkaChallengeResult> {
            Ok(self.outcome.clone())
        }
    }

    fn method(outcome: AkaChallengeResult) -> EapAkaMethod {
        EapAkaMethod::new(
            EapAkaConfig {
                sub_id: 1,
                app_type: SimAppType::Usim,
            },
            b"0555444333222111@example".to_vec(),
            Arc::new(ScriptedSim { outcome }),
        )
    }

    fn identity_request() -> EapMessage {
        EapMessage::request(
            0x10,
            EapMethodType::Aka,
            EapSimAkaTypeData::new(Subtype::AkaIdentity, vec![EapSimAkaAttribute::AnyIdReq])
                .encode(),
        )
    }

    fn challenge_request(mac: [u8; 16]) -> EapMessage {
        EapMessage::request(
            0x11,
            EapMethodType::Aka,
            EapSimAkaTypeData::new(
                Subtype::AkaChallenge,
                vec![
                    EapSimAkaAttribute::Rand(vec![[0xA1; 16]]),
                    EapSimAkaAttribute::Autn([0xB2; 16]),
                    EapSimAkaAttribute::Mac(mac),
                ],
            )
            .encode(),
        )
    }

    fn success_outcome() -> AkaChallengeResult {
        AkaChallengeResult::Success(AkaResponse {
            res: vec![0x11; 8],
            ck: vec![0x22; 16],
            ik: vec![0x33; 16],
        })
    }

    #[tokio::test]
    async fn test_identity_round() {
        let mut method = method(success_outcome());
        let result = method.process(&identity_request()).await;

        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(type_data.subtype, Subtype::AkaIdentity);
        assert_eq!(
            type_data.attributes,
            vec![EapSimAkaAttribute::Identity(
                b"0555444333222111@example".to_vec()
            )]
        );
        assert_eq!(method.state_name(), "Identity");
    }

    #[tokio::test]
    async fn test_challenge_success_with_valid_mac() {
        use hmac::{Hmac, Mac as _};
        use sha1::Sha1;

        let mut method = method(success_outcome());
        method.process(&identity_request()).await;

        // Compute the request MAC the server would: K_aut from MK over the
        // identity and the scripted CK/IK
        let mk = crypto::aka_master_key(b"0555444333222111@example", &[0x33; 16], &[0x22; 16]);
        let keys = crypto::expand_master_key(&mk);

        let template = challenge_request([0u8; 16]);
        let mut mac = Hmac::<Sha1>::new_from_slice(&keys.k_aut).unwrap();
        mac.update(&template.encode());
        let digest = mac.finalize().into_bytes();
        let mut at_mac = [0u8; 16];
        at_mac.copy_from_slice(&digest[..16]);

        let result = method.process(&challenge_request(at_mac)).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(type_data.subtype, Subtype::AkaChallenge);
        assert!(type_data
            .find(|a| matches!(a, EapSimAkaAttribute::Res { .. }))
            .is_some());

        let (msk, emsk) = method.pending_keys().unwrap();
        assert_eq!(msk.len(), 64);
        assert_eq!(emsk.len(), 64);
        assert_eq!((msk, emsk), (keys.msk, keys.emsk));
    }

    #[tokio::test]
    async fn test_challenge_mac_failure_yields_client_error() {
        let mut method = method(success_outcome());
        method.process(&identity_request()).await;

        let result = method.process(&challenge_request([0xFF; 16])).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(type_data.subtype, Subtype::ClientError);
        assert!(method.pending_keys().is_none());
    }

    #[tokio::test]
    async fn test_challenge_sync_failure_returns_auts() {
        let mut method = method(AkaChallengeResult::SyncFailure {
            auts: vec![0x44; 14],
        });

        let result = method.process(&challenge_request([0u8; 16])).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(type_data.subtype, Subtype::AkaSyncFailure);
        assert_eq!(
            type_data.attributes,
            vec![EapSimAkaAttribute::Auts([0x44; 14])]
        );

        // The conversation continues: no keys, not final
        assert!(method.pending_keys().is_none());
        assert_ne!(method.state_name(), "Final");
    }

    #[tokio::test]
    async fn test_challenge_auth_reject() {
        let mut method = method(AkaChallengeResult::AuthReject);

        let result = method.process(&challenge_request([0u8; 16])).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(type_data.subtype, Subtype::AkaAuthReject);
        assert!(type_data.attributes.is_empty());
    }

    #[tokio::test]
    async fn test_notification_keeps_state() {
        let mut method = method(success_outcome());
        method.process(&identity_request()).await;
        let state_before = method.state_name();

        let request = EapMessage::request(
            0x12,
            EapMethodType::Aka,
            EapSimAkaTypeData::new(Subtype::Notification, Vec::new()).encode(),
        );
        let result = method.process(&request).await;
        assert!(matches!(result, EapResult::Response(_)));
        assert_eq!(method.state_name(), state_before);
    }

    #[tokio::test]
    async fn test_unexpected_subtype_is_invalid_request() {
        let mut method = method(success_outcome());
        let request = EapMessage::request(
            0x13,
            EapMethodType::Aka,
            EapSimAkaTypeData::new(Subtype::SimStart, Vec::new()).encode(),
        );
        let result = method.process(&request).await;
        assert!(matches!(
            result,
            EapResult::Error(EapError::InvalidRequest(_))
        ));
    }
}
