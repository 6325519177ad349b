//! EAP-AKA' method state machine (RFC 5448)
//!
//! Follows the EAP-AKA flow, with the revised key schedule: CK'/IK' are
//! bound to the access network name advertised in AT_KDF_INPUT, K_aut is 32
//! bytes, and AT_MAC uses HMAC-SHA-256. A server network name that differs
//! from the configured one fails authentication unless the configuration
//! allows the mismatch; synchronization failures follow the AKA rule (reply
//! with AT_AUTS) and the KDF input is re-evaluated on the next challenge.

use super::config::EapAkaPrimeConfig;
use super::message::{EapMessage, EapMethodType};
use super::method::EapMethod;
use super::simaka::attribute::EapSimAkaAttribute;
use super::simaka::crypto::{self, AkaPrimeKeys, MacAlgorithm};
use super::simaka::{client_error_response, ClientErrorCode, EapSimAkaTypeData, Subtype};
use super::EapResult;
use crate::eap::EapError;
use carrick_platform::{AkaChallengeResult, SimAuthenticator};
use std::sync::Arc;

/// The only key derivation function defined for EAP-AKA'
const KDF_CK_IK_PRIME: u16 = 1;

#[derive(Debug)]
enum AkaPrimeState {
    Created,
    Identity { identity_used: Vec<u8> },
    Complete { keys: AkaPrimeKeys },
    Final,
}

/// EAP-AKA' method state machine
pub struct EapAkaPrimeMethod {
    config: EapAkaPrimeConfig,
    identity: Vec<u8>,
    sim: Arc<dyn SimAuthenticator>,
    state: AkaPrimeState,
}

impl EapAkaPrimeMethod {
    /// Create the method in its initial state
    pub fn new(
        config: EapAkaPrimeConfig,
        identity: Vec<u8>,
        sim: Arc<dyn SimAuthenticator>,
    ) -> Self {
        EapAkaPrimeMethod {
            config,
            identity,
            sim,
            state: AkaPrimeState::Created,
        }
    }

    fn identity_used(&self) -> Vec<u8> {
        match &self.state {
            AkaPrimeState::Identity { identity_used } => identity_used.clone(),
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
                EapMethodType::AkaPrime,
                ClientErrorCode::UnableToProcess,
            );
        }

        let response = EapMessage::response(
            message.identifier,
            EapMethodType::AkaPrime,
            EapSimAkaTypeData::new(
                Subtype::AkaIdentity,
                vec![EapSimAkaAttribute::Identity(self.identity.clone())],
            )
            .encode(),
        );

        self.state = AkaPrimeState::Identity {
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
                    EapMethodType::AkaPrime,
                    ClientErrorCode::UnableToProcess,
                )
            }
        };
        let autn = match type_data.find(|a| matches!(a, EapSimAkaAttribute::Autn(_))) {
            Some(EapSimAkaAttribute::Autn(autn)) => *autn,
            _ => {
                return client_error_response(
                    message.identifier,
                    EapMethodType::AkaPrime,
                    ClientErrorCode::UnableToProcess,
                )
            }
        };
        let kdf = match type_data.find(|a| matches!(a, EapSimAkaAttribute::Kdf(_))) {
            Some(EapSimAkaAttribute::Kdf(kdf)) => *kdf,
            _ => {
                return client_error_response(
                    message.identifier,
                    EapMethodType::AkaPrime,
                    ClientErrorCode::UnableToProcess,
                )
            }
        };
        let kdf_input = match type_data.find(|a| matches!(a, EapSimAkaAttribute::KdfInput(_))) {
            Some(EapSimAkaAttribute::KdfInput(input)) => input.clone(),
            _ => {
                return client_error_response(
                    message.identifier,
                    EapMethodType::AkaPrime,
                    ClientErrorCode::UnableToProcess,
                )
            }
        };

        if kdf != KDF_CK_IK_PRIME {
            return client_error_response(
                message.identifier,
                EapMethodType::AkaPrime,
                ClientErrorCode::UnableToProcess,
            );
        }

        // The advertised network name must match ours unless the
        // configuration explicitly tolerates a mismatch; a refusal behaves
        // like an incorrect AUTN
        if kdf_input != self.config.network_name.as_bytes()
            && !self.config.allow_mismatched_network_names
        {
            let response = EapMessage::response(
                message.identifier,
                EapMethodType::AkaPrime,
                EapSimAkaTypeData::new(Subtype::AkaAuthReject, Vec::new()).encode(),
            );
            return EapResult::Response(response.encode());
        }

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
                    EapMethodType::AkaPrime,
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
                    EapMethodType::AkaPrime,
                    EapSimAkaTypeData::new(Subtype::AkaAuthReject, Vec::new()).encode(),
                );
                EapResult::Response(response.encode())
            }
            AkaChallengeResult::Success(aka) => {
                // SQN xor AK is the first 6 octets of AUTN
                let mut sqn_xor_ak = [0u8; 6];
                sqn_xor_ak.copy_from_slice(&autn[..6]);

                let (ck_prime, ik_prime) =
                    crypto::derive_ck_ik_prime(&aka.ck, &aka.ik, &kdf_input, &sqn_xor_ak);
                let identity = self.identity_used();
                let keys = crypto::derive_aka_prime_keys(&ck_prime, &ik_prime, &identity);

                if crypto::verify_at_mac(
                    MacAlgorithm::HmacSha256,
                    &keys.k_aut,
                    message,
                    type_data,
                    &[],
                )
                .is_err()
                {
                    return client_error_response(
                        message.identifier,
                        EapMethodType::AkaPrime,
                        ClientErrorCode::UnableToProcess,
                    );
                }

                let response = crypto::seal_response(
                    MacAlgorithm::HmacSha256,
                    &keys.k_aut,
                    message.identifier,
                    EapMethodType::AkaPrime.to_u8(),
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

                self.state = AkaPrimeState::Complete { keys };
                EapResult::Response(response.encode())
            }
        }
    }
}

#[async_trait::async_trait]
impl EapMethod for EapAkaPrimeMethod {
    fn method_type(&self) -> EapMethodType {
        EapMethodType::AkaPrime
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            AkaPrimeState::Created => "Created",
            AkaPrimeState::Identity { .. } => "Identity",
            AkaPrimeState::Complete { .. } => "Challenge",
            AkaPrimeState::Final => "Final",
        }
    }

    fn pending_keys(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        match &self.state {
            AkaPrimeState::Complete { keys } => Some((keys.msk.clone(), keys.emsk.clone())),
            _ => None,
        }
    }

    fn mark_final(&mut self) {
        self.state = AkaPrimeState::Final;
    }

    async fn process(&mut self, message: &EapMessage) -> EapResult {
        let data = match &message.data {
            Some(data) => data,
            None => {
                return EapResult::Error(EapError::InvalidRequest(
                    "AKA' request without type data".into(),
                ))
            }
        };
        if data.method_type() != Some(EapMethodType::AkaPrime) {
            return EapResult::Error(EapError::InvalidRequest(format!(
                "Expected EAP-AKA' request, got type {}",
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
                    EapMethodType::AkaPrime,
                    ClientErrorCode::UnableToProcess,
                )
            }
        };

        match type_data.subtype {
            Subtype::AkaIdentity => self.process_identity(message, &type_data),
            Subtype::AkaChallenge => self.process_challenge(message, &type_data).await,
            Subtype::Notification => {
                let response = EapMessage::response(
                    message.identifier,
                    EapMethodType::AkaPrime,
                    EapSimAkaTypeData::new(Subtype::Notification, Vec::new()).encode(),
                );
                EapResult::Response(response.encode())
            }
            other => EapResult::Error(EapError::InvalidRequest(format!(
                "Unexpected EAP-AKA' subtype {:?} in state {}",
                other,
                self.state_name()
            ))),
        }
    }
}
