//! EAP-SIM method state machine (RFC 4186)
//!
//! ```text
//! Created --(SIM-Start)--> Start --(SIM-Challenge)--> Challenge --> Final
//! ```
//!
//! The Start round negotiates the protocol version, optionally supplies an
//! identity, and contributes NONCE_MT. The Challenge round runs the GSM
//! algorithm on the SIM for each RAND, verifies AT_MAC under K_aut, and
//! answers with a MAC computed over the SRES values.

use super::config::EapSimConfig;
use super::message::{EapMessage, EapMethodType};
use super::method::EapMethod;
use super::simaka::attribute::EapSimAkaAttribute;
use super::simaka::crypto::{self, MacAlgorithm, SimAkaKeys};
use super::simaka::{client_error_response, ClientErrorCode, EapSimAkaTypeData, Subtype};
use super::EapResult;
use crate::eap::EapError;
use carrick_platform::SimAuthenticator;
use rand::RngCore;
use std::sync::Arc;

/// Protocol version implemented (the only one defined)
const SIM_VERSION: u16 = 1;

/// Minimum number of distinct challenges we accept
const MIN_RAND_COUNT: usize = 2;

#[derive(Debug)]
enum SimState {
    Created,
    Start {
        version_list: Vec<u16>,
        nonce_mt: [u8; 16],
        identity_used: Vec<u8>,
    },
    Complete {
        keys: SimAkaKeys,
    },
    Final,
}

/// EAP-SIM method state machine
pub struct EapSimMethod {
    config: EapSimConfig,
    identity: Vec<u8>,
    sim: Arc<dyn SimAuthenticator>,
    state: SimState,
}

impl EapSimMethod {
    /// Create the method in its initial state
    pub fn new(config: EapSimConfig, identity: Vec<u8>, sim: Arc<dyn SimAuthenticator>) -> Self {
        EapSimMethod {
            config,
            identity,
            sim,
            state: SimState::Created,
        }
    }

    async fn process_start(
        &mut self,
        message: &EapMessage,
        type_data: &EapSimAkaTypeData,
    ) -> EapResult {
        let version_list = match type_data.find(|a| matches!(a, EapSimAkaAttribute::VersionList(_)))
        {
            Some(EapSimAkaAttribute::VersionList(versions)) => versions.clone(),
            _ => {
                return client_error_response(
                    message.identifier,
                    EapMethodType::Sim,
                    ClientErrorCode::UnableToProcess,
                )
            }
        };

        // Highest version both sides implement; only version 1 exists
        if !version_list.contains(&SIM_VERSION) {
            return client_error_response(
                message.identifier,
                EapMethodType::Sim,
                ClientErrorCode::UnsupportedVersion,
            );
        }

        let identity_requested = type_data
            .find(|a| {
                matches!(
                    a,
                    EapSimAkaAttribute::AnyIdReq
                        | EapSimAkaAttribute::PermanentIdReq
                        | EapSimAkaAttribute::FullAuthIdReq
                )
            })
            .is_some();

        let nonce_mt = match &self.state {
            // A repeated Start round keeps the original nonce
            SimState::Start { nonce_mt, .. } => *nonce_mt,
            _ => {
                let mut nonce = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut nonce);
                nonce
            }
        };

        let mut attributes = vec![
            EapSimAkaAttribute::NonceMt(nonce_mt),
            EapSimAkaAttribute::SelectedVersion(SIM_VERSION),
        ];
        if identity_requested {
            attributes.push(EapSimAkaAttribute::Identity(self.identity.clone()));
        }

        let response = EapMessage::response(
            message.identifier,
            EapMethodType::Sim,
            EapSimAkaTypeData::new(Subtype::SimStart, attributes).encode(),
        );

        self.state = SimState::Start {
            version_list,
            nonce_mt,
            identity_used: self.identity.clone(),
        };
        EapResult::Response(response.encode())
    }

    async fn process_challenge(
        &mut self,
        message: &EapMessage,
        type_data: &EapSimAkaTypeData,
    ) -> EapResult {
        let (version_list, nonce_mt, identity_used) = match &self.state {
            SimState::Start {
                version_list,
                nonce_mt,
                identity_used,
            } => (version_list.clone(), *nonce_mt, identity_used.clone()),
            _ => {
                return EapResult::Error(EapError::InvalidRequest(
                    "SIM-Challenge before SIM-Start".into(),
                ))
            }
        };

        let rands = match type_data.find(|a| matches!(a, EapSimAkaAttribute::Rand(_))) {
            Some(EapSimAkaAttribute::Rand(rands)) => rands.clone(),
            _ => {
                return client_error_response(
                    message.identifier,
                    EapMethodType::Sim,
                    ClientErrorCode::UnableToProcess,
                )
            }
        };

        if rands.len() < MIN_RAND_COUNT {
            return client_error_response(
                message.identifier,
                EapMethodType::Sim,
                ClientErrorCode::InsufficientChallenges,
            );
        }
        for (i, rand) in rands.iter().enumerate() {
            if rands[..i].contains(rand) {
                return client_error_response(
                    message.identifier,
                    EapMethodType::Sim,
                    ClientErrorCode::RandsNotFresh,
                );
            }
        }

        // Run the GSM algorithm for every challenge
        let mut kcs = Vec::with_capacity(rands.len());
        let mut sres_concat = Vec::with_capacity(rands.len() * 4);
        for rand in &rands {
            match self.sim.gsm_auth(self.config.app_type, rand).await {
                Ok(triplet) => {
                    kcs.push(triplet.kc);
                    sres_concat.extend_from_slice(&triplet.sres);
                }
                Err(e) => return EapResult::Error(EapError::Sim(e.to_string())),
            }
        }

        let mk = crypto::sim_master_key(
            &identity_used,
            &kcs,
            &nonce_mt,
            &version_list,
            SIM_VERSION,
        );
        let keys = crypto::expand_master_key(&mk);

        // The request MAC covers the packet concatenated with NONCE_MT
        if crypto::verify_at_mac(
            MacAlgorithm::HmacSha1,
            &keys.k_aut,
            message,
            type_data,
            &nonce_mt,
        )
        .is_err()
        {
            return client_error_response(
                message.identifier,
                EapMethodType::Sim,
                ClientErrorCode::UnableToProcess,
            );
        }

        // The response MAC covers the packet concatenated with n*SRES
        let response = crypto::seal_response(
            MacAlgorithm::HmacSha1,
            &keys.k_aut,
            message.identifier,
            EapMethodType::Sim.to_u8(),
            EapSimAkaTypeData::new(
                Subtype::SimChallenge,
                vec![EapSimAkaAttribute::Mac([0u8; 16])],
            ),
            &sres_concat,
        );

        self.state = SimState::Complete { keys };
        EapResult::Response(response.encode())
    }

    fn process_notification(&self, message: &EapMessage) -> EapResult {
        let response = EapMessage::response(
            message.identifier,
            EapMethodType::Sim,
            EapSimAkaTypeData::new(Subtype::Notification, Vec::new()).encode(),
        );
        EapResult::Response(response.encode())
    }
}

#[async_trait::async_trait]
impl EapMethod for EapSimMethod {
    fn method_type(&self) -> EapMethodType {
        EapMethodType::Sim
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            SimState::Created => "Created",
            SimState::Start { .. } => "Start",
            SimState::Complete { .. } => "Challenge",
            SimState::Final => "Final",
        }
    }

    fn pending_keys(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        match &self.state {
            SimState::Complete { keys } => Some((keys.msk.clone(), keys.emsk.clone())),
            _ => None,
        }
    }

    fn mark_final(&mut self) {
        self.state = SimState::Final;
    }

    async fn process(&mut self, message: &EapMessage) -> EapResult {
        let data = match &message.data {
            Some(data) => data,
            None => {
                return EapResult::Error(EapError::InvalidRequest(
                    "SIM request without type data".into(),
                ))
            }
        };
        if data.method_type() != Some(EapMethodType::Sim) {
            return EapResult::Error(EapError::InvalidRequest(format!(
                "Expected EAP-SIM request, got type {}",
                data.type_raw
            )));
        }

        let type_data = match EapSimAkaTypeData::decode(&data.type_data)
            .and_then(|td| td.reject_unknown_mandatory().map(|_| td))
        {
            Ok(td) => td,
            Err(_) => {
                // Parse-level failure: answer with a client error, stay put
                return client_error_response(
                    message.identifier,
                    EapMethodType::Sim,
                    ClientErrorCode::UnableToProcess,
                );
            }
        };

        match type_data.subtype {
            Subtype::SimStart => self.process_start(message, &type_data).await,
            Subtype::SimChallenge => self.process_challenge(message, &type_data).await,
            Subtype::Notification => self.process_notification(message),
            other => EapResult::Error(EapError::InvalidRequest(format!(
                "Unexpected EAP-SIM subtype {:?} in state {}",
                other,
                self.state_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eap::message::EapCode;
    use carrick_platform::{
        AkaChallengeResult, GsmTriplet, PlatformResult, SimAppType,
    };

    struct FixedSim;

    #[async_trait::async_trait]
    impl SimAuthenticator for FixedSim {
        async fn gsm_auth(
            &self,
            _app_type: SimAppType,
            rand: &[u8; 16],
        ) -> PlatformResult<GsmTriplet> {
            // Deterministic function of the challenge
            Ok(GsmTriplet {
                sres: [rand[0], rand[1], rand[2], rand[3]],
                kc: [rand[0]; 8],
            })
        }

        async fn aka_auth(
            &self,
            _app_type: SimAppType,
            _rand: &[u8; 16],
            _autn: &[u8; 16],
        ) -> PlatformResult<AkaChallengeResult> {
            Ok(AkaChallengeResult::AuthReject)
        }
    }

    fn method() -> EapSimMethod {
        EapSimMethod::new(
            EapSimConfig {
                sub_id: 1,
                app_type: SimAppType::Usim,
            },
            b"1234567890@example".to_vec(),
            Arc::new(FixedSim),
        )
    }

    fn start_request(identifier: u8, with_id_req: bool) -> EapMessage {
        let mut attributes = vec![EapSimAkaAttribute::VersionList(vec![1])];
        if with_id_req {
            attributes.push(EapSimAkaAttribute::AnyIdReq);
        }
        EapMessage::request(
            identifier,
            EapMethodType::Sim,
            EapSimAkaTypeData::new(Subtype::SimStart, attributes).encode(),
        )
    }

    #[tokio::test]
    async fn test_start_round() {
        let mut method = method();
        let result = method.process(&start_request(0x10, true)).await;

        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(response.code, EapCode::Response);
        assert_eq!(response.identifier, 0x10);

        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(type_data.subtype, Subtype::SimStart);
        assert!(type_data
            .find(|a| matches!(a, EapSimAkaAttribute::NonceMt(_)))
            .is_some());
        assert!(type_data
            .find(|a| matches!(a, EapSimAkaAttribute::SelectedVersion(1)))
            .is_some());
        assert!(type_data
            .find(|a| matches!(a, EapSimAkaAttribute::Identity(_)))
            .is_some());
        assert_eq!(method.state_name(), "Start");
    }

    #[tokio::test]
    async fn test_start_unsupported_version() {
        let mut method = method();
        let request = EapMessage::request(
            0x10,
            EapMethodType::Sim,
            EapSimAkaTypeData::new(
                Subtype::SimStart,
                vec![EapSimAkaAttribute::VersionList(vec![7])],
            )
            .encode(),
        );

        let result = method.process(&request).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected client error response, got {:?}", other),
        };
        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(type_data.subtype, Subtype::ClientError);
        assert_eq!(
            type_data.attributes,
            vec![EapSimAkaAttribute::ClientErrorCode(
                ClientErrorCode::UnsupportedVersion.to_u16()
            )]
        );
    }

    fn challenge_request(rands: Vec<[u8; 16]>, mac: [u8; 16]) -> EapMessage {
        EapMessage::request(
            0x11,
            EapMethodType::Sim,
            EapSimAkaTypeData::new(
                Subtype::SimChallenge,
                vec![
                    EapSimAkaAttribute::Rand(rands),
                    EapSimAkaAttribute::Mac(mac),
                ],
            )
            .encode(),
        )
    }

    async fn run_challenge(method: &mut EapSimMethod, rands: Vec<[u8; 16]>) -> EapResult {
        // Bogus MAC: exercises the failure paths that fire before (or at)
        // MAC verification
        method.process(&challenge_request(rands, [0u8; 16])).await
    }

    /// Derive K_aut and the nonce the same way the server side would
    fn server_side_keys(method: &EapSimMethod, rands: &[[u8; 16]]) -> (SimAkaKeys, [u8; 16]) {
        let nonce_mt = match &method.state {
            SimState::Start { nonce_mt, .. } => *nonce_mt,
            _ => panic!("method not in Start state"),
        };
        let kcs: Vec<[u8; 8]> = rands.iter().map(|r| [r[0]; 8]).collect();
        let mk = crypto::sim_master_key(b"1234567890@example", &kcs, &nonce_mt, &[1], 1);
        (crypto::expand_master_key(&mk), nonce_mt)
    }

    #[tokio::test]
    async fn test_challenge_success() {
        use hmac::{Hmac, Mac as _};
        use sha1::Sha1;

        let mut method = method();
        method.process(&start_request(0x10, false)).await;

        let rands = vec![[0xAA; 16], [0xBB; 16]];
        let (keys, nonce_mt) = server_side_keys(&method, &rands);

        // Seal the request MAC over packet | NONCE_MT
        let template = challenge_request(rands.clone(), [0u8; 16]);
        let mut mac = Hmac::<Sha1>::new_from_slice(&keys.k_aut).unwrap();
        mac.update(&template.encode());
        mac.update(&nonce_mt);
        let digest = mac.finalize().into_bytes();
        let mut at_mac = [0u8; 16];
        at_mac.copy_from_slice(&digest[..16]);

        let result = method.process(&challenge_request(rands, at_mac)).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected challenge response, got {:?}", other),
        };
        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(type_data.subtype, Subtype::SimChallenge);
        assert!(type_data
            .find(|a| matches!(a, EapSimAkaAttribute::Mac(_)))
            .is_some());

        // Keys are pending for the Success round
        let (msk, emsk) = method.pending_keys().unwrap();
        assert_eq!(msk.len(), 64);
        assert_eq!(emsk.len(), 64);
    }

    #[tokio::test]
    async fn test_challenge_insufficient_rands() {
        let mut method = method();
        method.process(&start_request(0x10, false)).await;

        let result = run_challenge(&mut method, vec![[0xAA; 16]]).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(type_data.subtype, Subtype::ClientError);
        assert_eq!(
            type_data.attributes,
            vec![EapSimAkaAttribute::ClientErrorCode(
                ClientErrorCode::InsufficientChallenges.to_u16()
            )]
        );
    }

    #[tokio::test]
    async fn test_challenge_duplicate_rands() {
        let mut method = method();
        method.process(&start_request(0x10, false)).await;

        let result = run_challenge(&mut method, vec![[0xAA; 16], [0xAA; 16]]).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(
            type_data.attributes,
            vec![EapSimAkaAttribute::ClientErrorCode(
                ClientErrorCode::RandsNotFresh.to_u16()
            )]
        );
    }

    #[tokio::test]
    async fn test_challenge_bad_mac_yields_client_error() {
        let mut method = method();
        method.process(&start_request(0x10, false)).await;

        let result = run_challenge(&mut method, vec![[0xAA; 16], [0xBB; 16]]).await;
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
    async fn test_challenge_before_start_is_invalid_request() {
        let mut method = method();
        let result = run_challenge(&mut method, vec![[0xAA; 16], [0xBB; 16]]).await;
        assert!(matches!(
            result,
            EapResult::Error(EapError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_type_data_yields_client_error() {
        let mut method = method();
        let request = EapMessage::request(0x10, EapMethodType::Sim, vec![0x11, 0x22]);
        let result = method.process(&request).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        let type_data =
            EapSimAkaTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(type_data.subtype, Subtype::ClientError);
        // Parse failures do not advance the state machine
        assert_eq!(method.state_name(), "Created");
    }

    #[tokio::test]
    async fn test_wrong_method_type_is_invalid_request() {
        let mut method = method();
        let request = EapMessage::request(0x10, EapMethodType::Aka, vec![0x01, 0x00, 0x00]);
        let result = method.process(&request).await;
        assert!(matches!(
            result,
            EapResult::Error(EapError::InvalidRequest(_))
        ));
    }
}
