//! End-to-end EAP conversation tests
//!
//! Runs complete method conversations through the public `EapSession`
//! surface, with the server side of each round built from the same
//! attribute codec and key schedule.

use carrick_platform::{
    AkaChallengeResult, AkaResponse, GsmTriplet, PlatformResult, SimAppType, SimAuthenticator,
};
use carrick_proto::eap::config::EapSessionConfig;
use carrick_proto::eap::message::{EapCode, EapMessage, EapMethodType};
use carrick_proto::eap::simaka::crypto::{self, MacAlgorithm};
use carrick_proto::eap::simaka::{EapSimAkaAttribute, EapSimAkaTypeData, Subtype};
use carrick_proto::eap::{EapResult, EapSession, EapSessionDeps};

use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::sync::Arc;

const IDENTITY: &[u8] = b"1234567890123456@nai.epc.example";

/// SIM whose outputs are a deterministic function of the challenge
struct DeterministicSim;

#[async_trait::async_trait]
impl SimAuthenticator for DeterministicSim {
    async fn gsm_auth(
        &self,
        _app_type: SimAppType,
        rand: &[u8; 16],
    ) -> PlatformResult<GsmTriplet> {
        Ok(GsmTriplet {
            sres: [rand[0], rand[1], rand[2], rand[3]],
            kc: [rand[15]; 8],
        })
    }

    async fn aka_auth(
        &self,
        _app_type: SimAppType,
        rand: &[u8; 16],
        _autn: &[u8; 16],
    ) -> PlatformResult<AkaChallengeResult> {
        Ok(AkaChallengeResult::Success(AkaResponse {
            res: rand[..8].to_vec(),
            ck: vec![rand[0]; 16],
            ik: vec![rand[1]; 16],
        }))
    }
}

fn deps() -> EapSessionDeps {
    EapSessionDeps {
        sim: Arc::new(DeterministicSim),
        tls_factory: None,
    }
}

fn sim_session() -> EapSession {
    let config = EapSessionConfig::builder()
        .with_identity(IDENTITY.to_vec())
        .with_sim(1, SimAppType::Usim)
        .build()
        .unwrap();
    EapSession::new(config, deps())
}

fn decode_response(result: EapResult) -> EapMessage {
    match result {
        EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
        other => panic!("expected a response, got {:?}", other),
    }
}

fn sim_type_data(message: &EapMessage) -> EapSimAkaTypeData {
    EapSimAkaTypeData::decode(&message.data.as_ref().unwrap().type_data).unwrap()
}

#[tokio::test]
async fn test_full_sim_conversation() {
    let mut session = sim_session();

    // Round 1: Identity
    let identity_response =
        decode_response(session.process(&EapMessage::request(1, EapMethodType::Identity, vec![]).encode()).await);
    assert_eq!(identity_response.code, EapCode::Response);
    assert_eq!(
        identity_response.data.unwrap().type_data,
        IDENTITY.to_vec()
    );

    // Round 2: SIM-Start
    let start_request = EapMessage::request(
        2,
        EapMethodType::Sim,
        EapSimAkaTypeData::new(
            Subtype::SimStart,
            vec![EapSimAkaAttribute::VersionList(vec![1])],
        )
        .encode(),
    );
    let start_response = decode_response(session.process(&start_request.encode()).await);
    let start_td = sim_type_data(&start_response);
    assert_eq!(start_td.subtype, Subtype::SimStart);

    let nonce_mt = match start_td.find(|a| matches!(a, EapSimAkaAttribute::NonceMt(_))) {
        Some(EapSimAkaAttribute::NonceMt(nonce)) => *nonce,
        other => panic!("expected NONCE_MT, got {:?}", other),
    };

    // Round 3: SIM-Challenge, with the request MAC computed server-side
    let rands = vec![[0x11u8; 16], [0x22u8; 16]];
    let kcs: Vec<[u8; 8]> = rands.iter().map(|r| [r[15]; 8]).collect();
    let sres_concat: Vec<u8> = rands.iter().flat_map(|r| r[..4].to_vec()).collect();

    let mk = crypto::sim_master_key(IDENTITY, &kcs, &nonce_mt, &[1], 1);
    let keys = crypto::expand_master_key(&mk);

    let template = EapMessage::request(
        3,
        EapMethodType::Sim,
        EapSimAkaTypeData::new(
            Subtype::SimChallenge,
            vec![
                EapSimAkaAttribute::Rand(rands.clone()),
                EapSimAkaAttribute::Mac([0u8; 16]),
            ],
        )
        .encode(),
    );
    let mut mac = Hmac::<Sha1>::new_from_slice(&keys.k_aut).unwrap();
    mac.update(&template.encode());
    mac.update(&nonce_mt);
    let digest = mac.finalize().into_bytes();
    let mut at_mac = [0u8; 16];
    at_mac.copy_from_slice(&digest[..16]);

    let challenge_request = EapMessage::request(
        3,
        EapMethodType::Sim,
        EapSimAkaTypeData::new(
            Subtype::SimChallenge,
            vec![
                EapSimAkaAttribute::Rand(rands),
                EapSimAkaAttribute::Mac(at_mac),
            ],
        )
        .encode(),
    );
    let challenge_response = decode_response(session.process(&challenge_request.encode()).await);
    let challenge_td = sim_type_data(&challenge_response);
    assert_eq!(challenge_td.subtype, Subtype::SimChallenge);

    // The response MAC verifies under K_aut with the SRES values appended
    crypto::verify_at_mac(
        MacAlgorithm::HmacSha1,
        &keys.k_aut,
        &challenge_response,
        &challenge_td,
        &sres_concat,
    )
    .expect("response MAC verifies");

    // Round 4: Success releases the session keys
    let result = session.process(&[0x03, 0x04, 0x00, 0x04]).await;
    match result {
        EapResult::Success { msk, emsk } => {
            assert_eq!(msk, keys.msk);
            assert_eq!(emsk, keys.emsk);
        }
        other => panic!("expected success, got {:?}", other),
    }
    assert!(session.is_finished());
}

#[tokio::test]
async fn test_aka_sync_failure_then_fresh_challenge() {
    /// AKA authenticator that reports a sync failure on the first
    /// challenge and succeeds on the second
    struct ResyncSim {
        calls: std::sync::Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl SimAuthenticator for ResyncSim {
        async fn gsm_auth(
            &self,
            _app_type: SimAppType,
            _rand: &[u8; 16],
        ) -> PlatformResult<GsmTriplet> {
            unreachable!("AKA test never runs GSM auth")
        }

        async fn aka_auth(
            &self,
            _app_type: SimAppType,
            rand: &[u8; 16],
            _autn: &[u8; 16],
        ) -> PlatformResult<AkaChallengeResult> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls == 1 {
                Ok(AkaChallengeResult::SyncFailure {
                    auts: vec![0x77; 14],
                })
            } else {
                Ok(AkaChallengeResult::Success(AkaResponse {
                    res: rand[..8].to_vec(),
                    ck: vec![0x0C; 16],
                    ik: vec![0x01; 16],
                }))
            }
        }
    }

    let config = EapSessionConfig::builder()
        .with_identity(IDENTITY.to_vec())
        .with_aka(1, SimAppType::Usim)
        .build()
        .unwrap();
    let mut session = EapSession::new(
        config,
        EapSessionDeps {
            sim: Arc::new(ResyncSim {
                calls: std::sync::Mutex::new(0),
            }),
            tls_factory: None,
        },
    );

    let challenge = |identifier: u8, mac: [u8; 16]| {
        EapMessage::request(
            identifier,
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
    };

    // First challenge: AUTS goes back, conversation continues
    let response = decode_response(session.process(&challenge(1, [0u8; 16]).encode()).await);
    let td = sim_type_data(&response);
    assert_eq!(td.subtype, Subtype::AkaSyncFailure);
    assert!(td
        .find(|a| matches!(a, EapSimAkaAttribute::Auts(_)))
        .is_some());
    assert!(!session.is_finished());

    // Second challenge with a valid MAC completes the method
    let mk = crypto::aka_master_key(IDENTITY, &[0x01; 16], &[0x0C; 16]);
    let keys = crypto::expand_master_key(&mk);

    let template = challenge(2, [0u8; 16]);
    let mut mac = Hmac::<Sha1>::new_from_slice(&keys.k_aut).unwrap();
    mac.update(&template.encode());
    let digest = mac.finalize().into_bytes();
    let mut at_mac = [0u8; 16];
    at_mac.copy_from_slice(&digest[..16]);

    let response = decode_response(session.process(&challenge(2, at_mac).encode()).await);
    assert_eq!(sim_type_data(&response).subtype, Subtype::AkaChallenge);

    let result = session.process(&[0x03, 0x05, 0x00, 0x04]).await;
    match result {
        EapResult::Success { msk, .. } => assert_eq!(msk, keys.msk),
        other => panic!("expected success, got {:?}", other),
    }
}

#[test]
fn test_nested_ttls_rejected_at_build() {
    let inner = EapSessionConfig::builder()
        .with_identity(b"inner@example".to_vec())
        .with_mschapv2("user", "pass")
        .build()
        .unwrap();
    let middle = EapSessionConfig::builder()
        .with_identity(b"middle@example".to_vec())
        .with_ttls(None, inner)
        .build()
        .unwrap();

    // TTLS inside TTLS must fail
    let result = EapSessionConfig::builder()
        .with_identity(b"outer@example".to_vec())
        .with_ttls(None, middle)
        .build();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_notification_and_nak_rounds() {
    let mut session = sim_session();

    // Notification request yields the canonical response
    let result = session
        .process(&hex::decode("0110000802AABBCC").unwrap())
        .await;
    match result {
        EapResult::Response(bytes) => assert_eq!(bytes, hex::decode("0210000502").unwrap()),
        other => panic!("expected canonical notification response, got {:?}", other),
    }

    // A request for an unconfigured method draws a Nak listing EAP-SIM
    let result = session.process(&hex::decode("0120000504").unwrap()).await;
    let nak = decode_response(result);
    let data = nak.data.unwrap();
    assert_eq!(data.method_type(), Some(EapMethodType::Nak));
    assert_eq!(data.type_data, vec![EapMethodType::Sim.to_u8()]);
}
