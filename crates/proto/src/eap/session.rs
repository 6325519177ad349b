//! Outer EAP session state machine
//!
//! Owns the method state machine for one EAP conversation and applies the
//! shared behavior before method dispatch:
//!
//! - Success → method enters Final, success result with MSK/EMSK where the
//!   method derived them
//! - Failure → method enters Final, failure result
//! - Identity request → identity response, state unchanged
//! - Notification request → canonical notification response, state
//!   unchanged
//! - Request for an unconfigured method before method selection → Nak
//! - Retransmitted request identifiers are answered from cache; requests
//!   with a previously consumed identifier never re-drive the method

use super::aka::EapAkaMethod;
use super::aka_prime::EapAkaPrimeMethod;
use super::config::EapSessionConfig;
use super::message::{EapCode, EapMessage, EapMethodType};
use super::method::EapMethod;
use super::mschapv2::EapMsChapV2Method;
use super::sim::EapSimMethod;
use super::ttls::{EapTtlsMethod, TlsSessionFactory};
use super::EapResult;
use crate::eap::EapError;
use carrick_platform::SimAuthenticator;
use std::sync::Arc;
use tracing::{debug, info};

/// External services an EAP session may need
#[derive(Clone)]
pub struct EapSessionDeps {
    /// SIM/UICC access for SIM/AKA/AKA'
    pub sim: Arc<dyn SimAuthenticator>,
    /// TLS factory for TTLS (None when TTLS is not configured)
    pub tls_factory: Option<Arc<dyn TlsSessionFactory>>,
}

impl std::fmt::Debug for EapSessionDeps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EapSessionDeps")
            .field("tls_factory", &self.tls_factory.is_some())
            .finish()
    }
}

/// One EAP conversation
pub struct EapSession {
    config: EapSessionConfig,
    deps: EapSessionDeps,
    method: Option<Box<dyn EapMethod>>,
    /// Identifier of the last request plus the response we produced
    response_cache: Option<(u8, Vec<u8>)>,
    finished: bool,
}

impl EapSession {
    /// Create a session for the given configuration
    pub fn new(config: EapSessionConfig, deps: EapSessionDeps) -> Self {
        EapSession {
            config,
            deps,
            method: None,
            response_cache: None,
            finished: false,
        }
    }

    /// Whether the conversation reached Success or Failure
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Process one inbound EAP packet
    pub async fn process(&mut self, packet: &[u8]) -> EapResult {
        if self.finished {
            return EapResult::Error(EapError::InvalidRequest(
                "EAP conversation already finished".into(),
            ));
        }

        let message = match EapMessage::decode(packet) {
            Ok(message) => message,
            Err(e) => return EapResult::Error(e),
        };

        match message.code {
            EapCode::Success => self.process_success(),
            EapCode::Failure => self.process_failure(),
            EapCode::Request => self.process_request(&message).await,
            EapCode::Response => EapResult::Error(EapError::InvalidRequest(
                "Peer sent an EAP Response to the supplicant".into(),
            )),
        }
    }

    fn process_success(&mut self) -> EapResult {
        let (msk, emsk) = self
            .method
            .as_ref()
            .and_then(|m| m.pending_keys())
            .unwrap_or_default();

        if let Some(method) = &mut self.method {
            info!(
                eap_method = ?method.method_type(),
                "EAP Success, entering final state"
            );
            method.mark_final();
        }
        self.finished = true;
        EapResult::Success { msk, emsk }
    }

    fn process_failure(&mut self) -> EapResult {
        if let Some(method) = &mut self.method {
            info!(
                eap_method = ?method.method_type(),
                "EAP Failure, entering final state"
            );
            method.mark_final();
        }
        self.finished = true;
        EapResult::Failure
    }

    async fn process_request(&mut self, message: &EapMessage) -> EapResult {
        // Retransmitted identifier: replay the cached response without
        // touching the method state
        if let Some((identifier, cached)) = &self.response_cache {
            if *identifier == message.identifier {
                debug!(
                    identifier = message.identifier,
                    "Replaying cached EAP response for retransmitted request"
                );
                return EapResult::Response(cached.clone());
            }
        }

        let data = match &message.data {
            Some(data) => data,
            None => {
                return EapResult::Error(EapError::InvalidRequest(
                    "EAP Request without type data".into(),
                ))
            }
        };

        let result = match data.method_type() {
            Some(EapMethodType::Identity) => {
                let response = EapMessage::response(
                    message.identifier,
                    EapMethodType::Identity,
                    self.config.identity.clone(),
                );
                EapResult::Response(response.encode())
            }
            Some(EapMethodType::Notification) => {
                // Canonical response regardless of method state
                EapResult::Response(EapMessage::notification_response(message.identifier).encode())
            }
            Some(EapMethodType::Nak) => EapResult::Error(EapError::InvalidRequest(
                "Nak is a response-only type".into(),
            )),
            Some(method_type) if method_type.is_auth_method() => {
                self.dispatch_method(message, method_type).await
            }
            _ => self.nak_or_reject(message),
        };

        if let EapResult::Response(bytes) = &result {
            self.response_cache = Some((message.identifier, bytes.clone()));
        }
        result
    }

    async fn dispatch_method(
        &mut self,
        message: &EapMessage,
        method_type: EapMethodType,
    ) -> EapResult {
        if self.method.is_none() {
            if !self.config.supports(method_type) {
                return self.nak_or_reject(message);
            }
            match self.create_method(method_type) {
                Ok(method) => {
                    info!(eap_method = ?method_type, "EAP method selected");
                    self.method = Some(method);
                }
                Err(e) => return EapResult::Error(e),
            }
        }

        let method = self.method.as_mut().expect("method installed above");
        if method.method_type() != method_type {
            return EapResult::Error(EapError::InvalidRequest(format!(
                "Server switched methods mid-conversation: {:?} after {:?}",
                method_type,
                method.method_type()
            )));
        }

        method.process(message).await
    }

    /// Nak the proposed method when no method is active yet; a method
    /// switch after selection is a protocol violation
    fn nak_or_reject(&self, message: &EapMessage) -> EapResult {
        if self.method.is_some() {
            return EapResult::Error(EapError::InvalidRequest(
                "Unexpected method type after method selection".into(),
            ));
        }
        let supported = self.config.supported_methods();
        EapResult::Response(EapMessage::nak_response(message.identifier, &supported).encode())
    }

    fn create_method(&self, method_type: EapMethodType) -> Result<Box<dyn EapMethod>, EapError> {
        let identity = self.config.identity.clone();
        match method_type {
            EapMethodType::Sim => {
                let config = self
                    .config
                    .sim
                    .clone()
                    .ok_or_else(|| EapError::Config("EAP-SIM not configured".into()))?;
                Ok(Box::new(EapSimMethod::new(
                    config,
                    identity,
                    self.deps.sim.clone(),
                )))
            }
            EapMethodType::Aka => {
                let config = self
                    .config
                    .aka
                    .clone()
                    .ok_or_else(|| EapError::Config("EAP-AKA not configured".into()))?;
                Ok(Box::new(EapAkaMethod::new(
                    config,
                    identity,
                    self.deps.sim.clone(),
                )))
            }
            EapMethodType::AkaPrime => {
                let config = self
                    .config
                    .aka_prime
                    .clone()
                    .ok_or_else(|| EapError::Config("EAP-AKA' not configured".into()))?;
                Ok(Box::new(EapAkaPrimeMethod::new(
                    config,
                    identity,
                    self.deps.sim.clone(),
                )))
            }
            EapMethodType::MsChapV2 => {
                let config = self
                    .config
                    .mschapv2
                    .clone()
                    .ok_or_else(|| EapError::Config("EAP-MSCHAPv2 not configured".into()))?;
                Ok(Box::new(EapMsChapV2Method::new(config)))
            }
            EapMethodType::Ttls => {
                let config = self
                    .config
                    .ttls
                    .clone()
                    .ok_or_else(|| EapError::Config("EAP-TTLS not configured".into()))?;
                Ok(Box::new(EapTtlsMethod::new(config, self.deps.clone())))
            }
            other => Err(EapError::Config(format!(
                "Unsupported method type {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carrick_platform::{
        AkaChallengeResult, GsmTriplet, PlatformError, PlatformResult, SimAppType,
    };

    struct NoSim;

    #[async_trait::async_trait]
    impl SimAuthenticator for NoSim {
        async fn gsm_auth(
            &self,
            _app_type: SimAppType,
            _rand: &[u8; 16],
        ) -> PlatformResult<GsmTriplet> {
            Err(PlatformError::Sim("no card".into()))
        }

        async fn aka_auth(
            &self,
            _app_type: SimAppType,
            _rand: &[u8; 16],
            _autn: &[u8; 16],
        ) -> PlatformResult<AkaChallengeResult> {
            Err(PlatformError::Sim("no card".into()))
        }
    }

    fn deps() -> EapSessionDeps {
        EapSessionDeps {
            sim: Arc::new(NoSim),
            tls_factory: None,
        }
    }

    fn session() -> EapSession {
        let config = EapSessionConfig::builder()
            .with_identity(b"user@example".to_vec())
            .with_sim(1, SimAppType::Usim)
            .with_aka(1, SimAppType::Usim)
            .build()
            .unwrap();
        EapSession::new(config, deps())
    }

    fn hex(s: &str) -> Vec<u8> {
        ::hex::decode(s).unwrap()
    }

    #[tokio::test]
    async fn test_success_yields_success_result() {
        // A bare Success finalizes the conversation
        let mut session = session();
        let result = session.process(&hex("03100004")).await;
        assert!(matches!(result, EapResult::Success { .. }));
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn test_failure_yields_failure_result() {
        let mut session = session();
        let result = session.process(&hex("04100004")).await;
        assert!(matches!(result, EapResult::Failure));
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn test_notification_gets_canonical_response() {
        let mut session = session();
        // Request with type Notification and payload AA BB CC
        let result = session.process(&hex("0110000802AABBCC")).await;
        match result {
            EapResult::Response(bytes) => assert_eq!(bytes, hex("0210000502")),
            other => panic!("expected canonical response, got {:?}", other),
        }
        assert!(!session.is_finished());
    }

    #[tokio::test]
    async fn test_identity_request_answered_with_identity() {
        let mut session = session();
        let result = session.process(&hex("0110000501")).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected identity response, got {:?}", other),
        };
        assert_eq!(response.code, EapCode::Response);
        let data = response.data.unwrap();
        assert_eq!(data.method_type(), Some(EapMethodType::Identity));
        assert_eq!(data.type_data, b"user@example".to_vec());
    }

    #[tokio::test]
    async fn test_unsupported_method_naks_with_configured_list() {
        let mut session = session();
        // Server proposes MD5-Challenge (type 4)
        let result = session.process(&hex("0110000504")).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected Nak, got {:?}", other),
        };
        let data = response.data.unwrap();
        assert_eq!(data.method_type(), Some(EapMethodType::Nak));
        // AKA then SIM per preference order
        assert_eq!(data.type_data, vec![23, 18]);
    }

    #[tokio::test]
    async fn test_retransmitted_identifier_replays_cached_response() {
        let mut session = session();
        let first = match session.process(&hex("0110000501")).await {
            EapResult::Response(bytes) => bytes,
            other => panic!("expected response, got {:?}", other),
        };

        // Same identifier again: identical bytes, no reprocessing
        let second = match session.process(&hex("0110000501")).await {
            EapResult::Response(bytes) => bytes,
            other => panic!("expected cached response, got {:?}", other),
        };
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_method_selection_then_switch_is_invalid() {
        let mut session = session();

        // SIM-Start request selects EAP-SIM
        let request = EapMessage::request(
            0x10,
            EapMethodType::Sim,
            crate::eap::simaka::EapSimAkaTypeData::new(
                crate::eap::simaka::Subtype::SimStart,
                vec![crate::eap::simaka::EapSimAkaAttribute::VersionList(vec![1])],
            )
            .encode(),
        );
        let result = session.process(&request.encode()).await;
        assert!(matches!(result, EapResult::Response(_)));

        // Now the server switches to AKA mid-conversation
        let aka_request = EapMessage::request(
            0x11,
            EapMethodType::Aka,
            crate::eap::simaka::EapSimAkaTypeData::new(
                crate::eap::simaka::Subtype::AkaIdentity,
                vec![crate::eap::simaka::EapSimAkaAttribute::AnyIdReq],
            )
            .encode(),
        );
        let result = session.process(&aka_request.encode()).await;
        assert!(matches!(
            result,
            EapResult::Error(EapError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_response_code_from_peer_is_invalid() {
        let mut session = session();
        let result = session.process(&hex("0210000501")).await;
        assert!(matches!(
            result,
            EapResult::Error(EapError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_packet_is_silent_error() {
        let mut session = session();
        let result = session.process(&hex("0310")).await;
        assert!(matches!(result, EapResult::Error(EapError::Silent(_))));
    }

    #[tokio::test]
    async fn test_finished_session_rejects_traffic() {
        let mut session = session();
        session.process(&hex("03100004")).await;
        let result = session.process(&hex("0110000501")).await;
        assert!(matches!(
            result,
            EapResult::Error(EapError::InvalidRequest(_))
        ));
    }
}
