//! EAP-TTLS method state machine (RFC 5281)
//!
//! ```text
//! Created --(Start)--> Handshake --(TLS established)--> Tunnel --> Final
//! ```
//!
//! Phase 1 drives an injected TLS client, assembling and fragmenting TLS
//! records across EAP round-trips with the L (length included), M (more
//! fragments) and S (start) flags. Phase 2 runs an inner EAP session whose
//! messages travel inside mandatory EAP-Message AVPs (code 79) ciphered
//! through the tunnel. The outer MSK/EMSK come from the TLS exporter.
//!
//! Version negotiation is implicit in the first exchange; only version 0
//! exists.

pub mod avp;

use super::config::EapTtlsConfig;
use super::message::{EapMessage, EapMethodType};
use super::method::EapMethod;
use super::session::{EapSession, EapSessionDeps};
use super::EapResult;
use crate::eap::{EapError, Result};
use avp::EapTtlsAvp;
use carrick_platform::{PlatformResult, TlsOutput, TlsSession, TlsStatus};

/// Creates TLS client sessions for the TTLS handshake
pub trait TlsSessionFactory: Send + Sync {
    /// Create a session, optionally pinned to a caller-provided trust
    /// anchor (DER)
    fn create(&self, trusted_ca: Option<&[u8]>) -> PlatformResult<Box<dyn TlsSession>>;
}

/// Largest TTLS fragment we emit
const MAX_FRAGMENT_LEN: usize = 1024;

const FLAG_LENGTH: u8 = 0x80;
const FLAG_MORE: u8 = 0x40;
const FLAG_START: u8 = 0x20;
const VERSION_MASK: u8 = 0x07;

/// Decoded TTLS type data
#[derive(Debug, Clone, PartialEq, Eq)]
struct TtlsTypeData {
    is_start: bool,
    is_more: bool,
    message_length: Option<u32>,
    version: u8,
    data: Vec<u8>,
}

impl TtlsTypeData {
    fn decode(type_data: &[u8]) -> Result<Self> {
        if type_data.is_empty() {
            return Err(EapError::Silent("Empty TTLS type data".into()));
        }

        let flags = type_data[0];
        let version = flags & VERSION_MASK;
        let mut offset = 1;

        let message_length = if flags & FLAG_LENGTH != 0 {
            if type_data.len() < 5 {
                return Err(EapError::Silent("TTLS length flag without length".into()));
            }
            let len = u32::from_be_bytes([
                type_data[1],
                type_data[2],
                type_data[3],
                type_data[4],
            ]);
            offset = 5;
            Some(len)
        } else {
            None
        };

        Ok(TtlsTypeData {
            is_start: flags & FLAG_START != 0,
            is_more: flags & FLAG_MORE != 0,
            message_length,
            version,
            data: type_data[offset..].to_vec(),
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut flags = self.version & VERSION_MASK;
        if self.is_start {
            flags |= FLAG_START;
        }
        if self.is_more {
            flags |= FLAG_MORE;
        }
        if self.message_length.is_some() {
            flags |= FLAG_LENGTH;
        }

        let mut out = vec![flags];
        if let Some(len) = self.message_length {
            out.extend_from_slice(&len.to_be_bytes());
        }
        out.extend_from_slice(&self.data);
        out
    }

    fn data_only(data: Vec<u8>) -> Self {
        TtlsTypeData {
            is_start: false,
            is_more: false,
            message_length: None,
            version: 0,
            data,
        }
    }
}

enum TtlsState {
    Created,
    Handshake,
    Tunnel {
        msk: Vec<u8>,
        emsk: Vec<u8>,
        inner: Box<EapSession>,
    },
    Final,
}

/// EAP-TTLS method state machine
pub struct EapTtlsMethod {
    config: EapTtlsConfig,
    deps: EapSessionDeps,
    tls: Option<Box<dyn TlsSession>>,
    state: TtlsState,
    /// Inbound TLS records accumulated across fragments
    reassembly: Vec<u8>,
    /// Outbound bytes not yet shipped (our fragments)
    pending_out: Vec<u8>,
    /// Whether the next outbound fragment is the first of its message
    first_fragment: bool,
}

impl EapTtlsMethod {
    /// Create the method; the TLS session is built lazily on Start
    pub fn new(config: EapTtlsConfig, deps: EapSessionDeps) -> Self {
        EapTtlsMethod {
            config,
            deps,
            tls: None,
            state: TtlsState::Created,
            reassembly: Vec::new(),
            pending_out: Vec::new(),
            first_fragment: true,
        }
    }

    fn tls(&mut self) -> Result<&mut Box<dyn TlsSession>> {
        self.tls
            .as_mut()
            .ok_or_else(|| EapError::Internal("TLS session not started".into()))
    }

    /// Queue outbound bytes and emit the next fragment as a response
    fn respond_with(&mut self, identifier: u8, outgoing: Vec<u8>) -> EapResult {
        self.pending_out.extend_from_slice(&outgoing);
        self.first_fragment = true;
        self.emit_fragment(identifier)
    }

    fn emit_fragment(&mut self, identifier: u8) -> EapResult {
        let total = self.pending_out.len();
        let chunk_len = total.min(MAX_FRAGMENT_LEN);
        let chunk: Vec<u8> = self.pending_out.drain(..chunk_len).collect();
        let more = !self.pending_out.is_empty();

        let type_data = TtlsTypeData {
            is_start: false,
            is_more: more,
            // The first fragment of a fragmented message carries the total
            message_length: if more && self.first_fragment {
                Some(total as u32)
            } else {
                None
            },
            version: 0,
            data: chunk,
        };
        self.first_fragment = false;

        let response = EapMessage::response(identifier, EapMethodType::Ttls, type_data.encode());
        EapResult::Response(response.encode())
    }

    async fn process_start(&mut self, message: &EapMessage, type_data: &TtlsTypeData) -> EapResult {
        if !type_data.is_start {
            return EapResult::Error(EapError::InvalidRequest(
                "First EAP-TTLS request without start bit".into(),
            ));
        }

        let factory = match &self.deps.tls_factory {
            Some(factory) => factory.clone(),
            None => {
                return EapResult::Error(EapError::Config(
                    "EAP-TTLS requires a TLS session factory".into(),
                ))
            }
        };
        let mut tls = match factory.create(self.config.trusted_ca.as_deref()) {
            Ok(tls) => tls,
            Err(e) => return EapResult::Error(EapError::Tls(e.to_string())),
        };

        let output = match tls.start_handshake().await {
            Ok(output) => output,
            Err(e) => return EapResult::Error(EapError::Tls(e.to_string())),
        };
        self.tls = Some(tls);
        self.state = TtlsState::Handshake;

        self.respond_with(message.identifier, output.records)
    }

    async fn process_handshake(
        &mut self,
        message: &EapMessage,
        type_data: &TtlsTypeData,
    ) -> EapResult {
        // Ack request for our next outbound fragment
        if type_data.data.is_empty() && !self.pending_out.is_empty() {
            return self.emit_fragment(message.identifier);
        }

        self.reassembly.extend_from_slice(&type_data.data);
        if type_data.is_more {
            // Acknowledge and wait for the rest
            let response = EapMessage::response(
                message.identifier,
                EapMethodType::Ttls,
                TtlsTypeData::data_only(Vec::new()).encode(),
            );
            return EapResult::Response(response.encode());
        }

        let records = std::mem::take(&mut self.reassembly);
        let TlsOutput { status, records } = {
            let tls = match self.tls() {
                Ok(tls) => tls,
                Err(e) => return EapResult::Error(e),
            };
            match tls.process_handshake_records(&records).await {
                Ok(output) => output,
                Err(e) => return EapResult::Error(EapError::Tls(e.to_string())),
            }
        };

        match status {
            TlsStatus::HandshakeInProgress => self.respond_with(message.identifier, records),
            TlsStatus::HandshakeComplete => {
                self.enter_tunnel(message.identifier, records).await
            }
            TlsStatus::Closed | TlsStatus::Failure => {
                EapResult::Error(EapError::Tls("TLS handshake failed".into()))
            }
        }
    }

    /// TLS is up: derive the outer keys, build the inner session, and ship
    /// the tunneled identity alongside any final handshake records
    async fn enter_tunnel(&mut self, identifier: u8, final_records: Vec<u8>) -> EapResult {
        let inner_config = (*self.config.inner).clone();
        let identity = inner_config.identity.clone();

        let (msk, emsk, first_tunneled) = {
            let tls = match self.tls() {
                Ok(tls) => tls,
                Err(e) => return EapResult::Error(e),
            };

            let keymat = match tls.export_key_material(128) {
                Ok(keymat) => keymat,
                Err(e) => return EapResult::Error(EapError::Tls(e.to_string())),
            };
            let msk = keymat[..64].to_vec();
            let emsk = keymat[64..].to_vec();

            // Phase 2 opens with the tunneled EAP-Identity response
            let identity_message =
                EapMessage::response(identifier, EapMethodType::Identity, identity);
            let avp = EapTtlsAvp::eap_message(identity_message.encode());
            let tunneled = match tls.encrypt(&avp.encode()).await {
                Ok(ciphertext) => ciphertext,
                Err(e) => return EapResult::Error(EapError::Tls(e.to_string())),
            };
            (msk, emsk, tunneled)
        };

        let inner = EapSession::new(inner_config, self.deps.clone());
        self.state = TtlsState::Tunnel {
            msk,
            emsk,
            inner: Box::new(inner),
        };

        let mut outgoing = final_records;
        outgoing.extend_from_slice(&first_tunneled);
        self.respond_with(identifier, outgoing)
    }

    async fn process_tunnel(
        &mut self,
        message: &EapMessage,
        type_data: &TtlsTypeData,
    ) -> EapResult {
        if type_data.data.is_empty() && !self.pending_out.is_empty() {
            return self.emit_fragment(message.identifier);
        }

        self.reassembly.extend_from_slice(&type_data.data);
        if type_data.is_more {
            let response = EapMessage::response(
                message.identifier,
                EapMethodType::Ttls,
                TtlsTypeData::data_only(Vec::new()).encode(),
            );
            return EapResult::Response(response.encode());
        }
        let ciphertext = std::mem::take(&mut self.reassembly);

        let plaintext = {
            let tls = match self.tls() {
                Ok(tls) => tls,
                Err(e) => return EapResult::Error(e),
            };
            match tls.decrypt(&ciphertext).await {
                Ok(plaintext) => plaintext,
                Err(e) => return EapResult::Error(EapError::Tls(e.to_string())),
            }
        };

        let (avp, _) = match EapTtlsAvp::decode(&plaintext) {
            Ok(decoded) => decoded,
            Err(e) => return EapResult::Error(e),
        };
        if avp.avp_code != avp::EAP_MESSAGE_AVP_CODE {
            if avp.is_mandatory {
                return EapResult::Error(EapError::InvalidRequest(format!(
                    "Unsupported mandatory AVP {} in tunnel",
                    avp.avp_code
                )));
            }
            // Optional unknown AVPs are ignored; nothing to answer
            return EapResult::Error(EapError::InvalidRequest(
                "Tunnel message carried no EAP-Message AVP".into(),
            ));
        }

        let inner_result = match &mut self.state {
            TtlsState::Tunnel { inner, .. } => inner.process(&avp.data).await,
            _ => return EapResult::Error(EapError::Internal("Not in tunnel state".into())),
        };

        match inner_result {
            EapResult::Response(inner_bytes) => {
                let avp = EapTtlsAvp::eap_message(inner_bytes);
                let tunneled = {
                    let tls = match self.tls() {
                        Ok(tls) => tls,
                        Err(e) => return EapResult::Error(e),
                    };
                    match tls.encrypt(&avp.encode()).await {
                        Ok(ciphertext) => ciphertext,
                        Err(e) => return EapResult::Error(EapError::Tls(e.to_string())),
                    }
                };
                self.respond_with(message.identifier, tunneled)
            }
            // The inner conversation concluding does not end the outer
            // method; the server follows with a cleartext Success/Failure
            EapResult::Success { .. } => EapResult::Error(EapError::InvalidRequest(
                "Inner EAP Success must arrive outside the tunnel".into(),
            )),
            EapResult::Failure => EapResult::Failure,
            EapResult::Error(e) => EapResult::Error(e),
        }
    }
}

#[async_trait::async_trait]
impl EapMethod for EapTtlsMethod {
    fn method_type(&self) -> EapMethodType {
        EapMethodType::Ttls
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            TtlsState::Created => "Created",
            TtlsState::Handshake => "Handshake",
            TtlsState::Tunnel { .. } => "Tunnel",
            TtlsState::Final => "Final",
        }
    }

    fn pending_keys(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        match &self.state {
            TtlsState::Tunnel { msk, emsk, .. } => Some((msk.clone(), emsk.clone())),
            _ => None,
        }
    }

    fn mark_final(&mut self) {
        self.state = TtlsState::Final;
    }

    async fn process(&mut self, message: &EapMessage) -> EapResult {
        let data = match &message.data {
            Some(data) => data,
            None => {
                return EapResult::Error(EapError::InvalidRequest(
                    "TTLS request without type data".into(),
                ))
            }
        };
        if data.method_type() != Some(EapMethodType::Ttls) {
            return EapResult::Error(EapError::InvalidRequest(format!(
                "Expected EAP-TTLS request, got type {}",
                data.type_raw
            )));
        }

        let type_data = match TtlsTypeData::decode(&data.type_data) {
            Ok(td) => td,
            Err(e) => return EapResult::Error(e),
        };
        if type_data.version != 0 {
            return EapResult::Error(EapError::InvalidRequest(format!(
                "Unsupported EAP-TTLS version {}",
                type_data.version
            )));
        }

        match &self.state {
            TtlsState::Created => self.process_start(message, &type_data).await,
            TtlsState::Handshake => self.process_handshake(message, &type_data).await,
            TtlsState::Tunnel { .. } => self.process_tunnel(message, &type_data).await,
            TtlsState::Final => EapResult::Error(EapError::InvalidRequest(
                "EAP-TTLS conversation already finished".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eap::config::EapSessionConfig;
    use crate::eap::message::EapCode;
    use carrick_platform::{
        AkaChallengeResult, GsmTriplet, PlatformError, SimAppType, SimAuthenticator,
    };
    use std::sync::Arc;

    /// TLS stub that completes the handshake after one round trip and
    /// "encrypts" by XOR-ing a constant
    struct StubTls {
        rounds: usize,
    }

    #[async_trait::async_trait]
    impl TlsSession for StubTls {
        async fn start_handshake(&mut self) -> PlatformResult<TlsOutput> {
            Ok(TlsOutput {
                status: TlsStatus::HandshakeInProgress,
                records: b"client-hello".to_vec(),
            })
        }

        async fn process_handshake_records(&mut self, _records: &[u8]) -> PlatformResult<TlsOutput> {
            self.rounds += 1;
            if self.rounds >= 2 {
                Ok(TlsOutput {
                    status: TlsStatus::HandshakeComplete,
                    records: b"finished".to_vec(),
                })
            } else {
                Ok(TlsOutput {
                    status: TlsStatus::HandshakeInProgress,
                    records: b"key-exchange".to_vec(),
                })
            }
        }

        async fn encrypt(&mut self, plaintext: &[u8]) -> PlatformResult<Vec<u8>> {
            Ok(plaintext.iter().map(|b| b ^ 0x5A).collect())
        }

        async fn decrypt(&mut self, records: &[u8]) -> PlatformResult<Vec<u8>> {
            Ok(records.iter().map(|b| b ^ 0x5A).collect())
        }

        fn export_key_material(&self, length: usize) -> PlatformResult<Vec<u8>> {
            Ok((0..length).map(|i| i as u8).collect())
        }
    }

    struct StubTlsFactory;

    impl TlsSessionFactory for StubTlsFactory {
        fn create(&self, _trusted_ca: Option<&[u8]>) -> PlatformResult<Box<dyn TlsSession>> {
            Ok(Box::new(StubTls { rounds: 0 }))
        }
    }

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
            tls_factory: Some(Arc::new(StubTlsFactory)),
        }
    }

    fn ttls_method() -> EapTtlsMethod {
        let inner = EapSessionConfig::builder()
            .with_identity(b"inner@example".to_vec())
            .with_mschapv2("user", "pass")
            .build()
            .unwrap();
        let config = EapSessionConfig::builder()
            .with_identity(b"outer@example".to_vec())
            .with_ttls(None, inner)
            .build()
            .unwrap();

        let ttls_config = match config.ttls_config() {
            Some(cfg) => cfg.clone(),
            None => panic!("TTLS config missing"),
        };
        EapTtlsMethod::new(ttls_config, deps())
    }

    fn start_request() -> EapMessage {
        EapMessage::request(0x40, EapMethodType::Ttls, vec![FLAG_START])
    }

    fn data_request(identifier: u8, data: &[u8]) -> EapMessage {
        EapMessage::request(
            identifier,
            EapMethodType::Ttls,
            TtlsTypeData::data_only(data.to_vec()).encode(),
        )
    }

    #[test]
    fn test_type_data_flags_roundtrip() {
        let td = TtlsTypeData {
            is_start: false,
            is_more: true,
            message_length: Some(4000),
            version: 0,
            data: vec![1, 2, 3],
        };
        let encoded = td.encode();
        assert_eq!(encoded[0], FLAG_LENGTH | FLAG_MORE);
        assert_eq!(TtlsTypeData::decode(&encoded).unwrap(), td);

        let start = TtlsTypeData {
            is_start: true,
            is_more: false,
            message_length: None,
            version: 0,
            data: Vec::new(),
        };
        assert_eq!(TtlsTypeData::decode(&start.encode()).unwrap(), start);
    }

    #[tokio::test]
    async fn test_start_produces_client_hello() {
        let mut method = ttls_method();
        let result = method.process(&start_request()).await;

        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        let td = TtlsTypeData::decode(&response.data.unwrap().type_data).unwrap();
        assert_eq!(td.data, b"client-hello");
        assert_eq!(method.state_name(), "Handshake");
    }

    #[tokio::test]
    async fn test_missing_start_bit_is_invalid() {
        let mut method = ttls_method();
        let result = method.process(&data_request(0x40, b"records")).await;
        assert!(matches!(
            result,
            EapResult::Error(EapError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_handshake_to_tunnel_transition() {
        let mut method = ttls_method();
        method.process(&start_request()).await;

        // Round 1: still in progress
        let result = method.process(&data_request(0x41, b"server-hello")).await;
        assert!(matches!(result, EapResult::Response(_)));
        assert_eq!(method.state_name(), "Handshake");

        // Round 2: handshake completes, tunneled identity goes out
        let result = method.process(&data_request(0x42, b"server-finished")).await;
        let response = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected response, got {:?}", other),
        };
        assert_eq!(method.state_name(), "Tunnel");

        let td = TtlsTypeData::decode(&response.data.unwrap().type_data).unwrap();
        // Final flight followed by the encrypted identity AVP
        assert!(td.data.starts_with(b"finished"));
        let tunneled = &td.data[b"finished".len()..];
        let plaintext: Vec<u8> = tunneled.iter().map(|b| b ^ 0x5A).collect();
        let (avp, _) = EapTtlsAvp::decode(&plaintext).unwrap();
        assert_eq!(avp.avp_code, avp::EAP_MESSAGE_AVP_CODE);

        let inner = EapMessage::decode(&avp.data).unwrap();
        assert_eq!(inner.code, EapCode::Response);
        assert_eq!(
            inner.data.unwrap().type_data,
            b"inner@example".to_vec()
        );

        // Outer keys come from the TLS exporter
        let (msk, emsk) = method.pending_keys().unwrap();
        assert_eq!(msk, (0..64).collect::<Vec<u8>>());
        assert_eq!(emsk, (64..128).map(|i| i as u8).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn test_inbound_fragments_are_acked_and_assembled() {
        let mut method = ttls_method();
        method.process(&start_request()).await;

        // First fragment with M set
        let frag1 = EapMessage::request(
            0x41,
            EapMethodType::Ttls,
            TtlsTypeData {
                is_start: false,
                is_more: true,
                message_length: Some(10),
                version: 0,
                data: b"serve".to_vec(),
            }
            .encode(),
        );
        let result = method.process(&frag1).await;
        let ack = match result {
            EapResult::Response(bytes) => EapMessage::decode(&bytes).unwrap(),
            other => panic!("expected ack, got {:?}", other),
        };
        let td = TtlsTypeData::decode(&ack.data.unwrap().type_data).unwrap();
        assert!(td.data.is_empty());

        // Second fragment completes the message; handshake advances
        let result = method.process(&data_request(0x42, b"r-hi!")).await;
        assert!(matches!(result, EapResult::Response(_)));
        assert_eq!(method.state_name(), "Handshake");
    }
}
