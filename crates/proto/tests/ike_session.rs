//! End-to-end IKE session tests
//!
//! Drives a complete initiator session against a scripted responder over an
//! in-memory transport. The responder side is assembled from the same
//! codec, crypto, and AUTH primitives, so both directions of every message
//! cross the real wire format.

use carrick_platform::{ChildSaInstall, PacketTransport, PlatformResult, SaInstaller};
use carrick_proto::ike::auth;
use carrick_proto::ike::config::{ChildSessionConfig, IkeSessionConfig};
use carrick_proto::ike::constants::{ExchangeType, IkeFlags, PayloadType};
use carrick_proto::ike::crypto::{CryptoSuite, DhExchange, DhGroup, KeyMaterial};
use carrick_proto::ike::message::{decode_payload_list, IkeHeader, IkeMessage};
use carrick_proto::ike::payload::{
    AuthPayload, IdPayload, IdType, IkePayload, KePayload, NoncePayload, NotifyPayload,
    NotifyType, SaPayload,
};
use carrick_proto::ike::proposal::{DhTransformId, Proposal};
use carrick_proto::ike::session::{IkeSession, SessionServices};
use carrick_proto::ike::sk::{self, SkKeys};
use carrick_proto::ike::IkeState;

use rand::RngCore;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

const PSK: &[u8] = b"integration-test-psk";
const RESPONDER_SPI: [u8; 8] = [0xBB; 8];

/// One half of an in-memory datagram pair
struct PairTransport {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    peer: SocketAddr,
}

#[async_trait::async_trait]
impl PacketTransport for PairTransport {
    async fn send(&self, data: &[u8], _peer: SocketAddr) -> PlatformResult<()> {
        let _ = self.tx.send(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> PlatformResult<(Vec<u8>, SocketAddr)> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(packet) => Ok((packet, self.peer)),
            None => {
                drop(rx);
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

fn transport_pair(peer: SocketAddr) -> (Arc<PairTransport>, PairEndpoint) {
    let (to_responder, from_initiator) = mpsc::unbounded_channel();
    let (to_initiator, from_responder) = mpsc::unbounded_channel();

    let initiator = Arc::new(PairTransport {
        tx: to_responder,
        rx: tokio::sync::Mutex::new(from_responder),
        peer,
    });
    let responder = PairEndpoint {
        tx: to_initiator,
        rx: from_initiator,
    };
    (initiator, responder)
}

/// Responder's raw endpoint
struct PairEndpoint {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl PairEndpoint {
    async fn recv(&mut self) -> Vec<u8> {
        self.rx.recv().await.expect("initiator hung up")
    }

    fn send(&self, packet: Vec<u8>) {
        let _ = self.tx.send(packet);
    }
}

#[derive(Default)]
struct RecordingInstaller {
    installed: Mutex<Vec<ChildSaInstall>>,
    deleted: Mutex<Vec<u32>>,
}

#[async_trait::async_trait]
impl SaInstaller for RecordingInstaller {
    async fn install_child_sa(&self, sa: ChildSaInstall) -> PlatformResult<()> {
        self.installed.lock().unwrap().push(sa);
        Ok(())
    }

    async fn delete_child_sa(&self, inbound_spi: u32) -> PlatformResult<()> {
        self.deleted.lock().unwrap().push(inbound_spi);
        Ok(())
    }
}

/// Responder-side state assembled while scripting the conversation
struct Responder {
    endpoint: PairEndpoint,
    suite: Option<CryptoSuite>,
    keys: Option<KeyMaterial>,
    nonce_r: Vec<u8>,
    init_request: Vec<u8>,
    init_response: Vec<u8>,
}

impl Responder {
    fn new(endpoint: PairEndpoint) -> Self {
        Responder {
            endpoint,
            suite: None,
            keys: None,
            nonce_r: Vec::new(),
            init_request: Vec::new(),
            init_response: Vec::new(),
        }
    }

    /// Answer IKE_SA_INIT, deriving the same key material as the peer
    async fn answer_init(&mut self) {
        let raw = self.endpoint.recv().await;
        self.init_request = raw.clone();
        let request = IkeMessage::from_bytes(&raw).expect("valid IKE_SA_INIT request");
        assert_eq!(request.header.exchange_type, ExchangeType::IkeSaInit);

        let mut selected: Option<Proposal> = None;
        let mut ke: Option<KePayload> = None;
        let mut nonce_i: Option<Vec<u8>> = None;
        for payload in &request.payloads {
            match payload {
                IkePayload::SA(sa) => selected = Some(sa.proposals[0].clone()),
                IkePayload::KE(p) => ke = Some(p.clone()),
                IkePayload::Nonce(n) => nonce_i = Some(n.nonce.clone()),
                _ => {}
            }
        }
        let selected = selected.expect("SA payload present");
        let ke = ke.expect("KE payload present");
        let nonce_i = nonce_i.expect("Nonce payload present");

        let group = DhGroup::from_transform(
            DhTransformId::from_u16(ke.dh_group).expect("known DH group"),
        );
        let dh = DhExchange::new(group);
        let shared_secret = dh.compute_shared_secret(&ke.key_data).unwrap();

        let mut nonce_r = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce_r);
        self.nonce_r = nonce_r.clone();

        let header = IkeHeader::new(
            request.header.initiator_spi,
            RESPONDER_SPI,
            PayloadType::SA,
            ExchangeType::IkeSaInit,
            IkeFlags::response(false),
            0,
            0,
        );
        let response = IkeMessage::new(
            header,
            vec![
                IkePayload::SA(SaPayload::new(vec![selected.clone()])),
                IkePayload::KE(KePayload::new(ke.dh_group, dh.public_key().to_vec())),
                IkePayload::Nonce(NoncePayload::new(nonce_r.clone()).unwrap()),
            ],
        )
        .to_bytes();
        self.init_response = response.clone();

        let suite = CryptoSuite::from_proposal(&selected).unwrap();
        let keys = KeyMaterial::derive(
            suite.prf,
            &nonce_i,
            &self.nonce_r,
            &shared_secret,
            &request.header.initiator_spi,
            &RESPONDER_SPI,
            suite.cipher.key_material_len(),
            suite.integ_key_len(),
        )
        .unwrap();

        self.suite = Some(suite);
        self.keys = Some(keys);
        self.endpoint.send(response);
    }

    fn recv_keys(&self) -> SkKeys<'_> {
        let keys = self.keys.as_ref().unwrap();
        SkKeys {
            encr: &keys.sk_ei,
            integ: &keys.sk_ai,
        }
    }

    /// Open a protected request and return its header and inner payloads
    async fn recv_protected(&mut self) -> (IkeHeader, Vec<IkePayload>) {
        let raw = self.endpoint.recv().await;
        let header = IkeHeader::from_bytes(&raw).unwrap();
        let suite = self.suite.unwrap();
        let envelope = sk::open(&suite, &self.recv_keys(), &raw).expect("authentic request");
        assert_eq!(envelope.total_fragments, 1);
        let inner = decode_payload_list(envelope.first_payload, &envelope.plaintext).unwrap();
        (header, inner)
    }

    fn send_protected(
        &mut self,
        exchange_type: ExchangeType,
        message_id: u32,
        inner: &[IkePayload],
    ) {
        let suite = self.suite.unwrap();
        let keys = self.keys.as_ref().unwrap();
        let header = IkeHeader::new(
            IkeHeader::from_bytes(&self.init_request).unwrap().initiator_spi,
            RESPONDER_SPI,
            PayloadType::SK,
            exchange_type,
            IkeFlags::response(false),
            message_id,
            0,
        );
        let sk_keys = SkKeys {
            encr: &keys.sk_er,
            integ: &keys.sk_ar,
        };
        let datagrams =
            sk::seal_fragmented(&suite, &sk_keys, &header, inner, 1280).unwrap();
        for datagram in datagrams {
            self.endpoint.send(datagram);
        }
    }

    /// Answer IKE_AUTH with PSK: verify the peer AUTH, send ours
    async fn answer_auth(&mut self) {
        let (header, inner) = self.recv_protected().await;
        assert_eq!(header.exchange_type, ExchangeType::IkeAuth);
        assert_eq!(header.message_id, 1);

        let mut id_i: Option<IdPayload> = None;
        let mut auth_payload: Option<AuthPayload> = None;
        let mut child_sa: Option<SaPayload> = None;
        let mut ts_i = None;
        let mut ts_r = None;
        for payload in &inner {
            match payload {
                IkePayload::IDi(id) => id_i = Some(id.clone()),
                IkePayload::AUTH(a) => auth_payload = Some(a.clone()),
                IkePayload::SA(sa) => child_sa = Some(sa.clone()),
                IkePayload::TSi(ts) => ts_i = Some(ts.clone()),
                IkePayload::TSr(ts) => ts_r = Some(ts.clone()),
                _ => {}
            }
        }
        let id_i = id_i.expect("IDi present");
        let auth_payload = auth_payload.expect("AUTH present");
        let child_sa = child_sa.expect("child SA present");

        let suite = self.suite.unwrap();
        let keys = self.keys.as_ref().unwrap();

        // Verify the initiator's PSK AUTH
        let octets = auth::initiator_signed_octets(
            suite.prf,
            &self.init_request,
            &self.nonce_r,
            &keys.sk_pi,
            &id_i.to_payload_data(),
        );
        auth::verify_shared_secret_auth(suite.prf, PSK, &octets, &auth_payload)
            .expect("initiator AUTH verifies");

        // The initiator's first nonce is inside the recorded init request
        let init_request = IkeMessage::from_bytes(&self.init_request).unwrap();
        let nonce_i = init_request
            .payloads
            .iter()
            .find_map(|p| match p {
                IkePayload::Nonce(n) => Some(n.nonce.clone()),
                _ => None,
            })
            .unwrap();

        // Build our AUTH and select the child proposal with our SPI
        let id_r = IdPayload {
            id_type: IdType::Fqdn,
            data: b"gateway.example.org".to_vec(),
        };
        let octets = auth::responder_signed_octets(
            suite.prf,
            &self.init_response,
            &nonce_i,
            &keys.sk_pr,
            &id_r.to_payload_data(),
        );
        let our_auth = auth::compute_shared_secret_auth(suite.prf, PSK, &octets);

        let mut selected_child = child_sa.proposals[0].clone();
        selected_child.spi = vec![0xCC, 0xCC, 0xCC, 0xCC];

        let response_inner = vec![
            IkePayload::IDr(id_r),
            IkePayload::AUTH(our_auth),
            IkePayload::SA(SaPayload::new(vec![selected_child])),
            IkePayload::TSi(ts_i.expect("TSi present")),
            IkePayload::TSr(ts_r.expect("TSr present")),
        ];
        self.send_protected(ExchangeType::IkeAuth, header.message_id, &response_inner);
    }

    /// Answer one INFORMATIONAL request with an empty response
    async fn answer_informational(&mut self) {
        let (header, _inner) = self.recv_protected().await;
        assert_eq!(header.exchange_type, ExchangeType::Informational);
        self.send_protected(ExchangeType::Informational, header.message_id, &[]);
    }
}

fn session_config(peer: SocketAddr) -> IkeSessionConfig {
    IkeSessionConfig::builder(peer)
        .with_local_id("device@example.org")
        .with_remote_id("gateway.example.org")
        .with_psk(PSK.to_vec())
        .build()
        .unwrap()
}

fn make_session(peer: SocketAddr) -> (IkeSession, PairEndpoint, Arc<RecordingInstaller>) {
    let (transport, endpoint) = transport_pair(peer);
    let installer = Arc::new(RecordingInstaller::default());
    let services = SessionServices {
        transport,
        sa_installer: installer.clone(),
        sim: None,
        tls_factory: None,
    };
    (
        IkeSession::new(session_config(peer), services),
        endpoint,
        installer,
    )
}

#[tokio::test]
async fn test_full_psk_handshake_and_teardown() {
    let peer: SocketAddr = "192.0.2.1:500".parse().unwrap();
    let (mut session, endpoint, installer) = make_session(peer);

    let responder = tokio::spawn(async move {
        let mut responder = Responder::new(endpoint);
        responder.answer_init().await;
        responder.answer_auth().await;
        // Liveness check, then the DELETE from shutdown
        responder.answer_informational().await;
        responder.answer_informational().await;
    });

    session.connect().await.expect("handshake succeeds");
    assert_eq!(session.state(), IkeState::Established);

    // The negotiated child pair reached the installer
    {
        let installed = installer.installed.lock().unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].outbound_spi, 0xCCCCCCCC);
        assert!(!installed[0].is_transport);
        assert_eq!(installed[0].local_selectors.len(), 2);
    }
    let child_spis = session.child_spis();
    assert_eq!(child_spis.len(), 1);

    session.check_liveness().await.expect("liveness succeeds");
    assert_eq!(session.state(), IkeState::Established);

    session.shutdown().await.expect("shutdown succeeds");
    assert_eq!(session.state(), IkeState::Closed);
    assert_eq!(installer.deleted.lock().unwrap().as_slice(), &child_spis[..]);

    responder.await.unwrap();
}

#[tokio::test]
async fn test_cookie_challenge_honored_once() {
    let peer: SocketAddr = "192.0.2.2:500".parse().unwrap();
    let (mut session, mut endpoint, _installer) = make_session(peer);

    let cookie_clone = vec![0xC0; 24];

    let responder = tokio::spawn(async move {
        // First request: demand a cookie
        let raw = endpoint.recv().await;
        let request = IkeMessage::from_bytes(&raw).unwrap();
        let (first_ke, first_nonce) = extract_ke_nonce(&request);

        let header = IkeHeader::new(
            request.header.initiator_spi,
            [0u8; 8],
            PayloadType::N,
            ExchangeType::IkeSaInit,
            IkeFlags::response(false),
            0,
            0,
        );
        let challenge = IkeMessage::new(
            header,
            vec![IkePayload::N(NotifyPayload::status(
                NotifyType::Cookie,
                cookie_clone.clone(),
            ))],
        )
        .to_bytes();
        endpoint.send(challenge);

        // Retried request: cookie first, then identical KE and nonce
        let raw = endpoint.recv().await;
        let retry = IkeMessage::from_bytes(&raw).unwrap();
        match &retry.payloads[0] {
            IkePayload::N(n) => {
                assert_eq!(n.notify_type(), Some(NotifyType::Cookie));
                assert_eq!(n.data, cookie_clone);
            }
            other => panic!("expected cookie notify first, got {:?}", other),
        }
        let (retry_ke, retry_nonce) = extract_ke_nonce(&retry);
        assert_eq!(retry_ke, first_ke);
        assert_eq!(retry_nonce, first_nonce);

        // Proceed normally from here
        let mut responder = Responder::new(endpoint);
        responder.init_request = raw.clone();
        responder.answer_init_from(retry).await;
        responder.answer_auth().await;
    });

    session.connect().await.expect("handshake after cookie");
    assert_eq!(session.state(), IkeState::Established);
    assert_eq!(session.metrics().snapshot().cookie_retries, 1);

    responder.await.unwrap();
}

fn extract_ke_nonce(message: &IkeMessage) -> (KePayload, Vec<u8>) {
    let mut ke = None;
    let mut nonce = None;
    for payload in &message.payloads {
        match payload {
            IkePayload::KE(p) => ke = Some(p.clone()),
            IkePayload::Nonce(n) => nonce = Some(n.nonce.clone()),
            _ => {}
        }
    }
    (ke.unwrap(), nonce.unwrap())
}

impl Responder {
    /// Variant of `answer_init` fed with an already-received request
    async fn answer_init_from(&mut self, request: IkeMessage) {
        let mut selected: Option<Proposal> = None;
        let mut ke: Option<KePayload> = None;
        let mut nonce_i: Option<Vec<u8>> = None;
        for payload in &request.payloads {
            match payload {
                IkePayload::SA(sa) => selected = Some(sa.proposals[0].clone()),
                IkePayload::KE(p) => ke = Some(p.clone()),
                IkePayload::Nonce(n) => nonce_i = Some(n.nonce.clone()),
                _ => {}
            }
        }
        let selected = selected.unwrap();
        let ke = ke.unwrap();
        let nonce_i = nonce_i.unwrap();

        let group = DhGroup::from_transform(DhTransformId::from_u16(ke.dh_group).unwrap());
        let dh = DhExchange::new(group);
        let shared_secret = dh.compute_shared_secret(&ke.key_data).unwrap();

        let mut nonce_r = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce_r);
        self.nonce_r = nonce_r.clone();

        let header = IkeHeader::new(
            request.header.initiator_spi,
            RESPONDER_SPI,
            PayloadType::SA,
            ExchangeType::IkeSaInit,
            IkeFlags::response(false),
            0,
            0,
        );
        let response = IkeMessage::new(
            header,
            vec![
                IkePayload::SA(SaPayload::new(vec![selected.clone()])),
                IkePayload::KE(KePayload::new(ke.dh_group, dh.public_key().to_vec())),
                IkePayload::Nonce(NoncePayload::new(nonce_r).unwrap()),
            ],
        )
        .to_bytes();
        self.init_response = response.clone();

        let suite = CryptoSuite::from_proposal(&selected).unwrap();
        let keys = KeyMaterial::derive(
            suite.prf,
            &nonce_i,
            &self.nonce_r,
            &shared_secret,
            &request.header.initiator_spi,
            &RESPONDER_SPI,
            suite.cipher.key_material_len(),
            suite.integ_key_len(),
        )
        .unwrap();

        self.suite = Some(suite);
        self.keys = Some(keys);
        self.endpoint.send(response);
    }
}

/// Tunnel-mode defaults: a bare proposal yields the full IPv4 + IPv6 space
#[test]
fn test_default_tunnel_child_session() {
    use carrick_proto::ike::payload::TrafficSelector;

    let config = ChildSessionConfig::tunnel_builder()
        .add_proposal(IkeSessionConfig::default_esp_proposal(1))
        .build()
        .unwrap();

    assert!(!config.is_transport);
    assert_eq!(
        config.local_ts,
        vec![TrafficSelector::ipv4_any(), TrafficSelector::ipv6_any()]
    );
    assert_eq!(config.remote_ts, config.local_ts);
}
