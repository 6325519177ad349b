//! IKE session driver
//!
//! Owns one initiator-side IKE SA end to end: it drives the exchanges from
//! `exchange.rs` over an injected packet transport, enforcing the exchange
//! discipline (one outstanding request per direction, strict message ID
//! ordering, response caching for retransmitted peer requests),
//! retransmission backoff, fragment reassembly with a discard deadline,
//! and the EAP conversation inside IKE_AUTH.
//!
//! All session state is mutated from the single task that owns the
//! session; inbound packets are pulled from the transport on the same
//! task, so no locks guard session-local state.

use super::child::ChildSa;
use super::config::{AuthConfig, ChildSessionConfig, IkeSessionConfig};
use super::constants::ExchangeType;
use super::exchange::{
    CreateChildSaExchange, IkeAuthExchange, IkeSaContext, IkeSaInitExchange, InitOutcome,
    LocalAuth,
};
use super::informational::{InformationalExchange, PeerInformational};
use super::logging;
use super::message::{decode_payload_list, IkeHeader};
use super::metrics::IkeMetrics;
use super::payload::{IkePayload, NotifyPayload, NotifyType};
use super::proposal::Proposal;
use super::retransmit::RetransmitTimer;
use super::sk::{self, FragmentReassembler};
use super::state::IkeState;
use crate::eap::{EapResult, EapSession, EapSessionDeps, TlsSessionFactory};
use crate::ike::{IkeError, Result};
use carrick_platform::{PacketTransport, SaInstaller, SimAuthenticator};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// External services a session consumes
#[derive(Clone)]
pub struct SessionServices {
    /// Datagram transport toward the peer
    pub transport: Arc<dyn PacketTransport>,
    /// Kernel SA programming
    pub sa_installer: Arc<dyn SaInstaller>,
    /// SIM access, required for SIM/AKA/AKA' EAP methods
    pub sim: Option<Arc<dyn SimAuthenticator>>,
    /// TLS factory, required for EAP-TTLS
    pub tls_factory: Option<Arc<dyn TlsSessionFactory>>,
}

/// A decrypted (or plaintext) response from the peer
enum InboundResponse {
    /// Plaintext datagram (IKE_SA_INIT only)
    Plain(Vec<u8>),
    /// Opened SK/SKF content
    Protected {
        first_payload: u8,
        plaintext: Vec<u8>,
    },
}

/// One initiator-side IKE session
pub struct IkeSession {
    config: IkeSessionConfig,
    services: SessionServices,
    metrics: IkeMetrics,
    ctx: IkeSaContext,
    /// Child SAs indexed by our inbound SPI
    child_sas: HashMap<u32, ChildSa>,
    /// Last response we sent to a peer-initiated request
    peer_response_cache: Option<(u32, Vec<Vec<u8>>)>,
    /// Reassembly buffer for a fragmented response
    reassembler: Option<FragmentReassembler>,
    /// EAP conversation, while IKE_AUTH is in its EAP leg
    eap: Option<EapSession>,
}

impl IkeSession {
    /// Create a session; nothing is sent until `connect`
    pub fn new(config: IkeSessionConfig, services: SessionServices) -> Self {
        let mut initiator_spi = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut initiator_spi);

        IkeSession {
            config,
            services,
            metrics: IkeMetrics::new(),
            ctx: IkeSaContext::new_initiator(initiator_spi),
            child_sas: HashMap::new(),
            peer_response_cache: None,
            reassembler: None,
            eap: None,
        }
    }

    /// Current session state
    pub fn state(&self) -> IkeState {
        self.ctx.state
    }

    /// Session metrics handle
    pub fn metrics(&self) -> &IkeMetrics {
        &self.metrics
    }

    /// Inbound SPIs of the live Child SAs
    pub fn child_spis(&self) -> Vec<u32> {
        self.child_sas
            .values()
            .filter(|c| c.can_use())
            .map(|c| c.inbound_spi)
            .collect()
    }

    /// Establish the IKE SA and the first Child SA
    ///
    /// Runs IKE_SA_INIT (honoring one cookie and one INVALID_KE retry) and
    /// IKE_AUTH (with the EAP conversation when configured), then installs
    /// the negotiated Child SA. The whole handshake is bounded by the
    /// configured soft deadline.
    pub async fn connect(&mut self) -> Result<()> {
        let peer = self.config.peer_addr.to_string();
        logging::log_handshake_start(&peer);
        self.metrics.record_handshake_started();
        let started = Instant::now();

        let deadline = started + self.config.handshake_timeout;
        let result = match timeout_at(deadline, self.handshake()).await {
            Ok(result) => result,
            Err(_) => Err(IkeError::Timeout("Handshake deadline exceeded".into())),
        };

        match result {
            Ok(()) => {
                self.metrics.record_handshake_completed();
                logging::log_handshake_complete(&peer, started.elapsed().as_millis() as u64);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_handshake_failed();
                logging::log_handshake_failed(&peer, &e.to_string());
                self.fail_session(&e).await;
                Err(e)
            }
        }
    }

    async fn handshake(&mut self) -> Result<()> {
        // ===== IKE_SA_INIT, with at most one retry per retry reason =====
        loop {
            let request = IkeSaInitExchange::create_request(&mut self.ctx, &self.config.ike_proposals)?;
            let datagram = request.to_bytes();

            let response = match self.exchange_once(&[datagram], 0, false).await? {
                InboundResponse::Plain(raw) => raw,
                InboundResponse::Protected { .. } => {
                    return Err(IkeError::InvalidSyntax(
                        "Encrypted payload before key derivation".into(),
                    ))
                }
            };

            match IkeSaInitExchange::process_response(
                &mut self.ctx,
                &response,
                &self.config.ike_proposals,
            )? {
                InitOutcome::Done => break,
                InitOutcome::RetryWithCookie => {
                    self.metrics.record_cookie_retry();
                    warn!("Responder demanded a cookie, retrying IKE_SA_INIT");
                    continue;
                }
                InitOutcome::RetryWithGroup(group) => {
                    warn!(group = group, "Responder demanded a different DH group");
                    continue;
                }
            }
        }

        // ===== IKE_AUTH =====
        let local_spi = random_child_spi();
        let child_proposals = proposals_with_spi(&self.config.child.proposals, local_spi);
        let ts_i = super::payload::TrafficSelectorsPayload::new(self.config.child.local_ts.clone());
        let ts_r =
            super::payload::TrafficSelectorsPayload::new(self.config.child.remote_ts.clone());

        let local_auth = match &self.config.auth {
            AuthConfig::Psk(psk) => LocalAuth::Psk(psk.clone()),
            AuthConfig::Eap(_) => LocalAuth::Eap,
        };

        let request_payloads = IkeAuthExchange::create_request_payloads(
            &self.ctx,
            &self.config.local_id,
            self.config.remote_id.as_ref(),
            &local_auth,
            child_proposals.clone(),
            ts_i,
            ts_r,
            self.config.child.is_transport,
            None,
        )?;

        self.ctx.state.checked_transition(IkeState::AuthSent)?;
        let mut inner = self
            .protected_exchange(ExchangeType::IkeAuth, &request_payloads)
            .await?;

        // ===== EAP leg, when configured =====
        let auth_config = self.config.auth.clone();
        let auth_secret: Vec<u8> = match auth_config {
            AuthConfig::Psk(psk) => psk,
            AuthConfig::Eap(eap_config) => {
                let sim = self.services.sim.clone().ok_or_else(|| {
                    IkeError::InvalidParameter(
                        "EAP authentication requires a SIM authenticator".into(),
                    )
                })?;
                let deps = EapSessionDeps {
                    sim,
                    tls_factory: self.services.tls_factory.clone(),
                };
                self.eap = Some(EapSession::new(eap_config, deps));
                self.ctx.state.checked_transition(IkeState::EapInProgress)?;

                let msk = loop {
                    let eap_request = IkeAuthExchange::eap_request(&mut self.ctx, &inner)
                        .ok_or_else(|| {
                            IkeError::AuthenticationFailed(
                                "Responder did not start the EAP conversation".into(),
                            )
                        })?;

                    let eap_session = self.eap.as_mut().expect("installed above");
                    match eap_session.process(&eap_request).await {
                        EapResult::Response(response) => {
                            let payloads = IkeAuthExchange::create_eap_payloads(response);
                            inner = self
                                .protected_exchange(ExchangeType::IkeAuth, &payloads)
                                .await?;
                        }
                        EapResult::Success { msk, .. } => {
                            self.metrics.record_eap_success();
                            break msk;
                        }
                        EapResult::Failure => {
                            self.metrics.record_eap_failure();
                            return Err(IkeError::AuthenticationFailed(
                                "EAP conversation failed".into(),
                            ));
                        }
                        EapResult::Error(e) => {
                            return Err(IkeError::AuthenticationFailed(format!(
                                "EAP error: {}",
                                e
                            )))
                        }
                    }
                };

                // Final AUTH round keyed by the MSK
                self.ctx.state.checked_transition(IkeState::FinalAuthSent)?;
                let payloads = IkeAuthExchange::create_final_auth_payloads(
                    &self.ctx,
                    &self.config.local_id,
                    &msk,
                )?;
                inner = self
                    .protected_exchange(ExchangeType::IkeAuth, &payloads)
                    .await?;
                msk
            }
        };

        let complete = IkeAuthExchange::process_final_response_payloads(
            &mut self.ctx,
            &inner,
            &auth_secret,
            &child_proposals,
        )?;

        if let Some(expected) = &self.config.remote_id {
            if *expected != complete.id_r {
                return Err(IkeError::AuthenticationFailed(
                    "Responder identity does not match configuration".into(),
                ));
            }
        }

        // ===== First Child SA =====
        let suite = *self.ctx.suite()?;
        let nonce_i = self
            .ctx
            .nonce_i
            .clone()
            .ok_or_else(|| IkeError::Internal("Initiator nonce missing".into()))?;
        let nonce_r = self
            .ctx
            .nonce_r
            .clone()
            .ok_or_else(|| IkeError::Internal("Responder nonce missing".into()))?;
        let sk_d = self.ctx.keys()?.sk_d.clone();

        let (child, install) = ChildSa::negotiate(
            suite.prf,
            &sk_d,
            &nonce_i,
            &nonce_r,
            complete.child_proposal,
            local_spi,
            complete.ts_i,
            complete.ts_r,
            complete.transport_mode,
        )?;

        self.services.sa_installer.install_child_sa(install).await?;
        self.metrics.record_child_sa_installed();
        logging::log_child_sa_installed(child.inbound_spi, child.outbound_spi, child.is_transport);
        self.child_sas.insert(child.inbound_spi, child);

        self.ctx.state.checked_transition(IkeState::Established)?;
        logging::log_state_transition(
            &self.ctx.initiator_spi,
            &self.ctx.responder_spi,
            "FinalAuth",
            "Established",
        );
        Ok(())
    }

    /// Create an additional Child SA on the established IKE SA
    pub async fn create_child_sa(&mut self, child_config: &ChildSessionConfig) -> Result<u32> {
        self.start_exchange(IkeState::CreateChild)?;
        let result = self.run_create_child(child_config, None).await;
        self.finish_exchange();
        result
    }

    /// Rekey an existing Child SA, replacing it with a fresh one
    pub async fn rekey_child_sa(&mut self, inbound_spi: u32) -> Result<u32> {
        let (rekeyed, child_config) = {
            let child = self.child_sas.get_mut(&inbound_spi).ok_or_else(|| {
                IkeError::InvalidParameter(format!("No Child SA with SPI 0x{:08x}", inbound_spi))
            })?;
            child.initiate_rekey()?;
            (
                child.inbound_spi,
                ChildSessionConfig {
                    proposals: vec![child.proposal.clone()],
                    local_ts: child.ts_i.selectors.clone(),
                    remote_ts: child.ts_r.selectors.clone(),
                    is_transport: child.is_transport,
                },
            )
        };

        self.start_exchange(IkeState::Rekeying)?;
        let result = self.run_create_child(&child_config, Some(rekeyed)).await;
        self.finish_exchange();

        match result {
            Ok(new_spi) => {
                // The replaced SA goes away once its successor is live
                self.remove_child(rekeyed).await?;
                Ok(new_spi)
            }
            Err(e) => {
                if let Some(child) = self.child_sas.get_mut(&inbound_spi) {
                    // Rekey failed; the old SA stays in service
                    child.state = super::child::ChildSaState::Active;
                }
                Err(e)
            }
        }
    }

    async fn run_create_child(
        &mut self,
        child_config: &ChildSessionConfig,
        rekeyed_spi: Option<u32>,
    ) -> Result<u32> {
        let local_spi = random_child_spi();
        let proposals = proposals_with_spi(&child_config.proposals, local_spi);

        let mut nonce = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);

        let payloads = CreateChildSaExchange::create_child_payloads(
            proposals.clone(),
            nonce.clone(),
            super::payload::TrafficSelectorsPayload::new(child_config.local_ts.clone()),
            super::payload::TrafficSelectorsPayload::new(child_config.remote_ts.clone()),
            child_config.is_transport,
            rekeyed_spi,
        )?;

        let inner = self
            .protected_exchange(ExchangeType::CreateChildSa, &payloads)
            .await?;
        let negotiated = CreateChildSaExchange::process_child_response(&inner, &proposals)?;

        let suite = *self.ctx.suite()?;
        let sk_d = self.ctx.keys()?.sk_d.clone();

        let (child, install) = ChildSa::negotiate(
            suite.prf,
            &sk_d,
            &nonce,
            &negotiated.nonce_r,
            negotiated.proposal,
            local_spi,
            negotiated.ts_i,
            negotiated.ts_r,
            negotiated.transport_mode,
        )?;

        self.services.sa_installer.install_child_sa(install).await?;
        self.metrics.record_child_sa_installed();
        logging::log_child_sa_installed(child.inbound_spi, child.outbound_spi, child.is_transport);
        self.child_sas.insert(child.inbound_spi, child);
        Ok(local_spi)
    }

    /// Delete a Child SA pair via an INFORMATIONAL exchange
    pub async fn delete_child_sa(&mut self, inbound_spi: u32) -> Result<()> {
        if !self.child_sas.contains_key(&inbound_spi) {
            return Err(IkeError::InvalidParameter(format!(
                "No Child SA with SPI 0x{:08x}",
                inbound_spi
            )));
        }

        self.start_exchange(IkeState::Informational)?;
        let payloads = InformationalExchange::delete_child_payloads(vec![inbound_spi])?;
        let result = self
            .protected_exchange(ExchangeType::Informational, &payloads)
            .await;
        self.finish_exchange();
        result?;

        self.remove_child(inbound_spi).await
    }

    /// Empty INFORMATIONAL request probing peer liveness
    pub async fn check_liveness(&mut self) -> Result<()> {
        self.start_exchange(IkeState::Informational)?;
        let result = self
            .protected_exchange(
                ExchangeType::Informational,
                &InformationalExchange::liveness_payloads(),
            )
            .await;
        self.finish_exchange();
        result.map(|_| ())
    }

    /// Tear the session down: best-effort DELETE, then Closed
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.ctx.state.is_established() {
            self.ctx.state.checked_transition(IkeState::Deleting)?;
            let payloads = InformationalExchange::delete_ike_payloads();
            // Best effort: the peer may already be gone
            if let Err(e) = self
                .protected_exchange(ExchangeType::Informational, &payloads)
                .await
            {
                debug!(error = %e, "DELETE exchange failed during shutdown");
            }
        }

        let spis: Vec<u32> = self.child_sas.keys().copied().collect();
        for spi in spis {
            let _ = self.remove_child(spi).await;
        }

        self.ctx.state.checked_transition(IkeState::Closed)?;
        Ok(())
    }

    /// Wait for and handle one peer-initiated request
    ///
    /// Call while the session is idle to service liveness checks and
    /// delete notifications from the peer.
    pub async fn handle_inbound(&mut self) -> Result<()> {
        let (packet, _) = self.services.transport.recv().await?;
        self.process_peer_packet(&packet).await
    }

    fn start_exchange(&mut self, state: IkeState) -> Result<()> {
        if self.ctx.state != IkeState::Established {
            return Err(IkeError::InvalidState(format!(
                "Exchange requires an established IKE SA, state is {:?}",
                self.ctx.state
            )));
        }
        self.ctx.state.checked_transition(state)
    }

    fn finish_exchange(&mut self) {
        if self.ctx.state.is_established() && self.ctx.state != IkeState::Established {
            let _ = self.ctx.state.checked_transition(IkeState::Established);
        }
    }

    /// Send protected inner payloads as one exchange and return the
    /// decrypted response payloads
    async fn protected_exchange(
        &mut self,
        exchange_type: ExchangeType,
        inner: &[IkePayload],
    ) -> Result<Vec<IkePayload>> {
        let message_id = self.ctx.next_request_id();
        let header = self.ctx.request_header(exchange_type, message_id);

        let suite = *self.ctx.suite()?;
        let datagrams = {
            let keys = self.ctx.sk_keys_out()?;
            sk::seal_fragmented(&suite, &keys, &header, inner, self.config.max_message_len)?
        };
        if datagrams.len() > 1 {
            self.metrics.record_message_fragmented();
        }

        match self.exchange_once(&datagrams, message_id, true).await? {
            InboundResponse::Protected {
                first_payload,
                plaintext,
            } => decode_payload_list(first_payload, &plaintext),
            InboundResponse::Plain(_) => Err(IkeError::InvalidSyntax(
                "Expected an encrypted response".into(),
            )),
        }
    }

    /// Transmit a request and await its response, retransmitting on the
    /// backoff schedule and servicing unrelated packets in the meantime
    async fn exchange_once(
        &mut self,
        datagrams: &[Vec<u8>],
        message_id: u32,
        protected: bool,
    ) -> Result<InboundResponse> {
        let mut timer = RetransmitTimer::new();
        self.reassembler = None;

        loop {
            let delay = match timer.next_delay() {
                Some(delay) => delay,
                None => {
                    self.metrics.record_peer_dead();
                    self.ctx.state.checked_transition(IkeState::Closed)?;
                    return Err(IkeError::PeerDead);
                }
            };
            if timer.attempts() > 1 {
                self.metrics.record_retransmission();
                logging::log_retransmit(message_id, timer.attempts(), delay.as_millis() as u64);
            }

            for datagram in datagrams {
                self.services
                    .transport
                    .send(datagram, self.config.peer_addr)
                    .await?;
            }

            let deadline = Instant::now() + delay;
            loop {
                self.expire_reassembly();

                let packet = match timeout_at(deadline, self.services.transport.recv()).await {
                    Ok(Ok((packet, _))) => packet,
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => break, // retransmit
                };

                match self.classify_packet(&packet, message_id, protected).await {
                    Ok(Some(response)) => return Ok(response),
                    Ok(None) => continue,
                    Err(e) => return Err(e),
                }
            }
        }
    }

    /// Handle one inbound datagram while a response is outstanding
    ///
    /// Returns `Some` when it completes the outstanding exchange, `None`
    /// when the packet was consumed some other way (peer request, stale
    /// retransmission, discarded fragment or garbage).
    async fn classify_packet(
        &mut self,
        packet: &[u8],
        message_id: u32,
        protected: bool,
    ) -> Result<Option<InboundResponse>> {
        let header = match IkeHeader::from_bytes(packet) {
            Ok(header) => header,
            Err(_) => {
                self.discard("unparseable header");
                return Ok(None);
            }
        };

        if header.initiator_spi != self.ctx.initiator_spi {
            self.discard("foreign initiator SPI");
            return Ok(None);
        }

        if !header.flags.is_response() {
            // Peer-initiated request arriving mid-exchange; service it so
            // the peer's window keeps moving
            self.process_peer_packet(packet).await?;
            return Ok(None);
        }

        if header.message_id != message_id {
            self.discard("response with unexpected message ID");
            return Ok(None);
        }

        if !protected {
            return Ok(Some(InboundResponse::Plain(packet.to_vec())));
        }

        let suite = *self.ctx.suite()?;
        let envelope = {
            let keys = self.ctx.sk_keys_in()?;
            match sk::open(&suite, &keys, packet) {
                Ok(envelope) => envelope,
                Err(_) => {
                    // Integrity or decryption failure: never reveal the
                    // outcome to the peer
                    self.discard("authentication failure");
                    return Ok(None);
                }
            }
        };

        if envelope.total_fragments == 1 {
            return Ok(Some(InboundResponse::Protected {
                first_payload: envelope.first_payload,
                plaintext: envelope.plaintext,
            }));
        }

        // Fragmented response: buffer until complete
        let needs_new = !matches!(
            &self.reassembler,
            Some(r) if r.message_id() == header.message_id
        );
        if needs_new {
            self.reassembler = Some(FragmentReassembler::new(
                header.message_id,
                envelope.total_fragments,
            ));
        }
        let reassembler = self.reassembler.as_mut().expect("installed above");

        match reassembler.insert(envelope) {
            Ok(Some((first_payload, plaintext))) => {
                self.reassembler = None;
                self.metrics.record_message_reassembled();
                Ok(Some(InboundResponse::Protected {
                    first_payload,
                    plaintext,
                }))
            }
            Ok(None) => Ok(None),
            Err(_) => {
                self.discard("inconsistent fragment");
                Ok(None)
            }
        }
    }

    fn expire_reassembly(&mut self) {
        if let Some(reassembler) = &self.reassembler {
            if reassembler.is_expired(self.config.fragment_timeout) {
                warn!(
                    message_id = reassembler.message_id(),
                    "Dropping incomplete fragment buffer"
                );
                self.metrics.record_reassembly_timeout();
                self.reassembler = None;
            }
        }
    }

    fn discard(&self, reason: &str) {
        self.metrics.record_packet_discarded();
        logging::log_discarded_packet(reason);
    }

    /// Process a peer-initiated request datagram
    async fn process_peer_packet(&mut self, packet: &[u8]) -> Result<()> {
        let header = match IkeHeader::from_bytes(packet) {
            Ok(header) => header,
            Err(_) => {
                self.discard("unparseable header");
                return Ok(());
            }
        };
        if header.flags.is_response() || header.initiator_spi != self.ctx.initiator_spi {
            self.discard("not a request for this session");
            return Ok(());
        }

        // Retransmitted peer request: resend the cached response verbatim
        if let Some((cached_id, cached)) = &self.peer_response_cache {
            if header.message_id == *cached_id {
                logging::log_cached_response(header.message_id);
                for datagram in cached.clone() {
                    self.services
                        .transport
                        .send(&datagram, self.config.peer_addr)
                        .await?;
                }
                return Ok(());
            }
        }

        if header.message_id != self.ctx.peer_request_id {
            // Outside the window of one: not a retransmission, not the
            // next request
            self.discard("peer request outside window");
            return Ok(());
        }

        if !self.ctx.state.is_established() {
            self.discard("peer request before establishment");
            return Ok(());
        }

        let suite = *self.ctx.suite()?;
        let envelope = {
            let keys = self.ctx.sk_keys_in()?;
            match sk::open(&suite, &keys, packet) {
                Ok(envelope) => envelope,
                Err(_) => {
                    self.discard("authentication failure");
                    return Ok(());
                }
            }
        };
        if envelope.total_fragments != 1 {
            // Peer requests are small; fragmented ones are not expected
            self.discard("fragmented peer request");
            return Ok(());
        }
        let inner = match decode_payload_list(envelope.first_payload, &envelope.plaintext) {
            Ok(inner) => inner,
            Err(_) => {
                self.discard("malformed peer request");
                return Ok(());
            }
        };

        let (response_payloads, action) = match header.exchange_type {
            ExchangeType::Informational => {
                match InformationalExchange::classify_request(&inner) {
                    PeerInformational::Liveness => (Vec::new(), PeerAction::None),
                    PeerInformational::DeleteIke => (Vec::new(), PeerAction::CloseSession),
                    PeerInformational::DeleteChild(peer_spis) => {
                        let local: Vec<u32> = self
                            .child_sas
                            .values()
                            .filter(|c| peer_spis.contains(&c.outbound_spi))
                            .map(|c| c.inbound_spi)
                            .collect();
                        (
                            InformationalExchange::delete_child_response_payloads(local.clone()),
                            PeerAction::RemoveChildren(local),
                        )
                    }
                    PeerInformational::Error(notify_type) => {
                        warn!(notify = ?notify_type, "Peer reported a fatal error");
                        (Vec::new(), PeerAction::CloseSession)
                    }
                }
            }
            ExchangeType::CreateChildSa => {
                // Initiator-only engine: refuse peer-created SAs; a rekey
                // collision surfaces as TEMPORARY_FAILURE
                let notify = if self.ctx.state == IkeState::Rekeying {
                    NotifyType::TemporaryFailure
                } else {
                    NotifyType::NoAdditionalSas
                };
                (
                    vec![IkePayload::N(NotifyPayload::error(notify))],
                    PeerAction::None,
                )
            }
            other => {
                self.discard(&format!("unsupported peer exchange {:?}", other));
                return Ok(());
            }
        };

        // Seal and send the response, caching it for retransmissions
        let response_header = self
            .ctx
            .response_header(header.exchange_type, header.message_id);
        let datagrams = {
            let keys = self.ctx.sk_keys_out()?;
            sk::seal_fragmented(
                &suite,
                &keys,
                &response_header,
                &response_payloads,
                self.config.max_message_len,
            )?
        };
        for datagram in &datagrams {
            self.services
                .transport
                .send(datagram, self.config.peer_addr)
                .await?;
        }
        self.peer_response_cache = Some((header.message_id, datagrams));
        self.ctx.peer_request_id += 1;

        match action {
            PeerAction::None => {}
            PeerAction::RemoveChildren(spis) => {
                for spi in spis {
                    let _ = self.remove_child(spi).await;
                }
            }
            PeerAction::CloseSession => {
                info!("Peer deleted the IKE SA");
                let spis: Vec<u32> = self.child_sas.keys().copied().collect();
                for spi in spis {
                    let _ = self.remove_child(spi).await;
                }
                self.ctx.state.checked_transition(IkeState::Closed)?;
            }
        }
        Ok(())
    }

    async fn remove_child(&mut self, inbound_spi: u32) -> Result<()> {
        if let Some(mut child) = self.child_sas.remove(&inbound_spi) {
            child.mark_deleted();
            self.services
                .sa_installer
                .delete_child_sa(inbound_spi)
                .await?;
            self.metrics.record_child_sa_deleted();
            logging::log_child_sa_deleted(inbound_spi);
        }
        Ok(())
    }

    /// Emit the wire-facing notify for a fatal error (when one maps) and
    /// close the session. Internal failures close silently.
    async fn fail_session(&mut self, error: &IkeError) {
        if let Some(notify_type) = error.notify_type() {
            // Only a keyed SA can emit a protected notify
            if self.ctx.keys.is_some() && self.ctx.suite.is_some() {
                let message_id = self.ctx.next_request_id();
                let header = self
                    .ctx
                    .request_header(ExchangeType::Informational, message_id);
                let payloads = InformationalExchange::error_notify_payloads(notify_type, Vec::new());
                let suite = *self.ctx.suite.as_ref().expect("checked above");
                if let Ok(keys) = self.ctx.sk_keys_out() {
                    if let Ok(datagrams) = sk::seal_fragmented(
                        &suite,
                        &keys,
                        &header,
                        &payloads,
                        self.config.max_message_len,
                    ) {
                        for datagram in datagrams {
                            let _ = self
                                .services
                                .transport
                                .send(&datagram, self.config.peer_addr)
                                .await;
                        }
                    }
                }
            }
        }

        let spis: Vec<u32> = self.child_sas.keys().copied().collect();
        for spi in spis {
            let _ = self.remove_child(spi).await;
        }
        let _ = self.ctx.state.checked_transition(IkeState::Closed);
    }
}

enum PeerAction {
    None,
    RemoveChildren(Vec<u32>),
    CloseSession,
}

fn random_child_spi() -> u32 {
    loop {
        let spi = rand::thread_rng().next_u32();
        if spi != 0 {
            return spi;
        }
    }
}

fn proposals_with_spi(proposals: &[Proposal], spi: u32) -> Vec<Proposal> {
    proposals
        .iter()
        .cloned()
        .map(|p| p.with_spi(spi.to_be_bytes().to_vec()))
        .collect()
}
