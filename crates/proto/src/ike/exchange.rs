//! IKEv2 Exchange Handlers
//!
//! Pure message construction and processing for the initiator side of the
//! IKE_SA_INIT, IKE_AUTH and CREATE_CHILD_SA exchanges. No I/O happens
//! here; the session driver seals, sends, and retransmits the messages
//! these handlers produce.
//!
//! # IKE_SA_INIT
//!
//! ```text
//! Initiator                         Responder
//! -----------                       -----------
//! HDR, [N(COOKIE),] SAi1, KEi, Ni  -->
//!                     <--  HDR, SAr1, KEr, Nr
//! ```
//!
//! # IKE_AUTH (EAP variant)
//!
//! ```text
//! HDR, SK {IDi, [IDr,] SAi2, TSi, TSr}  -->
//!                     <--  HDR, SK {IDr, EAP(Request)}
//! HDR, SK {EAP(Response)}  -->
//!                     <--  HDR, SK {EAP} ... until Success/Failure
//! HDR, SK {AUTH}  -->
//!                     <--  HDR, SK {AUTH, SAr2, TSi, TSr}
//! ```

use super::auth;
use super::constants::{ExchangeType, IkeFlags, PayloadType};
use super::crypto::{CryptoSuite, DhExchange, DhGroup, KeyMaterial};
use super::message::{IkeHeader, IkeMessage};
use super::payload::{
    AuthPayload, ConfigPayload, EapPayload, IdPayload, IkePayload, KePayload, NoncePayload,
    NotifyPayload, NotifyProtocolId, NotifyType, SaPayload, TrafficSelectorsPayload,
};
use super::proposal::{select_proposal, DhTransformId, Proposal};
use super::sk::SkKeys;
use super::state::IkeState;
use crate::ike::{IkeError, Result};
use rand::RngCore;

/// How the local side proves its identity in IKE_AUTH
#[derive(Debug, Clone)]
pub enum LocalAuth {
    /// Pre-shared key
    Psk(Vec<u8>),
    /// EAP; the AUTH payload is keyed by the method's MSK
    Eap,
}

/// IKE SA context
///
/// Maintains the negotiation state and key material for one initiator-side
/// IKE SA across exchanges.
#[derive(Debug)]
pub struct IkeSaContext {
    /// Current state
    pub state: IkeState,

    /// Initiator SPI (ours)
    pub initiator_spi: [u8; 8],

    /// Responder SPI (zero until the IKE_SA_INIT response)
    pub responder_spi: [u8; 8],

    /// Message ID for our next request
    next_request_id: u32,

    /// Message ID we expect for the peer's next request
    pub peer_request_id: u32,

    /// Proposal selected by the responder
    pub selected_proposal: Option<Proposal>,

    /// Crypto suite built from the selected proposal
    pub suite: Option<CryptoSuite>,

    /// Our nonce
    pub nonce_i: Option<Vec<u8>>,

    /// Responder's nonce
    pub nonce_r: Option<Vec<u8>>,

    /// Our ephemeral DH exchange
    pub dh: Option<DhExchange>,

    /// Group override requested via INVALID_KE_PAYLOAD
    dh_group_override: Option<DhGroup>,

    /// Derived IKE SA keys
    pub keys: Option<KeyMaterial>,

    /// Serialized bytes of the IKE_SA_INIT request we sent last
    pub init_request_bytes: Option<Vec<u8>>,

    /// Serialized bytes of the IKE_SA_INIT response
    pub init_response_bytes: Option<Vec<u8>>,

    /// Cookie demanded by the responder, echoed on retry
    pub cookie: Option<Vec<u8>>,

    /// Responder identity observed during IKE_AUTH
    pub peer_id: Option<IdPayload>,

    cookie_retried: bool,
    ke_retried: bool,
}

impl IkeSaContext {
    /// Create a new initiator context
    pub fn new_initiator(initiator_spi: [u8; 8]) -> Self {
        IkeSaContext {
            state: IkeState::Initial,
            initiator_spi,
            responder_spi: [0u8; 8],
            next_request_id: 0,
            peer_request_id: 0,
            selected_proposal: None,
            suite: None,
            nonce_i: None,
            nonce_r: None,
            dh: None,
            dh_group_override: None,
            keys: None,
            init_request_bytes: None,
            init_response_bytes: None,
            cookie: None,
            peer_id: None,
            cookie_retried: false,
            ke_retried: false,
        }
    }

    /// Allocate the message ID for our next request
    pub fn next_request_id(&mut self) -> u32 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Message ID of the request currently outstanding
    pub fn current_request_id(&self) -> u32 {
        self.next_request_id.saturating_sub(1)
    }

    /// Validate the message ID of an inbound response
    pub fn validate_response_id(&self, received: u32) -> Result<()> {
        let expected = self.current_request_id();
        if received != expected {
            return Err(IkeError::InvalidMessageId {
                expected,
                received,
            });
        }
        Ok(())
    }

    /// Negotiated crypto suite
    pub fn suite(&self) -> Result<&CryptoSuite> {
        self.suite
            .as_ref()
            .ok_or_else(|| IkeError::Internal("Crypto suite not negotiated".into()))
    }

    /// Derived key material
    pub fn keys(&self) -> Result<&KeyMaterial> {
        self.keys
            .as_ref()
            .ok_or_else(|| IkeError::Internal("IKE SA keys not derived".into()))
    }

    /// Keys for sealing our outbound messages (initiator direction)
    pub fn sk_keys_out(&self) -> Result<SkKeys<'_>> {
        let keys = self.keys()?;
        Ok(SkKeys {
            encr: &keys.sk_ei,
            integ: &keys.sk_ai,
        })
    }

    /// Keys for opening the peer's messages (responder direction)
    pub fn sk_keys_in(&self) -> Result<SkKeys<'_>> {
        let keys = self.keys()?;
        Ok(SkKeys {
            encr: &keys.sk_er,
            integ: &keys.sk_ar,
        })
    }

    /// Header template for a protected request
    pub fn request_header(&self, exchange_type: ExchangeType, message_id: u32) -> IkeHeader {
        IkeHeader::new(
            self.initiator_spi,
            self.responder_spi,
            PayloadType::SK,
            exchange_type,
            IkeFlags::request(true),
            message_id,
            0,
        )
    }

    /// Header template for a protected response to a peer request
    pub fn response_header(&self, exchange_type: ExchangeType, message_id: u32) -> IkeHeader {
        IkeHeader::new(
            self.initiator_spi,
            self.responder_spi,
            PayloadType::SK,
            exchange_type,
            IkeFlags::response(true),
            message_id,
            0,
        )
    }
}

/// Outcome of processing an IKE_SA_INIT response
#[derive(Debug, PartialEq, Eq)]
pub enum InitOutcome {
    /// Negotiation complete, keys derived
    Done,
    /// Responder demands a cookie; resend with it
    RetryWithCookie,
    /// Responder demands a different DH group; resend with it
    RetryWithGroup(u16),
}

/// IKE_SA_INIT exchange handler
pub struct IkeSaInitExchange;

impl IkeSaInitExchange {
    /// Create the IKE_SA_INIT request (message ID 0)
    ///
    /// On a cookie retry the nonce and KE are reused unchanged, with the
    /// notify prefixed as the first payload. On an INVALID_KE retry a fresh
    /// key pair is generated for the demanded group.
    pub fn create_request(
        context: &mut IkeSaContext,
        proposals: &[Proposal],
    ) -> Result<IkeMessage> {
        if !matches!(context.state, IkeState::Initial | IkeState::InitSent) {
            return Err(IkeError::InvalidState(format!(
                "Cannot create IKE_SA_INIT request in state {:?}",
                context.state
            )));
        }
        if proposals.is_empty() {
            return Err(IkeError::InvalidParameter("No proposals configured".into()));
        }

        if context.dh.is_none() {
            let group = match context.dh_group_override {
                Some(group) => group,
                None => {
                    let id = proposals[0].dh_id().ok_or_else(|| {
                        IkeError::InvalidParameter("Proposal missing DH transform".into())
                    })?;
                    DhGroup::from_transform(id)
                }
            };
            context.dh = Some(DhExchange::new(group));
        }
        if context.nonce_i.is_none() {
            let mut nonce = vec![0u8; 32];
            rand::thread_rng().fill_bytes(&mut nonce);
            context.nonce_i = Some(nonce);
        }

        let dh = context.dh.as_ref().expect("generated above");
        let nonce = context.nonce_i.clone().expect("generated above");

        let mut payloads = Vec::new();
        if let Some(cookie) = &context.cookie {
            payloads.push(IkePayload::N(NotifyPayload::status(
                NotifyType::Cookie,
                cookie.clone(),
            )));
        }
        payloads.push(IkePayload::SA(SaPayload::new(proposals.to_vec())));
        payloads.push(IkePayload::KE(KePayload::new(
            dh.group().group_num(),
            dh.public_key().to_vec(),
        )));
        payloads.push(IkePayload::Nonce(NoncePayload::new(nonce)?));
        payloads.push(IkePayload::N(NotifyPayload::status(
            NotifyType::FragmentationSupported,
            Vec::new(),
        )));

        let header = IkeHeader::new(
            context.initiator_spi,
            [0u8; 8],
            PayloadType::SA,
            ExchangeType::IkeSaInit,
            IkeFlags::request(true),
            0,
            0,
        );

        let message = IkeMessage::new(header, payloads);
        context.init_request_bytes = Some(message.to_bytes());
        context.state.checked_transition(IkeState::InitSent)?;

        Ok(message)
    }

    /// Process the IKE_SA_INIT response datagram
    pub fn process_response(
        context: &mut IkeSaContext,
        raw: &[u8],
        configured: &[Proposal],
    ) -> Result<InitOutcome> {
        if context.state != IkeState::InitSent {
            return Err(IkeError::InvalidState(format!(
                "Cannot process IKE_SA_INIT response in state {:?}",
                context.state
            )));
        }

        let response = IkeMessage::from_bytes(raw)?;
        if response.header.exchange_type != ExchangeType::IkeSaInit {
            return Err(IkeError::UnsupportedExchangeType(
                response.header.exchange_type.to_u8(),
            ));
        }
        if !response.header.flags.is_response() {
            return Err(IkeError::InvalidSyntax(
                "IKE_SA_INIT reply is not flagged as a response".into(),
            ));
        }
        if response.header.message_id != 0 {
            return Err(IkeError::InvalidMessageId {
                expected: 0,
                received: response.header.message_id,
            });
        }

        for notify in response.notifications() {
            match notify.notify_type() {
                Some(NotifyType::Cookie) => {
                    if context.cookie_retried {
                        return Err(IkeError::InvalidSyntax(
                            "Responder demanded a second cookie".into(),
                        ));
                    }
                    context.cookie = Some(notify.data.clone());
                    context.cookie_retried = true;
                    return Ok(InitOutcome::RetryWithCookie);
                }
                Some(NotifyType::InvalidKePayload) => {
                    if context.ke_retried {
                        return Err(IkeError::InvalidSyntax(
                            "Responder demanded a second DH group change".into(),
                        ));
                    }
                    if notify.data.len() != 2 {
                        return Err(IkeError::InvalidSyntax(
                            "INVALID_KE_PAYLOAD without group number".into(),
                        ));
                    }
                    let group_num = u16::from_be_bytes([notify.data[0], notify.data[1]]);
                    let id = DhTransformId::from_u16(group_num)
                        .ok_or(IkeError::InvalidKePayload {
                            preferred_group: group_num,
                        })?;
                    context.dh_group_override = Some(DhGroup::from_transform(id));
                    context.dh = None;
                    context.ke_retried = true;
                    return Ok(InitOutcome::RetryWithGroup(group_num));
                }
                Some(NotifyType::NoProposalChosen) => return Err(IkeError::NoProposalChosen),
                Some(t) if t.is_error() => {
                    return Err(IkeError::InvalidSyntax(format!(
                        "IKE_SA_INIT failed with notify {:?}",
                        t
                    )))
                }
                _ => {}
            }
        }

        let mut sa_payload = None;
        let mut ke_payload = None;
        let mut nonce_payload = None;
        for payload in &response.payloads {
            match payload {
                IkePayload::SA(sa) => sa_payload = Some(sa),
                IkePayload::KE(ke) => ke_payload = Some(ke),
                IkePayload::Nonce(nonce) => nonce_payload = Some(nonce),
                _ => {}
            }
        }

        let sa = sa_payload
            .ok_or_else(|| IkeError::InvalidSyntax("IKE_SA_INIT response missing SA".into()))?;
        let ke = ke_payload
            .ok_or_else(|| IkeError::InvalidSyntax("IKE_SA_INIT response missing KE".into()))?;
        let nonce = nonce_payload
            .ok_or_else(|| IkeError::InvalidSyntax("IKE_SA_INIT response missing Nonce".into()))?;

        // The responder picks exactly one of our proposals
        if sa.proposals.len() != 1 {
            return Err(IkeError::InvalidSyntax(format!(
                "Expected a single selected proposal, got {}",
                sa.proposals.len()
            )));
        }
        let selected = select_proposal(&sa.proposals, configured)?.clone();
        let suite = CryptoSuite::from_proposal(&selected)?;

        let dh = context
            .dh
            .as_ref()
            .ok_or_else(|| IkeError::Internal("DH exchange missing".into()))?;
        if ke.dh_group != dh.group().group_num() {
            return Err(IkeError::InvalidKePayload {
                preferred_group: ke.dh_group,
            });
        }
        let shared_secret = dh.compute_shared_secret(&ke.key_data)?;

        context.responder_spi = response.header.responder_spi;
        context.nonce_r = Some(nonce.nonce.clone());
        context.selected_proposal = Some(selected);
        context.init_response_bytes = Some(raw.to_vec());

        let nonce_i = context
            .nonce_i
            .as_ref()
            .ok_or_else(|| IkeError::Internal("Initiator nonce missing".into()))?;
        let keys = KeyMaterial::derive(
            suite.prf,
            nonce_i,
            &nonce.nonce,
            &shared_secret,
            &context.initiator_spi,
            &context.responder_spi,
            suite.cipher.key_material_len(),
            suite.integ_key_len(),
        )?;

        context.suite = Some(suite);
        context.keys = Some(keys);

        Ok(InitOutcome::Done)
    }
}

/// Fields carried by a completed IKE_AUTH response
#[derive(Debug, Clone)]
pub struct AuthComplete {
    /// Responder identity
    pub id_r: IdPayload,
    /// Selected Child SA proposal
    pub child_proposal: Proposal,
    /// Negotiated initiator traffic selectors
    pub ts_i: TrafficSelectorsPayload,
    /// Negotiated responder traffic selectors
    pub ts_r: TrafficSelectorsPayload,
    /// Transport mode was confirmed
    pub transport_mode: bool,
    /// Configuration reply, if any
    pub config: Option<ConfigPayload>,
}

/// IKE_AUTH exchange handler
pub struct IkeAuthExchange;

impl IkeAuthExchange {
    /// Build the inner payloads of the first IKE_AUTH request
    ///
    /// With PSK authentication the AUTH payload is included; with EAP it is
    /// omitted so the responder starts the EAP conversation.
    #[allow(clippy::too_many_arguments)]
    pub fn create_request_payloads(
        context: &IkeSaContext,
        id_i: &IdPayload,
        id_r: Option<&IdPayload>,
        local_auth: &LocalAuth,
        child_proposals: Vec<Proposal>,
        ts_i: TrafficSelectorsPayload,
        ts_r: TrafficSelectorsPayload,
        transport_mode: bool,
        config_request: Option<ConfigPayload>,
    ) -> Result<Vec<IkePayload>> {
        let mut payloads = Vec::new();
        payloads.push(IkePayload::IDi(id_i.clone()));
        if let Some(id_r) = id_r {
            payloads.push(IkePayload::IDr(id_r.clone()));
        }

        if let LocalAuth::Psk(psk) = local_auth {
            payloads.push(IkePayload::AUTH(Self::compute_local_auth(
                context, id_i, psk,
            )?));
        }

        if let Some(cp) = config_request {
            payloads.push(IkePayload::CP(cp));
        }
        payloads.push(IkePayload::SA(SaPayload::new(child_proposals)));
        payloads.push(IkePayload::TSi(ts_i));
        payloads.push(IkePayload::TSr(ts_r));
        if transport_mode {
            payloads.push(IkePayload::N(NotifyPayload::status(
                NotifyType::UseTransportMode,
                Vec::new(),
            )));
        }

        Ok(payloads)
    }

    /// AUTH payload for the local side, keyed by `secret` (PSK or EAP MSK)
    pub fn compute_local_auth(
        context: &IkeSaContext,
        id_i: &IdPayload,
        secret: &[u8],
    ) -> Result<AuthPayload> {
        let suite = context.suite()?;
        let keys = context.keys()?;
        let init_request = context
            .init_request_bytes
            .as_ref()
            .ok_or_else(|| IkeError::Internal("IKE_SA_INIT request bytes missing".into()))?;
        let nonce_r = context
            .nonce_r
            .as_ref()
            .ok_or_else(|| IkeError::Internal("Responder nonce missing".into()))?;

        let octets = auth::initiator_signed_octets(
            suite.prf,
            init_request,
            nonce_r,
            &keys.sk_pi,
            &id_i.to_payload_data(),
        );
        Ok(auth::compute_shared_secret_auth(suite.prf, secret, &octets))
    }

    /// Extract an EAP request from IKE_AUTH response payloads, recording
    /// the responder identity when present
    pub fn eap_request(context: &mut IkeSaContext, inner: &[IkePayload]) -> Option<Vec<u8>> {
        for payload in inner {
            if let IkePayload::IDr(id) = payload {
                context.peer_id = Some(id.clone());
            }
        }
        inner.iter().find_map(|p| match p {
            IkePayload::EAP(EapPayload { data }) => Some(data.clone()),
            _ => None,
        })
    }

    /// Wrap an EAP message for the next IKE_AUTH request
    pub fn create_eap_payloads(eap_message: Vec<u8>) -> Vec<IkePayload> {
        vec![IkePayload::EAP(EapPayload { data: eap_message })]
    }

    /// Build the final AUTH payload after EAP success
    pub fn create_final_auth_payloads(
        context: &IkeSaContext,
        id_i: &IdPayload,
        msk: &[u8],
    ) -> Result<Vec<IkePayload>> {
        Ok(vec![IkePayload::AUTH(Self::compute_local_auth(
            context, id_i, msk,
        )?)])
    }

    /// Process the completing IKE_AUTH response payloads
    ///
    /// Verifies the responder AUTH against `secret` (PSK, or EAP MSK) and
    /// extracts the negotiated Child SA parameters.
    pub fn process_final_response_payloads(
        context: &mut IkeSaContext,
        inner: &[IkePayload],
        secret: &[u8],
        configured_child: &[Proposal],
    ) -> Result<AuthComplete> {
        for notify in inner.iter().filter_map(|p| match p {
            IkePayload::N(n) => Some(n),
            _ => None,
        }) {
            match notify.notify_type() {
                Some(NotifyType::AuthenticationFailed) => {
                    return Err(IkeError::AuthenticationFailed(
                        "Responder rejected authentication".into(),
                    ))
                }
                Some(NotifyType::NoProposalChosen) => return Err(IkeError::NoProposalChosen),
                Some(NotifyType::TsUnacceptable) => return Err(IkeError::TsUnacceptable),
                _ => {}
            }
        }

        let mut id_r = None;
        let mut auth_payload = None;
        let mut child_sa = None;
        let mut ts_i = None;
        let mut ts_r = None;
        let mut config = None;
        let mut transport_mode = false;

        for payload in inner {
            match payload {
                IkePayload::IDr(id) => id_r = Some(id.clone()),
                IkePayload::AUTH(a) => auth_payload = Some(a.clone()),
                IkePayload::SA(sa) => child_sa = Some(sa.clone()),
                IkePayload::TSi(ts) => ts_i = Some(ts.clone()),
                IkePayload::TSr(ts) => ts_r = Some(ts.clone()),
                IkePayload::CP(cp) => config = Some(cp.clone()),
                IkePayload::N(n) => {
                    if n.notify_type() == Some(NotifyType::UseTransportMode) {
                        transport_mode = true;
                    }
                }
                _ => {}
            }
        }

        let id_r = id_r
            .or_else(|| context.peer_id.clone())
            .ok_or_else(|| IkeError::InvalidSyntax("IKE_AUTH response missing IDr".into()))?;
        let auth_payload = auth_payload
            .ok_or_else(|| IkeError::InvalidSyntax("IKE_AUTH response missing AUTH".into()))?;
        let child_sa = child_sa
            .ok_or_else(|| IkeError::InvalidSyntax("IKE_AUTH response missing SA".into()))?;
        let ts_i = ts_i
            .ok_or_else(|| IkeError::InvalidSyntax("IKE_AUTH response missing TSi".into()))?;
        let ts_r = ts_r
            .ok_or_else(|| IkeError::InvalidSyntax("IKE_AUTH response missing TSr".into()))?;

        // Verify the responder's AUTH
        let suite = context.suite()?;
        let keys = context.keys()?;
        let init_response = context
            .init_response_bytes
            .as_ref()
            .ok_or_else(|| IkeError::Internal("IKE_SA_INIT response bytes missing".into()))?;
        let nonce_i = context
            .nonce_i
            .as_ref()
            .ok_or_else(|| IkeError::Internal("Initiator nonce missing".into()))?;

        let octets = auth::responder_signed_octets(
            suite.prf,
            init_response,
            nonce_i,
            &keys.sk_pr,
            &id_r.to_payload_data(),
        );
        auth::verify_shared_secret_auth(suite.prf, secret, &octets, &auth_payload)?;

        let child_proposal = select_proposal(&child_sa.proposals, configured_child)?.clone();
        context.peer_id = Some(id_r.clone());

        Ok(AuthComplete {
            id_r,
            child_proposal,
            ts_i,
            ts_r,
            transport_mode,
            config,
        })
    }
}

/// Negotiated parameters from a CREATE_CHILD_SA response
#[derive(Debug, Clone)]
pub struct ChildNegotiated {
    /// Selected proposal (carries the peer's SPI)
    pub proposal: Proposal,
    /// Responder's nonce
    pub nonce_r: Vec<u8>,
    /// Negotiated initiator traffic selectors
    pub ts_i: TrafficSelectorsPayload,
    /// Negotiated responder traffic selectors
    pub ts_r: TrafficSelectorsPayload,
    /// Transport mode confirmed
    pub transport_mode: bool,
}

/// CREATE_CHILD_SA exchange handler
pub struct CreateChildSaExchange;

impl CreateChildSaExchange {
    /// Build the inner payloads to create (or rekey) a Child SA
    ///
    /// `rekeyed_spi` names the outbound Child SA being replaced; `None`
    /// creates a new SA.
    pub fn create_child_payloads(
        proposals: Vec<Proposal>,
        nonce: Vec<u8>,
        ts_i: TrafficSelectorsPayload,
        ts_r: TrafficSelectorsPayload,
        transport_mode: bool,
        rekeyed_spi: Option<u32>,
    ) -> Result<Vec<IkePayload>> {
        let mut payloads = Vec::new();
        if let Some(spi) = rekeyed_spi {
            payloads.push(IkePayload::N(NotifyPayload {
                protocol_id: NotifyProtocolId::Esp,
                spi: spi.to_be_bytes().to_vec(),
                notify_type_raw: NotifyType::RekeySa.to_u16(),
                data: Vec::new(),
            }));
        }
        payloads.push(IkePayload::SA(SaPayload::new(proposals)));
        payloads.push(IkePayload::Nonce(NoncePayload::new(nonce)?));
        payloads.push(IkePayload::TSi(ts_i));
        payloads.push(IkePayload::TSr(ts_r));
        if transport_mode {
            payloads.push(IkePayload::N(NotifyPayload::status(
                NotifyType::UseTransportMode,
                Vec::new(),
            )));
        }
        Ok(payloads)
    }

    /// Process a CREATE_CHILD_SA response
    pub fn process_child_response(
        inner: &[IkePayload],
        configured: &[Proposal],
    ) -> Result<ChildNegotiated> {
        for notify in inner.iter().filter_map(|p| match p {
            IkePayload::N(n) => Some(n),
            _ => None,
        }) {
            match notify.notify_type() {
                Some(NotifyType::NoAdditionalSas) => return Err(IkeError::NoAdditionalSas),
                Some(NotifyType::NoProposalChosen) => return Err(IkeError::NoProposalChosen),
                Some(NotifyType::TsUnacceptable) => return Err(IkeError::TsUnacceptable),
                Some(NotifyType::TemporaryFailure) => {
                    return Err(IkeError::Timeout(
                        "Peer reported TEMPORARY_FAILURE".into(),
                    ))
                }
                Some(t) if t.is_error() => {
                    return Err(IkeError::InvalidSyntax(format!(
                        "CREATE_CHILD_SA failed with notify {:?}",
                        t
                    )))
                }
                _ => {}
            }
        }

        let mut sa = None;
        let mut nonce = None;
        let mut ts_i = None;
        let mut ts_r = None;
        let mut transport_mode = false;

        for payload in inner {
            match payload {
                IkePayload::SA(p) => sa = Some(p.clone()),
                IkePayload::Nonce(p) => nonce = Some(p.clone()),
                IkePayload::TSi(p) => ts_i = Some(p.clone()),
                IkePayload::TSr(p) => ts_r = Some(p.clone()),
                IkePayload::N(n) => {
                    if n.notify_type() == Some(NotifyType::UseTransportMode) {
                        transport_mode = true;
                    }
                }
                _ => {}
            }
        }

        let sa = sa
            .ok_or_else(|| IkeError::InvalidSyntax("CREATE_CHILD_SA response missing SA".into()))?;
        let nonce = nonce.ok_or_else(|| {
            IkeError::InvalidSyntax("CREATE_CHILD_SA response missing Nonce".into())
        })?;
        let ts_i = ts_i.ok_or_else(|| {
            IkeError::InvalidSyntax("CREATE_CHILD_SA response missing TSi".into())
        })?;
        let ts_r = ts_r.ok_or_else(|| {
            IkeError::InvalidSyntax("CREATE_CHILD_SA response missing TSr".into())
        })?;

        let proposal = select_proposal(&sa.proposals, configured)?.clone();

        Ok(ChildNegotiated {
            proposal,
            nonce_r: nonce.nonce,
            ts_i,
            ts_r,
            transport_mode,
        })
    }

    /// Simultaneous-rekey tie break (RFC 7296 Section 2.8.1)
    ///
    /// When both peers initiate a rekey at once, the exchange whose
    /// initiator produced the lowest nonce loses, and that initiator
    /// deletes the SA it created.
    pub fn loses_rekey_tiebreak(our_nonce: &[u8], peer_nonce: &[u8]) -> bool {
        our_nonce < peer_nonce
    }
}
