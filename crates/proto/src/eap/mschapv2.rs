//! EAP-MSCHAPv2 method state machine (RFC 2759, key derivation per RFC 3079)
//!
//! ```text
//! Created --(Challenge)--> ValidateAuth --(Success request)--> Final
//! ```
//!
//! The challenge round computes the NT-Response from the password's NT hash
//! and both challenges; the success round verifies the server's
//! authenticator response before the method completes. The 16-byte master
//! key is exposed for consumption by a containing tunnel.
//!
//! EAP framing (opcode, MS-CHAPv2-ID, MS-Length) wraps the RFC 2759
//! packets.

use super::config::EapMsChapV2Config;
use super::message::{EapMessage, EapMethodType};
use super::method::EapMethod;
use super::EapResult;
use crate::eap::{EapError, Result};

use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};
use des::Des;
use md4::{Digest as Md4Digest, Md4};
use rand::RngCore;
use sha1::Sha1;

/// Op codes used by the EAP encapsulation
const OP_CHALLENGE: u8 = 1;
const OP_RESPONSE: u8 = 2;
const OP_SUCCESS: u8 = 3;
const OP_FAILURE: u8 = 4;

/// Magic constants from RFC 2759 Section 8.7
const MAGIC1: &[u8] = b"Magic server to client signing constant";
const MAGIC2: &[u8] = b"Pad to make it do more than one iteration";

/// Master key magic from RFC 3079 Section 3.4
const MPPE_MAGIC: &[u8] = b"This is the MPPE Master Key";

/// NT hash of the UTF-16LE password (MD4)
fn nt_password_hash(password: &str) -> [u8; 16] {
    let mut hasher = Md4::new();
    for unit in password.encode_utf16() {
        hasher.update(unit.to_le_bytes());
    }
    hasher.finalize().into()
}

/// ChallengeHash from RFC 2759 Section 8.2
fn challenge_hash(peer_challenge: &[u8; 16], auth_challenge: &[u8; 16], username: &[u8]) -> [u8; 8] {
    let mut hasher = Sha1::new();
    hasher.update(peer_challenge);
    hasher.update(auth_challenge);
    hasher.update(username);
    let digest = hasher.finalize();
    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Expand a 7-byte key to 8 bytes with DES parity bits
fn des_key_with_parity(key7: &[u8]) -> [u8; 8] {
    let mut key = [0u8; 8];
    key[0] = key7[0];
    key[1] = (key7[0] << 7) | (key7[1] >> 1);
    key[2] = (key7[1] << 6) | (key7[2] >> 2);
    key[3] = (key7[2] << 5) | (key7[3] >> 3);
    key[4] = (key7[3] << 4) | (key7[4] >> 4);
    key[5] = (key7[4] << 3) | (key7[5] >> 5);
    key[6] = (key7[5] << 2) | (key7[6] >> 6);
    key[7] = key7[6] << 1;
    key
}

/// ChallengeResponse from RFC 2759 Section 8.5
fn challenge_response(challenge: &[u8; 8], password_hash: &[u8; 16]) -> Result<[u8; 24]> {
    let mut z_password_hash = [0u8; 21];
    z_password_hash[..16].copy_from_slice(password_hash);

    let mut response = [0u8; 24];
    for i in 0..3 {
        let key = des_key_with_parity(&z_password_hash[i * 7..(i + 1) * 7]);
        let des = Des::new_from_slice(&key)
            .map_err(|_| EapError::Internal("DES key setup failed".into()))?;
        let mut block = GenericArray::clone_from_slice(challenge);
        des.encrypt_block(&mut block);
        response[i * 8..(i + 1) * 8].copy_from_slice(&block);
    }
    Ok(response)
}

/// GenerateNTResponse from RFC 2759 Section 8.1
fn generate_nt_response(
    auth_challenge: &[u8; 16],
    peer_challenge: &[u8; 16],
    username: &[u8],
    password: &str,
) -> Result<[u8; 24]> {
    let challenge = challenge_hash(peer_challenge, auth_challenge, username);
    let password_hash = nt_password_hash(password);
    challenge_response(&challenge, &password_hash)
}

/// GenerateAuthenticatorResponse from RFC 2759 Section 8.7
fn generate_authenticator_response(
    password: &str,
    nt_response: &[u8; 24],
    peer_challenge: &[u8; 16],
    auth_challenge: &[u8; 16],
    username: &[u8],
) -> String {
    let password_hash_hash: [u8; 16] = Md4::digest(nt_password_hash(password)).into();

    let mut hasher = Sha1::new();
    hasher.update(password_hash_hash);
    hasher.update(nt_response);
    hasher.update(MAGIC1);
    let digest = hasher.finalize();

    let challenge = challenge_hash(peer_challenge, auth_challenge, username);

    let mut hasher = Sha1::new();
    hasher.update(digest);
    hasher.update(challenge);
    hasher.update(MAGIC2);
    let auth = hasher.finalize();

    format!("S={}", hex::encode_upper(auth))
}

/// GetMasterKey from RFC 3079 Section 3.4
fn master_key(password: &str, nt_response: &[u8; 24]) -> [u8; 16] {
    let password_hash_hash: [u8; 16] = Md4::digest(nt_password_hash(password)).into();

    let mut hasher = Sha1::new();
    hasher.update(password_hash_hash);
    hasher.update(nt_response);
    hasher.update(MPPE_MAGIC);
    let digest = hasher.finalize();

    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

#[derive(Debug)]
enum MsChapState {
    Created,
    ValidateAuth {
        expected_auth: String,
        master_key: [u8; 16],
    },
    Complete {
        master_key: [u8; 16],
    },
    Final,
}

/// EAP-MSCHAPv2 method state machine
pub struct EapMsChapV2Method {
    config: EapMsChapV2Config,
    state: MsChapState,
}

impl EapMsChapV2Method {
    /// Create the method in its initial state
    pub fn new(config: EapMsChapV2Config) -> Self {
        EapMsChapV2Method {
            config,
            state: MsChapState::Created,
        }
    }

    /// The negotiated 16-byte master key, once the server authenticated
    pub fn master_key(&self) -> Option<[u8; 16]> {
        match &self.state {
            MsChapState::Complete { master_key } => Some(*master_key),
            _ => None,
        }
    }

    fn process_challenge(&mut self, message: &EapMessage, type_data: &[u8]) -> EapResult {
        // opcode(1) id(1) ms-len(2) value-size(1) challenge(16) name
        if type_data.len() < 21 {
            return EapResult::Error(EapError::InvalidRequest(
                "MSCHAPv2 challenge request too short".into(),
            ));
        }
        let ms_id = type_data[1];
        let value_size = type_data[4] as usize;
        if value_size != 16 || type_data.len() < 5 + 16 {
            return EapResult::Error(EapError::InvalidRequest(format!(
                "MSCHAPv2 challenge value size {} invalid",
                value_size
            )));
        }
        let mut auth_challenge = [0u8; 16];
        auth_challenge.copy_from_slice(&type_data[5..21]);

        let mut peer_challenge = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut peer_challenge);

        let username = self.config.username.as_bytes().to_vec();
        let nt_response = match generate_nt_response(
            &auth_challenge,
            &peer_challenge,
            &username,
            &self.config.password,
        ) {
            Ok(response) => response,
            Err(e) => return EapResult::Error(e),
        };

        let expected_auth = generate_authenticator_response(
            &self.config.password,
            &nt_response,
            &peer_challenge,
            &auth_challenge,
            &username,
        );
        let master_key = master_key(&self.config.password, &nt_response);

        // Response value: peer challenge (16) | reserved (8) | NT response
        // (24) | flags (1)
        let mut value = Vec::with_capacity(49);
        value.extend_from_slice(&peer_challenge);
        value.extend_from_slice(&[0u8; 8]);
        value.extend_from_slice(&nt_response);
        value.push(0);

        let ms_len = 4 + 1 + value.len() + username.len();
        let mut response_data = Vec::with_capacity(ms_len);
        response_data.push(OP_RESPONSE);
        response_data.push(ms_id);
        response_data.extend_from_slice(&(ms_len as u16).to_be_bytes());
        response_data.push(49);
        response_data.extend_from_slice(&value);
        response_data.extend_from_slice(&username);

        let response =
            EapMessage::response(message.identifier, EapMethodType::MsChapV2, response_data);

        self.state = MsChapState::ValidateAuth {
            expected_auth,
            master_key,
        };
        EapResult::Response(response.encode())
    }

    fn process_success_request(&mut self, message: &EapMessage, type_data: &[u8]) -> EapResult {
        let (expected_auth, master_key) = match &self.state {
            MsChapState::ValidateAuth {
                expected_auth,
                master_key,
            } => (expected_auth.clone(), *master_key),
            _ => {
                return EapResult::Error(EapError::InvalidRequest(
                    "MSCHAPv2 success request before challenge".into(),
                ))
            }
        };

        // Message format: opcode(1) id(1) ms-len(2) "S=<40 hex chars> M=..."
        let body = if type_data.len() > 4 {
            &type_data[4..]
        } else {
            &[][..]
        };
        let text = String::from_utf8_lossy(body);
        let received = text
            .split_whitespace()
            .find(|part| part.starts_with("S="))
            .map(|s| s.to_string());

        match received {
            Some(auth) if auth.eq_ignore_ascii_case(&expected_auth) => {
                // Acknowledge: a bare success opcode
                let response = EapMessage::response(
                    message.identifier,
                    EapMethodType::MsChapV2,
                    vec![OP_SUCCESS],
                );
                self.state = MsChapState::Complete { master_key };
                EapResult::Response(response.encode())
            }
            _ => EapResult::Error(EapError::InvalidRequest(
                "Server authenticator response did not verify".into(),
            )),
        }
    }

    fn process_failure_request(&mut self, message: &EapMessage) -> EapResult {
        let response = EapMessage::response(
            message.identifier,
            EapMethodType::MsChapV2,
            vec![OP_FAILURE],
        );
        EapResult::Response(response.encode())
    }
}

#[async_trait::async_trait]
impl EapMethod for EapMsChapV2Method {
    fn method_type(&self) -> EapMethodType {
        EapMethodType::MsChapV2
    }

    fn state_name(&self) -> &'static str {
        match self.state {
            MsChapState::Created => "Created",
            MsChapState::ValidateAuth { .. } => "ValidateAuth",
            MsChapState::Complete { .. } => "Complete",
            MsChapState::Final => "Final",
        }
    }

    fn pending_keys(&self) -> Option<(Vec<u8>, Vec<u8>)> {
        match &self.state {
            MsChapState::Complete { master_key } => Some((master_key.to_vec(), Vec::new())),
            _ => None,
        }
    }

    fn mark_final(&mut self) {
        self.state = MsChapState::Final;
    }

    async fn process(&mut self, message: &EapMessage) -> EapResult {
        let data = match &message.data {
            Some(data) => data,
            None => {
                return EapResult::Error(EapError::InvalidRequest(
                    "MSCHAPv2 request without type data".into(),
                ))
            }
        };
        if data.method_type() != Some(EapMethodType::MsChapV2) {
            return EapResult::Error(EapError::InvalidRequest(format!(
                "Expected EAP-MSCHAPv2 request, got type {}",
                data.type_raw
            )));
        }
        if data.type_data.is_empty() {
            return EapResult::Error(EapError::InvalidRequest(
                "Empty MSCHAPv2 request".into(),
            ));
        }

        match data.type_data[0] {
            OP_CHALLENGE => self.process_challenge(message, &data.type_data),
            OP_SUCCESS => self.process_success_request(message, &data.type_data),
            OP_FAILURE => self.process_failure_request(message),
            other => EapResult::Error(EapError::InvalidRequest(format!(
                "Unexpected MSCHAPv2 op code {}",
                other
            ))),
        }
    }
}
