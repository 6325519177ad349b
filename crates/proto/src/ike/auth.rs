//! IKEv2 Authentication
//!
//! Implements AUTH payload computation as defined in RFC 7296 Section 2.15,
//! for both pre-shared-key authentication and the EAP variant of
//! Section 2.16 where the EAP-derived MSK takes the place of the shared
//! secret.

use super::constants::AuthMethod;
use super::crypto::PrfAlgorithm;
use super::payload::AuthPayload;
use crate::ike::{IkeError, Result};
use subtle::ConstantTimeEq;

/// Key pad for IKEv2 (RFC 7296 Section 2.15)
const KEY_PAD_IKEV2: &[u8] = b"Key Pad for IKEv2";

/// Compute a shared-secret AUTH payload
///
/// ```text
/// AUTH = prf(prf(Secret, "Key Pad for IKEv2"), <SignedOctets>)
/// ```
///
/// `secret` is the configured PSK, or the EAP MSK for the final IKE_AUTH
/// round of an EAP exchange.
pub fn compute_shared_secret_auth(
    prf: PrfAlgorithm,
    secret: &[u8],
    signed_octets: &[u8],
) -> AuthPayload {
    let pad_key = prf.compute(secret, KEY_PAD_IKEV2);
    let auth_data = prf.compute(&pad_key, signed_octets);

    AuthPayload::new(AuthMethod::SharedKeyMic, auth_data)
}

/// Verify a shared-secret AUTH payload in constant time
pub fn verify_shared_secret_auth(
    prf: PrfAlgorithm,
    secret: &[u8],
    signed_octets: &[u8],
    received: &AuthPayload,
) -> Result<()> {
    if received.auth_method != AuthMethod::SharedKeyMic {
        return Err(IkeError::AuthenticationFailed(format!(
            "Expected shared-key auth, got {:?}",
            received.auth_method
        )));
    }

    let expected = compute_shared_secret_auth(prf, secret, signed_octets);
    if expected.auth_data.len() != received.auth_data.len()
        || expected.auth_data.ct_eq(&received.auth_data).unwrap_u8() != 1
    {
        return Err(IkeError::AuthenticationFailed(
            "AUTH verification failed".to_string(),
        ));
    }

    Ok(())
}

/// Construct initiator signed octets (RFC 7296 Section 2.15)
///
/// ```text
/// InitiatorSignedOctets = RealMessage1 | NonceR | prf(SK_pi, IDi')
/// ```
pub fn initiator_signed_octets(
    prf: PrfAlgorithm,
    real_message1: &[u8],
    nonce_r: &[u8],
    sk_pi: &[u8],
    id_i_data: &[u8],
) -> Vec<u8> {
    let mut octets = Vec::with_capacity(real_message1.len() + nonce_r.len() + prf.output_len());
    octets.extend_from_slice(real_message1);
    octets.extend_from_slice(nonce_r);
    octets.extend_from_slice(&prf.compute(sk_pi, id_i_data));
    octets
}

/// Construct responder signed octets (RFC 7296 Section 2.15)
///
/// ```text
/// ResponderSignedOctets = RealMessage2 | NonceI | prf(SK_pr, IDr')
/// ```
pub fn responder_signed_octets(
    prf: PrfAlgorithm,
    real_message2: &[u8],
    nonce_i: &[u8],
    sk_pr: &[u8],
    id_r_data: &[u8],
) -> Vec<u8> {
    let mut octets = Vec::with_capacity(real_message2.len() + nonce_i.len() + prf.output_len());
    octets.extend_from_slice(real_message2);
    octets.extend_from_slice(nonce_i);
    octets.extend_from_slice(&prf.compute(sk_pr, id_r_data));
    octets
}
