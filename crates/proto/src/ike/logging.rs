//! Structured logging for IKE session operations
//!
//! Thin helpers over the `tracing` framework so state transitions and
//! exchange outcomes carry consistent context fields.
//!
//! # Log Levels
//!
//! - **TRACE**: payload-level detail
//! - **DEBUG**: retransmissions, fragment handling, discarded packets
//! - **INFO**: state transitions, handshake and exchange lifecycle
//! - **WARN**: retryable anomalies (cookie demands, stale message IDs)
//! - **ERROR**: failed exchanges, authentication failures

use tracing::{debug, error, info, warn};

/// Log an IKE session state transition
pub fn log_state_transition(spi_i: &[u8], spi_r: &[u8], old_state: &str, new_state: &str) {
    info!(
        ike_spi_i = %hex::encode(spi_i),
        ike_spi_r = %hex::encode(spi_r),
        state_from = old_state,
        state_to = new_state,
        "IKE session state transition"
    );
}

/// Log handshake start
pub fn log_handshake_start(peer_addr: &str) {
    info!(peer = peer_addr, role = "initiator", "IKE handshake started");
}

/// Log handshake completion
pub fn log_handshake_complete(peer_addr: &str, duration_ms: u64) {
    info!(
        peer = peer_addr,
        duration_ms = duration_ms,
        "IKE handshake completed successfully"
    );
}

/// Log handshake failure
pub fn log_handshake_failed(peer_addr: &str, error: &str) {
    error!(peer = peer_addr, error = error, "IKE handshake failed");
}

/// Log a retransmission
pub fn log_retransmit(message_id: u32, attempt: u32, delay_ms: u64) {
    debug!(
        message_id = message_id,
        attempt = attempt,
        delay_ms = delay_ms,
        "Retransmitting request"
    );
}

/// Log a silently discarded packet
///
/// Used for integrity/decryption failures; the reason never reaches the
/// peer.
pub fn log_discarded_packet(reason: &str) {
    debug!(reason = reason, "Discarded inbound packet");
}

/// Log a stale request answered from the response cache
pub fn log_cached_response(message_id: u32) {
    warn!(
        message_id = message_id,
        "Retransmitted peer request, resending cached response"
    );
}

/// Log an EAP method event
pub fn log_eap_event(method: &str, state: &str, event: &str) {
    info!(eap_method = method, eap_state = state, event = event, "EAP event");
}

/// Log Child SA installation
pub fn log_child_sa_installed(inbound_spi: u32, outbound_spi: u32, transport: bool) {
    info!(
        inbound_spi = format!("0x{:08x}", inbound_spi),
        outbound_spi = format!("0x{:08x}", outbound_spi),
        transport_mode = transport,
        "Child SA installed"
    );
}

/// Log Child SA deletion
pub fn log_child_sa_deleted(inbound_spi: u32) {
    info!(
        inbound_spi = format!("0x{:08x}", inbound_spi),
        "Child SA deleted"
    );
}
