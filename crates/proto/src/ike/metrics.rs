//! Metrics for IKE session operations
//!
//! Thread-safe atomic counters covering handshake outcomes, retransmission
//! behavior, fragmentation, and EAP results. Instances are per stack, not
//! process-global; snapshots can be exported to any monitoring system.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// IKE session metrics
#[derive(Debug, Clone, Default)]
pub struct IkeMetrics {
    /// Handshakes initiated
    pub handshakes_started: Arc<AtomicU64>,

    /// Handshakes completed successfully
    pub handshakes_completed: Arc<AtomicU64>,

    /// Handshakes failed
    pub handshakes_failed: Arc<AtomicU64>,

    /// Requests retransmitted
    pub retransmissions: Arc<AtomicU64>,

    /// Peers declared dead after retransmission exhaustion
    pub peers_declared_dead: Arc<AtomicU64>,

    /// Packets silently discarded (integrity/decryption failure)
    pub packets_discarded: Arc<AtomicU64>,

    /// Outbound messages fragmented
    pub messages_fragmented: Arc<AtomicU64>,

    /// Inbound messages reassembled from fragments
    pub messages_reassembled: Arc<AtomicU64>,

    /// Reassembly buffers dropped on timeout
    pub reassembly_timeouts: Arc<AtomicU64>,

    /// EAP exchanges ending in Success
    pub eap_successes: Arc<AtomicU64>,

    /// EAP exchanges ending in Failure
    pub eap_failures: Arc<AtomicU64>,

    /// Child SAs installed
    pub child_sas_installed: Arc<AtomicU64>,

    /// Child SAs deleted
    pub child_sas_deleted: Arc<AtomicU64>,

    /// Cookie challenges honored
    pub cookie_retries: Arc<AtomicU64>,
}

impl IkeMetrics {
    /// Create a fresh metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a handshake start
    pub fn record_handshake_started(&self) {
        self.handshakes_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed handshake
    pub fn record_handshake_completed(&self) {
        self.handshakes_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed handshake
    pub fn record_handshake_failed(&self) {
        self.handshakes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one retransmission
    pub fn record_retransmission(&self) {
        self.retransmissions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dead peer
    pub fn record_peer_dead(&self) {
        self.peers_declared_dead.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a silently discarded packet
    pub fn record_packet_discarded(&self) {
        self.packets_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an outbound fragmentation event
    pub fn record_message_fragmented(&self) {
        self.messages_fragmented.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed reassembly
    pub fn record_message_reassembled(&self) {
        self.messages_reassembled.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reassembly timeout
    pub fn record_reassembly_timeout(&self) {
        self.reassembly_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an EAP success
    pub fn record_eap_success(&self) {
        self.eap_successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an EAP failure
    pub fn record_eap_failure(&self) {
        self.eap_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a Child SA installation
    pub fn record_child_sa_installed(&self) {
        self.child_sas_installed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a Child SA deletion
    pub fn record_child_sa_deleted(&self) {
        self.child_sas_deleted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a honored cookie challenge
    pub fn record_cookie_retry(&self) {
        self.cookie_retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self) -> IkeMetricsSnapshot {
        IkeMetricsSnapshot {
            handshakes_started: self.handshakes_started.load(Ordering::Relaxed),
            handshakes_completed: self.handshakes_completed.load(Ordering::Relaxed),
            handshakes_failed: self.handshakes_failed.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
            peers_declared_dead: self.peers_declared_dead.load(Ordering::Relaxed),
            packets_discarded: self.packets_discarded.load(Ordering::Relaxed),
            messages_fragmented: self.messages_fragmented.load(Ordering::Relaxed),
            messages_reassembled: self.messages_reassembled.load(Ordering::Relaxed),
            reassembly_timeouts: self.reassembly_timeouts.load(Ordering::Relaxed),
            eap_successes: self.eap_successes.load(Ordering::Relaxed),
            eap_failures: self.eap_failures.load(Ordering::Relaxed),
            child_sas_installed: self.child_sas_installed.load(Ordering::Relaxed),
            child_sas_deleted: self.child_sas_deleted.load(Ordering::Relaxed),
            cookie_retries: self.cookie_retries.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of all counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IkeMetricsSnapshot {
    /// Handshakes initiated
    pub handshakes_started: u64,
    /// Handshakes completed successfully
    pub handshakes_completed: u64,
    /// Handshakes failed
    pub handshakes_failed: u64,
    /// Requests retransmitted
    pub retransmissions: u64,
    /// Peers declared dead
    pub peers_declared_dead: u64,
    /// Packets silently discarded
    pub packets_discarded: u64,
    /// Outbound messages fragmented
    pub messages_fragmented: u64,
    /// Inbound messages reassembled
    pub messages_reassembled: u64,
    /// Reassembly buffers dropped on timeout
    pub reassembly_timeouts: u64,
    /// EAP successes
    pub eap_successes: u64,
    /// EAP failures
    pub eap_failures: u64,
    /// Child SAs installed
    pub child_sas_installed: u64,
    /// Child SAs deleted
    pub child_sas_deleted: u64,
    /// Cookie challenges honored
    pub cookie_retries: u64,
}
