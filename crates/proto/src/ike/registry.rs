//! SPI-to-session index
//!
//! A packet dispatcher funneling one socket to several IKE sessions looks
//! the owning session up by the initiator SPI in the message header. The
//! index is a plain hash map keyed on the 64-bit SPI: it is created,
//! mutated, and read on the session worker, so it needs no interior
//! locking.

use super::constants::IKE_HEADER_SIZE;
use std::collections::HashMap;

/// Index from initiator SPI to a session handle
#[derive(Debug)]
pub struct SpiRegistry<T> {
    sessions: HashMap<u64, T>,
}

impl<T> Default for SpiRegistry<T> {
    fn default() -> Self {
        SpiRegistry {
            sessions: HashMap::new(),
        }
    }
}

impl<T> SpiRegistry<T> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Register a session under its initiator SPI
    ///
    /// Returns the previous occupant on SPI collision (8 random bytes
    /// colliding means the caller should regenerate).
    pub fn insert(&mut self, initiator_spi: [u8; 8], session: T) -> Option<T> {
        self.sessions.insert(u64::from_be_bytes(initiator_spi), session)
    }

    /// Remove a session on teardown
    pub fn remove(&mut self, initiator_spi: [u8; 8]) -> Option<T> {
        self.sessions.remove(&u64::from_be_bytes(initiator_spi))
    }

    /// Look up the session owning a SPI
    pub fn get_mut(&mut self, initiator_spi: [u8; 8]) -> Option<&mut T> {
        self.sessions.get_mut(&u64::from_be_bytes(initiator_spi))
    }

    /// Route an inbound datagram to its session by the initiator SPI in
    /// the header
    ///
    /// Returns `None` for runts and for SPIs no session owns; such packets
    /// are dropped by the dispatcher.
    pub fn route(&mut self, datagram: &[u8]) -> Option<&mut T> {
        if datagram.len() < IKE_HEADER_SIZE {
            return None;
        }
        let mut spi = [0u8; 8];
        spi.copy_from_slice(&datagram[0..8]);
        self.get_mut(spi)
    }
}
