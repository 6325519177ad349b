//! Method state machine interface
//!
//! Method identity is a tagged value (`EapMethodType`); behavior is this
//! trait. State transitions inside a method are values, not types; the
//! session owns the method object and applies the shared Success/Failure/
//! Notification handling before dispatching to it.

use super::message::{EapMessage, EapMethodType};
use super::EapResult;

/// One EAP authentication method conversation
#[async_trait::async_trait]
pub trait EapMethod: Send {
    /// Method identity
    fn method_type(&self) -> EapMethodType;

    /// Human-readable current state, for logging
    fn state_name(&self) -> &'static str;

    /// Keys the method has derived and is ready to release on EAP Success
    ///
    /// `None` until the method's challenge has verified; an EAP Success
    /// received while this is `None` is a protocol violation.
    fn pending_keys(&self) -> Option<(Vec<u8>, Vec<u8>)>;

    /// Enter the terminal state (after Success or Failure)
    fn mark_final(&mut self);

    /// Process one method-level request
    async fn process(&mut self, message: &EapMessage) -> EapResult;
}
