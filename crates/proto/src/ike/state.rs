//! IKE session state machine
//!
//! Tracks the lifecycle of one initiator-side IKE SA:
//!
//! ```text
//! Initial
//!   ↓ (send IKE_SA_INIT)
//! InitSent
//!   ↓ (recv IKE_SA_INIT response, derive keys)
//! AuthSent ──(EAP negotiated)──> EapInProgress ──> FinalAuthSent
//!   ↓                                                   ↓
//! Established ⇄ { CreateChild, Rekeying, Informational, Deleting }
//!   ↓
//! Closed
//! ```

use crate::ike::{IkeError, Result};

/// IKE session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IkeState {
    /// No exchange started yet
    Initial,

    /// IKE_SA_INIT request sent, waiting for response
    InitSent,

    /// IKE_AUTH request sent, waiting for response
    AuthSent,

    /// EAP conversation in progress inside IKE_AUTH
    EapInProgress,

    /// EAP finished, final AUTH request sent
    FinalAuthSent,

    /// IKE SA established, no exchange outstanding
    Established,

    /// CREATE_CHILD_SA exchange outstanding
    CreateChild,

    /// Rekey exchange outstanding
    Rekeying,

    /// INFORMATIONAL exchange outstanding
    Informational,

    /// DELETE exchange outstanding
    Deleting,

    /// IKE SA is gone; terminal
    Closed,
}

impl IkeState {
    /// Check if a transition to `next` is legal
    pub fn can_transition_to(&self, next: IkeState) -> bool {
        use IkeState::*;

        match (self, next) {
            (Initial, InitSent) => true,
            (InitSent, AuthSent) => true,
            (AuthSent, EapInProgress) => true,
            (AuthSent, Established) => true,
            (EapInProgress, FinalAuthSent) => true,
            (FinalAuthSent, Established) => true,

            // Established is the hub for follow-on exchanges
            (Established, CreateChild) => true,
            (Established, Rekeying) => true,
            (Established, Informational) => true,
            (Established, Deleting) => true,
            (CreateChild, Established) => true,
            (Rekeying, Established) => true,
            (Informational, Established) => true,

            // Teardown is reachable from everywhere
            (_, Closed) => true,

            (s1, s2) if *s1 == s2 => true,

            _ => false,
        }
    }

    /// Check if this is the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, IkeState::Closed)
    }

    /// Check if the IKE SA is usable for protected exchanges
    pub fn is_established(&self) -> bool {
        matches!(
            self,
            IkeState::Established
                | IkeState::CreateChild
                | IkeState::Rekeying
                | IkeState::Informational
        )
    }

    /// Check if a response is outstanding
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            IkeState::InitSent
                | IkeState::AuthSent
                | IkeState::EapInProgress
                | IkeState::FinalAuthSent
                | IkeState::CreateChild
                | IkeState::Rekeying
                | IkeState::Informational
                | IkeState::Deleting
        )
    }

    /// Transition helper returning a descriptive error on violation
    pub fn checked_transition(&mut self, next: IkeState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(IkeError::InvalidState(format!(
                "Invalid state transition from {:?} to {:?}",
                self, next
            )));
        }
        *self = next;
        Ok(())
    }
}
