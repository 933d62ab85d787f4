//! Events and notices exchanged with the owning context
//!
//! Background work (deadline timers, authenticator challenges) never
//! mutates lifecycle state directly. It reports back through a
//! [`LifecycleEvent`] tagged with the generation it was started under; the
//! owner hands the event to the session or gate, which discards it if the
//! generation has moved on.
//!
//! Hosts observe state changes through broadcast [`SessionNotice`] and
//! [`LockNotice`] subscriptions.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use warden_core::AuthError;

/// Capacity of the notice broadcast channels
pub(crate) const NOTICE_CAPACITY: usize = 16;

/// Result of background work, delivered to the owning context
#[derive(Debug)]
pub enum LifecycleEvent {
    /// An inactivity deadline elapsed
    DeadlineElapsed {
        generation: u64,
    },
    /// A re-authentication challenge resolved
    ChallengeResolved {
        generation: u64,
        outcome: Result<bool, AuthError>,
    },
}

/// Sending half of the owner's event channel
pub type EventSender = mpsc::UnboundedSender<LifecycleEvent>;

/// Receiving half of the owner's event channel
pub type EventReceiver = mpsc::UnboundedReceiver<LifecycleEvent>;

/// Create the event channel for one owning context
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Why a session expired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpiryCause {
    /// No activity within the inactivity timeout
    Inactivity,
    /// The remote credential expired
    CredentialExpired,
}

impl std::fmt::Display for ExpiryCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpiryCause::Inactivity => write!(f, "INACTIVITY"),
            ExpiryCause::CredentialExpired => write!(f, "CREDENTIAL_EXPIRED"),
        }
    }
}

/// Session lifecycle notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// A session became active
    Started { session_id: String },
    /// An active session ended (manually or through expiry)
    Ended { session_id: String },
    /// An active session expired; published once per expiry
    Expired { session_id: String, cause: ExpiryCause },
}

/// Lock status notice, published only on actual transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockNotice {
    Locked,
    Unlocked,
}

impl LockNotice {
    /// Whether this notice reports the locked state
    pub fn is_locked(&self) -> bool {
        matches!(self, LockNotice::Locked)
    }
}
