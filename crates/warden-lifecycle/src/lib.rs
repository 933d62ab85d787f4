//! Warden Lifecycle - Session inactivity and foreground lock coordination
//!
//! Three cooperating pieces decide whether the user may act:
//! - [`InactivitySession`] expires after a period without activity, or when
//!   the credential it depends on expires, and clears stored credentials
//!   when it ends
//! - [`ForegroundLockGate`] locks on return from the background and unlocks
//!   after a successful re-authentication challenge
//! - [`LifecycleWorker`] owns both on one tokio task and answers
//!   [`LifecycleHandle::is_allowed`]
//!
//! The session and gate can also be owned directly by a host that runs its
//! own loop over the [`events`] channel.

pub mod config;
pub mod error;
pub mod events;
pub mod lock_gate;
pub mod session;
pub mod worker;

pub use config::{LifecycleConfig, CONFIG_PATH_ENV};
pub use error::{LifecycleError, Result};
pub use events::{
    event_channel, EventReceiver, EventSender, ExpiryCause, LifecycleEvent, LockNotice,
    SessionNotice,
};
pub use lock_gate::ForegroundLockGate;
pub use session::{InactivitySession, SessionSnapshot, SessionState};
pub use worker::{LifecycleHandle, LifecycleSnapshot, LifecycleWorker};
