//! Foreground lock gate
//!
//! Locks the application when it returns to the foreground after spending
//! at least `lock_delay` in the background, and unlocks it only after a
//! successful re-authentication challenge.
//!
//! Visibility transitions are forwarded by the host as explicit calls. The
//! challenge runs as a detached tokio task; its outcome comes back to the
//! owner as a [`LifecycleEvent::ChallengeResolved`] and is applied through
//! [`ForegroundLockGate::handle_challenge`]. Starting a new challenge, or
//! disabling the gate, supersedes any challenge still in flight.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use warden_core::{AuthError, Authenticator, DEFAULT_LOCK_DELAY_SECS, DEFAULT_UNLOCK_REASON};

use crate::events::{EventSender, LifecycleEvent, LockNotice, NOTICE_CAPACITY};

/// In-flight challenge; the task is aborted when dropped
#[derive(Debug)]
struct PendingChallenge {
    generation: u64,
    task: JoinHandle<()>,
}

impl Drop for PendingChallenge {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Lock gate driven by background/foreground transitions
pub struct ForegroundLockGate {
    authenticator: Arc<dyn Authenticator>,
    enabled: bool,
    locked: bool,
    backgrounded_at: Option<Instant>,
    lock_delay: Duration,
    unlock_reason: String,
    generation: u64,
    challenge: Option<PendingChallenge>,
    events: EventSender,
    notices: broadcast::Sender<LockNotice>,
}

impl std::fmt::Debug for ForegroundLockGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForegroundLockGate")
            .field("method", &self.authenticator.available_method())
            .field("enabled", &self.enabled)
            .field("locked", &self.locked)
            .field("lock_delay", &self.lock_delay)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

impl ForegroundLockGate {
    /// Create a disabled, unlocked gate with an immediate lock delay
    pub fn new(authenticator: Arc<dyn Authenticator>, events: EventSender) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            authenticator,
            enabled: false,
            locked: false,
            backgrounded_at: None,
            lock_delay: Duration::from_secs(DEFAULT_LOCK_DELAY_SECS),
            unlock_reason: DEFAULT_UNLOCK_REASON.to_string(),
            generation: 0,
            challenge: None,
            events,
            notices,
        }
    }

    /// Set the background time required before locking
    pub fn with_lock_delay(mut self, lock_delay: Duration) -> Self {
        self.lock_delay = lock_delay;
        self
    }

    /// Set the reason shown by the authenticator
    pub fn with_unlock_reason(mut self, reason: impl Into<String>) -> Self {
        self.unlock_reason = reason.into();
        self
    }

    /// Subscribe to lock notices
    pub fn subscribe(&self) -> broadcast::Receiver<LockNotice> {
        self.notices.subscribe()
    }

    pub(crate) fn notice_sender(&self) -> broadcast::Sender<LockNotice> {
        self.notices.clone()
    }

    /// Start reacting to visibility transitions
    pub fn enable(&mut self) {
        if self.enabled {
            return;
        }

        self.enabled = true;
        info!(
            method = %self.authenticator.available_method(),
            lock_delay_secs = self.lock_delay.as_secs(),
            "Foreground lock enabled"
        );
    }

    /// Stop reacting to visibility transitions and force the gate unlocked
    pub fn disable(&mut self) {
        let was_enabled = std::mem::replace(&mut self.enabled, false);
        self.generation = self.generation.wrapping_add(1);
        self.challenge = None;
        self.backgrounded_at = None;
        self.set_locked(false);

        if was_enabled {
            info!("Foreground lock disabled");
        }
    }

    /// The application moved to the background
    pub fn on_entered_background(&mut self) {
        if !self.enabled {
            return;
        }

        self.backgrounded_at = Some(Instant::now());
        debug!("Entered background");
    }

    /// The application is about to return to the foreground
    pub fn on_will_enter_foreground(&mut self) {
        if !self.enabled {
            return;
        }

        let should_lock = match self.backgrounded_at.take() {
            Some(at) => at.elapsed() >= self.lock_delay,
            None => true,
        };

        if should_lock {
            self.set_locked(true);
            self.spawn_challenge();
        } else {
            debug!("Returned to foreground within lock delay");
        }
    }

    /// Ask for another challenge while locked
    ///
    /// No-op unless the gate is enabled and locked. Supersedes a challenge
    /// still in flight.
    pub fn request_unlock(&mut self) {
        if self.enabled && self.locked {
            self.spawn_challenge();
        }
    }

    /// Apply a challenge outcome delivered by the owning context
    ///
    /// Returns `true` if the outcome unlocked the gate.
    pub fn handle_challenge(&mut self, generation: u64, outcome: Result<bool, AuthError>) -> bool {
        let current = self
            .challenge
            .as_ref()
            .map_or(false, |pending| pending.generation == generation);

        if !self.enabled || !current {
            debug!(
                generation,
                current = self.generation,
                "Discarding stale challenge outcome"
            );
            return false;
        }
        self.challenge = None;

        match outcome {
            Ok(true) => {
                self.set_locked(false);
                true
            }
            Ok(false) => {
                warn!("Unlock challenge rejected, remaining locked");
                false
            }
            Err(AuthError::Cancelled) => {
                warn!("Unlock challenge cancelled, remaining locked");
                false
            }
            Err(e) => {
                error!("Unlock challenge failed: {}", e);
                false
            }
        }
    }

    /// Whether the gate is currently locked
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Whether the gate reacts to visibility transitions
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Background time required before locking
    pub fn lock_delay(&self) -> Duration {
        self.lock_delay
    }

    /// Change the lock delay; applies to the next foreground transition
    pub fn set_lock_delay(&mut self, lock_delay: Duration) {
        self.lock_delay = lock_delay;
    }

    /// Reason shown by the authenticator
    pub fn unlock_reason(&self) -> &str {
        &self.unlock_reason
    }

    /// Generation of the in-flight challenge, if any
    pub fn pending_challenge(&self) -> Option<u64> {
        self.challenge.as_ref().map(|pending| pending.generation)
    }

    fn spawn_challenge(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;

        let authenticator = Arc::clone(&self.authenticator);
        let reason = self.unlock_reason.clone();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            let outcome = authenticator.challenge(&reason).await;
            let _ = events.send(LifecycleEvent::ChallengeResolved {
                generation,
                outcome,
            });
        });

        // Replacing the pending challenge aborts the previous one
        self.challenge = Some(PendingChallenge { generation, task });
        debug!(generation, "Unlock challenge started");
    }

    fn set_locked(&mut self, locked: bool) {
        if self.locked == locked {
            return;
        }

        self.locked = locked;
        if locked {
            info!("Locked");
            let _ = self.notices.send(LockNotice::Locked);
        } else {
            info!("Unlocked");
            let _ = self.notices.send(LockNotice::Unlocked);
        }
    }
}
