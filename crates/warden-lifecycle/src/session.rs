//! Inactivity-bounded session lifecycle
//!
//! An [`InactivitySession`] is active between [`start`](InactivitySession::start)
//! and [`end`](InactivitySession::end). While active it keeps a deadline
//! armed `timeout` after the last recorded activity; reaching the deadline,
//! or discovering an expired credential during a validity check, expires
//! the session: it ends (clearing stored credentials) and publishes
//! exactly one [`SessionNotice::Expired`].
//!
//! # Ownership
//!
//! All methods take `&mut self`, so the session has a single owner and no
//! internal locking. Deadline timers run as tokio tasks that only send a
//! [`LifecycleEvent::DeadlineElapsed`] to the owner, who passes it back
//! through [`handle_deadline`](InactivitySession::handle_deadline). Methods
//! that arm a deadline must be called from within a tokio runtime.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use warden_core::{CredentialStore, ExpiryStatus, ExpiryTracker, DEFAULT_SESSION_TIMEOUT_SECS};

use crate::events::{EventSender, ExpiryCause, LifecycleEvent, SessionNotice, NOTICE_CAPACITY};

/// Session state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session (initial, or after end/expiry)
    Inactive,
    /// Session is active
    Active,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Inactive => write!(f, "INACTIVE"),
            SessionState::Active => write!(f, "ACTIVE"),
        }
    }
}

/// Armed inactivity deadline; the timer task is aborted when dropped
#[derive(Debug)]
struct Deadline {
    generation: u64,
    task: JoinHandle<()>,
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Point-in-time view of a session, for display and diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Identifier of the current (or last) session
    pub session_id: Option<String>,
    /// Current state
    pub state: SessionState,
    /// Inactivity timeout in seconds
    pub timeout_secs: u64,
    /// Seconds since the last recorded activity
    pub idle_secs: u64,
    /// Seconds until the inactivity deadline (only while active)
    pub remaining_secs: Option<u64>,
    /// Credential expiry status
    pub credential: ExpiryStatus,
}

/// User session bounded by inactivity and credential expiry
#[derive(Debug)]
pub struct InactivitySession {
    /// Identifier of the current (or last) session, for log correlation
    session_id: Option<String>,

    /// Whether a session is active
    active: bool,

    /// Last activity timestamp
    last_activity: Instant,

    /// Inactivity timeout
    timeout: Duration,

    /// Credential expiry, consulted by validity checks
    expiry: ExpiryTracker,

    /// Credentials cleared when the session ends
    credentials: CredentialStore,

    /// Bumped on every arm and cancel; older deadlines are stale
    generation: u64,

    /// Currently armed deadline (only while active)
    deadline: Option<Deadline>,

    /// Owner's event channel
    events: EventSender,

    /// Notice broadcast channel
    notices: broadcast::Sender<SessionNotice>,
}

impl InactivitySession {
    /// Create an inactive session
    ///
    /// # Arguments
    /// * `credentials` - Store cleared whenever the session ends
    /// * `expiry` - Credential expiry consulted by validity checks
    /// * `timeout` - Inactivity timeout
    /// * `events` - Channel to the owning context, for deadline events
    pub fn new(
        credentials: CredentialStore,
        expiry: ExpiryTracker,
        timeout: Duration,
        events: EventSender,
    ) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            session_id: None,
            active: false,
            last_activity: Instant::now(),
            timeout,
            expiry,
            credentials,
            generation: 0,
            deadline: None,
            events,
            notices,
        }
    }

    /// Create an inactive session with the default 5 minute timeout
    pub fn with_default_timeout(
        credentials: CredentialStore,
        expiry: ExpiryTracker,
        events: EventSender,
    ) -> Self {
        Self::new(
            credentials,
            expiry,
            Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
            events,
        )
    }

    /// Subscribe to session notices
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub(crate) fn notice_sender(&self) -> broadcast::Sender<SessionNotice> {
        self.notices.clone()
    }

    /// Start a session and arm the inactivity deadline
    ///
    /// Starting an already active session restarts its deadline and keeps
    /// its identifier.
    pub fn start(&mut self) {
        let was_active = self.active;
        self.active = true;
        self.last_activity = Instant::now();
        self.arm_deadline();

        if was_active {
            debug!(session = self.session_label(), "Session restarted");
            return;
        }

        let session_id = Uuid::new_v4().to_string();
        info!(
            session = %session_id,
            timeout_secs = self.timeout.as_secs(),
            "Session started"
        );
        self.session_id = Some(session_id.clone());
        let _ = self.notices.send(SessionNotice::Started { session_id });
    }

    /// End the session, cancel the deadline and clear stored credentials
    ///
    /// Safe to call at any time. Credential clearing is best-effort: a
    /// storage failure is logged and the session still ends.
    pub fn end(&mut self) {
        let was_active = std::mem::replace(&mut self.active, false);
        self.cancel_deadline();

        if !self.credentials.clear_tokens() {
            warn!(
                session = self.session_label(),
                "Credentials could not be fully cleared"
            );
        }

        if was_active {
            info!(session = self.session_label(), "Session ended");
            if let Some(session_id) = self.session_id.clone() {
                let _ = self.notices.send(SessionNotice::Ended { session_id });
            }
        }
    }

    /// Record user activity, pushing the deadline out by a full timeout
    ///
    /// Only the timestamp is updated while inactive; no deadline is armed.
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();

        if self.active {
            self.arm_deadline();
            debug!(session = self.session_label(), "Activity recorded");
        }
    }

    /// Check whether the session is still valid
    ///
    /// Returns `false` if inactive. An expired credential or an elapsed
    /// inactivity timeout expires the session and returns `false`.
    pub fn check_validity(&mut self) -> bool {
        if !self.active {
            return false;
        }

        if self.expiry.is_expired() {
            self.expire(ExpiryCause::CredentialExpired);
            return false;
        }

        if self.last_activity.elapsed() >= self.timeout {
            self.expire(ExpiryCause::Inactivity);
            return false;
        }

        true
    }

    /// Handle a deadline event delivered by the owning context
    ///
    /// Returns `true` if the deadline was current and expired the session.
    pub fn handle_deadline(&mut self, generation: u64) -> bool {
        if !self.active || generation != self.generation {
            debug!(
                generation,
                current = self.generation,
                "Discarding stale session deadline"
            );
            return false;
        }

        self.expire(ExpiryCause::Inactivity);
        true
    }

    /// Get current session state
    pub fn state(&self) -> SessionState {
        if self.active {
            SessionState::Active
        } else {
            SessionState::Inactive
        }
    }

    /// Whether a session is active
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Identifier of the current (or last) session
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Inactivity timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Change the inactivity timeout, re-arming the deadline if active
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
        if self.active {
            self.arm_deadline();
        }
    }

    /// Time left before the inactivity deadline (only while active)
    pub fn time_remaining(&self) -> Option<Duration> {
        self.active
            .then(|| self.timeout.saturating_sub(self.last_activity.elapsed()))
    }

    /// Generation of the armed deadline, if any
    pub fn pending_deadline(&self) -> Option<u64> {
        self.deadline.as_ref().map(|deadline| deadline.generation)
    }

    /// Credential expiry tracker
    pub fn expiry(&self) -> &ExpiryTracker {
        &self.expiry
    }

    /// Mutable credential expiry tracker, for setting or refreshing expiry
    pub fn expiry_mut(&mut self) -> &mut ExpiryTracker {
        &mut self.expiry
    }

    /// Credential store cleared on session end
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Capture a snapshot for display
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            state: self.state(),
            timeout_secs: self.timeout.as_secs(),
            idle_secs: self.last_activity.elapsed().as_secs(),
            remaining_secs: self.time_remaining().map(|d| d.as_secs()),
            credential: ExpiryStatus::from_tracker(&self.expiry, Utc::now()),
        }
    }

    /// Shared expiry path; only an active session can expire
    fn expire(&mut self, cause: ExpiryCause) {
        if !self.active {
            return;
        }

        warn!(session = self.session_label(), cause = %cause, "Session expired");
        self.end();

        if let Some(session_id) = self.session_id.clone() {
            let _ = self.notices.send(SessionNotice::Expired { session_id, cause });
        }
    }

    /// Replace any armed deadline with one `timeout` after the last activity
    fn arm_deadline(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.deadline = None;

        let Some(deadline_at) = self.last_activity.checked_add(self.timeout) else {
            debug!(
                session = self.session_label(),
                "Timeout too large to schedule, relying on validity checks"
            );
            return;
        };

        let generation = self.generation;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline_at).await;
            let _ = events.send(LifecycleEvent::DeadlineElapsed { generation });
        });

        self.deadline = Some(Deadline { generation, task });
    }

    fn cancel_deadline(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.deadline = None;
    }

    fn session_label(&self) -> &str {
        self.session_id.as_deref().unwrap_or("-")
    }
}
