//! Lifecycle worker
//!
//! [`LifecycleWorker`] is the single owner of one [`InactivitySession`] and
//! one [`ForegroundLockGate`]. It runs as a tokio task, applying commands
//! from any number of [`LifecycleHandle`]s and routing deadline and
//! challenge events back to the objects that started them. Every mutation
//! happens on this one task, in arrival order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use warden_core::{Authenticator, CredentialStore, ExpiryTracker};

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, Result};
use crate::events::{event_channel, EventReceiver, LifecycleEvent, LockNotice, SessionNotice};
use crate::lock_gate::ForegroundLockGate;
use crate::session::{InactivitySession, SessionSnapshot};

/// Combined view of the session and the lock gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleSnapshot {
    pub session: SessionSnapshot,
    pub locked: bool,
    pub lock_enabled: bool,
    /// Session valid and gate unlocked
    pub allowed: bool,
}

enum Command {
    StartSession,
    EndSession,
    RecordActivity,
    CheckValidity { reply: oneshot::Sender<bool> },
    SetSessionTimeout(Duration),
    SetExpiry(DateTime<Utc>),
    ShouldRefresh { reply: oneshot::Sender<bool> },
    EnableLock,
    DisableLock,
    SetLockDelay(Duration),
    EnteredBackground,
    WillEnterForeground,
    RequestUnlock,
    IsAllowed { reply: oneshot::Sender<bool> },
    Snapshot { reply: oneshot::Sender<LifecycleSnapshot> },
    Shutdown,
}

/// Owner task for a session and its lock gate
pub struct LifecycleWorker {
    session: InactivitySession,
    gate: ForegroundLockGate,
    commands: mpsc::UnboundedReceiver<Command>,
    events: EventReceiver,
}

impl LifecycleWorker {
    /// Build the session and gate from `config` and run them on a new task
    ///
    /// Returns a handle for driving the lifecycle and the worker's join
    /// handle. The worker stops on [`LifecycleHandle::shutdown`] or once
    /// every handle has been dropped.
    pub fn spawn(
        config: &LifecycleConfig,
        credentials: CredentialStore,
        authenticator: Arc<dyn Authenticator>,
    ) -> (LifecycleHandle, JoinHandle<()>) {
        let (events_tx, events_rx) = event_channel();

        let session = InactivitySession::new(
            credentials,
            ExpiryTracker::new(config.refresh_buffer()),
            config.session_timeout(),
            events_tx.clone(),
        );
        let gate = ForegroundLockGate::new(authenticator, events_tx)
            .with_lock_delay(config.lock_delay())
            .with_unlock_reason(config.unlock_reason.clone());

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let handle = LifecycleHandle {
            commands: commands_tx,
            session_notices: session.notice_sender(),
            lock_notices: gate.notice_sender(),
        };

        let worker = Self {
            session,
            gate,
            commands: commands_rx,
            events: events_rx,
        };

        (handle, tokio::spawn(worker.run()))
    }

    async fn run(mut self) {
        info!(
            timeout_secs = self.session.timeout().as_secs(),
            lock_delay_secs = self.gate.lock_delay().as_secs(),
            "Lifecycle worker started"
        );

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = self.events.recv() => self.handle_event(event),
            }
        }

        info!("Lifecycle worker stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartSession => self.session.start(),
            Command::EndSession => self.session.end(),
            Command::RecordActivity => self.session.record_activity(),
            Command::CheckValidity { reply } => {
                let _ = reply.send(self.session.check_validity());
            }
            Command::SetSessionTimeout(timeout) => self.session.set_timeout(timeout),
            Command::SetExpiry(expiry) => self.session.expiry_mut().set_expiry(expiry),
            Command::ShouldRefresh { reply } => {
                let _ = reply.send(self.session.expiry().should_refresh());
            }
            Command::EnableLock => self.gate.enable(),
            Command::DisableLock => self.gate.disable(),
            Command::SetLockDelay(delay) => self.gate.set_lock_delay(delay),
            Command::EnteredBackground => self.gate.on_entered_background(),
            Command::WillEnterForeground => self.gate.on_will_enter_foreground(),
            Command::RequestUnlock => self.gate.request_unlock(),
            Command::IsAllowed { reply } => {
                let _ = reply.send(self.is_allowed());
            }
            Command::Snapshot { reply } => {
                let allowed = self.is_allowed();
                let _ = reply.send(LifecycleSnapshot {
                    session: self.session.snapshot(),
                    locked: self.gate.is_locked(),
                    lock_enabled: self.gate.is_enabled(),
                    allowed,
                });
            }
            Command::Shutdown => {}
        }
    }

    fn handle_event(&mut self, event: LifecycleEvent) {
        debug!(?event, "Lifecycle event");
        match event {
            LifecycleEvent::DeadlineElapsed { generation } => {
                self.session.handle_deadline(generation);
            }
            LifecycleEvent::ChallengeResolved {
                generation,
                outcome,
            } => {
                self.gate.handle_challenge(generation, outcome);
            }
        }
    }

    fn is_allowed(&mut self) -> bool {
        self.session.check_validity() && !self.gate.is_locked()
    }
}

/// Cloneable handle to a running [`LifecycleWorker`]
///
/// Fire-and-forget methods return once the command is queued; queries wait
/// for the worker's answer. Both fail with
/// [`LifecycleError::WorkerStopped`] once the worker is gone.
#[derive(Clone)]
pub struct LifecycleHandle {
    commands: mpsc::UnboundedSender<Command>,
    session_notices: broadcast::Sender<SessionNotice>,
    lock_notices: broadcast::Sender<LockNotice>,
}

impl std::fmt::Debug for LifecycleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHandle")
            .field("closed", &self.commands.is_closed())
            .finish()
    }
}

impl LifecycleHandle {
    /// Subscribe to session notices
    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionNotice> {
        self.session_notices.subscribe()
    }

    /// Subscribe to lock notices
    pub fn subscribe_lock(&self) -> broadcast::Receiver<LockNotice> {
        self.lock_notices.subscribe()
    }

    /// Start a session (login succeeded)
    pub fn start_session(&self) -> Result<()> {
        self.send(Command::StartSession)
    }

    /// End the session and clear stored credentials (logout)
    pub fn end_session(&self) -> Result<()> {
        self.send(Command::EndSession)
    }

    /// Record user activity
    pub fn record_activity(&self) -> Result<()> {
        self.send(Command::RecordActivity)
    }

    /// Change the inactivity timeout
    pub fn set_session_timeout(&self, timeout: Duration) -> Result<()> {
        self.send(Command::SetSessionTimeout(timeout))
    }

    /// Set the credential expiry
    pub fn set_expiry(&self, expiry: DateTime<Utc>) -> Result<()> {
        self.send(Command::SetExpiry(expiry))
    }

    /// Enable the foreground lock
    pub fn enable_lock(&self) -> Result<()> {
        self.send(Command::EnableLock)
    }

    /// Disable the foreground lock, unlocking if locked
    pub fn disable_lock(&self) -> Result<()> {
        self.send(Command::DisableLock)
    }

    /// Change the lock delay
    pub fn set_lock_delay(&self, delay: Duration) -> Result<()> {
        self.send(Command::SetLockDelay(delay))
    }

    /// The application moved to the background
    pub fn entered_background(&self) -> Result<()> {
        self.send(Command::EnteredBackground)
    }

    /// The application is about to return to the foreground
    pub fn will_enter_foreground(&self) -> Result<()> {
        self.send(Command::WillEnterForeground)
    }

    /// Retry the unlock challenge while locked
    pub fn request_unlock(&self) -> Result<()> {
        self.send(Command::RequestUnlock)
    }

    /// Stop the worker; pending timers and challenges are cancelled
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    /// Check session validity, expiring it if overdue
    pub async fn check_validity(&self) -> Result<bool> {
        self.query(|reply| Command::CheckValidity { reply }).await
    }

    /// Whether the credential is due for refresh
    pub async fn should_refresh(&self) -> Result<bool> {
        self.query(|reply| Command::ShouldRefresh { reply }).await
    }

    /// Whether the user may act: session valid and gate unlocked
    pub async fn is_allowed(&self) -> Result<bool> {
        self.query(|reply| Command::IsAllowed { reply }).await
    }

    /// Capture the combined state
    ///
    /// Runs a validity check first, so an overdue session is reported as
    /// expired.
    pub async fn snapshot(&self) -> Result<LifecycleSnapshot> {
        self.query(|reply| Command::Snapshot { reply }).await
    }

    /// Refresh the credential if it is due
    ///
    /// `refresh` runs on the caller's task, so a slow refresh never stalls
    /// the worker. It is invoked at most once; on success the returned
    /// expiry is applied. The outer result reports a stopped worker, the
    /// inner one carries the refresh outcome with its error unchanged.
    pub async fn refresh_if_needed<F, Fut, E>(
        &self,
        refresh: F,
    ) -> Result<std::result::Result<bool, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<DateTime<Utc>, E>>,
    {
        if !self.should_refresh().await? {
            return Ok(Ok(false));
        }

        match refresh().await {
            Ok(expiry) => {
                self.set_expiry(expiry)?;
                Ok(Ok(true))
            }
            Err(e) => Ok(Err(e)),
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| LifecycleError::WorkerStopped)
    }

    async fn query<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response.await.map_err(|_| LifecycleError::WorkerStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{AuthMethod, MemoryStorage, StaticAuthenticator};

    fn spawn_worker(config: &LifecycleConfig) -> (LifecycleHandle, JoinHandle<()>) {
        let storage = Arc::new(MemoryStorage::new("com.warden.tests.worker"));
        let auth = Arc::new(StaticAuthenticator::approving(AuthMethod::Face));
        LifecycleWorker::spawn(config, CredentialStore::new(storage), auth)
    }

    #[tokio::test]
    async fn test_not_allowed_before_start() {
        let (handle, _worker) = spawn_worker(&LifecycleConfig::default());
        assert!(!handle.is_allowed().await.unwrap());
        assert!(handle.should_refresh().await.unwrap());
    }

    #[tokio::test]
    async fn test_allowed_with_valid_session() {
        let (handle, _worker) = spawn_worker(&LifecycleConfig::default());
        handle
            .set_expiry(Utc::now() + chrono::Duration::seconds(3600))
            .unwrap();
        handle.start_session().unwrap();

        assert!(handle.is_allowed().await.unwrap());
        assert!(!handle.should_refresh().await.unwrap());

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.allowed);
        assert!(!snapshot.locked);
        assert!(!snapshot.lock_enabled);
    }

    #[tokio::test]
    async fn test_refresh_if_needed_through_handle() {
        let (handle, _worker) = spawn_worker(&LifecycleConfig::default());
        let new_expiry = Utc::now() + chrono::Duration::seconds(3600);

        let refreshed = handle
            .refresh_if_needed(move || async move { Ok::<_, String>(new_expiry) })
            .await
            .unwrap();
        assert_eq!(refreshed, Ok(true));

        let refreshed = handle
            .refresh_if_needed(|| async { Err::<DateTime<Utc>, _>("not called".to_string()) })
            .await
            .unwrap();
        assert_eq!(refreshed, Ok(false));
    }

    #[tokio::test]
    async fn test_refresh_error_kept_apart_from_worker_errors() {
        let (handle, worker) = spawn_worker(&LifecycleConfig::default());

        let outcome = handle
            .refresh_if_needed(|| async { Err::<DateTime<Utc>, _>("token revoked") })
            .await
            .unwrap();
        assert_eq!(outcome, Err("token revoked"));
        assert!(handle.should_refresh().await.unwrap());

        handle.shutdown().unwrap();
        worker.await.unwrap();

        let mut called = false;
        let result = handle
            .refresh_if_needed(|| {
                called = true;
                async { Ok::<_, &str>(Utc::now()) }
            })
            .await;
        assert!(matches!(result, Err(LifecycleError::WorkerStopped)));
        assert!(!called);
    }

    #[tokio::test]
    async fn test_shutdown_stops_worker() {
        let (handle, worker) = spawn_worker(&LifecycleConfig::default());
        handle.shutdown().unwrap();
        worker.await.unwrap();

        assert!(matches!(handle.start_session(), Err(LifecycleError::WorkerStopped)));
        assert!(matches!(
            handle.is_allowed().await,
            Err(LifecycleError::WorkerStopped)
        ));
    }

    #[tokio::test]
    async fn test_dropping_handles_stops_worker() {
        let (handle, worker) = spawn_worker(&LifecycleConfig::default());
        let clone = handle.clone();
        drop(handle);
        assert!(clone.is_allowed().await.is_ok());

        drop(clone);
        worker.await.unwrap();
    }
}
