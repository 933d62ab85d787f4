//! Authenticator capability used to re-authenticate a locked session
//!
//! Platform integrations (biometrics, device passcode) implement
//! [`Authenticator`]. [`StaticAuthenticator`] is a scripted implementation
//! for tests and headless hosts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Authentication method available on the device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    /// No method can be evaluated
    #[default]
    None,
    /// Face recognition
    Face,
    /// Fingerprint reader
    Fingerprint,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::None => write!(f, "none"),
            AuthMethod::Face => write!(f, "face"),
            AuthMethod::Fingerprint => write!(f, "fingerprint"),
        }
    }
}

/// Trait for user re-authentication backends
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Probe which method is available (no side effects)
    fn available_method(&self) -> AuthMethod;

    /// Ask the user to authenticate
    ///
    /// Resolves once the user responds or the platform gives up.
    /// `Ok(true)` means the user was verified.
    ///
    /// # Arguments
    /// * `reason` - User-facing explanation of why authentication is needed
    async fn challenge(&self, reason: &str) -> Result<bool, AuthError>;
}

/// Authenticator with a fixed capability and scripted outcomes
///
/// Queued outcomes are returned first, in order; once the queue is empty
/// every challenge returns the fallback outcome.
#[derive(Debug)]
pub struct StaticAuthenticator {
    method: AuthMethod,
    fallback: Result<bool, AuthError>,
    queued: Mutex<VecDeque<Result<bool, AuthError>>>,
    delay: Duration,
    challenges: AtomicUsize,
    last_reason: Mutex<Option<String>>,
}

impl StaticAuthenticator {
    fn with_fallback(method: AuthMethod, fallback: Result<bool, AuthError>) -> Self {
        Self {
            method,
            fallback,
            queued: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            challenges: AtomicUsize::new(0),
            last_reason: Mutex::new(None),
        }
    }

    /// Every challenge succeeds
    pub fn approving(method: AuthMethod) -> Self {
        Self::with_fallback(method, Ok(true))
    }

    /// Every challenge is rejected by the user
    pub fn denying(method: AuthMethod) -> Self {
        Self::with_fallback(method, Ok(false))
    }

    /// Every challenge fails with `error`
    pub fn failing(method: AuthMethod, error: AuthError) -> Self {
        Self::with_fallback(method, Err(error))
    }

    /// Delay each challenge by `delay` before resolving
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue an outcome for the next unanswered challenge
    pub fn push_outcome(&self, outcome: Result<bool, AuthError>) {
        if let Ok(mut queued) = self.queued.lock() {
            queued.push_back(outcome);
        }
    }

    /// Number of challenges started so far
    pub fn challenge_count(&self) -> usize {
        self.challenges.load(Ordering::SeqCst)
    }

    /// Reason passed to the most recent challenge
    pub fn last_reason(&self) -> Option<String> {
        self.last_reason.lock().ok().and_then(|reason| reason.clone())
    }

    fn next_outcome(&self) -> Result<bool, AuthError> {
        self.queued
            .lock()
            .ok()
            .and_then(|mut queued| queued.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    fn available_method(&self) -> AuthMethod {
        self.method
    }

    async fn challenge(&self, reason: &str) -> Result<bool, AuthError> {
        self.challenges.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_reason.lock() {
            *last = Some(reason.to_string());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.next_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_outcomes_then_fallback() {
        let auth = StaticAuthenticator::approving(AuthMethod::Face);
        auth.push_outcome(Ok(false));
        auth.push_outcome(Err(AuthError::Cancelled));

        assert_eq!(auth.challenge("first").await, Ok(false));
        assert_eq!(auth.challenge("second").await, Err(AuthError::Cancelled));
        assert_eq!(auth.challenge("third").await, Ok(true));

        assert_eq!(auth.challenge_count(), 3);
        assert_eq!(auth.last_reason().as_deref(), Some("third"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_challenge() {
        let auth = StaticAuthenticator::denying(AuthMethod::Fingerprint)
            .with_delay(Duration::from_secs(5));

        let started = tokio::time::Instant::now();
        assert_eq!(auth.challenge("unlock").await, Ok(false));
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn test_method_display() {
        assert_eq!(AuthMethod::default(), AuthMethod::None);
        assert_eq!(AuthMethod::Face.to_string(), "face");
        assert_eq!(
            StaticAuthenticator::failing(AuthMethod::None, AuthError::Unavailable)
                .available_method(),
            AuthMethod::None
        );
    }
}
