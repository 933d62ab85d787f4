//! Credential expiry tracking with a proactive refresh window
//!
//! An [`ExpiryTracker`] holds the expiry instant of the current remote
//! credential. A tracker that was never given an expiry is treated as
//! already expired, so a fresh tracker always asks for a refresh.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::DEFAULT_REFRESH_BUFFER_SECS;

/// Tracks when the current credential expires and when to refresh it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryTracker {
    /// When the credential expires (`None` = never set)
    expiry: Option<DateTime<Utc>>,

    /// How long before `expiry` a refresh becomes due
    refresh_buffer: Duration,
}

impl Default for ExpiryTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_REFRESH_BUFFER_SECS))
    }
}

impl ExpiryTracker {
    /// Create a tracker with no expiry and the given refresh buffer
    pub fn new(refresh_buffer: Duration) -> Self {
        Self {
            expiry: None,
            refresh_buffer,
        }
    }

    /// The current expiry, if one has been set
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expiry
    }

    /// The refresh buffer
    pub fn refresh_buffer(&self) -> Duration {
        self.refresh_buffer
    }

    /// Change the refresh buffer; takes effect on the next check
    pub fn set_refresh_buffer(&mut self, refresh_buffer: Duration) {
        self.refresh_buffer = refresh_buffer;
    }

    /// Overwrite the expiry unconditionally
    pub fn set_expiry(&mut self, expires_at: DateTime<Utc>) {
        self.expiry = Some(expires_at);
    }

    /// Check if the credential has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Check if the credential has expired at the given time
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now >= expiry,
            None => true,
        }
    }

    /// Check if the credential is within the refresh buffer (or expired)
    pub fn should_refresh(&self) -> bool {
        self.should_refresh_at(Utc::now())
    }

    /// Check if the credential is within the refresh buffer at the given time
    pub fn should_refresh_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now >= self.refresh_threshold(expiry),
            None => true,
        }
    }

    /// Time left before the credential expires
    ///
    /// Returns `None` if no expiry has been set, and zero once expired.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.time_until_expiry_at(Utc::now())
    }

    /// Time left before the credential expires, measured from `now`
    pub fn time_until_expiry_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expiry
            .map(|expiry| (expiry - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Time left before a refresh becomes due
    pub fn time_until_refresh(&self) -> Option<Duration> {
        self.time_until_refresh_at(Utc::now())
    }

    /// Time left before a refresh becomes due, measured from `now`
    pub fn time_until_refresh_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expiry.map(|expiry| {
            (self.refresh_threshold(expiry) - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
        })
    }

    /// Refresh the credential if it is within the refresh buffer
    ///
    /// `refresh` performs the actual refresh (usually a network call) and
    /// returns the new expiry. It is invoked at most once, and only when
    /// [`should_refresh`](Self::should_refresh) holds. Its error is returned
    /// unchanged and leaves the current expiry untouched; retrying is up to
    /// the caller.
    ///
    /// Returns `Ok(true)` if a refresh happened, `Ok(false)` if none was due.
    pub async fn refresh_if_needed<F, Fut, E>(&mut self, refresh: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<DateTime<Utc>, E>>,
    {
        if !self.should_refresh() {
            return Ok(false);
        }

        let new_expiry = refresh().await?;
        self.set_expiry(new_expiry);
        debug!("Credential refreshed, new expiry {}", new_expiry);

        Ok(true)
    }

    /// The instant at which a refresh becomes due
    fn refresh_threshold(&self, expiry: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.refresh_buffer)
            .ok()
            .and_then(|buffer| expiry.checked_sub_signed(buffer))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Status information about credential expiry for display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiryStatus {
    /// When the credential expires, if known
    pub expires_at: Option<DateTime<Utc>>,
    /// Seconds until expiry (0 once expired)
    pub secs_until_expiry: Option<u64>,
    /// Whether the credential has expired
    pub is_expired: bool,
    /// Whether a refresh is due
    pub should_refresh: bool,
    /// Human-readable status message
    pub message: String,
}

impl ExpiryStatus {
    /// Create status from a tracker at the given time
    pub fn from_tracker(tracker: &ExpiryTracker, now: DateTime<Utc>) -> Self {
        let is_expired = tracker.is_expired_at(now);
        let should_refresh = tracker.should_refresh_at(now);
        let secs_until_expiry = tracker.time_until_expiry_at(now).map(|d| d.as_secs());

        let message = match (tracker.expiry(), secs_until_expiry) {
            (None, _) => "No credential expiry set - refresh required".to_string(),
            _ if is_expired => "Credential has expired - refresh required".to_string(),
            (_, Some(secs)) if should_refresh => {
                format!("Refresh due: credential expires in {}s", secs)
            }
            (_, Some(secs)) => format!("OK: credential expires in {}s", secs),
            (Some(_), None) => "OK".to_string(),
        };

        Self {
            expires_at: tracker.expiry(),
            secs_until_expiry,
            is_expired,
            should_refresh,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn in_secs(secs: i64) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(secs)
    }

    #[derive(Debug, PartialEq)]
    struct RefreshFailed;

    #[test]
    fn test_defaults() {
        let tracker = ExpiryTracker::default();
        assert_eq!(tracker.expiry(), None);
        assert_eq!(tracker.refresh_buffer(), Duration::from_secs(60));
    }

    #[test]
    fn test_custom_buffer() {
        let tracker = ExpiryTracker::new(Duration::from_secs(120));
        assert_eq!(tracker.refresh_buffer(), Duration::from_secs(120));
    }

    #[test]
    fn test_unset_expiry_is_expired_and_needs_refresh() {
        let tracker = ExpiryTracker::default();
        assert!(tracker.is_expired());
        assert!(tracker.should_refresh());
        assert_eq!(tracker.time_until_expiry(), None);
    }

    #[test]
    fn test_set_expiry_overwrites() {
        let mut tracker = ExpiryTracker::default();
        let first = in_secs(100);
        let second = in_secs(200);
        tracker.set_expiry(first);
        tracker.set_expiry(second);
        assert_eq!(tracker.expiry(), Some(second));
    }

    #[test]
    fn test_past_and_future_expiry() {
        let mut tracker = ExpiryTracker::default();

        tracker.set_expiry(in_secs(-10));
        assert!(tracker.is_expired());
        assert!(tracker.should_refresh());
        assert_eq!(tracker.time_until_expiry(), Some(Duration::ZERO));

        tracker.set_expiry(in_secs(3600));
        assert!(!tracker.is_expired());
        assert!(!tracker.should_refresh());
    }

    #[test]
    fn test_refresh_window_boundaries() {
        let now = Utc::now();
        let expiry = now + chrono::Duration::seconds(3600);

        let mut tracker = ExpiryTracker::new(Duration::from_secs(60));
        tracker.set_expiry(expiry);
        assert!(!tracker.should_refresh_at(now));
        assert!(tracker.should_refresh_at(expiry - chrono::Duration::seconds(60)));
        assert!(!tracker.is_expired_at(expiry - chrono::Duration::seconds(1)));
        assert!(tracker.is_expired_at(expiry));

        tracker.set_refresh_buffer(Duration::from_secs(7200));
        assert!(tracker.should_refresh_at(now));
        assert!(!tracker.is_expired_at(now));
    }

    #[test]
    fn test_buffer_change_applies_immediately() {
        let mut tracker = ExpiryTracker::new(Duration::from_secs(10));
        tracker.set_expiry(in_secs(30));
        assert!(!tracker.should_refresh());

        tracker.set_refresh_buffer(Duration::from_secs(60));
        assert!(tracker.should_refresh());
    }

    #[test]
    fn test_huge_buffer_saturates() {
        let mut tracker = ExpiryTracker::new(Duration::from_secs(u64::MAX));
        tracker.set_expiry(in_secs(3600));
        assert!(tracker.should_refresh());
        assert_eq!(tracker.time_until_refresh_at(Utc::now()), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_refresh_invokes_action_when_due() {
        let mut tracker = ExpiryTracker::default();
        tracker.set_expiry(in_secs(-10));
        let new_expiry = in_secs(7200);
        let calls = Cell::new(0);

        let refreshed = tracker
            .refresh_if_needed(|| async {
                calls.set(calls.get() + 1);
                Ok::<_, RefreshFailed>(new_expiry)
            })
            .await;

        assert_eq!(refreshed, Ok(true));
        assert_eq!(calls.get(), 1);
        assert_eq!(tracker.expiry(), Some(new_expiry));
    }

    #[tokio::test]
    async fn test_refresh_skips_action_when_not_due() {
        let mut tracker = ExpiryTracker::new(Duration::from_secs(60));
        let expiry = in_secs(3600);
        tracker.set_expiry(expiry);
        let calls = Cell::new(0);

        let refreshed = tracker
            .refresh_if_needed(|| async {
                calls.set(calls.get() + 1);
                Ok::<_, RefreshFailed>(Utc::now())
            })
            .await;

        assert_eq!(refreshed, Ok(false));
        assert_eq!(calls.get(), 0);
        assert_eq!(tracker.expiry(), Some(expiry));
    }

    #[tokio::test]
    async fn test_refresh_error_propagates_and_keeps_expiry() {
        let mut tracker = ExpiryTracker::default();
        let expiry = in_secs(5);
        tracker.set_expiry(expiry);

        let result = tracker
            .refresh_if_needed(|| async { Err::<DateTime<Utc>, _>(RefreshFailed) })
            .await;

        assert_eq!(result, Err(RefreshFailed));
        assert_eq!(tracker.expiry(), Some(expiry));
    }

    #[test]
    fn test_status_messages() {
        let now = Utc::now();
        let mut tracker = ExpiryTracker::new(Duration::from_secs(60));

        let status = ExpiryStatus::from_tracker(&tracker, now);
        assert!(status.is_expired);
        assert!(status.message.contains("No credential expiry"));

        tracker.set_expiry(now + chrono::Duration::seconds(30));
        let status = ExpiryStatus::from_tracker(&tracker, now);
        assert!(!status.is_expired);
        assert!(status.should_refresh);
        assert_eq!(status.secs_until_expiry, Some(30));
        assert!(status.message.starts_with("Refresh due"));

        tracker.set_expiry(now + chrono::Duration::seconds(3600));
        let status = ExpiryStatus::from_tracker(&tracker, now);
        assert!(status.message.starts_with("OK"));
    }
}
