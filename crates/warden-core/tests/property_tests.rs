//! Property-based tests for warden-core using proptest
//!
//! These tests verify the expiry and refresh-window invariants for
//! arbitrary expiry offsets and buffers.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use warden_core::ExpiryTracker;

fn fixed_now() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

// Offsets within roughly +/- 10 years, buffers up to roughly 20 years
fn arb_offset_secs() -> impl Strategy<Value = i64> {
    -315_360_000i64..315_360_000i64
}

fn arb_buffer_secs() -> impl Strategy<Value = u64> {
    0u64..630_720_000u64
}

proptest! {
    #[test]
    fn expired_iff_now_reaches_expiry(offset in arb_offset_secs(), buffer in arb_buffer_secs()) {
        let now = fixed_now();
        let expiry = now + chrono::Duration::seconds(offset);
        let mut tracker = ExpiryTracker::new(Duration::from_secs(buffer));
        tracker.set_expiry(expiry);

        prop_assert_eq!(tracker.is_expired_at(now), now >= expiry);
    }

    #[test]
    fn refresh_due_iff_within_buffer(offset in arb_offset_secs(), buffer in arb_buffer_secs()) {
        let now = fixed_now();
        let expiry = now + chrono::Duration::seconds(offset);
        let mut tracker = ExpiryTracker::new(Duration::from_secs(buffer));
        tracker.set_expiry(expiry);

        let threshold = expiry - chrono::Duration::seconds(buffer as i64);
        prop_assert_eq!(tracker.should_refresh_at(now), now >= threshold);
    }

    #[test]
    fn expired_implies_refresh_due(offset in arb_offset_secs(), buffer in arb_buffer_secs()) {
        let now = fixed_now();
        let mut tracker = ExpiryTracker::new(Duration::from_secs(buffer));
        tracker.set_expiry(now + chrono::Duration::seconds(offset));

        if tracker.is_expired_at(now) {
            prop_assert!(tracker.should_refresh_at(now));
        }
    }

    #[test]
    fn unset_expiry_is_always_due(buffer in arb_buffer_secs(), offset in arb_offset_secs()) {
        let tracker = ExpiryTracker::new(Duration::from_secs(buffer));
        let now = fixed_now() + chrono::Duration::seconds(offset);

        prop_assert!(tracker.is_expired_at(now));
        prop_assert!(tracker.should_refresh_at(now));
    }
}
