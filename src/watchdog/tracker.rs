//! Activity Tracker
//!
//! Holds the vault's last-known activity timestamp and its inactivity window.

use crate::WatchdogError;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityTracker {
    /// Unix timestamp (seconds); never decreases
    last_activity_time: u64,
    /// Fixed for the lifetime of the run
    inactivity_threshold: Duration,
}

impl ActivityTracker {
    pub fn new(last_activity_time: u64, inactivity_threshold: Duration) -> Self {
        Self {
            last_activity_time,
            inactivity_threshold,
        }
    }

    pub fn last_activity_time(&self) -> u64 {
        self.last_activity_time
    }

    pub fn inactivity_threshold(&self) -> Duration {
        self.inactivity_threshold
    }

    /// Merge an observed activity timestamp
    ///
    /// Older or repeated timestamps are ignored, so recording is idempotent
    /// and the result does not depend on call order.
    ///
    /// # Returns
    /// `true` if the last-activity time moved forward
    pub fn record_activity(&mut self, timestamp: u64) -> bool {
        if timestamp > self.last_activity_time {
            self.last_activity_time = timestamp;
            true
        } else {
            false
        }
    }

    /// Time elapsed between the last activity and `current_timestamp`
    ///
    /// # Returns
    /// * `Err(WatchdogError::InvalidTimeOrdering)` if `current_timestamp` is
    ///   earlier than the last activity
    pub fn elapsed_since(&self, current_timestamp: u64) -> Result<Duration, WatchdogError> {
        current_timestamp
            .checked_sub(self.last_activity_time)
            .map(Duration::from_secs)
            .ok_or(WatchdogError::InvalidTimeOrdering {
                current: current_timestamp,
                last_activity: self.last_activity_time,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    #[test]
    fn test_record_keeps_maximum_in_any_order() {
        let orders: [&[u64]; 3] = [&[10, 30, 20], &[30, 20, 10], &[20, 10, 30, 30]];

        for order in orders {
            let mut tracker = ActivityTracker::new(0, DAY);
            for &ts in order {
                tracker.record_activity(ts);
            }
            assert_eq!(tracker.last_activity_time(), 30, "order {:?}", order);
        }
    }

    #[test]
    fn test_record_reports_forward_movement_only() {
        let mut tracker = ActivityTracker::new(1500, DAY);

        assert!(!tracker.record_activity(1500));
        assert!(!tracker.record_activity(1000));
        assert!(tracker.record_activity(2000));
        assert_eq!(tracker.last_activity_time(), 2000);
    }

    #[test]
    fn test_elapsed_since() {
        let tracker = ActivityTracker::new(1000, DAY);

        assert_eq!(tracker.elapsed_since(1000).unwrap(), Duration::ZERO);
        assert_eq!(tracker.elapsed_since(1060).unwrap(), Duration::from_secs(60));
    }

    #[test]
    fn test_elapsed_before_last_activity_is_an_ordering_error() {
        let tracker = ActivityTracker::new(1000, DAY);

        assert_eq!(
            tracker.elapsed_since(999),
            Err(WatchdogError::InvalidTimeOrdering {
                current: 999,
                last_activity: 1000,
            })
        );
    }
}
