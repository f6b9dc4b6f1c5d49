//! Timeout Evaluator
//!
//! Decides whether the vault has been inactive for longer than its window.
//! Pure functions; nothing here touches the gateway or mutates state.

use crate::{ChainSnapshot, VaultState, WatchdogError};
use std::time::Duration;

/// Result of comparing the chain's clock to the vault's last activity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Inactivity so far, clamped to zero on an ordering anomaly
    pub elapsed: Duration,
    pub expired: bool,
    /// Set when the block timestamp was earlier than the last activity
    pub anomaly: Option<WatchdogError>,
}

/// Evaluate the snapshot against the vault state
///
/// A block timestamp earlier than the recorded activity never expires the
/// window: elapsed time is clamped to zero and the anomaly is returned for
/// reporting.
pub fn evaluate(snapshot: &ChainSnapshot, vault: &VaultState) -> Evaluation {
    let threshold = vault.activity.inactivity_threshold();
    match vault.activity.elapsed_since(snapshot.block_timestamp) {
        Ok(elapsed) => Evaluation {
            elapsed,
            expired: elapsed > threshold,
            anomaly: None,
        },
        Err(err) => Evaluation {
            elapsed: Duration::ZERO,
            expired: false,
            anomaly: Some(err),
        },
    }
}

/// `true` iff inactivity is strictly greater than the threshold
pub fn has_expired(snapshot: &ChainSnapshot, vault: &VaultState) -> bool {
    evaluate(snapshot, vault).expired
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    fn at(block_timestamp: u64) -> ChainSnapshot {
        ChainSnapshot {
            block_number: 100,
            block_timestamp,
        }
    }

    #[test]
    fn test_one_second_past_threshold_expires() {
        let vault = VaultState::new(1000, DAY);
        assert!(has_expired(&at(1000 + 86_401), &vault));
    }

    #[test]
    fn test_exactly_at_threshold_does_not_expire() {
        let vault = VaultState::new(1000, DAY);
        assert!(!has_expired(&at(1000 + 86_400), &vault));
    }

    #[test]
    fn test_reports_elapsed_inactivity() {
        let vault = VaultState::new(1000, DAY);
        let evaluation = evaluate(&at(4600), &vault);

        assert_eq!(evaluation.elapsed, Duration::from_secs(3600));
        assert!(!evaluation.expired);
        assert!(evaluation.anomaly.is_none());
    }

    #[test]
    fn test_regressed_timestamp_is_clamped_and_reported() {
        // Would be "expired" for any threshold if the subtraction wrapped
        let vault = VaultState::new(1000, Duration::from_secs(1));
        let evaluation = evaluate(&at(900), &vault);

        assert_eq!(evaluation.elapsed, Duration::ZERO);
        assert!(!evaluation.expired);
        assert!(matches!(
            evaluation.anomaly,
            Some(WatchdogError::InvalidTimeOrdering {
                current: 900,
                last_activity: 1000
            })
        ));
    }
}
