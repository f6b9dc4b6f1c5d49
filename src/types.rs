use crate::watchdog::ActivityTracker;
use ethers::types::{H256, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Everything the watchdog knows about the vault it protects
///
/// Created once at startup from the gateway's seed values and owned by the
/// watchdog loop for the whole run. `triggered` only ever moves from `false`
/// to `true`.
#[derive(Debug, Clone)]
pub struct VaultState {
    /// Last-known activity timestamp and the inactivity window
    pub activity: ActivityTracker,
    /// Set once the fallback transfer has been confirmed
    triggered: bool,
}

impl VaultState {
    pub fn new(last_activity_time: u64, inactivity_threshold: Duration) -> Self {
        Self {
            activity: ActivityTracker::new(last_activity_time, inactivity_threshold),
            triggered: false,
        }
    }

    pub fn triggered(&self) -> bool {
        self.triggered
    }

    /// Latch the trigger guard. There is no way to clear it again.
    pub(crate) fn mark_triggered(&mut self) {
        self.triggered = true;
    }
}

/// Latest block as observed on one polling iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub block_number: u64,
    /// Unix timestamp (seconds) of the block
    pub block_timestamp: u64,
}

/// A successful vault execution found on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LivenessEvent {
    pub block_number: u64,
    pub tx_hash: Option<H256>,
}

/// Highest block number already covered by a successful scan
///
/// Only the event scanner moves it, and only forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCursor(u64);

impl ScanCursor {
    pub fn new(block: u64) -> Self {
        Self(block)
    }

    pub fn block(&self) -> u64 {
        self.0
    }

    /// First block of the next scan range
    pub fn next_from(&self) -> u64 {
        self.0.saturating_add(1)
    }

    pub(crate) fn advance_to(&mut self, block: u64) {
        debug_assert!(block >= self.0, "scan cursor must never rewind");
        self.0 = self.0.max(block);
    }
}

/// Receipt data for a confirmed fallback transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferConfirmation {
    pub tx_hash: H256,
    pub block_number: Option<u64>,
    /// Amount moved to the beneficiary (wei)
    pub amount: U256,
}

/// Failures reported by a ledger gateway
///
/// All of these are treated as transient by the watchdog loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("gateway call timed out after {0:?}")]
    Timeout(Duration),

    #[error("transaction reverted: {0}")]
    Reverted(String),

    /// A transaction was broadcast earlier and has no receipt yet
    #[error("transaction {tx_hash:?} broadcast but not yet confirmed")]
    Unconfirmed { tx_hash: H256 },
}

/// Errors raised by the watchdog core
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchdogError {
    /// The ledger reported a time earlier than the recorded last activity
    #[error("block timestamp {current} is earlier than last activity {last_activity}")]
    InvalidTimeOrdering { current: u64, last_activity: u64 },

    /// A scan was requested over a range that does not continue the cursor
    #[error("invalid scan range [{from}, {to}] for cursor at block {cursor}")]
    InvalidScanRange { from: u64, to: u64, cursor: u64 },

    /// The fallback transfer kept failing past the configured attempt cap
    #[error("fallback transfer failed {attempts} times, last error: {last_error}")]
    TriggerAttemptsExhausted { attempts: u32, last_error: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl WatchdogError {
    /// Whether the watchdog loop must stop instead of retrying
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WatchdogError::InvalidScanRange { .. } | WatchdogError::TriggerAttemptsExhausted { .. }
        )
    }
}
