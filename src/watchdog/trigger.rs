//! Trigger Executor
//!
//! Submits the fallback transfer once the inactivity window has passed.
//! The ledger does not deduplicate trigger intent, so the executor checks
//! the vault's `triggered` guard before every submission and only latches
//! it after a confirmed transfer.

use crate::{GatewayError, TransferConfirmation, VaultState, l1::LedgerGateway};
use tracing::{error, info, warn};

/// Outcome of a single `fire` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The transfer was confirmed by this call
    Submitted(TransferConfirmation),
    /// A previous call already confirmed the transfer; the gateway was not contacted
    AlreadyTriggered,
    /// Submission failed; the guard is still open and a later call may retry
    Failed(GatewayError),
}

/// Fallback transfer executor
///
/// Tracks failed attempts so the loop can stop retrying a transfer that
/// keeps failing for a non-transient reason. A transfer that was broadcast
/// and is still waiting for its receipt is not counted as a failure.
#[derive(Debug, Default)]
pub struct TriggerExecutor {
    failed_attempts: u32,
    last_error: Option<GatewayError>,
}

impl TriggerExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn last_error(&self) -> Option<&GatewayError> {
        self.last_error.as_ref()
    }

    /// Submit the fallback transfer unless it has already been confirmed
    ///
    /// # Arguments
    /// * `gateway` - Gateway used for the submission
    /// * `vault` - Vault state; `triggered` is set only on `Submitted`
    pub async fn fire<G: LedgerGateway + ?Sized>(
        &mut self,
        gateway: &G,
        vault: &mut VaultState,
    ) -> TriggerOutcome {
        if vault.triggered() {
            return TriggerOutcome::AlreadyTriggered;
        }

        info!(
            "Inactivity window exceeded (last activity {}), submitting fallback transfer",
            vault.activity.last_activity_time()
        );

        match gateway.submit_fallback_transfer().await {
            Ok(confirmation) => {
                vault.mark_triggered();
                info!(
                    "Fallback transfer confirmed: tx {:?}, amount {}",
                    confirmation.tx_hash, confirmation.amount
                );
                TriggerOutcome::Submitted(confirmation)
            }
            // Still waiting on an earlier broadcast; nothing new was sent
            Err(e @ GatewayError::Unconfirmed { .. }) => {
                warn!("Fallback transfer pending: {}", e);
                self.last_error = Some(e.clone());
                TriggerOutcome::Failed(e)
            }
            Err(e) => {
                self.failed_attempts += 1;
                error!(
                    "Fallback transfer attempt {} failed: {}",
                    self.failed_attempts, e
                );
                self.last_error = Some(e.clone());
                TriggerOutcome::Failed(e)
            }
        }
    }
}
