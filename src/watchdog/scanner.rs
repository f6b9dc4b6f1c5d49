//! Event Scanner
//!
//! Walks the chain in contiguous block ranges looking for vault executions.
//! The scanner owns the [`ScanCursor`]: a range is only marked as scanned
//! once the gateway has answered for all of it, so a failed query is simply
//! retried from the same block on the next pass.

use crate::{LivenessEvent, ScanCursor, WatchdogError, l1::LedgerGateway};
use tracing::{debug, info};

pub struct EventScanner {
    cursor: ScanCursor,
}

impl EventScanner {
    /// Creates a scanner that resumes after `last_scanned_block`
    pub fn new(last_scanned_block: u64) -> Self {
        Self {
            cursor: ScanCursor::new(last_scanned_block),
        }
    }

    pub fn cursor(&self) -> ScanCursor {
        self.cursor
    }

    /// Scan `[from_block, to_block]` for liveness events
    ///
    /// `from_block` must be the block right after the cursor. An empty range
    /// (`to_block == from_block - 1`) is legal and returns no events without
    /// contacting the gateway.
    ///
    /// # Returns
    /// * `Ok(events)` after which the cursor sits at `to_block`
    /// * `Err(WatchdogError::InvalidScanRange)` if the range does not
    ///   continue the cursor
    /// * `Err(WatchdogError::Gateway)` if the query failed; the cursor is untouched
    pub async fn scan<G: LedgerGateway + ?Sized>(
        &mut self,
        gateway: &G,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LivenessEvent>, WatchdogError> {
        let cursor = self.cursor.block();
        if from_block != self.cursor.next_from() || to_block < cursor {
            return Err(WatchdogError::InvalidScanRange {
                from: from_block,
                to: to_block,
                cursor,
            });
        }

        if to_block == cursor {
            return Ok(Vec::new());
        }

        let events = gateway.scan_liveness_events(from_block, to_block).await?;
        self.cursor.advance_to(to_block);

        if events.is_empty() {
            debug!("Scanned blocks {}..={}: no liveness events", from_block, to_block);
        } else {
            info!(
                "Scanned blocks {}..={}: {} liveness event(s)",
                from_block,
                to_block,
                events.len()
            );
        }
        Ok(events)
    }

    /// Scan everything between the cursor and `latest_block`
    pub async fn scan_to<G: LedgerGateway + ?Sized>(
        &mut self,
        gateway: &G,
        latest_block: u64,
    ) -> Result<Vec<LivenessEvent>, WatchdogError> {
        let from = self.cursor.next_from();
        self.scan(gateway, from, latest_block).await
    }
}
