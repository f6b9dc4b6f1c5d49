//! Watchdog Loop Module
//!
//! This module implements the loop that ties the watchdog together. Each
//! iteration walks the same state machine:
//!
//! ```text
//! POLLING -> SCANNING -> EVALUATING -> IDLE | FIRING -> POLLING
//! ```
//!
//! # Iteration
//! 1. Fetch the latest block from the gateway
//! 2. Scan `[cursor + 1, latest]` for vault executions and, if any were
//!    found, re-read the module's canonical last-activity time
//! 3. Compare the block timestamp with the last activity
//! 4. Sleep for the poll interval, or fire the fallback transfer first if
//!    the inactivity window has passed
//!
//! A gateway failure at any step abandons the iteration before evaluation,
//! so a broken connection is never mistaken for inactivity. The loop backs
//! off exponentially and restarts from POLLING; the scan cursor has not
//! moved, so the same range is retried.

use crate::{
    ChainSnapshot, GatewayError, ScanCursor, VaultState, WatchdogError,
    config::WatchdogConfig,
    l1::LedgerGateway,
    watchdog::{
        Backoff, EventScanner, Evaluation, HealthHandle, HealthStatus, TriggerExecutor,
        TriggerOutcome, evaluate,
    },
};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Where the loop currently is in its state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Polling,
    Scanning,
    Evaluating,
    Idle,
    Firing,
}

/// What a completed iteration observed and did
#[derive(Debug, Clone)]
pub struct StepReport {
    pub snapshot: ChainSnapshot,
    pub evaluation: Evaluation,
    /// Present only when the window had expired
    pub trigger: Option<TriggerOutcome>,
}

/// Dead-man's-switch watchdog
///
/// Owns all mutable watchdog state. Nothing else mutates it, so none of it
/// is behind a lock; only the health snapshot is shared.
pub struct Watchdog<G> {
    gateway: G,
    config: WatchdogConfig,
    vault: VaultState,
    scanner: EventScanner,
    trigger: TriggerExecutor,
    backoff: Backoff,
    health: HealthHandle,
    phase: Phase,
    /// Events were found but the canonical last-activity time has not been read yet
    refresh_pending: bool,
    /// Events were found and the module has not been pinged for them yet
    ping_pending: bool,
}

impl<G: LedgerGateway> Watchdog<G> {
    /// Creates a watchdog from already-known state
    ///
    /// # Arguments
    /// * `gateway` - Ledger gateway (wrap it in `TimedGateway` to bound calls)
    /// * `config` - Loop tuning
    /// * `vault` - Seeded vault state
    /// * `cursor_block` - Last block considered already scanned
    /// * `health` - Handle the loop publishes its health to
    pub fn new(
        gateway: G,
        config: WatchdogConfig,
        vault: VaultState,
        cursor_block: u64,
        health: HealthHandle,
    ) -> Self {
        let backoff = Backoff::from_config(&config);
        Self {
            gateway,
            config,
            vault,
            scanner: EventScanner::new(cursor_block),
            trigger: TriggerExecutor::new(),
            backoff,
            health,
            phase: Phase::Polling,
            refresh_pending: false,
            ping_pending: false,
        }
    }

    /// Seed the watchdog from the gateway, retrying until it answers
    ///
    /// Reads the inactivity window, the last activity time, and (unless
    /// `start_block` is given) the latest block. Scanning begins at
    /// `start_block` when set, otherwise right after the latest block.
    ///
    /// # Returns
    /// * `Ok(Some(watchdog))` once seeding succeeded
    /// * `Ok(None)` if `stop` was raised before seeding completed
    pub async fn seed(
        gateway: G,
        config: WatchdogConfig,
        start_block: Option<u64>,
        health: HealthHandle,
        stop: &mut watch::Receiver<bool>,
    ) -> Option<Self> {
        let mut backoff = Backoff::from_config(&config);
        loop {
            if *stop.borrow() {
                health.update(|h| h.status = HealthStatus::Stopped).await;
                return None;
            }

            match read_seed(&gateway, start_block).await {
                Ok((vault, cursor_block)) => {
                    info!(
                        "Watchdog seeded: threshold={:?}, last_activity={}, cursor={}",
                        vault.activity.inactivity_threshold(),
                        vault.activity.last_activity_time(),
                        cursor_block
                    );
                    return Some(Self::new(gateway, config, vault, cursor_block, health));
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    warn!("Seeding failed: {}; retrying in {:?}", e, delay);
                    let failures = backoff.failures();
                    health
                        .update(|h| {
                            h.status = HealthStatus::Degraded;
                            h.consecutive_failures = failures;
                            h.last_error = Some(e.to_string());
                        })
                        .await;
                    if wait_or_stop(delay, stop).await {
                        health.update(|h| h.status = HealthStatus::Stopped).await;
                        return None;
                    }
                }
            }
        }
    }

    pub fn vault(&self) -> &VaultState {
        &self.vault
    }

    pub fn cursor(&self) -> ScanCursor {
        self.scanner.cursor()
    }

    pub fn trigger(&self) -> &TriggerExecutor {
        &self.trigger
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn health(&self) -> &HealthHandle {
        &self.health
    }

    /// Run one POLLING -> SCANNING -> EVALUATING -> IDLE | FIRING pass
    ///
    /// # Returns
    /// * `Ok(report)` if the iteration evaluated the window
    /// * `Err` if a gateway call failed (retry later) or a fatal condition was hit
    pub async fn step(&mut self) -> Result<StepReport, WatchdogError> {
        self.phase = Phase::Polling;
        let snapshot = self.gateway.get_latest_block().await?;
        debug!(
            "Polled block {} at {}",
            snapshot.block_number, snapshot.block_timestamp
        );

        self.phase = Phase::Scanning;
        self.scan(&snapshot).await?;

        self.phase = Phase::Evaluating;
        let evaluation = evaluate(&snapshot, &self.vault);
        if let Some(anomaly) = &evaluation.anomaly {
            warn!("Ordering anomaly at block {}: {}", snapshot.block_number, anomaly);
        }

        if !evaluation.expired {
            self.phase = Phase::Idle;
            debug!(
                "Inactive for {:?} of {:?}",
                evaluation.elapsed,
                self.vault.activity.inactivity_threshold()
            );
            return Ok(StepReport {
                snapshot,
                evaluation,
                trigger: None,
            });
        }

        self.phase = Phase::Firing;
        let outcome = self.trigger.fire(&self.gateway, &mut self.vault).await;
        if let TriggerOutcome::Failed(e) = &outcome {
            let attempts = self.trigger.failed_attempts();
            if attempts >= self.config.max_trigger_attempts {
                return Err(WatchdogError::TriggerAttemptsExhausted {
                    attempts,
                    last_error: e.to_string(),
                });
            }
        }

        Ok(StepReport {
            snapshot,
            evaluation,
            trigger: Some(outcome),
        })
    }

    /// Scan new blocks and fold any detected activity into the vault state
    async fn scan(&mut self, snapshot: &ChainSnapshot) -> Result<(), WatchdogError> {
        let cursor = self.scanner.cursor().block();
        if snapshot.block_number < cursor {
            warn!(
                "Latest block {} is behind scan cursor {}; skipping scan",
                snapshot.block_number, cursor
            );
        } else {
            let events = self
                .scanner
                .scan_to(&self.gateway, snapshot.block_number)
                .await?;
            if !events.is_empty() {
                self.refresh_pending = true;
                self.ping_pending = self.config.ping_on_activity;
            }
        }

        if !self.refresh_pending {
            return Ok(());
        }

        if self.ping_pending {
            self.ping_pending = false;
            if let Err(e) = self.gateway.record_activity_ping().await {
                warn!("Activity ping failed (ignored): {}", e);
            }
        }

        let last_activity = self.gateway.get_last_activity_time().await?;
        self.refresh_pending = false;
        if self.vault.activity.record_activity(last_activity) {
            info!("Vault activity observed, last activity now {}", last_activity);
        } else {
            debug!(
                "Liveness event did not move last activity ({})",
                self.vault.activity.last_activity_time()
            );
        }
        Ok(())
    }

    /// Run until stopped, triggered (with `stop_after_trigger`), or a fatal error
    ///
    /// `stop` is checked at the top of every iteration and while sleeping;
    /// a gateway call already in flight is allowed to finish.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) -> Result<(), WatchdogError> {
        info!(
            "Watchdog running: poll_interval={:?}, threshold={:?}",
            self.config.poll_interval(),
            self.vault.activity.inactivity_threshold()
        );

        loop {
            if *stop.borrow() {
                return self.stopped().await;
            }

            let delay = match self.step().await {
                Ok(report) => {
                    self.backoff.reset();
                    self.publish_report(&report).await;
                    if matches!(report.trigger, Some(TriggerOutcome::Submitted(_)))
                        && self.config.stop_after_trigger
                    {
                        info!("Fallback transfer confirmed; watchdog going dormant");
                        return Ok(());
                    }
                    self.config.poll_interval()
                }
                Err(e) if e.is_fatal() => {
                    error!("Watchdog stopping on fatal error: {}", e);
                    let message = e.to_string();
                    let attempts = self.trigger.failed_attempts();
                    self.health
                        .update(|h| {
                            h.status = HealthStatus::Failed;
                            h.trigger_attempts = attempts;
                            h.last_error = Some(message);
                        })
                        .await;
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    warn!(
                        "Watchdog iteration failed during {:?}: {}; retrying in {:?}",
                        self.phase, e, delay
                    );
                    self.publish_failure(&e).await;
                    delay
                }
            };

            if wait_or_stop(delay, &mut stop).await {
                return self.stopped().await;
            }
        }
    }

    async fn publish_report(&self, report: &StepReport) {
        let vault = &self.vault;
        let attempts = self.trigger.failed_attempts();
        let last_error = match (&report.trigger, &report.evaluation.anomaly) {
            (Some(TriggerOutcome::Failed(e)), _) => Some(e.to_string()),
            (_, Some(anomaly)) => Some(anomaly.to_string()),
            _ => None,
        };
        let status = if vault.triggered() {
            HealthStatus::Triggered
        } else {
            HealthStatus::Healthy
        };

        self.health
            .update(|h| {
                h.status = status;
                h.phase = self.phase;
                h.last_successful_poll = Some(Utc::now());
                h.last_block = Some(report.snapshot.block_number);
                h.last_activity_time = Some(vault.activity.last_activity_time());
                h.inactivity_threshold_secs = Some(vault.activity.inactivity_threshold().as_secs());
                h.elapsed_inactivity_secs = Some(report.evaluation.elapsed.as_secs());
                h.consecutive_failures = 0;
                h.trigger_attempts = attempts;
                h.triggered = vault.triggered();
                h.last_error = last_error;
            })
            .await;
    }

    async fn publish_failure(&self, error: &WatchdogError) {
        let failures = self.backoff.failures();
        let triggered = self.vault.triggered();
        let message = error.to_string();
        self.health
            .update(|h| {
                // A confirmed trigger outranks later transport trouble
                h.status = if triggered {
                    HealthStatus::Triggered
                } else {
                    HealthStatus::Degraded
                };
                h.phase = self.phase;
                h.consecutive_failures = failures;
                h.last_error = Some(message);
            })
            .await;
    }

    async fn stopped(&self) -> Result<(), WatchdogError> {
        info!("Watchdog stop requested");
        self.health
            .update(|h| {
                if h.status != HealthStatus::Triggered {
                    h.status = HealthStatus::Stopped;
                }
            })
            .await;
        Ok(())
    }
}

async fn read_seed<G: LedgerGateway>(
    gateway: &G,
    start_block: Option<u64>,
) -> Result<(VaultState, u64), GatewayError> {
    let threshold = gateway.get_inactivity_threshold().await?;
    let last_activity = gateway.get_last_activity_time().await?;
    let cursor_block = match start_block {
        Some(block) => block.saturating_sub(1),
        None => gateway.get_latest_block().await?.block_number,
    };
    Ok((VaultState::new(last_activity, threshold), cursor_block))
}

/// Sleep for `delay`, waking early if `stop` is raised
///
/// # Returns
/// `true` if the loop should stop
async fn wait_or_stop(delay: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    let timer = sleep(delay);
    tokio::pin!(timer);
    loop {
        tokio::select! {
            _ = &mut timer => return *stop.borrow(),
            changed = stop.changed() => {
                if changed.is_err() {
                    // Sender gone: nobody can ask us to stop any more
                    (&mut timer).await;
                    return false;
                }
                if *stop.borrow() {
                    return true;
                }
            }
        }
    }
}
