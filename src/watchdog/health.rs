//! Health Reporting
//!
//! The watchdog publishes a point-in-time [`HealthSnapshot`] after every
//! iteration so an operator can tell "healthy and waiting" from "degraded
//! by transport errors" from "already triggered". The API server reads the
//! same handle.

use crate::watchdog::Phase;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Seeding has not completed yet
    Starting,
    /// Last iteration reached the ledger and evaluated the window
    Healthy,
    /// Recent gateway calls are failing; the loop is backing off
    Degraded,
    /// The fallback transfer has been confirmed
    Triggered,
    /// The loop hit a fatal condition and stopped
    Failed,
    /// The loop was cancelled
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: HealthStatus,
    /// Loop phase at the time of the last update
    pub phase: Phase,
    pub last_successful_poll: Option<DateTime<Utc>>,
    pub last_block: Option<u64>,
    pub last_activity_time: Option<u64>,
    pub inactivity_threshold_secs: Option<u64>,
    pub elapsed_inactivity_secs: Option<u64>,
    pub consecutive_failures: u32,
    pub trigger_attempts: u32,
    pub triggered: bool,
    pub last_error: Option<String>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            status: HealthStatus::Starting,
            phase: Phase::Polling,
            last_successful_poll: None,
            last_block: None,
            last_activity_time: None,
            inactivity_threshold_secs: None,
            elapsed_inactivity_secs: None,
            consecutive_failures: 0,
            trigger_attempts: 0,
            triggered: false,
            last_error: None,
        }
    }
}

/// Cloneable handle to the shared health snapshot
#[derive(Debug, Clone, Default)]
pub struct HealthHandle {
    inner: Arc<RwLock<HealthSnapshot>>,
}

impl HealthHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        self.inner.read().await.clone()
    }

    pub async fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut HealthSnapshot),
    {
        let mut snapshot = self.inner.write().await;
        f(&mut snapshot);
    }
}
