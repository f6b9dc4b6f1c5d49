//! Ledger Gateway Interface
//!
//! The watchdog never talks to the chain directly. Everything it needs,
//! reads and writes alike, goes through [`LedgerGateway`], so the loop can
//! be driven by the ethers client in production and by scripted gateways
//! in tests.

use crate::{
    ChainSnapshot, GatewayError, LivenessEvent, TransferConfirmation, config::WatchdogConfig,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Query/command surface of the remote ledger and its contracts
///
/// Every operation returns a `Result`; callers are expected to branch on it.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Latest block number and its timestamp
    async fn get_latest_block(&self) -> Result<ChainSnapshot, GatewayError>;

    /// Inactivity window configured on the module contract
    async fn get_inactivity_threshold(&self) -> Result<Duration, GatewayError>;

    /// Canonical last-activity timestamp held by the module contract
    async fn get_last_activity_time(&self) -> Result<u64, GatewayError>;

    /// Vault executions in the inclusive block range `[from_block, to_block]`
    ///
    /// Must fail rather than return a partial result.
    async fn scan_liveness_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LivenessEvent>, GatewayError>;

    /// Move the vault's funds to the beneficiary
    async fn submit_fallback_transfer(&self) -> Result<TransferConfirmation, GatewayError>;

    /// Ask the module contract to refresh its own last-activity value
    async fn record_activity_ping(&self) -> Result<(), GatewayError>;
}

#[async_trait]
impl<G: LedgerGateway + ?Sized> LedgerGateway for Arc<G> {
    async fn get_latest_block(&self) -> Result<ChainSnapshot, GatewayError> {
        (**self).get_latest_block().await
    }

    async fn get_inactivity_threshold(&self) -> Result<Duration, GatewayError> {
        (**self).get_inactivity_threshold().await
    }

    async fn get_last_activity_time(&self) -> Result<u64, GatewayError> {
        (**self).get_last_activity_time().await
    }

    async fn scan_liveness_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LivenessEvent>, GatewayError> {
        (**self).scan_liveness_events(from_block, to_block).await
    }

    async fn submit_fallback_transfer(&self) -> Result<TransferConfirmation, GatewayError> {
        (**self).submit_fallback_transfer().await
    }

    async fn record_activity_ping(&self) -> Result<(), GatewayError> {
        (**self).record_activity_ping().await
    }
}

/// Gateway wrapper that bounds every call with a timeout
///
/// An expired call surfaces as [`GatewayError::Timeout`]. The fallback
/// transfer has its own, longer limit because it covers waiting for the
/// receipt, not just one request.
pub struct TimedGateway<G> {
    inner: G,
    limit: Duration,
    submit_limit: Duration,
}

impl<G> TimedGateway<G> {
    /// Bound every call, the transfer included, by `limit`
    pub fn new(inner: G, limit: Duration) -> Self {
        Self {
            inner,
            limit,
            submit_limit: limit,
        }
    }

    /// Use `request_timeout` for reads and `confirm_timeout` for the transfer
    pub fn from_config(inner: G, config: &WatchdogConfig) -> Self {
        Self::new(inner, config.request_timeout()).with_submit_limit(config.confirm_timeout())
    }

    pub fn with_submit_limit(mut self, limit: Duration) -> Self {
        self.submit_limit = limit;
        self
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = Result<T, GatewayError>>,
    {
        bounded_by(self.limit, call).await
    }
}

async fn bounded_by<T, F>(limit: Duration, call: F) -> Result<T, GatewayError>
where
    F: std::future::Future<Output = Result<T, GatewayError>>,
{
    match timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(limit)),
    }
}

#[async_trait]
impl<G: LedgerGateway> LedgerGateway for TimedGateway<G> {
    async fn get_latest_block(&self) -> Result<ChainSnapshot, GatewayError> {
        self.bounded(self.inner.get_latest_block()).await
    }

    async fn get_inactivity_threshold(&self) -> Result<Duration, GatewayError> {
        self.bounded(self.inner.get_inactivity_threshold()).await
    }

    async fn get_last_activity_time(&self) -> Result<u64, GatewayError> {
        self.bounded(self.inner.get_last_activity_time()).await
    }

    async fn scan_liveness_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LivenessEvent>, GatewayError> {
        self.bounded(self.inner.scan_liveness_events(from_block, to_block))
            .await
    }

    async fn submit_fallback_transfer(&self) -> Result<TransferConfirmation, GatewayError> {
        bounded_by(self.submit_limit, self.inner.submit_fallback_transfer()).await
    }

    async fn record_activity_ping(&self) -> Result<(), GatewayError> {
        self.bounded(self.inner.record_activity_ping()).await
    }
}
