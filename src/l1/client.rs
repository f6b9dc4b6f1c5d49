//! Ethers Gateway Module
//!
//! This module implements [`LedgerGateway`] against a real Ethereum node.
//! Reads go through the dead-man's-switch module contract; liveness is
//! detected from the vault's `ExecutionSuccess` logs; the fallback transfer
//! and the activity ping are signed transactions sent to the module.
//!
//! The gateway remembers the last fallback transfer it broadcast. A later
//! submission first looks up that transaction's receipt, so a transfer that
//! outlived its caller's timeout is confirmed instead of sent twice.
//!
//! # Contracts
//! - **Module**: holds `timeToDie` and `lastTransactionTime`, and moves the
//!   vault's funds to the beneficiary through `transferSafe`
//! - **Safe (vault)**: emits `ExecutionSuccess` for every executed transaction

use crate::{
    ChainSnapshot, GatewayError, LivenessEvent, TransferConfirmation, config::L1Config,
    l1::LedgerGateway,
};
use anyhow::Context;
use async_trait::async_trait;
use ethers::{
    contract::{ContractError, abigen},
    middleware::SignerMiddleware,
    providers::{Http, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, BlockNumber, Filter, H256, TransactionReceipt, U64, U256},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

abigen!(
    DeadmanModule,
    r#"[
        function getTimeToDie() external view returns (uint256)
        function lastTransactionTime() external view returns (uint256)
        function transferSafe(uint96 amount) external
        function updateLastTransactionTime() external
    ]"#
);

/// Event emitted by the vault for every successfully executed transaction
const EXECUTION_SUCCESS_EVENT: &str = "ExecutionSuccess(bytes32,uint256)";

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// A fallback transfer that was broadcast but not yet seen confirmed
#[derive(Debug, Clone, Copy)]
struct Broadcast {
    tx_hash: H256,
    amount: U256,
}

/// Ledger gateway backed by an ethers HTTP provider and a local signing key
pub struct EthersGateway {
    client: Arc<SignerClient>,
    module: DeadmanModule<SignerClient>,
    safe_address: Address,
    /// Held for the whole submission so two transfers never race
    broadcast: Mutex<Option<Broadcast>>,
}

impl EthersGateway {
    /// Connect to the configured RPC endpoint
    ///
    /// The signing key is read from the environment variable named by
    /// `config.signer_key_env`; it never appears in the config file.
    ///
    /// # Returns
    /// * `Err` if an address is malformed, the key is missing or invalid,
    ///   or the RPC URL cannot be parsed
    pub fn connect(config: &L1Config) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .with_context(|| format!("invalid rpc_url {}", config.rpc_url))?;

        let module_address: Address = config
            .module_address
            .parse()
            .with_context(|| format!("invalid module_address {}", config.module_address))?;
        let safe_address: Address = config
            .safe_address
            .parse()
            .with_context(|| format!("invalid safe_address {}", config.safe_address))?;

        let key = std::env::var(&config.signer_key_env).with_context(|| {
            format!("signer key variable {} is not set", config.signer_key_env)
        })?;
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .context("signer key is not a valid private key")?
            .with_chain_id(config.chain_id);
        info!("Watchdog signer address: {:?}", wallet.address());

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let module = DeadmanModule::new(module_address, client.clone());

        Ok(Self {
            client,
            module,
            safe_address,
            broadcast: Mutex::new(None),
        })
    }

    /// Resolve an earlier broadcast before anything new is sent
    ///
    /// # Returns
    /// * `Ok(Some(_))` if the earlier transfer is confirmed
    /// * `Ok(None)` if it reverted or the node no longer knows it, so a new
    ///   transfer may be sent
    /// * `Err(Unconfirmed)` if it is still pending
    async fn settle_broadcast(
        &self,
        previous: Broadcast,
    ) -> Result<Option<TransferConfirmation>, GatewayError> {
        let receipt = self
            .client
            .get_transaction_receipt(previous.tx_hash)
            .await
            .map_err(transport)?;

        match receipt {
            Some(receipt) if receipt.status == Some(U64::zero()) => {
                warn!(
                    "Earlier fallback transfer {:?} reverted, sending a new one",
                    previous.tx_hash
                );
                Ok(None)
            }
            Some(receipt) => {
                info!(
                    "Earlier fallback transfer {:?} is confirmed",
                    previous.tx_hash
                );
                Ok(Some(confirmation(previous, &receipt)))
            }
            None => {
                let known = self
                    .client
                    .get_transaction(previous.tx_hash)
                    .await
                    .map_err(transport)?;
                if known.is_some() {
                    return Err(GatewayError::Unconfirmed {
                        tx_hash: previous.tx_hash,
                    });
                }
                warn!(
                    "Earlier fallback transfer {:?} was dropped, sending a new one",
                    previous.tx_hash
                );
                Ok(None)
            }
        }
    }
}

fn confirmation(sent: Broadcast, receipt: &TransactionReceipt) -> TransferConfirmation {
    TransferConfirmation {
        tx_hash: sent.tx_hash,
        block_number: receipt.block_number.map(|n| n.as_u64()),
        amount: sent.amount,
    }
}

fn transport<E: std::fmt::Display>(err: E) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

fn contract_error(err: ContractError<SignerClient>) -> GatewayError {
    match err {
        ContractError::Revert(data) => GatewayError::Reverted(format!("revert data {}", data)),
        other => GatewayError::Transport(other.to_string()),
    }
}

fn to_u64(value: U256, what: &str) -> Result<u64, GatewayError> {
    if value > U256::from(u64::MAX) {
        return Err(GatewayError::Transport(format!(
            "{} {} does not fit in 64 bits",
            what, value
        )));
    }
    Ok(value.as_u64())
}

#[async_trait]
impl LedgerGateway for EthersGateway {
    async fn get_latest_block(&self) -> Result<ChainSnapshot, GatewayError> {
        let block = self
            .client
            .get_block(BlockNumber::Latest)
            .await
            .map_err(transport)?
            .ok_or_else(|| GatewayError::Transport("node returned no latest block".into()))?;

        let block_number = block
            .number
            .ok_or_else(|| GatewayError::Transport("latest block has no number".into()))?
            .as_u64();

        Ok(ChainSnapshot {
            block_number,
            block_timestamp: to_u64(block.timestamp, "block timestamp")?,
        })
    }

    async fn get_inactivity_threshold(&self) -> Result<Duration, GatewayError> {
        let secs = self
            .module
            .get_time_to_die()
            .call()
            .await
            .map_err(contract_error)?;
        Ok(Duration::from_secs(to_u64(secs, "timeToDie")?))
    }

    async fn get_last_activity_time(&self) -> Result<u64, GatewayError> {
        let time = self
            .module
            .last_transaction_time()
            .call()
            .await
            .map_err(contract_error)?;
        to_u64(time, "lastTransactionTime")
    }

    async fn scan_liveness_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<LivenessEvent>, GatewayError> {
        let filter = Filter::new()
            .address(self.safe_address)
            .event(EXECUTION_SUCCESS_EVENT)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self.client.get_logs(&filter).await.map_err(transport)?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            // Logs flagged as removed belong to a block that was reorged out
            if log.removed == Some(true) {
                debug!("Ignoring removed log {:?}", log.transaction_hash);
                continue;
            }
            let block_number = log.block_number.ok_or_else(|| {
                GatewayError::Transport("ExecutionSuccess log without block number".into())
            })?;
            events.push(LivenessEvent {
                block_number: block_number.as_u64(),
                tx_hash: log.transaction_hash,
            });
        }
        Ok(events)
    }

    async fn submit_fallback_transfer(&self) -> Result<TransferConfirmation, GatewayError> {
        let mut broadcast = self.broadcast.lock().await;

        if let Some(previous) = *broadcast {
            if let Some(confirmed) = self.settle_broadcast(previous).await? {
                return Ok(confirmed);
            }
            *broadcast = None;
        }

        let balance = self
            .client
            .get_balance(self.safe_address, None)
            .await
            .map_err(transport)?;

        if balance.is_zero() {
            return Err(GatewayError::Reverted("vault balance is zero".into()));
        }
        // transferSafe takes a uint96
        if balance.bits() > 96 {
            return Err(GatewayError::Reverted(format!(
                "vault balance {} exceeds uint96",
                balance
            )));
        }

        let call = self.module.transfer_safe(balance.as_u128());
        let pending = call.send().await.map_err(contract_error)?;
        let sent = Broadcast {
            tx_hash: pending.tx_hash(),
            amount: balance,
        };
        // Recorded before waiting, so a caller timeout does not lose the hash
        *broadcast = Some(sent);
        info!("Fallback transfer {:?} sent, waiting for receipt", sent.tx_hash);

        let receipt = pending
            .await
            .map_err(transport)?
            .ok_or(GatewayError::Unconfirmed {
                tx_hash: sent.tx_hash,
            })?;

        if receipt.status == Some(U64::zero()) {
            *broadcast = None;
            return Err(GatewayError::Reverted(format!(
                "transferSafe {:?} failed on chain",
                sent.tx_hash
            )));
        }

        Ok(confirmation(sent, &receipt))
    }

    async fn record_activity_ping(&self) -> Result<(), GatewayError> {
        let call = self.module.update_last_transaction_time();
        let pending = call.send().await.map_err(contract_error)?;
        debug!("Activity ping {:?} sent", pending.tx_hash());
        pending.await.map_err(transport)?;
        Ok(())
    }
}
