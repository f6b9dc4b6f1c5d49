//! Configuration Module
//!
//! This module defines all configuration structures for the watchdog.
//! Configuration is loaded from TOML files and parsed using serde.

use anyhow::{Context, bail};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

/// Main configuration structure
///
/// Contains all configuration sections for the watchdog.
/// Loaded from a TOML file (e.g., config/default.toml).
///
/// # Example TOML
/// ```toml
/// [l1]
/// rpc_url = "http://127.0.0.1:8545"
/// chain_id = 5
/// module_address = "0x22fc233efd12d34a25944dc23f3cb839b889a14d"
/// safe_address = "0xd6903Dfb7569fFDCCa0EB54157Ac019Aaa79a479"
/// signer_key_env = "DEADMAN_SIGNER_KEY"
///
/// [watchdog]
/// poll_interval_ms = 15000
/// max_trigger_attempts = 10
///
/// [api]
/// host = "127.0.0.1"
/// port = 9100
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub l1: L1Config,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    pub api: ApiConfig,
}

/// Layer 1 connection configuration
///
/// Settings for reaching the chain that hosts the vault and its
/// dead-man's-switch module.
///
/// # Fields
/// - `rpc_url`: Ethereum RPC endpoint
/// - `chain_id`: Chain id used when signing transactions
/// - `module_address`: Address of the dead-man's-switch module contract
/// - `safe_address`: Address of the vault whose executions count as activity
/// - `signer_key_env`: Name of the environment variable holding the signing key
/// - `start_block`: Optional first block to scan (1 or later); by default scanning starts after the latest block at startup
#[derive(Debug, Clone, Deserialize)]
pub struct L1Config {
    pub rpc_url: String,
    pub chain_id: u64,
    pub module_address: String,
    pub safe_address: String,
    pub signer_key_env: String,
    #[serde(default)]
    pub start_block: Option<u64>,
}

/// Watchdog loop tuning
///
/// Every field has a default, so the whole `[watchdog]` section may be omitted.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchdogConfig {
    /// Delay between polling iterations
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on a single gateway call
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Upper bound on submitting the fallback transfer and waiting for its receipt
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    /// First retry delay after a transport failure
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    /// Retry delays never exceed this
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Failed fallback transfers tolerated before the watchdog gives up
    #[serde(default = "default_max_trigger_attempts")]
    pub max_trigger_attempts: u32,
    /// Refresh the module's own last-activity value when activity is seen
    #[serde(default = "default_true")]
    pub ping_on_activity: bool,
    /// Stop polling once the fallback transfer is confirmed
    #[serde(default = "default_true")]
    pub stop_after_trigger: bool,
}

const fn default_poll_interval_ms() -> u64 {
    15_000
}

const fn default_request_timeout_ms() -> u64 {
    10_000
}

const fn default_confirm_timeout_ms() -> u64 {
    300_000
}

const fn default_backoff_initial_ms() -> u64 {
    1_000
}

const fn default_backoff_max_ms() -> u64 {
    300_000
}

const fn default_backoff_multiplier() -> f64 {
    2.0
}

const fn default_max_trigger_attempts() -> u32 {
    10
}

const fn default_true() -> bool {
    true
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            confirm_timeout_ms: default_confirm_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_trigger_attempts: default_max_trigger_attempts(),
            ping_on_activity: true,
            stop_after_trigger: true,
        }
    }
}

impl WatchdogConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    /// Reject settings that would make the loop spin or never retry
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval_ms == 0 {
            bail!("watchdog.poll_interval_ms must be greater than zero");
        }
        if self.request_timeout_ms == 0 {
            bail!("watchdog.request_timeout_ms must be greater than zero");
        }
        if self.confirm_timeout_ms < self.request_timeout_ms {
            bail!(
                "watchdog.confirm_timeout_ms ({}) is below request_timeout_ms ({})",
                self.confirm_timeout_ms,
                self.request_timeout_ms
            );
        }
        if self.backoff_max_ms < self.backoff_initial_ms {
            bail!(
                "watchdog.backoff_max_ms ({}) is below backoff_initial_ms ({})",
                self.backoff_max_ms,
                self.backoff_initial_ms
            );
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            bail!("watchdog.backoff_multiplier must be at least 1.0");
        }
        if self.max_trigger_attempts == 0 {
            bail!("watchdog.max_trigger_attempts must be at least 1");
        }
        Ok(())
    }
}

impl L1Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        // The scan cursor holds the last block already covered, so block 0
        // cannot be the first block to scan. Genesis never holds executions.
        if self.start_block == Some(0) {
            bail!("l1.start_block must be at least 1");
        }
        Ok(())
    }
}

/// Health API configuration
///
/// # Fields
/// - `host`: IP address to bind to (e.g., "127.0.0.1" or "0.0.0.0")
/// - `port`: TCP port to listen on
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was loaded, parsed and validated
    /// * `Err` if the file couldn't be read, the TOML is invalid, or a value is out of range
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        Self::from_toml(&content).with_context(|| format!("invalid config file {}", path))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.l1.validate()?;
        config.watchdog.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [l1]
        rpc_url = "http://127.0.0.1:8545"
        chain_id = 31337
        module_address = "0x22fc233efd12d34a25944dc23f3cb839b889a14d"
        safe_address = "0xd6903Dfb7569fFDCCa0EB54157Ac019Aaa79a479"
        signer_key_env = "DEADMAN_SIGNER_KEY"

        [api]
        host = "127.0.0.1"
        port = 9100
    "#;

    #[test]
    fn test_watchdog_section_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();

        assert_eq!(config.watchdog.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.watchdog.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.watchdog.confirm_timeout(), Duration::from_secs(300));
        assert_eq!(config.watchdog.max_trigger_attempts, 10);
        assert!(config.watchdog.ping_on_activity);
        assert!(config.watchdog.stop_after_trigger);
        assert_eq!(config.l1.start_block, None);
    }

    #[test]
    fn test_watchdog_overrides() {
        let toml = format!(
            "{}\n[watchdog]\npoll_interval_ms = 500\nping_on_activity = false\n",
            MINIMAL
        );
        let config = Config::from_toml(&toml).unwrap();

        assert_eq!(config.watchdog.poll_interval_ms, 500);
        assert!(!config.watchdog.ping_on_activity);
        assert_eq!(config.watchdog.backoff_initial_ms, 1_000);
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let toml = format!("{}\n[watchdog]\npoll_interval_ms = 0\n", MINIMAL);
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_rejects_inverted_backoff_bounds() {
        let toml = format!(
            "{}\n[watchdog]\nbackoff_initial_ms = 5000\nbackoff_max_ms = 100\n",
            MINIMAL
        );
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_rejects_zero_trigger_attempts() {
        let toml = format!("{}\n[watchdog]\nmax_trigger_attempts = 0\n", MINIMAL);
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_rejects_confirm_timeout_below_request_timeout() {
        let toml = format!(
            "{}\n[watchdog]\nrequest_timeout_ms = 10000\nconfirm_timeout_ms = 5000\n",
            MINIMAL
        );
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn test_start_block_must_be_scannable() {
        let genesis = MINIMAL.replace(
            "signer_key_env = \"DEADMAN_SIGNER_KEY\"",
            "signer_key_env = \"DEADMAN_SIGNER_KEY\"\nstart_block = 0",
        );
        let err = Config::from_toml(&genesis).unwrap_err();
        assert!(err.to_string().contains("start_block"));

        let first = genesis.replace("start_block = 0", "start_block = 1");
        assert_eq!(Config::from_toml(&first).unwrap().l1.start_block, Some(1));
    }
}
