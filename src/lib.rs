//! This crate implements a dead-man's-switch watchdog for a custodial vault.
//! It watches the chain for vault activity and, once the vault has been idle
//! for longer than its inactivity window, moves the funds to the beneficiary.

pub mod types; // Vault state, chain snapshots, liveness events and errors.
pub mod api; // Health endpoint for operators.
pub mod l1; // Ledger gateway interface and its ethers implementation.
pub mod watchdog; // Activity tracking, scanning, evaluation, triggering and the polling loop.
pub mod config; // Defines and loads system configuration.

// Re-export commonly used types and configurations for easier access.
pub use types::*;
pub use config::Config;
pub use watchdog::Watchdog;
