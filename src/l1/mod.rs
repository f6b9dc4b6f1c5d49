//! Layer 1 Integration Module
//!
//! This module handles integration with the chain hosting the vault:
//! - Declares the ledger gateway interface the watchdog consumes
//! - Bounds every gateway call with a timeout
//! - Implements the gateway on top of ethers-rs

mod client;
mod gateway;

pub use client::EthersGateway;
pub use gateway::{LedgerGateway, TimedGateway};
