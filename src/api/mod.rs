//! API Module
//!
//! This module exposes watchdog health over HTTP so operators can see
//! whether the watchdog is waiting, degraded, or has already triggered.

mod server;
pub use server::{Server, router};
