//! Watchdog Module
//!
//! This module implements the dead-man's-switch core:
//! - ActivityTracker: last-known vault activity and the inactivity window
//! - EventScanner: contiguous block-range scanning for vault executions
//! - Evaluator: decides whether the window has been exceeded
//! - TriggerExecutor: submits the fallback transfer at most once
//! - Watchdog: the polling loop that sequences all of the above
//!
//! Transport failures back off and retry; they are never read as inactivity.

mod backoff;
mod evaluator;
mod health;
mod runner;
mod scanner;
mod tracker;
mod trigger;


pub use backoff::Backoff;
pub use evaluator::{Evaluation, evaluate, has_expired};
pub use health::{HealthHandle, HealthSnapshot, HealthStatus};
pub use runner::{Phase, StepReport, Watchdog};
pub use scanner::EventScanner;
pub use tracker::ActivityTracker;
pub use trigger::{TriggerExecutor, TriggerOutcome};
