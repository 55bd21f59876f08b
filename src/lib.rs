//! ShadowEye runs a fixed battery of cloud security checks, isolates their
//! failures, and reports every finding from one ordered ledger.

pub mod alerts;
pub mod archive;
pub mod checks;
pub mod cli;
pub mod config;
pub mod core;
pub mod engine;
pub mod exit;
pub mod logging;
pub mod platform;
pub mod ui;
