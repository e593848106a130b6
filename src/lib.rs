//! Xeggex Agent: exchange balance and order change events.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod options;
pub mod exchange;
pub mod engine;
pub mod storage;
pub mod health;
pub mod dashboard;
