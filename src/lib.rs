//! A-share paper trading engine
//!
//! An in-process, multi-threaded simulator for trading China A-share
//! equities against polled market prices: an order lifecycle state
//! machine, a FIFO lot-based position ledger with T+X settlement, a
//! nine-phase trading-session calendar, a deterministic fee schedule,
//! and a background matching loop and persistence flusher sharing one
//! service-wide lock.

pub mod calendar;
pub mod config;
pub mod error;
pub mod fees;
pub mod ledger;
pub mod matching;
pub mod market_data;
pub mod order;
pub mod persistence;
pub mod service;
pub mod types;

pub use config::Config;
pub use error::EngineError;
pub use types::*;
