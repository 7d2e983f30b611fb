//! Configuration management
//!
//! Handles loading and parsing of a JSON configuration file with
//! environment-variable overrides.

use crate::fees::FeeSchedule;
use crate::types::Money;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub initial_cash: Money,
    /// Settlement window in trading days (1 for China A-shares).
    pub t_plus: i64,
    pub order_expiry_minutes: i64,
    pub max_fill_attempts: u32,
    pub shares_per_lot: u64,
    pub price_cache_ttl_ms: u64,
    pub persist_interval_secs: u64,
    pub match_interval_ms: u64,
    pub snapshot_path: String,
}

impl Config {
    /// Load configuration from a JSON file, overlaying the snapshot path
    /// from the environment if set.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path.as_ref()).context("failed to read config file")?;
        let mut config: Config =
            serde_json::from_str(&contents).context("failed to parse config JSON")?;

        if let Ok(snapshot_path) = std::env::var("PAPER_TRADER_SNAPSHOT_PATH") {
            config.snapshot_path = snapshot_path;
        }

        Ok(config)
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::a_share()
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            initial_cash: Money::from_f64(100_000.0),
            t_plus: 1,
            order_expiry_minutes: 30,
            max_fill_attempts: 10,
            shares_per_lot: 100,
            price_cache_ttl_ms: 1_000,
            persist_interval_secs: 30,
            match_interval_ms: 500,
            snapshot_path: "data/trading.ptrs".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_reference_constants() {
        let config = Config::default();
        assert_eq!(config.t_plus, 1);
        assert_eq!(config.order_expiry_minutes, 30);
        assert_eq!(config.max_fill_attempts, 10);
        assert_eq!(config.shares_per_lot, 100);
    }
}
