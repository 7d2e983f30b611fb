//! Market data abstraction: a polled price source plus a short-TTL cache
//!
//! The matching engine and order validation both need "the current
//! price" for a symbol without hammering the upstream quote endpoint on
//! every tick. [`PriceCache`] sits in front of any [`MarketDataSource`]
//! and serves a value up to one second old before calling through again.

use crate::error::EngineError;
use crate::types::{Money, Symbol};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const EASTMONEY_BASE_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";
const EASTMONEY_UT: &str = "fa5fd1943c7b386f172d6893dbfba10b";

/// Source of live A-share quotes and limit-up/limit-down bands.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn latest_price(&self, symbol: &Symbol) -> Result<Money, EngineError>;
    async fn limit_prices(&self, symbol: &Symbol) -> Result<(Money, Money), EngineError>;
}

/// HTTP adapter for Eastmoney's public quote endpoint.
///
/// A thin `reqwest::Client` wrapper with one method per logical request
/// and `anyhow::Context` wrapping every fallible I/O step. Eastmoney's
/// quote endpoint takes no API key or request signature.
#[derive(Debug, Clone)]
pub struct EastmoneyMarketDataSource {
    client: reqwest::Client,
}

impl EastmoneyMarketDataSource {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    fn secid(symbol: &Symbol) -> String {
        format!("{}.{}", symbol.market_code(), symbol.code())
    }

    async fn fetch(&self, symbol: &Symbol, fields: &str) -> Result<EastmoneyData> {
        let secid = Self::secid(symbol);
        let params = [
            ("invt", "2"),
            ("fltt", "1"),
            ("fields", fields),
            ("secid", secid.as_str()),
            ("ut", EASTMONEY_UT),
        ];

        let response = self
            .client
            .get(EASTMONEY_BASE_URL)
            .query(&params)
            .send()
            .await
            .context("failed to reach eastmoney quote endpoint")?;

        let envelope: EastmoneyEnvelope = response
            .json()
            .await
            .context("failed to parse eastmoney response")?;

        if envelope.rc != 0 {
            anyhow::bail!("eastmoney returned rc={} for {}", envelope.rc, symbol);
        }

        envelope
            .data
            .context("eastmoney response missing data field")
    }
}

impl Default for EastmoneyMarketDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataSource for EastmoneyMarketDataSource {
    async fn latest_price(&self, symbol: &Symbol) -> Result<Money, EngineError> {
        let data = self
            .fetch(symbol, "f43,f59")
            .await
            .map_err(|_| EngineError::PriceUnavailable(symbol.clone()))?;

        let precision = data.f59.unwrap_or(0);
        let raw = data
            .f43
            .ok_or_else(|| EngineError::PriceUnavailable(symbol.clone()))?;
        Ok(scale(raw, precision))
    }

    async fn limit_prices(&self, symbol: &Symbol) -> Result<(Money, Money), EngineError> {
        let data = self
            .fetch(symbol, "f51,f52,f59")
            .await
            .map_err(|_| EngineError::PriceUnavailable(symbol.clone()))?;

        let precision = data.f59.unwrap_or(0);
        let upper = data
            .f51
            .ok_or_else(|| EngineError::PriceUnavailable(symbol.clone()))?;
        let lower = data
            .f52
            .ok_or_else(|| EngineError::PriceUnavailable(symbol.clone()))?;
        Ok((scale(upper, precision), scale(lower, precision)))
    }
}

/// Divide a raw integer-ish quote field by `10^precision`.
fn scale(raw: f64, precision: i32) -> Money {
    if precision == 0 {
        Money::from_f64(raw)
    } else {
        Money::from_f64(raw / 10f64.powi(precision))
    }
}

#[derive(Debug, Deserialize)]
struct EastmoneyEnvelope {
    rc: i64,
    data: Option<EastmoneyData>,
}

#[derive(Debug, Deserialize)]
struct EastmoneyData {
    f43: Option<f64>,
    f51: Option<f64>,
    f52: Option<f64>,
    f59: Option<i32>,
}

/// Per-symbol TTL cache in front of a [`MarketDataSource`], so order
/// validation and the matching loop can both ask "the current price"
/// without hitting the upstream quote endpoint on every call.
pub struct PriceCache {
    source: Box<dyn MarketDataSource>,
    entries: Mutex<HashMap<Symbol, (Money, Instant)>>,
    ttl: Duration,
}

impl PriceCache {
    /// One second TTL.
    pub fn new(source: Box<dyn MarketDataSource>) -> Self {
        Self::with_ttl(source, Duration::from_secs(1))
    }

    pub fn with_ttl(source: Box<dyn MarketDataSource>, ttl: Duration) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn latest_price(&self, symbol: &Symbol) -> Result<Money, EngineError> {
        {
            let entries = self.entries.lock().await;
            if let Some((price, fetched_at)) = entries.get(symbol) {
                if fetched_at.elapsed() < self.ttl {
                    return Ok(*price);
                }
            }
        }

        let price = self.source.latest_price(symbol).await?;
        let mut entries = self.entries.lock().await;
        entries.insert(symbol.clone(), (price, Instant::now()));
        Ok(price)
    }

    pub async fn limit_prices(&self, symbol: &Symbol) -> Result<(Money, Money), EngineError> {
        self.source.limit_prices(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        price: Money,
    }

    #[async_trait]
    impl MarketDataSource for CountingSource {
        async fn latest_price(&self, _symbol: &Symbol) -> Result<Money, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.price)
        }

        async fn limit_prices(&self, _symbol: &Symbol) -> Result<(Money, Money), EngineError> {
            Ok((Money::from_f64(11.0), Money::from_f64(9.0)))
        }
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            calls: calls.clone(),
            price: Money::from_f64(10.0),
        };
        let cache = PriceCache::new(Box::new(source));
        let symbol = Symbol::new("sh600519");

        let first = cache.latest_price(&symbol).await.unwrap();
        let second = cache.latest_price(&symbol).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_miss_refetches_after_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            calls: calls.clone(),
            price: Money::from_f64(10.0),
        };
        let cache = PriceCache::new(Box::new(source));
        let symbol = Symbol::new("sh600519");

        cache.latest_price(&symbol).await.unwrap();
        {
            let mut entries = cache.entries.lock().await;
            let (_, fetched_at) = entries.get_mut(&symbol).unwrap();
            *fetched_at = Instant::now() - Duration::from_secs(2);
        }
        cache.latest_price(&symbol).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
