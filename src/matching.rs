//! Background matching loop
//!
//! On every tick it delegates to [`crate::service::TradingService::tick`],
//! which expires stale orders and then, if the session allows trading,
//! attempts to fill every resting order against the polled reference
//! price.

use crate::service::TradingService;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct MatchingEngine {
    service: Arc<TradingService>,
    interval: Duration,
}

impl MatchingEngine {
    pub fn new(service: Arc<TradingService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Run until `shutdown` resolves.
    pub async fn run(&self, mut shutdown: tokio::sync::mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = Utc::now();
                    if let Err(e) = self.service.tick(now).await {
                        warn!(%e, "matching tick failed");
                    } else {
                        debug!("matching tick complete");
                    }
                }
                _ = shutdown.recv() => {
                    debug!("matching engine shutting down");
                    break;
                }
            }
        }
    }
}
