//! Versioned, atomically-written disk snapshots of the engine state
//!
//! A single versioned binary file, written atomically by serializing to
//! a temp path and renaming over the previous good snapshot.

use crate::error::EngineError;
use crate::ledger::LedgerSnapshot;
use crate::order::OrderBookSnapshot;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const MAGIC: &[u8; 4] = b"PTRS";
const SCHEMA_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
pub struct Snapshot {
    pub ledger: LedgerSnapshot,
    pub book: OrderBookSnapshot,
}

/// Load a snapshot from `path`, validating the magic and version header
/// before attempting to deserialize the body. A magic/version mismatch
/// is a hard `PersistenceFailure`, never a best-effort partial read.
pub fn load(path: &Path) -> Result<Snapshot, EngineError> {
    let bytes = std::fs::read(path)
        .map_err(|e| EngineError::PersistenceFailure(format!("reading {path:?}: {e}")))?;

    if bytes.len() < 6 || &bytes[0..4] != MAGIC {
        return Err(EngineError::PersistenceFailure(
            "snapshot magic mismatch".into(),
        ));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != SCHEMA_VERSION {
        return Err(EngineError::PersistenceFailure(format!(
            "unsupported snapshot schema version {version}"
        )));
    }

    bincode::deserialize(&bytes[6..])
        .map_err(|e| EngineError::PersistenceFailure(format!("decoding snapshot: {e}")))
}

/// Write `snapshot` to `path` atomically: serialize to `<path>.tmp`,
/// then rename over `path`, so a crash mid-write can never corrupt the
/// previous good snapshot.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), EngineError> {
    let mut bytes = Vec::with_capacity(6);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&SCHEMA_VERSION.to_le_bytes());
    bincode::serialize_into(&mut bytes, snapshot)
        .map_err(|e| EngineError::PersistenceFailure(format!("encoding snapshot: {e}")))?;

    let tmp_path = tmp_path_for(path);
    std::fs::write(&tmp_path, &bytes)
        .map_err(|e| EngineError::PersistenceFailure(format!("writing {tmp_path:?}: {e}")))?;
    std::fs::rename(&tmp_path, path)
        .map_err(|e| EngineError::PersistenceFailure(format!("renaming {tmp_path:?}: {e}")))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

/// Anything that can produce and accept a [`Snapshot`], satisfied by
/// [`crate::service::TradingService`]. Kept as a trait so the background
/// flush loop doesn't need to know about `TradingService` internals.
#[async_trait::async_trait]
pub trait Snapshottable: Send + Sync {
    async fn snapshot(&self) -> Snapshot;
    async fn restore(&self, snapshot: Snapshot);
}

/// Background task that flushes a snapshot on a fixed interval and once
/// more on shutdown.
pub struct StatePersistor<S: Snapshottable> {
    target: Arc<S>,
    path: PathBuf,
    interval: Duration,
}

impl<S: Snapshottable> StatePersistor<S> {
    pub fn new(target: Arc<S>, path: PathBuf, interval: Duration) -> Self {
        Self {
            target,
            path,
            interval,
        }
    }

    pub async fn flush_now(&self) {
        let snapshot = self.target.snapshot().await;
        match save(&self.path, &snapshot) {
            Ok(()) => debug!(path = ?self.path, "snapshot flushed"),
            Err(e) => error!(%e, "snapshot flush failed"),
        }
    }

    pub async fn load_into_target(&self) -> Result<(), EngineError> {
        if !self.path.exists() {
            info!(path = ?self.path, "no snapshot to load, starting fresh");
            return Ok(());
        }
        let snapshot = load(&self.path)?;
        self.target.restore(snapshot).await;
        info!(path = ?self.path, "snapshot loaded");
        Ok(())
    }

    /// Run the periodic flush loop until `shutdown` resolves.
    pub async fn run(&self, mut shutdown: tokio::sync::mpsc::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.flush_now().await;
                }
                _ = shutdown.recv() => {
                    self.flush_now().await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::FeeSchedule;
    use crate::ledger::Ledger;
    use crate::order::OrderBook;
    use crate::types::Money;
    use std::collections::{HashMap, VecDeque};

    #[test]
    fn test_save_and_load_roundtrip() {
        let ledger = Ledger::new(Money::from_f64(100_000.0), FeeSchedule::a_share(), 1);
        let book = OrderBook::new();
        let snapshot = Snapshot {
            ledger: ledger.to_snapshot(),
            book: book.to_snapshot(),
        };

        let dir = std::env::temp_dir().join(format!("ptrs-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("snapshot.bin");

        save(&path, &snapshot).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.ledger.cash, Money::from_f64(100_000.0));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let dir = std::env::temp_dir().join(format!("ptrs-test-badmagic-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("snapshot.bin");
        std::fs::write(&path, b"NOPE00").unwrap();

        let result = load(&path);
        assert!(result.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_empty_positions_and_history_roundtrip() {
        let snapshot = Snapshot {
            ledger: LedgerSnapshot {
                cash: Money::ZERO,
                frozen_cash: Money::ZERO,
                positions: HashMap::new(),
                frozen_shares: HashMap::new(),
                equity_history: VecDeque::new(),
                trade_journal: Vec::new(),
                today_realized_pnl: Money::ZERO,
                t_plus: 1,
            },
            book: OrderBookSnapshot {
                orders: HashMap::new(),
                pending: VecDeque::new(),
            },
        };
        let dir = std::env::temp_dir().join(format!("ptrs-test-empty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("snapshot.bin");
        save(&path, &snapshot).unwrap();
        let loaded = load(&path).unwrap();
        assert!(loaded.ledger.positions.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
