//! Cash, lots and the trade journal: the account's single source of truth

use crate::error::EngineError;
use crate::fees::FeeSchedule;
use crate::types::{EquitySample, Fill, Lot, Money, Position, Side, Symbol};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Serializable projection of [`Ledger`] used for disk snapshots.
#[derive(Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub cash: Money,
    pub frozen_cash: Money,
    pub positions: HashMap<Symbol, Vec<Lot>>,
    pub frozen_shares: HashMap<Symbol, u64>,
    pub equity_history: VecDeque<EquitySample>,
    pub trade_journal: Vec<Fill>,
    pub today_realized_pnl: Money,
    pub t_plus: i64,
}

/// Longest equity-curve history retained in memory.
const EQUITY_HISTORY_CAP: usize = 100;

/// The account's cash, positions and history. Every mutation goes
/// through one of this type's methods; [`crate::service::TradingService`]
/// is the only caller, and it serializes all access behind a single
/// mutex, so nothing here needs its own internal locking.
pub struct Ledger {
    cash: Money,
    frozen_cash: Money,
    positions: HashMap<Symbol, Vec<Lot>>,
    frozen_shares: HashMap<Symbol, u64>,
    equity_history: VecDeque<EquitySample>,
    trade_journal: Vec<Fill>,
    today_realized_pnl: Money,
    fees: FeeSchedule,
    t_plus: i64,
}

impl Ledger {
    pub fn new(initial_cash: Money, fees: FeeSchedule, t_plus: i64) -> Self {
        Self {
            cash: initial_cash,
            frozen_cash: Money::ZERO,
            positions: HashMap::new(),
            frozen_shares: HashMap::new(),
            equity_history: VecDeque::new(),
            trade_journal: Vec::new(),
            today_realized_pnl: Money::ZERO,
            fees,
            t_plus,
        }
    }

    pub fn to_snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            cash: self.cash,
            frozen_cash: self.frozen_cash,
            positions: self.positions.clone(),
            frozen_shares: self.frozen_shares.clone(),
            equity_history: self.equity_history.clone(),
            trade_journal: self.trade_journal.clone(),
            today_realized_pnl: self.today_realized_pnl,
            t_plus: self.t_plus,
        }
    }

    pub fn restore(snapshot: LedgerSnapshot, fees: FeeSchedule) -> Self {
        Self {
            cash: snapshot.cash,
            frozen_cash: snapshot.frozen_cash,
            positions: snapshot.positions,
            frozen_shares: snapshot.frozen_shares,
            equity_history: snapshot.equity_history,
            trade_journal: snapshot.trade_journal,
            today_realized_pnl: snapshot.today_realized_pnl,
            fees,
            t_plus: snapshot.t_plus,
        }
    }

    pub fn cash(&self) -> Money {
        self.cash
    }

    pub fn available_cash(&self) -> Money {
        self.cash - self.frozen_cash
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        self.fees
    }

    pub fn trade_journal(&self) -> &[Fill] {
        &self.trade_journal
    }

    pub fn equity_history(&self) -> impl Iterator<Item = &EquitySample> {
        self.equity_history.iter()
    }

    pub fn today_realized_pnl(&self) -> Money {
        self.today_realized_pnl
    }

    pub fn position(&self, symbol: &Symbol) -> Option<Position> {
        let lots = self.positions.get(symbol)?;
        if lots.is_empty() {
            return None;
        }
        let total_quantity: u64 = lots.iter().map(|l| l.quantity).sum();
        let total_cost: Money = lots
            .iter()
            .map(|l| l.cost_price * Money::from_i64(l.quantity as i64))
            .sum();
        let average_cost = if total_quantity > 0 {
            total_cost / Money::from_i64(total_quantity as i64)
        } else {
            Money::ZERO
        };
        let earliest_acquired_on = lots.iter().map(|l| l.acquired_on).min();

        Some(Position {
            symbol: symbol.clone(),
            total_quantity,
            frozen_quantity: self.frozen_shares.get(symbol).copied().unwrap_or(0),
            average_cost,
            earliest_acquired_on,
        })
    }

    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        self.positions.keys().filter_map(|s| self.position(s))
    }

    pub fn available_quantity(&self, symbol: &Symbol) -> u64 {
        self.position(symbol)
            .map(|p| p.available_quantity())
            .unwrap_or(0)
    }

    /// All-lots-settleable T+X rule: a symbol is sellable only once every
    /// open lot has cleared the settlement window; a single unsettled lot
    /// blocks the whole position. The window is plain calendar days, not
    /// trading days: a lot acquired on day N clears once `as_of - N` is
    /// strictly greater than `t_plus` days.
    pub fn can_sell(&self, symbol: &Symbol, as_of: NaiveDate) -> bool {
        match self.positions.get(symbol) {
            None => false,
            Some(lots) if lots.is_empty() => false,
            Some(lots) => lots
                .iter()
                .all(|lot| (as_of - lot.acquired_on).num_days() > self.t_plus),
        }
    }

    /// Earliest date at which every current lot of `symbol` will have
    /// cleared settlement, for error reporting.
    pub fn settlement_complete_on(&self, symbol: &Symbol) -> Option<NaiveDate> {
        self.positions
            .get(symbol)?
            .iter()
            .map(|lot| lot.acquired_on)
            .max()
    }

    pub fn freeze_cash(&mut self, amount: Money) {
        self.frozen_cash += amount;
    }

    pub fn unfreeze_cash(&mut self, amount: Money) {
        self.frozen_cash = (self.frozen_cash - amount).max(Money::ZERO);
    }

    pub fn freeze_shares(&mut self, symbol: &Symbol, quantity: u64) {
        *self.frozen_shares.entry(symbol.clone()).or_insert(0) += quantity;
    }

    pub fn unfreeze_shares(&mut self, symbol: &Symbol, quantity: u64) {
        if let Some(frozen) = self.frozen_shares.get_mut(symbol) {
            *frozen = frozen.saturating_sub(quantity);
        }
    }

    /// Debit cash and open a new lot.
    pub fn apply_buy_fill(
        &mut self,
        order_id: u64,
        symbol: &Symbol,
        price: Money,
        quantity: u64,
        trade_date: NaiveDate,
        filled_at: DateTime<Utc>,
    ) -> Fill {
        let notional = price * Money::from_i64(quantity as i64);
        let fee = self.fees.buy_fee(notional);
        self.cash -= notional + fee;

        self.positions.entry(symbol.clone()).or_default().push(Lot {
            quantity,
            cost_price: price,
            acquired_on: trade_date,
        });

        let fill = Fill {
            order_id,
            symbol: symbol.clone(),
            side: Side::Buy,
            price,
            quantity,
            fee,
            realized_pnl: Money::ZERO,
            filled_at,
        };
        info!(%symbol, %price, quantity, "buy fill applied");
        self.trade_journal.push(fill.clone());
        fill
    }

    /// Credit cash and consume lots oldest-first (FIFO). Each lot slice
    /// consumed gets its own journal entry carrying that slice's own
    /// executed price, quantity, fee and realized P&L; the `Fill`
    /// returned to the caller is the aggregate across all slices.
    pub fn apply_sell_fill(
        &mut self,
        order_id: u64,
        symbol: &Symbol,
        price: Money,
        quantity: u64,
        filled_at: DateTime<Utc>,
    ) -> Result<Fill, EngineError> {
        let lots = self
            .positions
            .get_mut(symbol)
            .ok_or_else(|| EngineError::InsufficientHoldings {
                symbol: symbol.clone(),
                needed: quantity,
                available: 0,
            })?;

        let mut remaining = quantity;
        let mut realized_pnl = Money::ZERO;
        let mut total_fee = Money::ZERO;

        while remaining > 0 {
            let Some(lot) = lots.first_mut() else {
                return Err(EngineError::InsufficientHoldings {
                    symbol: symbol.clone(),
                    needed: remaining,
                    available: 0,
                });
            };

            let consumed = remaining.min(lot.quantity);
            let sell_amount = price * Money::from_i64(consumed as i64);
            let fee = self.fees.sell_fee(sell_amount);
            let pnl = (price - lot.cost_price) * Money::from_i64(consumed as i64) - fee;

            realized_pnl += pnl;
            total_fee += fee;
            self.cash += sell_amount - fee;

            let slice_fill = Fill {
                order_id,
                symbol: symbol.clone(),
                side: Side::Sell,
                price,
                quantity: consumed,
                fee,
                realized_pnl: pnl,
                filled_at,
            };
            info!(%symbol, %price, consumed, %pnl, "sell fill slice applied");
            self.trade_journal.push(slice_fill);

            if consumed == lot.quantity {
                lots.remove(0);
            } else {
                lot.quantity -= consumed;
            }
            remaining -= consumed;
        }

        if lots.is_empty() {
            self.positions.remove(symbol);
        }

        self.today_realized_pnl += realized_pnl;

        Ok(Fill {
            order_id,
            symbol: symbol.clone(),
            side: Side::Sell,
            price,
            quantity,
            fee: total_fee,
            realized_pnl,
            filled_at,
        })
    }

    pub fn stock_value(&self, prices: &HashMap<Symbol, Money>) -> Money {
        self.positions
            .keys()
            .filter_map(|symbol| {
                let position = self.position(symbol)?;
                let price = *prices.get(symbol)?;
                Some(position.market_value(price))
            })
            .sum()
    }

    /// Record a new equity sample: overwrite the last sample instead of
    /// appending when the timestamp is unchanged, and cap retention at
    /// the most recent [`EQUITY_HISTORY_CAP`] samples.
    pub fn record_equity_sample(&mut self, at: DateTime<Utc>, stock_value: Money) {
        let sample = EquitySample {
            at,
            cash: self.cash,
            stock_value,
            total_assets: self.cash + stock_value,
        };

        if self.equity_history.back().map(|s| s.at) == Some(at) {
            *self.equity_history.back_mut().unwrap() = sample;
        } else {
            self.equity_history.push_back(sample);
        }

        while self.equity_history.len() > EQUITY_HISTORY_CAP {
            self.equity_history.pop_front();
        }
        debug!(len = self.equity_history.len(), "equity history updated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_buy_fill_debits_cash_and_opens_lot() {
        let mut ledger = Ledger::new(Money::from_f64(100_000.0), FeeSchedule::a_share(), 1);
        let symbol = Symbol::new("sh600519");
        ledger.apply_buy_fill(
            1,
            &symbol,
            Money::from_f64(10.0),
            1000,
            date(2026, 7, 27),
            Utc::now(),
        );
        // notional 10000, fee = max(10000*0.00025,5) + 10000*0.00001 = 5 + 0.1 = 5.10
        assert_eq!(ledger.cash(), Money::from_f64(89_994.90));
        let position = ledger.position(&symbol).unwrap();
        assert_eq!(position.total_quantity, 1000);
    }

    #[test]
    fn test_sell_fill_consumes_fifo_across_two_lots() {
        let mut ledger = Ledger::new(Money::from_f64(100_000.0), FeeSchedule::a_share(), 0);
        let symbol = Symbol::new("sh600519");
        ledger.apply_buy_fill(
            1,
            &symbol,
            Money::from_f64(10.0),
            500,
            date(2026, 7, 20),
            Utc::now(),
        );
        ledger.apply_buy_fill(
            2,
            &symbol,
            Money::from_f64(12.0),
            500,
            date(2026, 7, 21),
            Utc::now(),
        );

        let fill = ledger
            .apply_sell_fill(3, &symbol, Money::from_f64(15.0), 700, Utc::now())
            .unwrap();

        assert_eq!(fill.quantity, 700);
        // lot1: 500 @ 10 fully consumed, lot2: 200 @ 12 partially consumed
        let remaining = ledger.position(&symbol).unwrap();
        assert_eq!(remaining.total_quantity, 300);
    }

    #[test]
    fn test_sell_fill_journals_one_entry_per_consumed_lot_slice() {
        let mut ledger = Ledger::new(Money::from_f64(100_000.0), FeeSchedule::a_share(), 0);
        let symbol = Symbol::new("sh600519");
        ledger.apply_buy_fill(
            1,
            &symbol,
            Money::from_f64(10.0),
            500,
            date(2026, 7, 20),
            Utc::now(),
        );
        ledger.apply_buy_fill(
            2,
            &symbol,
            Money::from_f64(12.0),
            500,
            date(2026, 7, 21),
            Utc::now(),
        );

        ledger
            .apply_sell_fill(3, &symbol, Money::from_f64(15.0), 700, Utc::now())
            .unwrap();

        // Two buy fills plus two sell slices (500 from lot1, 200 from lot2).
        let journal = ledger.trade_journal();
        assert_eq!(journal.len(), 4);

        let sell_slices: Vec<_> = journal.iter().filter(|f| f.side == Side::Sell).collect();
        assert_eq!(sell_slices.len(), 2);
        assert_eq!(sell_slices[0].quantity, 500);
        assert_eq!(sell_slices[1].quantity, 200);
        // Each slice's own P&L, computed against its own lot's cost basis.
        assert!(sell_slices[0].realized_pnl > sell_slices[1].realized_pnl);
        let total_sell_qty: u64 = sell_slices.iter().map(|f| f.quantity).sum();
        assert_eq!(total_sell_qty, 700);
    }

    #[test]
    fn test_can_sell_blocked_while_any_lot_unsettled() {
        let mut ledger = Ledger::new(Money::from_f64(100_000.0), FeeSchedule::a_share(), 1);
        let symbol = Symbol::new("sh600519");

        ledger.apply_buy_fill(
            1,
            &symbol,
            Money::from_f64(10.0),
            100,
            date(2026, 7, 27), // Monday
            Utc::now(),
        );

        // Same day: not settleable yet.
        assert!(!ledger.can_sell(&symbol, date(2026, 7, 27)));
        // One calendar day later (Tuesday): still not settled, t_plus=1 needs > 1 day.
        assert!(!ledger.can_sell(&symbol, date(2026, 7, 28)));
        // Two calendar days later (Wednesday): settled.
        assert!(ledger.can_sell(&symbol, date(2026, 7, 29)));
    }

    #[test]
    fn test_can_sell_uses_calendar_days_not_trading_days() {
        // Bought Thursday with t_plus=1: Friday is only one calendar day
        // later, so the sale must still be blocked even though Friday is
        // the very next trading day.
        let mut ledger = Ledger::new(Money::from_f64(100_000.0), FeeSchedule::a_share(), 1);
        let symbol = Symbol::new("sh600519");
        ledger.apply_buy_fill(
            1,
            &symbol,
            Money::from_f64(10.0),
            100,
            date(2026, 7, 23), // Thursday
            Utc::now(),
        );
        assert!(!ledger.can_sell(&symbol, date(2026, 7, 24))); // Friday
        assert!(ledger.can_sell(&symbol, date(2026, 7, 25))); // Saturday
    }

    #[test]
    fn test_equity_history_caps_at_100_and_overwrites_same_timestamp() {
        let mut ledger = Ledger::new(Money::from_f64(100_000.0), FeeSchedule::a_share(), 1);
        let t = Utc::now();
        for _ in 0..150 {
            ledger.record_equity_sample(t, Money::ZERO);
        }
        assert_eq!(ledger.equity_history().count(), 1);
    }
}
