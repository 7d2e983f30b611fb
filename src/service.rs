//! The trading service facade: the single entry point every caller uses
//!
//! Owns one locked `{ledger, book}` pair behind an `Arc<Mutex<..>>`,
//! shared between the public API below, the background
//! [`crate::matching::MatchingEngine`] task and the background
//! [`crate::persistence::StatePersistor`] task. Every mutation takes the
//! lock for the duration of one logical operation.

use crate::calendar::{split, TradingCalendar, TradingPhase};
use crate::config::Config;
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::market_data::PriceCache;
use crate::order::{Order, OrderBook, OrderId, OrderState};
use crate::types::{Fill, Money, Position, Side, Symbol};
use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

struct Locked {
    ledger: Ledger,
    book: OrderBook,
}

pub struct TradingService {
    state: Arc<Mutex<Locked>>,
    calendar: TradingCalendar,
    prices: Arc<PriceCache>,
    config: Config,
}

/// Snapshot of cash, positions and pending-order counts for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioReport {
    pub cash: Money,
    pub frozen_cash: Money,
    pub positions: Vec<Position>,
    pub total_assets: Money,
    pub today_realized_pnl: Money,
    pub pending_order_count: usize,
    pub trade_count: usize,
}

impl TradingService {
    pub fn new(config: Config, calendar: TradingCalendar, prices: Arc<PriceCache>) -> Self {
        let ledger = Ledger::new(config.initial_cash, config.fee_schedule(), config.t_plus);
        Self {
            state: Arc::new(Mutex::new(Locked {
                ledger,
                book: OrderBook::new(),
            })),
            calendar,
            prices,
            config,
        }
    }

    fn phase_now(&self, now: DateTime<Utc>) -> TradingPhase {
        let (date, time) = split(now.naive_local());
        self.calendar.phase_at(date, time)
    }

    /// Validate and, if accepted, freeze the order's reservation and add
    /// it to the resting book. Checks run in order: symbol well-formedness,
    /// quantity/lot size, price positivity, session gating, limit-price
    /// band, then the side-specific holdings/cash check. Outside
    /// pre-market, an accepted order is first offered an immediate fill
    /// against the latest price before it ever rests in the book.
    pub async fn place_order(
        &self,
        symbol: Symbol,
        side: Side,
        limit_price: Money,
        quantity: u64,
        now: DateTime<Utc>,
    ) -> Result<OrderId, EngineError> {
        if !symbol.is_well_formed() {
            return Err(EngineError::SymbolNotFound(symbol));
        }
        if quantity == 0 || quantity % self.config.shares_per_lot != 0 {
            return Err(EngineError::InvalidQuantity);
        }
        if !limit_price.is_positive() {
            return Err(EngineError::InvalidPrice);
        }

        let phase = self.phase_now(now);
        if !phase.can_place_order() {
            return Err(EngineError::SessionClosed { phase });
        }

        let (upper, lower) = self.prices.limit_prices(&symbol).await?;
        match side {
            Side::Buy if limit_price > upper => {
                return Err(EngineError::LimitBreach {
                    limit: upper,
                    submitted: limit_price,
                })
            }
            Side::Sell if limit_price < lower => {
                return Err(EngineError::LimitBreach {
                    limit: lower,
                    submitted: limit_price,
                })
            }
            _ => {}
        }

        let mut locked = self.state.lock().await;

        match side {
            Side::Sell => {
                let available = locked.ledger.available_quantity(&symbol);
                if available < quantity {
                    return Err(EngineError::InsufficientHoldings {
                        symbol,
                        needed: quantity,
                        available,
                    });
                }
                let trade_date = now.date_naive();
                if !locked.ledger.can_sell(&symbol, trade_date) {
                    let settles_on = locked
                        .ledger
                        .settlement_complete_on(&symbol)
                        .unwrap_or(trade_date);
                    return Err(EngineError::SettlementLocked { symbol, settles_on });
                }
                locked.ledger.freeze_shares(&symbol, quantity);
            }
            Side::Buy => {
                let notional = limit_price * Money::from_i64(quantity as i64);
                let fee = locked.ledger.fee_schedule().buy_fee(notional);
                let total = notional + fee;
                if locked.ledger.available_cash() < total {
                    return Err(EngineError::InsufficientFunds {
                        needed: total,
                        available: locked.ledger.available_cash(),
                    });
                }
                locked.ledger.freeze_cash(total);
            }
        }

        let symbol_for_fill = symbol.clone();
        let order = Order::new(
            symbol,
            side,
            limit_price,
            quantity,
            now,
            Duration::minutes(self.config.order_expiry_minutes),
        );
        let id = order.id;
        locked.book.insert(order);
        info!(order_id = id, "order accepted");

        if !phase.is_pre_market() {
            if let Ok(price) = self.prices.latest_price(&symbol_for_fill).await {
                let fillable = price.is_positive()
                    && match side {
                        Side::Buy => price <= limit_price,
                        Side::Sell => price >= limit_price,
                    };
                if fillable {
                    let order = locked.book.get(id).expect("just inserted").clone();
                    self.execute_fill(&mut locked, id, &order, limit_price, now)
                        .await?;
                }
            }
        }

        Ok(id)
    }

    pub async fn cancel_order(&self, id: OrderId, now: DateTime<Utc>) -> Result<(), EngineError> {
        let phase = self.phase_now(now);
        if !phase.can_cancel() {
            return Err(EngineError::SessionClosed { phase });
        }

        let mut locked = self.state.lock().await;
        let order = locked
            .book
            .get(id)
            .cloned()
            .ok_or(EngineError::OrderNotFound(id))?;
        if order.state != OrderState::Pending {
            return Err(EngineError::OrderNotCancelable(id));
        }

        Self::release_reservation(&mut locked.ledger, &order);
        if let Some(order) = locked.book.get_mut(id) {
            order.state = OrderState::Canceled;
            order.updated_at = now;
        }
        locked.book.retire(id);
        info!(order_id = id, "order canceled");
        Ok(())
    }

    fn release_reservation(ledger: &mut Ledger, order: &Order) {
        match order.side {
            Side::Buy => {
                let notional = order.limit_price * Money::from_i64(order.quantity as i64);
                let fee = ledger.fee_schedule().buy_fee(notional);
                ledger.unfreeze_cash(notional + fee);
            }
            Side::Sell => ledger.unfreeze_shares(&order.symbol, order.quantity),
        }
    }

    /// Run one matching-engine tick: expire stale orders, then attempt a
    /// fill for every still-pending order if the session allows trading.
    /// Called by [`crate::matching::MatchingEngine`].
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<(), EngineError> {
        let phase = self.phase_now(now);
        let mut locked = self.state.lock().await;

        for id in locked.book.pending_ids() {
            let expired_or_over_attempted = {
                let order = locked.book.get(id).expect("pending id always present");
                order.is_expired(now) || order.attempts > self.config.max_fill_attempts
            };
            if expired_or_over_attempted {
                let order = locked.book.get(id).unwrap().clone();
                Self::release_reservation(&mut locked.ledger, &order);
                if let Some(order) = locked.book.get_mut(id) {
                    order.state = OrderState::Expired;
                    order.updated_at = now;
                }
                locked.book.retire(id);
                warn!(order_id = id, "order expired");
            }
        }

        if !phase.is_matchable() {
            return Ok(());
        }

        for id in locked.book.pending_ids() {
            let order = locked.book.get(id).expect("pending id always present").clone();
            let price = match self.prices.latest_price(&order.symbol).await {
                Ok(p) => p,
                Err(_) => continue,
            };

            let fillable = price.is_positive()
                && match order.side {
                    Side::Buy => price <= order.limit_price,
                    Side::Sell => price >= order.limit_price,
                };

            if fillable {
                self.execute_fill(&mut locked, id, &order, order.limit_price, now)
                    .await?;
            } else if let Some(order) = locked.book.get_mut(id) {
                order.attempts += 1;
                order.updated_at = now;
            }
        }

        Ok(())
    }

    /// Record a fill. `executed_price` is always the order's own limit
    /// price (a polled reference price only ever gates whether a fill
    /// happens, it is never what gets recorded as the trade price).
    async fn execute_fill(
        &self,
        locked: &mut Locked,
        id: OrderId,
        order: &Order,
        executed_price: Money,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let trade_date = now.date_naive();
        let fill = match order.side {
            Side::Buy => {
                let notional = order.limit_price * Money::from_i64(order.quantity as i64);
                let fee = locked.ledger.fee_schedule().buy_fee(notional);
                locked.ledger.unfreeze_cash(notional + fee);
                locked.ledger.apply_buy_fill(
                    id,
                    &order.symbol,
                    executed_price,
                    order.quantity,
                    trade_date,
                    now,
                )
            }
            Side::Sell => {
                locked.ledger.unfreeze_shares(&order.symbol, order.quantity);
                locked
                    .ledger
                    .apply_sell_fill(id, &order.symbol, executed_price, order.quantity, now)?
            }
        };

        if let Some(order) = locked.book.get_mut(id) {
            order.state = OrderState::Filled;
            order.updated_at = now;
        }
        locked.book.retire(id);

        let mut price_map = HashMap::new();
        price_map.insert(fill.symbol.clone(), executed_price);
        let stock_value = locked.ledger.stock_value(&price_map);
        locked.ledger.record_equity_sample(now, stock_value);

        info!(order_id = id, ?fill.side, %fill.price, fill.quantity, "order filled");
        Ok(())
    }

    pub async fn portfolio_report(&self, prices: &HashMap<Symbol, Money>) -> PortfolioReport {
        let locked = self.state.lock().await;
        let positions: Vec<Position> = locked
            .ledger
            .positions()
            .sorted_by_key(|p| p.symbol.as_str().to_string())
            .collect();
        let stock_value = locked.ledger.stock_value(prices);

        PortfolioReport {
            cash: locked.ledger.cash(),
            frozen_cash: locked.ledger.cash() - locked.ledger.available_cash(),
            total_assets: locked.ledger.cash() + stock_value,
            today_realized_pnl: locked.ledger.today_realized_pnl(),
            pending_order_count: locked.book.len_pending(),
            trade_count: locked.ledger.trade_journal().len(),
            positions,
        }
    }

    pub async fn trade_history(&self) -> Vec<Fill> {
        self.state.lock().await.ledger.trade_journal().to_vec()
    }
}

#[async_trait::async_trait]
impl crate::persistence::Snapshottable for TradingService {
    async fn snapshot(&self) -> crate::persistence::Snapshot {
        let locked = self.state.lock().await;
        crate::persistence::Snapshot {
            ledger: locked.ledger.to_snapshot(),
            book: locked.book.to_snapshot(),
        }
    }

    async fn restore(&self, snapshot: crate::persistence::Snapshot) {
        let mut locked = self.state.lock().await;
        locked.ledger = Ledger::restore(snapshot.ledger, self.config.fee_schedule());
        locked.book = OrderBook::restore(snapshot.book);
    }
}
