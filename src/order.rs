//! Order lifecycle and the resting-order book

use crate::types::{Money, Side, Symbol};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

static ORDER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

pub type OrderId = u64;

fn next_order_id() -> OrderId {
    ORDER_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// An order's lifecycle has exactly one forward transition out of
/// `Pending`; once terminal, an order is never mutated again. This
/// engine has no partial fills and no depth book to rest a
/// partially-matched order in, so there is no `PartiallyFilled` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    Pending,
    Filled,
    Canceled,
    Expired,
}

impl OrderState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, OrderState::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub limit_price: Money,
    pub quantity: u64,
    pub state: OrderState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

impl Order {
    pub fn new(
        symbol: Symbol,
        side: Side,
        limit_price: Money,
        quantity: u64,
        now: DateTime<Utc>,
        expiry: Duration,
    ) -> Self {
        Self {
            id: next_order_id(),
            symbol,
            side,
            limit_price,
            quantity,
            state: OrderState::Pending,
            created_at: now,
            updated_at: now,
            expires_at: now + expiry,
            attempts: 0,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Resting-order storage: a fast id-keyed lookup plus an arrival-order
/// FIFO queue.
///
/// Orders match against one polled reference price rather than against
/// other resting orders, so there is no price level to index by, only
/// arrival order.
#[derive(Default)]
pub struct OrderBook {
    orders: HashMap<OrderId, Order>,
    pending: VecDeque<OrderId>,
}

/// Serializable projection of [`OrderBook`] used for disk snapshots.
#[derive(Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub orders: HashMap<OrderId, Order>,
    pub pending: VecDeque<OrderId>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_snapshot(&self) -> OrderBookSnapshot {
        OrderBookSnapshot {
            orders: self.orders.clone(),
            pending: self.pending.clone(),
        }
    }

    pub fn restore(snapshot: OrderBookSnapshot) -> Self {
        // Keep the order-id counter ahead of every restored order so newly
        // placed orders never collide with a restored id.
        if let Some(&max_id) = snapshot.orders.keys().max() {
            let mut current = ORDER_ID_COUNTER.load(Ordering::SeqCst);
            while current <= max_id {
                match ORDER_ID_COUNTER.compare_exchange(
                    current,
                    max_id + 1,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                ) {
                    Ok(_) => break,
                    Err(observed) => current = observed,
                }
            }
        }
        Self {
            orders: snapshot.orders,
            pending: snapshot.pending,
        }
    }

    pub fn insert(&mut self, order: Order) -> OrderId {
        let id = order.id;
        self.pending.push_back(id);
        self.orders.insert(id, order);
        id
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&id)
    }

    /// Remove an order from the pending queue once it reaches a terminal
    /// state. The order record itself is retained in `orders` for
    /// history/reporting.
    pub fn retire(&mut self, id: OrderId) {
        self.pending.retain(|&pending_id| pending_id != id);
    }

    pub fn pending_ids(&self) -> Vec<OrderId> {
        self.pending.iter().copied().collect()
    }

    pub fn len_pending(&self) -> usize {
        self.pending.len()
    }

    pub fn all_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_retire() {
        let mut book = OrderBook::new();
        let order = Order::new(
            Symbol::new("sh600519"),
            Side::Buy,
            Money::from_f64(10.0),
            100,
            Utc::now(),
            Duration::minutes(30),
        );
        let id = book.insert(order);
        assert_eq!(book.len_pending(), 1);
        book.retire(id);
        assert_eq!(book.len_pending(), 0);
        assert!(book.get(id).is_some());
    }

    #[test]
    fn test_fifo_pending_order() {
        let mut book = OrderBook::new();
        let now = Utc::now();
        let first = book.insert(Order::new(
            Symbol::new("sh600519"),
            Side::Buy,
            Money::from_f64(10.0),
            100,
            now,
            Duration::minutes(30),
        ));
        let second = book.insert(Order::new(
            Symbol::new("sh600519"),
            Side::Buy,
            Money::from_f64(10.0),
            100,
            now,
            Duration::minutes(30),
        ));
        assert_eq!(book.pending_ids(), vec![first, second]);
    }

    #[test]
    fn test_order_expiry() {
        let now = Utc::now();
        let order = Order::new(
            Symbol::new("sh600519"),
            Side::Buy,
            Money::from_f64(10.0),
            100,
            now,
            Duration::minutes(30),
        );
        assert!(!order.is_expired(now));
        assert!(order.is_expired(now + Duration::minutes(31)));
    }
}
