//! Domain error types for the trading engine

use crate::calendar::TradingPhase;
use crate::types::{Money, Symbol};
use chrono::NaiveDate;
use thiserror::Error;

/// Errors surfaced by [`crate::service::TradingService`] and the
/// components it orchestrates. Never panics on these conditions; every
/// rejection path returns one of these variants instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient available cash: need {needed}, have {available}")]
    InsufficientFunds { needed: Money, available: Money },

    #[error("insufficient available holdings in {symbol}: need {needed}, have {available}")]
    InsufficientHoldings {
        symbol: Symbol,
        needed: u64,
        available: u64,
    },

    #[error("{symbol} is settlement-locked until {settles_on}")]
    SettlementLocked {
        symbol: Symbol,
        settles_on: NaiveDate,
    },

    #[error("orders cannot be placed or canceled during the {phase:?} session")]
    SessionClosed { phase: TradingPhase },

    #[error("price {submitted} breaches the session limit of {limit}")]
    LimitBreach { limit: Money, submitted: Money },

    #[error("quantity must be a positive multiple of the exchange lot size")]
    InvalidQuantity,

    #[error("price must be positive")]
    InvalidPrice,

    #[error("unknown symbol: {0}")]
    SymbolNotFound(Symbol),

    #[error("no price available for {0}")]
    PriceUnavailable(Symbol),

    #[error("order {0} not found")]
    OrderNotFound(u64),

    #[error("order {0} cannot be canceled in its current state")]
    OrderNotCancelable(u64),

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),
}
