//! Trading calendar: session-phase classification for A-share exchanges
//!
//! Shanghai and Shenzhen run the same intraday schedule. Nine disjoint
//! windows cover a full trading day; everything outside a trading day's
//! own hours, and every non-trading day, classifies as [`TradingPhase::NonTrading`].

use chrono::{NaiveDate, NaiveTime, Timelike, Weekday};
use std::collections::HashSet;

/// One of the nine intraday session windows, plus `NonTrading` for days
/// the exchange isn't open at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradingPhase {
    /// 09:15-09:20, order entry and cancellation both allowed.
    PreOpen,
    /// 09:20-09:25, opening call auction, no cancellation.
    OpenCallNoCancel,
    /// 09:25-09:30, opening call auction, no cancellation.
    OpenCall,
    /// 09:30-11:30, continuous morning session.
    ContinuousAm,
    /// 11:30-13:00, midday recess, no order activity.
    Break,
    /// 13:00-14:57, continuous afternoon session.
    ContinuousPm,
    /// 14:57-15:00, closing call auction, no cancellation.
    CloseCall,
    /// 15:00-15:30, post-market fixed-price trading.
    PostMarket,
    /// 15:30-09:15 the next trading day, or any non-trading day.
    Closed,
    /// Weekends and holidays.
    NonTrading,
}

impl TradingPhase {
    /// Whether a resting order may be canceled while this phase is active.
    pub fn can_cancel(self) -> bool {
        matches!(
            self,
            TradingPhase::PreOpen | TradingPhase::ContinuousAm | TradingPhase::ContinuousPm
        )
    }

    /// Whether a new order may be submitted while this phase is active.
    pub fn can_place_order(self) -> bool {
        !matches!(self, TradingPhase::NonTrading | TradingPhase::Closed)
    }

    /// Whether this phase is one of the pre-market call-auction windows.
    pub fn is_pre_market(self) -> bool {
        matches!(
            self,
            TradingPhase::PreOpen | TradingPhase::OpenCall | TradingPhase::OpenCallNoCancel
        )
    }

    /// Whether the matching engine should run a matching pass this tick.
    pub fn is_matchable(self) -> bool {
        matches!(self, TradingPhase::ContinuousAm | TradingPhase::ContinuousPm)
    }
}

struct SessionWindow {
    phase: TradingPhase,
    start: NaiveTime,
    end: NaiveTime,
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).expect("static session boundary is always valid")
}

fn session_windows() -> [SessionWindow; 9] {
    [
        SessionWindow {
            phase: TradingPhase::PreOpen,
            start: time(9, 15),
            end: time(9, 20),
        },
        SessionWindow {
            phase: TradingPhase::OpenCallNoCancel,
            start: time(9, 20),
            end: time(9, 25),
        },
        SessionWindow {
            phase: TradingPhase::OpenCall,
            start: time(9, 25),
            end: time(9, 30),
        },
        SessionWindow {
            phase: TradingPhase::ContinuousAm,
            start: time(9, 30),
            end: time(11, 30),
        },
        SessionWindow {
            phase: TradingPhase::Break,
            start: time(11, 30),
            end: time(13, 0),
        },
        SessionWindow {
            phase: TradingPhase::ContinuousPm,
            start: time(13, 0),
            end: time(14, 57),
        },
        SessionWindow {
            phase: TradingPhase::CloseCall,
            start: time(14, 57),
            end: time(15, 0),
        },
        SessionWindow {
            phase: TradingPhase::PostMarket,
            start: time(15, 0),
            end: time(15, 30),
        },
        // Wraps midnight: evaluated as start <= t || t < end.
        SessionWindow {
            phase: TradingPhase::Closed,
            start: time(15, 30),
            end: time(9, 15),
        },
    ]
}

/// Classifies wall-clock instants into trading-day status and session
/// phase, and tracks a fixed table of exchange holidays.
///
/// Holidays are a static, explicitly dated set rather than a live
/// country-calendar lookup, so this table needs periodic manual refresh
/// (see `DESIGN.md`).
pub struct TradingCalendar {
    holidays: HashSet<NaiveDate>,
}

impl TradingCalendar {
    pub fn new(holidays: HashSet<NaiveDate>) -> Self {
        Self { holidays }
    }

    /// A calendar with no holidays configured; every weekday is a trading day.
    pub fn weekdays_only() -> Self {
        Self::new(HashSet::new())
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    /// Classify a local wall-clock instant into its trading phase.
    pub fn phase_at(&self, date: NaiveDate, naive_time: NaiveTime) -> TradingPhase {
        if !self.is_trading_day(date) {
            return TradingPhase::NonTrading;
        }

        for window in session_windows() {
            if window.start > window.end {
                if naive_time >= window.start || naive_time < window.end {
                    return window.phase;
                }
            } else if naive_time >= window.start && naive_time < window.end {
                return window.phase;
            }
        }

        TradingPhase::Closed
    }
}

/// Split a `chrono::DateTime`-like timestamp into date and naive time
/// for calendar classification, ignoring the sub-second component.
pub fn split(naive_datetime: chrono::NaiveDateTime) -> (NaiveDate, NaiveTime) {
    let t = naive_datetime.time();
    (
        naive_datetime.date(),
        NaiveTime::from_hms_opt(t.hour(), t.minute(), t.second()).unwrap_or(t),
    )
}
