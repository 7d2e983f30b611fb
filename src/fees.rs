//! Deterministic commission/transfer/stamp-duty fee schedule

use crate::types::Money;

/// A-share trading cost schedule. Every rate is fixed, not configurable
/// per-broker: commission at 2.5bps with a flat floor, a transfer fee at
/// 1bp, and stamp duty at 10bps charged only on sells.
#[derive(Debug, Clone, Copy)]
pub struct FeeSchedule {
    commission_rate: Money,
    commission_floor: Money,
    transfer_rate: Money,
    stamp_duty_rate: Money,
}

impl FeeSchedule {
    pub fn a_share() -> Self {
        Self {
            commission_rate: Money::from_f64(0.00025),
            commission_floor: Money::from_f64(5.00),
            transfer_rate: Money::from_f64(0.00001),
            stamp_duty_rate: Money::from_f64(0.001),
        }
    }

    fn commission(self, notional: Money) -> Money {
        (notional * self.commission_rate).max(self.commission_floor)
    }

    fn transfer_fee(self, notional: Money) -> Money {
        notional * self.transfer_rate
    }

    /// Commission + transfer fee. Applies to both buy and sell fills.
    pub fn buy_fee(self, notional: Money) -> Money {
        self.commission(notional) + self.transfer_fee(notional)
    }

    /// Commission + transfer fee + stamp duty (sell-only).
    pub fn sell_fee(self, notional: Money) -> Money {
        self.commission(notional) + self.transfer_fee(notional) + notional * self.stamp_duty_rate
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::a_share()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commission_floor_applies_to_small_trades() {
        let fees = FeeSchedule::a_share();
        let notional = Money::from_f64(1000.0); // 0.00025 * 1000 = 0.25, below the 5.00 floor
        let buy = fees.buy_fee(notional);
        assert_eq!(buy, Money::from_f64(5.0) + Money::from_f64(0.01));
    }

    #[test]
    fn test_commission_scales_above_floor() {
        let fees = FeeSchedule::a_share();
        let notional = Money::from_f64(1_000_000.0);
        let buy = fees.buy_fee(notional);
        // commission = 250.0, transfer = 10.0
        assert_eq!(buy, Money::from_f64(260.0));
    }

    #[test]
    fn test_sell_fee_includes_stamp_duty() {
        let fees = FeeSchedule::a_share();
        let notional = Money::from_f64(1_000_000.0);
        let sell = fees.sell_fee(notional);
        // commission 250 + transfer 10 + stamp duty 1000
        assert_eq!(sell, Money::from_f64(1260.0));
    }
}
