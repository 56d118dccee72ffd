//! Exchange fee schedule for binary contracts.
//!
//! Fees follow the standard binary-exchange equation
//! `rate * contracts * price * (1 - price)` with cent-wise round-up.

use rust_decimal::Decimal;

/// Immutable fee schedule loaded once per market.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    /// Rate for trades filled immediately against resting orders.
    pub taker_rate: Decimal,
    /// Rate for trades filled after resting on the book.
    pub maker_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            taker_rate: Decimal::new(7, 2),    // 0.07
            maker_rate: Decimal::new(175, 4),  // 0.0175
        }
    }
}

impl FeeSchedule {
    pub fn new(taker_rate: Decimal, maker_rate: Decimal) -> Self {
        Self {
            taker_rate,
            maker_rate,
        }
    }

    /// Fee burden with cent-wise round-up.
    fn fee(&self, rate: Decimal, price: Decimal, contracts: i64) -> Decimal {
        let raw = rate * Decimal::from(contracts) * price * (Decimal::ONE - price);
        (raw * Decimal::ONE_HUNDRED).ceil() / Decimal::ONE_HUNDRED
    }

    /// Total taker fee for `contracts` executed at `price`.
    pub fn taker_fee(&self, price: Decimal, contracts: i64) -> Decimal {
        self.fee(self.taker_rate, price, contracts)
    }

    /// Total maker fee for `contracts` executed at `price`.
    pub fn maker_fee(&self, price: Decimal, contracts: i64) -> Decimal {
        self.fee(self.maker_rate, price, contracts)
    }

    /// Total fee for a mixed fill: `made` contracts rested, `taken` crossed.
    pub fn mixed_fee(&self, price: Decimal, made: i64, taken: i64) -> Decimal {
        self.maker_fee(price, made) + self.taker_fee(price, taken)
    }

    /// Per-contract taker fee at `price`.
    pub fn taker_fee_per_contract(&self, price: Decimal) -> Decimal {
        self.taker_fee(price, 1)
    }

    /// Per-contract maker fee at `price`.
    pub fn maker_fee_per_contract(&self, price: Decimal) -> Decimal {
        self.maker_fee(price, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_taker_fee() {
        let fees = FeeSchedule::default();
        // 0.07 * 100 * 0.45 * 0.55 = 1.7325, cent round-up -> 1.74
        assert_eq!(fees.taker_fee(dec!(0.45), 100), dec!(1.74));
    }

    #[test]
    fn test_maker_fee() {
        let fees = FeeSchedule::default();
        // 0.0175 * 100 * 0.50 * 0.50 = 0.4375 -> 0.44
        assert_eq!(fees.maker_fee(dec!(0.50), 100), dec!(0.44));
    }

    #[test]
    fn test_mixed_fee_is_sum_of_parts() {
        let fees = FeeSchedule::default();
        let mixed = fees.mixed_fee(dec!(0.45), 40, 60);
        assert_eq!(
            mixed,
            fees.maker_fee(dec!(0.45), 40) + fees.taker_fee(dec!(0.45), 60)
        );
    }

    #[test]
    fn test_zero_contracts_zero_fee() {
        let fees = FeeSchedule::default();
        assert_eq!(fees.taker_fee(dec!(0.45), 0), Decimal::ZERO);
    }

    #[test]
    fn test_per_contract_fee_rounds_up() {
        let fees = FeeSchedule::default();
        // 0.07 * 0.45 * 0.55 = 0.017325 -> 0.02 per contract
        assert_eq!(fees.taker_fee_per_contract(dec!(0.45)), dec!(0.02));
    }
}
