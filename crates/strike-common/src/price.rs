//! Price range helpers for binary contracts.
//!
//! Binary contract prices live in [0.01, 0.99] dollars. The NO side of the
//! book is the complement of the YES side; `complement` converts between them.

use rust_decimal::Decimal;

/// Lowest tradeable contract price.
pub fn min_price() -> Decimal {
    Decimal::new(1, 2)
}

/// Highest tradeable contract price.
pub fn max_price() -> Decimal {
    Decimal::new(99, 2)
}

/// NO-side complement: 1 - price.
pub fn complement(price: Decimal) -> Decimal {
    Decimal::ONE - price
}

/// Whether a price is inside the tradeable range.
pub fn is_valid_price(price: Decimal) -> bool {
    price >= min_price() && price <= max_price()
}

/// Clamp a price into the tradeable range.
pub fn clamp_price(price: Decimal) -> Decimal {
    price.max(min_price()).min(max_price())
}
