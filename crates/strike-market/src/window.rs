//! Bounded sliding price history feeding the realized-volatility estimate.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Ordered (timestamp, price) samples bounded to a configured horizon.
///
/// Entries older than the horizon are evicted on each push. The realized
/// volatility is the standard deviation of log returns over the window.
#[derive(Debug, Clone)]
pub struct PriceWindow {
    horizon: Duration,
    samples: VecDeque<(DateTime<Utc>, Decimal)>,
}

impl PriceWindow {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            samples: VecDeque::new(),
        }
    }

    /// Append a sample and evict entries older than the horizon.
    pub fn push(&mut self, timestamp: DateTime<Utc>, price: Decimal) {
        self.samples.push_back((timestamp, price));
        let cutoff = timestamp - self.horizon;
        while let Some((ts, _)) = self.samples.front() {
            if *ts < cutoff {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Drop all samples. Called when sequence continuity breaks: prices on
    /// either side of a resync are not a contiguous series.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Standard deviation of log returns over the window.
    ///
    /// Returns `None` with fewer than two samples. Non-positive prices are
    /// skipped since their log return is undefined.
    pub fn realized_volatility(&self) -> Option<f64> {
        let prices: Vec<f64> = self
            .samples
            .iter()
            .filter_map(|(_, p)| p.to_f64())
            .filter(|p| *p > 0.0)
            .collect();
        if prices.len() < 2 {
            return None;
        }

        let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        Some(variance.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_eviction_beyond_horizon() {
        let mut window = PriceWindow::new(Duration::seconds(60));
        window.push(t(0), dec!(0.50));
        window.push(t(50), dec!(0.51));
        window.push(t(100), dec!(0.52));
        // The t(0) sample is older than 100 - 60 and gets evicted; t(50)
        // is inside the horizon and stays.
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_volatility_needs_two_samples() {
        let mut window = PriceWindow::new(Duration::seconds(60));
        assert_eq!(window.realized_volatility(), None);
        window.push(t(0), dec!(0.50));
        assert_eq!(window.realized_volatility(), None);
        window.push(t(1), dec!(0.50));
        assert!(window.realized_volatility().is_some());
    }

    #[test]
    fn test_constant_prices_zero_volatility() {
        let mut window = PriceWindow::new(Duration::seconds(60));
        for i in 0..5 {
            window.push(t(i), dec!(0.50));
        }
        assert_eq!(window.realized_volatility(), Some(0.0));
    }

    #[test]
    fn test_volatility_of_known_series() {
        let mut window = PriceWindow::new(Duration::seconds(600));
        window.push(t(0), dec!(0.50));
        window.push(t(1), dec!(0.55));
        window.push(t(2), dec!(0.50));

        let r1 = (0.55f64 / 0.50).ln();
        let r2 = (0.50f64 / 0.55).ln();
        let mean = (r1 + r2) / 2.0;
        let expected = (((r1 - mean).powi(2) + (r2 - mean).powi(2)) / 2.0).sqrt();

        let vol = window.realized_volatility().unwrap();
        assert!((vol - expected).abs() < 1e-12);
    }

    #[test]
    fn test_clear() {
        let mut window = PriceWindow::new(Duration::seconds(60));
        window.push(t(0), dec!(0.50));
        window.push(t(1), dec!(0.51));
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.realized_volatility(), None);
    }
}
