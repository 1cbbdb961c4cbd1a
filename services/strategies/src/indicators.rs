//! Rolling indicators over `Decimal` prices
//!
//! All arithmetic is checked. A result outside the `Decimal` range is
//! reported as [`Overflow`] and leaves the indicator unchanged.

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::VecDeque;
use thiserror::Error;

/// An indicator value left the `Decimal` range
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("{0} overflowed the decimal range")]
pub struct Overflow(pub &'static str);

/// Fixed-length window with a running sum
#[derive(Debug, Clone)]
pub struct RollingMean {
    period: usize,
    window: VecDeque<Decimal>,
    sum: Decimal,
}

impl RollingMean {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            window: VecDeque::with_capacity(period),
            sum: Decimal::ZERO,
        }
    }

    /// Push a value; returns the mean once the window is full
    pub fn push(&mut self, value: Decimal) -> Result<Option<Decimal>, Overflow> {
        let evicted = if self.window.len() == self.period {
            self.window.front().copied()
        } else {
            None
        };
        let mut sum = self.sum;
        if let Some(evicted) = evicted {
            sum = sum.checked_sub(evicted).ok_or(Overflow("rolling sum"))?;
        }
        sum = sum.checked_add(value).ok_or(Overflow("rolling sum"))?;

        if evicted.is_some() {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.sum = sum;
        Ok(self.value())
    }

    pub fn value(&self) -> Option<Decimal> {
        self.is_ready()
            .then(|| self.sum / Decimal::from(self.period))
    }

    pub fn is_ready(&self) -> bool {
        self.window.len() == self.period
    }
}

/// Percent change between the newest price and the one `period` ticks ago
#[derive(Debug, Clone)]
pub struct RateOfChange {
    period: usize,
    window: VecDeque<Decimal>,
}

impl RateOfChange {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            window: VecDeque::with_capacity(period + 1),
        }
    }

    /// Slides the window even when the change itself overflows
    pub fn push(&mut self, value: Decimal) -> Result<Option<Decimal>, Overflow> {
        self.window.push_back(value);
        if self.window.len() > self.period + 1 {
            self.window.pop_front();
        }
        self.value()
    }

    pub fn value(&self) -> Result<Option<Decimal>, Overflow> {
        if self.window.len() != self.period + 1 {
            return Ok(None);
        }
        let (Some(&oldest), Some(&newest)) = (self.window.front(), self.window.back()) else {
            return Ok(None);
        };
        if oldest.is_zero() {
            return Ok(None);
        }
        newest
            .checked_sub(oldest)
            .and_then(|delta| delta.checked_div(oldest))
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .map(Some)
            .ok_or(Overflow("rate of change"))
    }
}

/// Direction of a fast/slow crossover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cross {
    Above,
    Below,
}

/// Detects the fast series crossing the slow one
#[derive(Debug, Clone, Default)]
pub struct CrossDetector {
    last: Option<Ordering>,
}

impl CrossDetector {
    /// Feed the latest pair; reports a cross only on a strict change of side
    pub fn update(&mut self, fast: Decimal, slow: Decimal) -> Option<Cross> {
        let relation = fast.cmp(&slow);
        if relation == Ordering::Equal {
            return None;
        }
        let previous = self.last.replace(relation);
        match (previous, relation) {
            (Some(Ordering::Less), Ordering::Greater) => Some(Cross::Above),
            (Some(Ordering::Greater), Ordering::Less) => Some(Cross::Below),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_rolling_mean() {
        let mut mean = RollingMean::new(3);
        assert_eq!(mean.push(dec!(10)), Ok(None));
        assert_eq!(mean.push(dec!(20)), Ok(None));
        assert_eq!(mean.push(dec!(30)), Ok(Some(dec!(20))));
        assert_eq!(mean.push(dec!(40)), Ok(Some(dec!(30))));
    }

    #[test]
    fn test_rolling_sum_overflow_leaves_window_intact() {
        let mut mean = RollingMean::new(2);
        mean.push(Decimal::MAX).unwrap();
        assert_eq!(mean.push(Decimal::MAX), Err(Overflow("rolling sum")));

        // the rejected value never entered the window
        assert!(!mean.is_ready());
        assert_eq!(mean.push(dec!(-1)).unwrap(), Some((Decimal::MAX - dec!(1)) / dec!(2)));
    }

    #[test]
    fn test_rate_of_change() {
        let mut roc = RateOfChange::new(2);
        assert_eq!(roc.push(dec!(100)), Ok(None));
        assert_eq!(roc.push(dec!(105)), Ok(None));
        assert_eq!(roc.push(dec!(110)), Ok(Some(dec!(10))));
        assert_eq!(
            roc.push(dec!(99)).unwrap().map(|v| v.round_dp(2)),
            Some(dec!(-5.71))
        );
    }

    #[test]
    fn test_rate_of_change_from_tiny_price_overflows() {
        let mut roc = RateOfChange::new(1);
        assert_eq!(roc.push(Decimal::new(1, 28)), Ok(None));
        assert_eq!(
            roc.push(dec!(10000000000)),
            Err(Overflow("rate of change"))
        );
        assert_eq!(roc.push(dec!(11000000000)), Ok(Some(dec!(10))));
    }

    #[test]
    fn test_cross_requires_side_change() {
        let mut cross = CrossDetector::default();
        assert_eq!(cross.update(dec!(1), dec!(2)), None);
        assert_eq!(cross.update(dec!(1), dec!(2)), None);
        assert_eq!(cross.update(dec!(3), dec!(2)), Some(Cross::Above));
        assert_eq!(cross.update(dec!(2), dec!(2)), None);
        assert_eq!(cross.update(dec!(1), dec!(2)), Some(Cross::Below));
    }
}
