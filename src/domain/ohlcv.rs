//! Price bars and series validation.

use chrono::NaiveDate;
use std::fmt;

use super::error::VoltraderError;

/// Number of distinct regime labels a bar can carry.
pub const REGIME_COUNT: usize = 3;

/// Opaque volatility-regime label in `0..REGIME_COUNT`.
///
/// Nothing in the crate assumes a particular label means calm or stressed
/// markets unless the labeler was asked to calibrate its numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Regime(u8);

impl Regime {
    pub fn new(label: u8) -> Result<Self, VoltraderError> {
        if (label as usize) < REGIME_COUNT {
            Ok(Regime(label))
        } else {
            Err(VoltraderError::data(format!(
                "regime label {} out of range 0..{}",
                label, REGIME_COUNT
            )))
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub regime: Option<Regime>,
}

impl Bar {
    /// Bar where every price field is `close`. Handy for close-only feeds.
    pub fn from_close(date: NaiveDate, close: f64) -> Self {
        Bar {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume: 0,
            regime: None,
        }
    }

    pub fn with_regime(mut self, regime: Regime) -> Self {
        self.regime = Some(regime);
        self
    }
}

/// Reject series the engine must not run on: empty input, closes that are
/// not finite and strictly positive, and dates that are not strictly increasing.
pub fn validate_series(bars: &[Bar]) -> Result<(), VoltraderError> {
    if bars.is_empty() {
        return Err(VoltraderError::data("bar series is empty"));
    }

    for (i, bar) in bars.iter().enumerate() {
        if !(bar.close.is_finite() && bar.close > 0.0) {
            return Err(VoltraderError::data(format!(
                "bar {} ({}) has invalid close {}",
                i, bar.date, bar.close
            )));
        }
        if i > 0 {
            let prev = bars[i - 1].date;
            if bar.date == prev {
                return Err(VoltraderError::data(format!(
                    "bar {} duplicates date {}",
                    i, bar.date
                )));
            }
            if bar.date < prev {
                return Err(VoltraderError::data(format!(
                    "bar {} ({}) is earlier than bar {} ({})",
                    i,
                    bar.date,
                    i - 1,
                    prev
                )));
            }
        }
    }

    Ok(())
}

/// Keep bars whose date falls inside `[start, end]`; open bounds keep everything.
pub fn filter_range(bars: Vec<Bar>, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Vec<Bar> {
    bars.into_iter()
        .filter(|b| start.is_none_or(|s| b.date >= s) && end.is_none_or(|e| b.date <= e))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn regime_accepts_three_labels() {
        for label in 0..3u8 {
            assert_eq!(Regime::new(label).unwrap().value(), label);
        }
    }

    #[test]
    fn regime_rejects_out_of_range() {
        let err = Regime::new(3).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn from_close_fills_prices() {
        let bar = Bar::from_close(day(2), 17.5);
        assert_eq!(bar.open, 17.5);
        assert_eq!(bar.high, 17.5);
        assert_eq!(bar.low, 17.5);
        assert_eq!(bar.volume, 0);
        assert!(bar.regime.is_none());
    }

    #[test]
    fn validate_accepts_increasing_dates() {
        let bars = vec![
            Bar::from_close(day(1), 10.0),
            Bar::from_close(day(2), 11.0),
            Bar::from_close(day(5), 12.0),
        ];
        assert!(validate_series(&bars).is_ok());
    }

    #[test]
    fn validate_rejects_empty() {
        assert!(validate_series(&[]).unwrap_err().is_data_error());
    }

    #[test]
    fn validate_rejects_duplicate_date() {
        let bars = vec![Bar::from_close(day(1), 10.0), Bar::from_close(day(1), 11.0)];
        let err = validate_series(&bars).unwrap_err();
        assert!(err.is_data_error());
        assert!(err.to_string().contains("duplicates"));
    }

    #[test]
    fn validate_rejects_out_of_order() {
        let bars = vec![Bar::from_close(day(3), 10.0), Bar::from_close(day(2), 11.0)];
        let err = validate_series(&bars).unwrap_err();
        assert!(err.to_string().contains("earlier"));
    }

    #[test]
    fn validate_rejects_nan_close() {
        let bars = vec![Bar::from_close(day(1), f64::NAN)];
        assert!(validate_series(&bars).unwrap_err().is_data_error());
    }

    #[test]
    fn validate_rejects_zero_and_negative_close() {
        for close in [0.0, -1.5] {
            let bars = vec![Bar::from_close(day(1), 16.0), Bar::from_close(day(2), close)];
            let err = validate_series(&bars).unwrap_err();
            assert!(err.is_data_error());
            assert!(err.to_string().contains("bar 1"));
        }
    }

    #[test]
    fn filter_range_is_inclusive() {
        let bars: Vec<Bar> = (1..=5).map(|d| Bar::from_close(day(d), d as f64)).collect();
        let kept = filter_range(bars, Some(day(2)), Some(day(4)));
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].date, day(2));
        assert_eq!(kept[2].date, day(4));
    }
}
