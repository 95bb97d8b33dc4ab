//! Threshold strategy: parameters and the per-bar decision function.

use std::fmt;

use super::error::VoltraderError;
use super::ohlcv::{Bar, Regime};
use super::position::Position;

pub const DEFAULT_LONG_THRESHOLD: f64 = 20.0;
pub const DEFAULT_SHORT_THRESHOLD: f64 = 15.0;
pub const DEFAULT_STOP_LOSS_FRACTION: f64 = 0.02;

/// What the engine should do with the current bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Hold,
    EnterLong,
    EnterShort,
    Exit,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Hold => write!(f, "hold"),
            Action::EnterLong => write!(f, "enter-long"),
            Action::EnterShort => write!(f, "enter-short"),
            Action::Exit => write!(f, "exit"),
        }
    }
}

/// Immutable per-run strategy parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    long_threshold: f64,
    short_threshold: f64,
    stop_loss_fraction: f64,
    entry_regimes: Option<Vec<Regime>>,
}

impl StrategyParams {
    /// Validated constructor.
    ///
    /// A long threshold below the short threshold is accepted: the decision
    /// function still resolves deterministically by testing the long entry
    /// first.
    pub fn new(
        long_threshold: f64,
        short_threshold: f64,
        stop_loss_fraction: f64,
    ) -> Result<Self, VoltraderError> {
        if !(long_threshold.is_finite() && long_threshold >= 0.0) {
            return Err(VoltraderError::config_invalid(
                "strategy",
                "long_threshold",
                "long_threshold must be a non-negative number",
            ));
        }
        if !(short_threshold.is_finite() && short_threshold >= 0.0) {
            return Err(VoltraderError::config_invalid(
                "strategy",
                "short_threshold",
                "short_threshold must be a non-negative number",
            ));
        }
        if !(stop_loss_fraction.is_finite() && (0.0..1.0).contains(&stop_loss_fraction)) {
            return Err(VoltraderError::config_invalid(
                "strategy",
                "stop_loss_fraction",
                "stop_loss_fraction must be in [0, 1)",
            ));
        }
        if long_threshold < short_threshold {
            tracing::warn!(
                long_threshold,
                short_threshold,
                "long_threshold is below short_threshold; long entries take precedence where both match"
            );
        }

        Ok(StrategyParams {
            long_threshold,
            short_threshold,
            stop_loss_fraction,
            entry_regimes: None,
        })
    }

    /// Only take entries on bars labelled with one of `regimes`.
    /// An empty list removes the filter.
    pub fn with_entry_regimes(mut self, regimes: Vec<Regime>) -> Self {
        self.entry_regimes = if regimes.is_empty() {
            None
        } else {
            Some(regimes)
        };
        self
    }

    pub fn long_threshold(&self) -> f64 {
        self.long_threshold
    }

    pub fn short_threshold(&self) -> f64 {
        self.short_threshold
    }

    pub fn stop_loss_fraction(&self) -> f64 {
        self.stop_loss_fraction
    }

    pub fn entry_regimes(&self) -> Option<&[Regime]> {
        self.entry_regimes.as_deref()
    }

    fn regime_allows_entry(&self, regime: Option<Regime>) -> bool {
        match (&self.entry_regimes, regime) {
            (None, _) => true,
            (Some(allowed), Some(r)) => allowed.contains(&r),
            (Some(_), None) => false,
        }
    }
}

impl Default for StrategyParams {
    fn default() -> Self {
        StrategyParams {
            long_threshold: DEFAULT_LONG_THRESHOLD,
            short_threshold: DEFAULT_SHORT_THRESHOLD,
            stop_loss_fraction: DEFAULT_STOP_LOSS_FRACTION,
            entry_regimes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub params: StrategyParams,
}

/// Decide the action for `bar` given the position carried in from the
/// previous bar.
///
/// Priority: stop-loss exit, then long entry, then short entry, then hold.
/// An open position that has not breached its stop is held; entries are
/// only considered when flat.
pub fn decide(bar: &Bar, params: &StrategyParams, position: Option<&Position>) -> Action {
    let close = bar.close;

    if let Some(pos) = position {
        return if pos.stop_breached(close) {
            Action::Exit
        } else {
            Action::Hold
        };
    }

    if !params.regime_allows_entry(bar.regime) {
        return Action::Hold;
    }

    if close > params.long_threshold {
        Action::EnterLong
    } else if close < params.short_threshold {
        Action::EnterShort
    } else {
        Action::Hold
    }
}
