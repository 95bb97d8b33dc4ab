//! Configuration parsing and validation.
//!
//! Every value read here goes through a typed reader that distinguishes an
//! absent key (use the default) from a present key that fails to parse
//! (a `ConfigInvalid` error). Range checks live with the domain types they
//! guard: [`BacktestConfig::validate`], [`StrategyParams::new`] and
//! [`RegimeLabeler::validate`].

use chrono::NaiveDate;

use crate::domain::backtest::{
    BacktestConfig, EndOfRun, DEFAULT_COMMISSION_RATE, DEFAULT_INITIAL_CASH, DEFAULT_STAKE,
};
use crate::domain::error::VoltraderError;
use crate::domain::ohlcv::Regime;
use crate::domain::regime::{RegimeLabeler, DEFAULT_MAX_ITERATIONS, DEFAULT_WINDOW};
use crate::domain::strategy::{
    Strategy, StrategyParams, DEFAULT_LONG_THRESHOLD, DEFAULT_SHORT_THRESHOLD,
    DEFAULT_STOP_LOSS_FRACTION,
};
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_STRATEGY_NAME: &str = "VIX threshold";

/// Inclusive date filter applied to the bar series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

pub fn parse_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, VoltraderError> {
    let end_of_run = match non_empty(config, "backtest", "end_of_run") {
        Some(s) => s.parse::<EndOfRun>()?,
        None => EndOfRun::default(),
    };

    let bt = BacktestConfig {
        initial_cash: read_double(config, "backtest", "initial_cash", DEFAULT_INITIAL_CASH)?,
        commission_rate: read_double(
            config,
            "backtest",
            "commission_rate",
            DEFAULT_COMMISSION_RATE,
        )?,
        stake: read_double(config, "backtest", "stake", DEFAULT_STAKE)?,
        end_of_run,
        risk_free_rate: read_double(config, "backtest", "risk_free_rate", 0.0)?,
    };
    bt.validate()?;
    Ok(bt)
}

pub fn parse_date_range(config: &dyn ConfigPort) -> Result<DateRange, VoltraderError> {
    let start = read_date(config, "backtest", "start_date")?;
    let end = read_date(config, "backtest", "end_date")?;

    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(VoltraderError::config_invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    Ok(DateRange { start, end })
}

pub fn parse_strategy(config: &dyn ConfigPort) -> Result<Strategy, VoltraderError> {
    let name = non_empty(config, "strategy", "name")
        .unwrap_or_else(|| DEFAULT_STRATEGY_NAME.to_string());

    let params = StrategyParams::new(
        read_double(config, "strategy", "long_threshold", DEFAULT_LONG_THRESHOLD)?,
        read_double(config, "strategy", "short_threshold", DEFAULT_SHORT_THRESHOLD)?,
        read_double(
            config,
            "strategy",
            "stop_loss_fraction",
            DEFAULT_STOP_LOSS_FRACTION,
        )?,
    )?
    .with_entry_regimes(read_regimes(config, "strategy", "entry_regimes")?);

    Ok(Strategy { name, params })
}

/// `None` unless `[regime] enabled = true`.
pub fn parse_regime_labeler(
    config: &dyn ConfigPort,
) -> Result<Option<RegimeLabeler>, VoltraderError> {
    if !read_bool(config, "regime", "enabled", false)? {
        return Ok(None);
    }

    let window = read_int(config, "regime", "window", DEFAULT_WINDOW as i64)?;
    let max_iterations = read_int(
        config,
        "regime",
        "max_iterations",
        DEFAULT_MAX_ITERATIONS as i64,
    )?;

    let labeler = RegimeLabeler {
        window: to_usize("window", window)?,
        max_iterations: to_usize("max_iterations", max_iterations)?,
        calibrate: read_bool(config, "regime", "calibrate", false)?,
    };
    labeler.validate()?;
    Ok(Some(labeler))
}

fn to_usize(key: &str, value: i64) -> Result<usize, VoltraderError> {
    usize::try_from(value)
        .map_err(|_| VoltraderError::config_invalid("regime", key, "must not be negative"))
}

fn non_empty(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn read_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, VoltraderError> {
    match non_empty(config, section, key) {
        None => Ok(default),
        Some(raw) => raw.parse::<f64>().map_err(|_| {
            VoltraderError::config_invalid(section, key, format!("'{raw}' is not a number"))
        }),
    }
}

pub fn read_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, VoltraderError> {
    match non_empty(config, section, key) {
        None => Ok(default),
        Some(raw) => raw.parse::<i64>().map_err(|_| {
            VoltraderError::config_invalid(section, key, format!("'{raw}' is not an integer"))
        }),
    }
}

pub fn read_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, VoltraderError> {
    match non_empty(config, section, key) {
        None => Ok(default),
        Some(raw) => match raw.to_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(VoltraderError::config_invalid(
                section,
                key,
                format!("'{raw}' is not a boolean"),
            )),
        },
    }
}

pub fn read_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, VoltraderError> {
    match non_empty(config, section, key) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                VoltraderError::config_invalid(
                    section,
                    key,
                    format!("invalid {key} format, expected YYYY-MM-DD"),
                )
            }),
    }
}

/// Comma-separated regime labels, e.g. `0,2`. Absent or empty means none.
pub fn read_regimes(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Vec<Regime>, VoltraderError> {
    let Some(raw) = non_empty(config, section, key) else {
        return Ok(Vec::new());
    };

    let mut regimes = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let value = part.parse::<u8>().map_err(|_| {
            VoltraderError::config_invalid(section, key, format!("'{part}' is not a regime label"))
        })?;
        let regime = Regime::new(value)
            .map_err(|e| VoltraderError::config_invalid(section, key, e.to_string()))?;
        if !regimes.contains(&regime) {
            regimes.push(regime);
        }
    }
    Ok(regimes)
}
