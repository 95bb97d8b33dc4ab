//! Parallel threshold/stop-loss grid search.
//!
//! Every combination gets its own [`Engine`] and therefore its own ledger;
//! the bar series is shared read-only across the rayon pool.

use rayon::prelude::*;

use super::backtest::{BacktestConfig, Engine};
use super::error::VoltraderError;
use super::metrics::Metrics;
use super::ohlcv::{validate_series, Bar};
use super::strategy::{Strategy, StrategyParams};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepGrid {
    pub long_thresholds: Vec<f64>,
    pub short_thresholds: Vec<f64>,
    pub stop_loss_fractions: Vec<f64>,
}

impl SweepGrid {
    pub fn len(&self) -> usize {
        self.long_thresholds.len() * self.short_thresholds.len() * self.stop_loss_fractions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product in grid order: long, then short, then stop.
    /// Combinations that fail parameter validation are dropped with a warning.
    pub fn combinations(&self) -> Vec<StrategyParams> {
        let mut out = Vec::with_capacity(self.len());
        for &long in &self.long_thresholds {
            for &short in &self.short_thresholds {
                for &stop in &self.stop_loss_fractions {
                    match StrategyParams::new(long, short, stop) {
                        Ok(params) => out.push(params),
                        Err(e) => tracing::warn!(long, short, stop, "skipping combination: {e}"),
                    }
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct SweepResult {
    pub params: StrategyParams,
    pub final_equity: f64,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    pub total_trades: usize,
    pub open_at_end: bool,
}

/// Run every valid combination of `grid` over `bars`.
///
/// Results are sorted by final equity, best first; equal equities keep grid
/// order. The series is validated once up front so a bad input fails the
/// whole sweep instead of every run.
pub fn run_sweep(
    bars: &[Bar],
    grid: &SweepGrid,
    config: &BacktestConfig,
) -> Result<Vec<SweepResult>, VoltraderError> {
    config.validate()?;
    validate_series(bars)?;

    let combos = grid.combinations();
    tracing::info!(combinations = combos.len(), bars = bars.len(), "sweep started");

    let runs: Vec<Result<SweepResult, VoltraderError>> = combos
        .into_par_iter()
        .map(|params| {
            let strategy = Strategy {
                name: format!(
                    "sweep long={} short={} stop={}",
                    params.long_threshold(),
                    params.short_threshold(),
                    params.stop_loss_fraction()
                ),
                params,
            };
            let mut engine = Engine::new(strategy, config.clone())?;
            let result = engine.run(bars)?;
            let metrics = Metrics::compute(&result, config.risk_free_rate);
            Ok(SweepResult {
                params: engine.strategy().params.clone(),
                final_equity: result.final_equity,
                total_return: metrics.total_return,
                max_drawdown: metrics.max_drawdown,
                sharpe_ratio: metrics.sharpe_ratio,
                total_trades: metrics.total_trades,
                open_at_end: result.open_position.is_some(),
            })
        })
        .collect();

    let mut results = runs.into_iter().collect::<Result<Vec<_>, _>>()?;
    sort_results(&mut results);
    Ok(results)
}

/// Best final equity first. The sort is stable so ties keep their order.
pub fn sort_results(results: &mut [SweepResult]) {
    results.sort_by(|a, b| {
        b.final_equity
            .partial_cmp(&a.final_equity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
