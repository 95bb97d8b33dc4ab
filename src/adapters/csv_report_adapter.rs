//! CSV report adapter implementing ReportPort.
//!
//! A report is a directory holding `equity.csv` (one row per processed bar)
//! and `trades.csv` (one row per closed round trip). Charting is left to
//! whatever reads those files.

use std::fs;
use std::path::Path;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::VoltraderError;
use crate::domain::ohlcv::Bar;
use crate::domain::regime::RegimeLabels;
use crate::domain::strategy::Strategy;
use crate::ports::report_port::ReportPort;

pub const EQUITY_FILE: &str = "equity.csv";
pub const TRADES_FILE: &str = "trades.csv";

#[derive(Debug, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    fn write_equity(result: &BacktestResult, path: &Path) -> Result<(), VoltraderError> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record(["date", "equity"])?;
        for point in result.equity_curve() {
            wtr.write_record([point.date.to_string(), format_money(point.equity)])?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_trades(result: &BacktestResult, path: &Path) -> Result<(), VoltraderError> {
        let mut wtr = csv::Writer::from_path(path)?;
        wtr.write_record([
            "entry_date",
            "exit_date",
            "side",
            "quantity",
            "entry_price",
            "exit_price",
            "pnl",
            "net_pnl",
        ])?;
        for trade in result.trades() {
            wtr.write_record([
                trade.entry_date.to_string(),
                trade.exit_date.to_string(),
                trade.side.to_string(),
                trade.quantity.to_string(),
                trade.entry_price.to_string(),
                trade.exit_price.to_string(),
                format_money(trade.pnl),
                format_money(trade.net_pnl()),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(
        &self,
        result: &BacktestResult,
        strategy: &Strategy,
        output_dir: &Path,
    ) -> Result<(), VoltraderError> {
        fs::create_dir_all(output_dir)?;
        Self::write_equity(result, &output_dir.join(EQUITY_FILE))?;
        Self::write_trades(result, &output_dir.join(TRADES_FILE))?;
        tracing::info!(
            strategy = %strategy.name,
            dir = %output_dir.display(),
            equity_rows = result.equity_curve().len(),
            trades = result.trades().len(),
            "report written"
        );
        Ok(())
    }
}

/// Write `bars` with their rolling statistics and regime label. Warm-up rows
/// leave the statistics and label empty.
pub fn write_labeled_csv(
    path: &Path,
    bars: &[Bar],
    labels: &RegimeLabels,
) -> Result<(), VoltraderError> {
    if labels.labels.len() != bars.len() {
        return Err(VoltraderError::data(format!(
            "{} labels for {} bars",
            labels.labels.len(),
            bars.len()
        )));
    }

    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record([
        "Date", "Open", "High", "Low", "Close", "Volume", "RollingMean", "RollingStd", "Regime",
    ])?;
    for (i, bar) in bars.iter().enumerate() {
        wtr.write_record([
            bar.date.to_string(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
            optional(labels.rolling_mean[i]),
            optional(labels.rolling_std[i]),
            labels.labels[i].map(|r| r.to_string()).unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn optional(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

fn format_money(value: f64) -> String {
    format!("{value:.4}")
}
