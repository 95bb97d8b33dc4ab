//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::{write_labeled_csv, CsvReportAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestResult, Engine};
use crate::domain::config_validation::{
    parse_backtest_config, parse_date_range, parse_regime_labeler, parse_strategy, DateRange,
};
use crate::domain::error::VoltraderError;
use crate::domain::metrics::Metrics;
use crate::domain::ohlcv::{validate_series, Bar, REGIME_COUNT};
use crate::domain::regime::{RegimeLabeler, DEFAULT_WINDOW};
use crate::domain::strategy::Strategy;
use crate::domain::sweep::{run_sweep, SweepGrid};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "voltrader", about = "VIX threshold strategy backtester")]
pub struct Cli {
    /// Debug-level diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Price CSV, overrides `[data] path`
        #[arg(short, long)]
        data: Option<PathBuf>,
        /// Directory for equity.csv and trades.csv
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Label bars with volatility regimes
    Label {
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value_t = DEFAULT_WINDOW)]
        window: usize,
        /// Number regimes by ascending mean close
        #[arg(long)]
        calibrate: bool,
    },
    /// Run a threshold/stop-loss grid
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(long, value_delimiter = ',', required = true)]
        long: Vec<f64>,
        #[arg(long, value_delimiter = ',', required = true)]
        short: Vec<f64>,
        #[arg(long, value_delimiter = ',', required = true)]
        stop: Vec<f64>,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Everything a backtest needs, resolved from configuration.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub backtest: BacktestConfig,
    pub range: DateRange,
    pub strategy: Strategy,
    pub labeler: Option<RegimeLabeler>,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            data,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, data.as_deref(), output.as_deref())
            }
        }
        Command::Label {
            data,
            output,
            window,
            calibrate,
        } => run_label(&data, &output, window, calibrate),
        Command::Sweep {
            config,
            data,
            long,
            short,
            stop,
            top,
        } => {
            let grid = SweepGrid {
                long_thresholds: long,
                short_thresholds: short,
                stop_loss_fractions: stop,
            };
            run_sweep_command(&config, data.as_deref(), &grid, top)
        }
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(e: &VoltraderError) -> ExitCode {
    eprintln!("error: {e}");
    e.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

pub fn build_plan(config: &dyn ConfigPort) -> Result<RunPlan, VoltraderError> {
    Ok(RunPlan {
        backtest: parse_backtest_config(config)?,
        range: parse_date_range(config)?,
        strategy: parse_strategy(config)?,
        labeler: parse_regime_labeler(config)?,
    })
}

/// `--data` wins over `[data] path`.
pub fn resolve_data_path(
    data_override: Option<&Path>,
    config: &dyn ConfigPort,
) -> Result<PathBuf, VoltraderError> {
    if let Some(path) = data_override {
        return Ok(path.to_path_buf());
    }
    config
        .get_string("data", "path")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| VoltraderError::ConfigMissing {
            section: "data".into(),
            key: "path".into(),
        })
}

/// Fetch, validate and (when configured) regime-label the bar series.
pub fn load_bars(data_port: &dyn DataPort, plan: &RunPlan) -> Result<Vec<Bar>, VoltraderError> {
    let mut bars = data_port.fetch_bars(plan.range.start, plan.range.end)?;
    validate_series(&bars)?;
    if let Some(labeler) = &plan.labeler {
        labeler.apply(&mut bars)?;
    }
    Ok(bars)
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    plan: &RunPlan,
) -> Result<BacktestResult, VoltraderError> {
    let bars = load_bars(data_port, plan)?;
    let mut engine = Engine::new(plan.strategy.clone(), plan.backtest.clone())?;
    engine.run(&bars)
}

fn run_backtest(config_path: &Path, data: Option<&Path>, output: Option<&Path>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let plan = match build_plan(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let data_path = match resolve_data_path(data, &adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    let data_port = CsvAdapter::new(data_path);
    let result = match run_backtest_pipeline(&data_port, &plan) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    let metrics = Metrics::compute(&result, plan.backtest.risk_free_rate);
    print_summary(&plan.strategy, &result, &metrics);

    if let Some(dir) = output {
        if let Err(e) = CsvReportAdapter::new().write(&result, &plan.strategy, dir) {
            return fail(&e);
        }
        println!("\nReport written to: {}", dir.display());
    }
    ExitCode::SUCCESS
}

pub fn print_summary(strategy: &Strategy, result: &BacktestResult, metrics: &Metrics) {
    println!("Strategy:                 {}", strategy.name);
    println!("Starting Portfolio Value: {:.2}", result.initial_cash());
    println!("Final Portfolio Value:    {:.2}", result.final_equity);
    println!("Bars Processed:           {}", result.bars_processed);
    if let Some(pos) = &result.open_position {
        println!(
            "Open Position:            {} {} @ {:.2} (unrealized {:+.2})",
            pos.side, pos.quantity, pos.entry_price, result.unrealized_pnl
        );
    }

    println!("\n=== Results ===");
    println!("Total Return:     {:.4}%", metrics.total_return * 100.0);
    println!("Annualized:       {:.4}%", metrics.annualized_return * 100.0);
    println!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    println!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    println!("Max Drawdown:     -{:.4}%", metrics.max_drawdown * 100.0);
    println!(
        "Total Trades:     {} ({} long, {} short)",
        metrics.total_trades, metrics.long_trades, metrics.short_trades
    );
    println!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    println!("Profit Factor:    {:.2}", metrics.profit_factor);
    println!("Commission Paid:  {:.2}", metrics.total_commission);
}

pub fn run_dry_run(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let plan = match build_plan(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    let params = &plan.strategy.params;
    println!("Strategy: {}", plan.strategy.name);
    println!("  long_threshold:     {}", params.long_threshold());
    println!("  short_threshold:    {}", params.short_threshold());
    println!("  stop_loss_fraction: {}", params.stop_loss_fraction());
    match params.entry_regimes() {
        Some(regimes) => {
            let list: Vec<String> = regimes.iter().map(|r| r.to_string()).collect();
            println!("  entry_regimes:      {}", list.join(","));
        }
        None => println!("  entry_regimes:      any"),
    }
    println!("Backtest:");
    println!("  initial_cash:       {}", plan.backtest.initial_cash);
    println!("  commission_rate:    {}", plan.backtest.commission_rate);
    println!("  stake:              {}", plan.backtest.stake);
    println!("  end_of_run:         {:?}", plan.backtest.end_of_run);
    match &plan.labeler {
        Some(l) => println!(
            "Regime labelling: window {}, calibrate {}",
            l.window, l.calibrate
        ),
        None => println!("Regime labelling: off"),
    }
    match resolve_data_path(None, &adapter) {
        Ok(p) => println!("Data: {}", p.display()),
        Err(_) => println!("Data: (pass --data)"),
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_label(data: &Path, output: &Path, window: usize, calibrate: bool) -> ExitCode {
    let labeler = match RegimeLabeler::new(window) {
        Ok(l) => l.calibrated(calibrate),
        Err(e) => return fail(&e),
    };

    let bars = match CsvAdapter::new(data.to_path_buf()).fetch_bars(None, None) {
        Ok(b) => b,
        Err(e) => return fail(&e),
    };
    if let Err(e) = validate_series(&bars) {
        return fail(&e);
    }

    let labels = match labeler.label(&bars) {
        Ok(l) => l,
        Err(e) => return fail(&e),
    };
    if let Err(e) = write_labeled_csv(output, &bars, &labels) {
        return fail(&e);
    }

    let mut counts = [0usize; REGIME_COUNT];
    for label in labels.labels.iter().flatten() {
        counts[label.value() as usize] += 1;
    }
    println!("Labelled {} bars ({} k-means iterations)", bars.len(), labels.iterations);
    for (k, centroid) in labels.centroids.iter().enumerate() {
        println!(
            "  regime {k}: {:>5} bars, close {:.2}, mean {:.2}, std {:.2}",
            counts[k], centroid[0], centroid[1], centroid[2]
        );
    }
    println!("Written to: {}", output.display());
    ExitCode::SUCCESS
}

fn run_sweep_command(
    config_path: &Path,
    data: Option<&Path>,
    grid: &SweepGrid,
    top: usize,
) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let plan = match build_plan(&adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let data_path = match resolve_data_path(data, &adapter) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    let bars = match load_bars(&CsvAdapter::new(data_path), &plan) {
        Ok(b) => b,
        Err(e) => return fail(&e),
    };

    let results = match run_sweep(&bars, grid, &plan.backtest) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    println!(
        "{:>8} {:>8} {:>8} {:>14} {:>10} {:>8} {:>7}",
        "long", "short", "stop", "final_equity", "return%", "maxdd%", "trades"
    );
    for r in results.iter().take(top) {
        println!(
            "{:>8} {:>8} {:>8} {:>14.2} {:>10.4} {:>8.4} {:>7}{}",
            r.params.long_threshold(),
            r.params.short_threshold(),
            r.params.stop_loss_fraction(),
            r.final_equity,
            r.total_return * 100.0,
            r.max_drawdown * 100.0,
            r.total_trades,
            if r.open_at_end { " *" } else { "" }
        );
    }
    println!("\n{} of {} combinations shown", results.len().min(top), results.len());
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match build_plan(&adapter) {
        Ok(plan) => {
            println!("Configuration is valid.");
            println!(
                "  strategy '{}': long > {}, short < {}, stop {}",
                plan.strategy.name,
                plan.strategy.params.long_threshold(),
                plan.strategy.params.short_threshold(),
                plan.strategy.params.stop_loss_fraction()
            );
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}
