//! Backtest engine and event loop.
//!
//! The engine walks a validated bar series in date order. For each bar it
//! asks [`decide`] for an action using the position carried in from the
//! previous bar, applies that action to the [`Ledger`], then marks the book
//! to the bar's close and records one equity sample. Bar `t + 1` is never
//! looked at while processing bar `t`.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use super::error::VoltraderError;
use super::ledger::Ledger;
use super::ohlcv::{validate_series, Bar};
use super::position::{Position, Side};
use super::strategy::{decide, Action, Strategy};

pub const DEFAULT_INITIAL_CASH: f64 = 100_000.0;
pub const DEFAULT_COMMISSION_RATE: f64 = 0.001;
pub const DEFAULT_STAKE: f64 = 1.0;

/// What to do with a position still open after the last bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndOfRun {
    /// Leave it open and report its unrealized P&L.
    #[default]
    LeaveOpen,
    /// Exit at the last bar's close before its equity is recorded.
    Close,
}

impl FromStr for EndOfRun {
    type Err = VoltraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "leave_open" | "leave-open" | "open" => Ok(EndOfRun::LeaveOpen),
            "close" | "force_close" | "force-close" => Ok(EndOfRun::Close),
            other => Err(VoltraderError::config_invalid(
                "backtest",
                "end_of_run",
                format!("unknown policy '{}', expected leave_open or close", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_cash: f64,
    pub commission_rate: f64,
    /// Units traded on every entry.
    pub stake: f64,
    pub end_of_run: EndOfRun,
    /// Annual rate, used only for Sharpe/Sortino.
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_cash: DEFAULT_INITIAL_CASH,
            commission_rate: DEFAULT_COMMISSION_RATE,
            stake: DEFAULT_STAKE,
            end_of_run: EndOfRun::LeaveOpen,
            risk_free_rate: 0.0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), VoltraderError> {
        if !(self.initial_cash.is_finite() && self.initial_cash > 0.0) {
            return Err(VoltraderError::config_invalid(
                "backtest",
                "initial_cash",
                "initial_cash must be positive",
            ));
        }
        if !(self.commission_rate.is_finite() && (0.0..1.0).contains(&self.commission_rate)) {
            return Err(VoltraderError::config_invalid(
                "backtest",
                "commission_rate",
                "commission_rate must be in [0, 1)",
            ));
        }
        if !(self.stake.is_finite() && self.stake > 0.0) {
            return Err(VoltraderError::config_invalid(
                "backtest",
                "stake",
                "stake must be positive",
            ));
        }
        if !(self.risk_free_rate.is_finite() && (0.0..1.0).contains(&self.risk_free_rate)) {
            return Err(VoltraderError::config_invalid(
                "backtest",
                "risk_free_rate",
                "risk_free_rate must be between 0 and 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Finished,
}

/// How many times each action was produced during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionCounts {
    pub hold: usize,
    pub enter_long: usize,
    pub enter_short: usize,
    pub exit: usize,
}

impl ActionCounts {
    fn record(&mut self, action: Action) {
        match action {
            Action::Hold => self.hold += 1,
            Action::EnterLong => self.enter_long += 1,
            Action::EnterShort => self.enter_short += 1,
            Action::Exit => self.exit += 1,
        }
    }
}

/// Outcome of a finished run. The ledger is read-only from here on.
#[derive(Debug, Clone)]
pub struct BacktestResult {
    ledger: Ledger,
    pub final_equity: f64,
    /// Position left open after the last processed bar, if any.
    pub open_position: Option<Position>,
    pub unrealized_pnl: f64,
    pub bars_processed: usize,
    pub aborted: bool,
    pub actions: ActionCounts,
}

impl BacktestResult {
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn initial_cash(&self) -> f64 {
        self.ledger.initial_cash()
    }

    pub fn equity_curve(&self) -> &[super::ledger::EquityPoint] {
        self.ledger.equity_curve()
    }

    pub fn trades(&self) -> &[super::position::ClosedTrade] {
        self.ledger.closed_trades()
    }

    pub fn realized_pnl(&self) -> f64 {
        self.ledger.realized_pnl()
    }
}

/// Single-use simulation driver: `Idle -> Running -> Finished`.
#[derive(Debug)]
pub struct Engine {
    strategy: Strategy,
    config: BacktestConfig,
    state: EngineState,
}

impl Engine {
    /// Build an engine, rejecting invalid configuration up front.
    pub fn new(strategy: Strategy, config: BacktestConfig) -> Result<Self, VoltraderError> {
        config.validate()?;
        Ok(Engine {
            strategy,
            config,
            state: EngineState::Idle,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn run(&mut self, bars: &[Bar]) -> Result<BacktestResult, VoltraderError> {
        let never = AtomicBool::new(false);
        self.run_with_cancel(bars, &never)
    }

    /// Run over `bars`, polling `cancel` before each bar. A cancelled run
    /// still returns the bars processed so far with `aborted` set.
    pub fn run_with_cancel(
        &mut self,
        bars: &[Bar],
        cancel: &AtomicBool,
    ) -> Result<BacktestResult, VoltraderError> {
        if self.state != EngineState::Idle {
            return Err(VoltraderError::invalid_state(format!(
                "engine cannot start from state {:?}",
                self.state
            )));
        }
        validate_series(bars)?;

        self.state = EngineState::Running;
        let outcome = self.simulate(bars, cancel);
        self.state = EngineState::Finished;
        outcome
    }

    fn simulate(
        &self,
        bars: &[Bar],
        cancel: &AtomicBool,
    ) -> Result<BacktestResult, VoltraderError> {
        let params = &self.strategy.params;
        let mut ledger = Ledger::new(
            self.config.initial_cash,
            self.config.commission_rate,
            params.stop_loss_fraction(),
        );
        let mut actions = ActionCounts::default();
        let mut bars_processed = 0usize;
        let mut aborted = false;
        let last_index = bars.len() - 1;

        tracing::info!(
            strategy = %self.strategy.name,
            bars = bars.len(),
            first = %bars[0].date,
            last = %bars[last_index].date,
            "backtest started"
        );

        for (i, bar) in bars.iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                tracing::warn!(date = %bar.date, bars_processed, "backtest cancelled");
                aborted = true;
                break;
            }

            let action = decide(bar, params, ledger.position());
            actions.record(action);
            self.apply(&mut ledger, action, bar)?;

            if i == last_index && self.config.end_of_run == EndOfRun::Close && !ledger.is_flat() {
                let trade = ledger.exit(bar.close, bar.date)?;
                tracing::debug!(date = %bar.date, side = %trade.side, price = bar.close, pnl = trade.pnl, "closed at end of run");
            }

            if let Some(pos) = ledger.position() {
                if !(pos.quantity > 0.0) {
                    return Err(VoltraderError::invalid_state(format!(
                        "open {} position with quantity {} on {}",
                        pos.side, pos.quantity, bar.date
                    )));
                }
            }

            let equity = ledger.mark_to_market(bar.close);
            ledger.record_equity(bar.date, equity)?;
            bars_processed += 1;
        }

        let last_close = bars[bars_processed.saturating_sub(1)].close;
        let final_equity = ledger
            .equity_curve()
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.config.initial_cash);
        let open_position = ledger.position().cloned();
        let unrealized_pnl = ledger.unrealized_pnl(last_close);

        tracing::info!(
            final_equity,
            trades = ledger.closed_trades().len(),
            open = open_position.is_some(),
            aborted,
            "backtest finished"
        );

        Ok(BacktestResult {
            ledger,
            final_equity,
            open_position,
            unrealized_pnl,
            bars_processed,
            aborted,
            actions,
        })
    }

    fn apply(&self, ledger: &mut Ledger, action: Action, bar: &Bar) -> Result<(), VoltraderError> {
        match action {
            Action::Hold => {}
            Action::EnterLong | Action::EnterShort => {
                let side = if action == Action::EnterLong {
                    Side::Long
                } else {
                    Side::Short
                };
                let pos = ledger.enter(side, bar.close, self.config.stake, bar.date)?;
                tracing::debug!(date = %bar.date, %side, price = pos.entry_price, stop = pos.stop_price, "entered");
            }
            Action::Exit => {
                let trade = ledger.exit(bar.close, bar.date)?;
                tracing::debug!(date = %bar.date, side = %trade.side, price = trade.exit_price, pnl = trade.pnl, "stop-loss exit");
            }
        }
        Ok(())
    }
}

/// Validate, build an engine and run it once.
pub fn run_backtest(
    bars: &[Bar],
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, VoltraderError> {
    Engine::new(strategy.clone(), config.clone())?.run(bars)
}
