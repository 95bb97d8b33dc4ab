//! Property-based checks on ledger and engine invariants.

mod common;

use common::*;
use proptest::prelude::*;
use voltrader::domain::backtest::{run_backtest, BacktestConfig, EndOfRun};
use voltrader::domain::ledger::Ledger;
use voltrader::domain::position::Side;
use voltrader::domain::strategy::{decide, Action, StrategyParams};

fn arb_closes() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(5.0..60.0_f64, 1..150)
}

/// Closes that may also be zero, negative or non-finite.
fn arb_dirty_closes() -> impl Strategy<Value = Vec<f64>> {
    let close = prop_oneof![
        8 => 5.0..60.0_f64,
        1 => Just(0.0),
        1 => -10.0..0.0_f64,
        1 => Just(f64::NAN),
    ];
    prop::collection::vec(close, 1..40)
}

fn arb_price() -> impl Strategy<Value = f64> {
    1.0..200.0_f64
}

fn arb_side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Long), Just(Side::Short)]
}

fn strategy_with(long: f64, short: f64, stop: f64) -> voltrader::domain::strategy::Strategy {
    voltrader::domain::strategy::Strategy {
        name: "prop".into(),
        params: StrategyParams::new(long, short, stop).unwrap(),
    }
}

proptest! {
    /// One equity sample per bar, an open position always has a positive
    /// quantity, and cash reconciles with the booked trades.
    #[test]
    fn engine_invariants_hold(
        closes in arb_closes(),
        long in 10.0..40.0_f64,
        short in 5.0..30.0_f64,
        stop in 0.0..0.2_f64,
        commission in 0.0..0.01_f64,
        close_at_end in any::<bool>(),
    ) {
        let bars = make_bars(&closes);
        let config = BacktestConfig {
            commission_rate: commission,
            end_of_run: if close_at_end { EndOfRun::Close } else { EndOfRun::LeaveOpen },
            ..BacktestConfig::default()
        };
        let result = run_backtest(&bars, &strategy_with(long, short, stop), &config).unwrap();

        prop_assert_eq!(result.equity_curve().len(), bars.len());
        prop_assert_eq!(result.bars_processed, bars.len());
        for (point, bar) in result.equity_curve().iter().zip(&bars) {
            prop_assert_eq!(point.date, bar.date);
        }

        if let Some(pos) = &result.open_position {
            prop_assert!(pos.quantity > 0.0);
            prop_assert!(!close_at_end);
        }

        let open_commission = result
            .open_position
            .as_ref()
            .map(|p| p.entry_commission)
            .unwrap_or(0.0);
        let booked: f64 = result.trades().iter().map(|t| t.net_pnl()).sum();
        let cash = result.ledger().cash();
        prop_assert!((cash - (config.initial_cash + booked - open_commission)).abs() < 1e-6);
        prop_assert!((result.realized_pnl() - (cash - config.initial_cash)).abs() < 1e-6);
        prop_assert!((result.final_equity - (cash + result.unrealized_pnl)).abs() < 1e-6);
    }

    /// Stopping after any bar leaves a position with positive quantity whose
    /// stop is not breached by that bar's close, and the equity seen so far
    /// matches the full run (no look-ahead).
    #[test]
    fn position_invariant_holds_after_every_bar(
        closes in prop::collection::vec(5.0..60.0_f64, 1..60),
        stop in 0.0..0.1_f64,
    ) {
        let bars = make_bars(&closes);
        let strategy = strategy_with(20.0, 15.0, stop);
        let config = BacktestConfig::default();
        let full = run_backtest(&bars, &strategy, &config).unwrap();

        for end in 1..=bars.len() {
            let prefix = run_backtest(&bars[..end], &strategy, &config).unwrap();
            if let Some(pos) = &prefix.open_position {
                prop_assert!(pos.quantity > 0.0);
                prop_assert!(!pos.stop_breached(bars[end - 1].close));
            }
            prop_assert_eq!(prefix.equity_curve(), &full.equity_curve()[..end]);
        }
    }

    /// A series either fails validation as a data error or runs to the end;
    /// the ledger never sees a price it refuses.
    #[test]
    fn valid_series_never_hits_invalid_state(closes in arb_dirty_closes()) {
        let bars = make_bars(&closes);
        match run_backtest(&bars, &strategy_with(20.0, 15.0, 0.02), &zero_commission_config()) {
            Ok(result) => prop_assert_eq!(result.bars_processed, bars.len()),
            Err(err) => {
                prop_assert!(err.is_data_error());
                prop_assert!(closes.iter().any(|c| !(c.is_finite() && *c > 0.0)));
            }
        }
    }

    /// Trades never overlap: each entry comes strictly after the previous exit.
    #[test]
    fn trades_do_not_overlap(closes in arb_closes(), stop in 0.0..0.1_f64) {
        let bars = make_bars(&closes);
        let result = run_backtest(&bars, &strategy_with(20.0, 15.0, stop), &zero_commission_config()).unwrap();
        for trade in result.trades() {
            prop_assert!(trade.exit_date > trade.entry_date);
        }
        for pair in result.trades().windows(2) {
            prop_assert!(pair[1].entry_date > pair[0].exit_date);
        }
        let counts = result.actions;
        prop_assert_eq!(counts.hold + counts.enter_long + counts.enter_short + counts.exit, bars.len());
    }

    /// Enter-then-exit at the same price with no commission books nothing.
    #[test]
    fn round_trip_without_commission_is_flat(
        side in arb_side(),
        price in arb_price(),
        qty in 0.1..100.0_f64,
    ) {
        let mut ledger = Ledger::new(100_000.0, 0.0, 0.02);
        ledger.enter(side, price, qty, date(2024, 1, 1)).unwrap();
        let trade = ledger.exit(price, date(2024, 1, 2)).unwrap();
        prop_assert_eq!(trade.pnl, 0.0);
        prop_assert_eq!(ledger.realized_pnl(), 0.0);
        prop_assert_eq!(ledger.cash(), 100_000.0);
        prop_assert!(ledger.is_flat());
    }

    /// A second entry always fails and leaves the original position untouched.
    #[test]
    fn double_entry_is_invalid_state(
        first in arb_side(),
        second in arb_side(),
        price in arb_price(),
    ) {
        let mut ledger = Ledger::new(100_000.0, 0.001, 0.02);
        ledger.enter(first, price, 1.0, date(2024, 1, 1)).unwrap();
        let before = ledger.clone();
        let err = ledger.enter(second, price, 1.0, date(2024, 1, 2)).unwrap_err();
        prop_assert!(err.is_invalid_state());
        prop_assert_eq!(ledger, before);
    }

    #[test]
    fn exit_while_flat_is_invalid_state(price in arb_price()) {
        let mut ledger = Ledger::new(100_000.0, 0.001, 0.02);
        let err = ledger.exit(price, date(2024, 1, 1)).unwrap_err();
        prop_assert!(err.is_invalid_state());
        prop_assert!(ledger.closed_trades().is_empty());
    }

    /// Repeated marks at the same price give the same equity.
    #[test]
    fn hold_is_idempotent(side in arb_side(), entry in arb_price(), mark in arb_price()) {
        let mut ledger = Ledger::new(100_000.0, 0.001, 0.02);
        ledger.enter(side, entry, 1.0, date(2024, 1, 1)).unwrap();
        let first = ledger.mark_to_market(mark);
        let second = ledger.mark_to_market(mark);
        prop_assert_eq!(first, second);
        prop_assert!((first - (ledger.cash() + ledger.unrealized_pnl(mark))).abs() < 1e-9);
    }

    /// A breached stop always exits, whatever the entry thresholds say.
    #[test]
    fn stop_breach_always_exits(entry in 20.5..100.0_f64, drop in 0.03..0.5_f64) {
        let params = StrategyParams::default();
        let mut ledger = Ledger::new(100_000.0, 0.0, params.stop_loss_fraction());
        ledger.enter(Side::Long, entry, 1.0, date(2024, 1, 1)).unwrap();
        let bar = make_bar("2024-01-02", entry * (1.0 - drop));
        prop_assert_eq!(decide(&bar, &params, ledger.position()), Action::Exit);
    }
}
