//! Performance metrics over a finished backtest.

use super::backtest::BacktestResult;
use super::ledger::EquityPoint;
use super::position::{ClosedTrade, Side};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub final_equity: f64,
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    /// Longest run of bars spent below a prior equity peak.
    pub max_drawdown_duration: i64,
    pub total_trades: usize,
    pub long_trades: usize,
    pub short_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_trade_duration: f64,
    pub total_commission: f64,
}

impl Metrics {
    /// Trade statistics use each trade's net P&L (both commission legs).
    pub fn compute(result: &BacktestResult, risk_free_rate: f64) -> Self {
        let equity_curve = result.equity_curve();
        let trades = result.trades();
        let initial_cash = result.initial_cash();
        let final_equity = result.final_equity;

        let total_return = if initial_cash > 0.0 {
            (final_equity - initial_cash) / initial_cash
        } else {
            0.0
        };

        let years = equity_curve.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);

        let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, daily_rf);

        let stats = TradeStats::from_trades(trades);

        Metrics {
            final_equity,
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            total_trades: trades.len(),
            long_trades: trades.iter().filter(|t| t.side == Side::Long).count(),
            short_trades: trades.iter().filter(|t| t.side == Side::Short).count(),
            trades_won: stats.won,
            trades_lost: stats.lost,
            trades_breakeven: stats.breakeven,
            win_rate: stats.win_rate(),
            profit_factor: stats.profit_factor(),
            avg_win: stats.avg_win(),
            avg_loss: stats.avg_loss(),
            largest_win: stats.largest_win,
            largest_loss: stats.largest_loss,
            avg_trade_duration: stats.avg_duration(),
            total_commission: result.ledger().total_commission(),
        }
    }
}

#[derive(Debug, Default)]
struct TradeStats {
    won: usize,
    lost: usize,
    breakeven: usize,
    total_wins: f64,
    total_losses: f64,
    largest_win: f64,
    largest_loss: f64,
    total_duration_days: i64,
}

impl TradeStats {
    fn from_trades(trades: &[ClosedTrade]) -> Self {
        let mut stats = TradeStats::default();
        for trade in trades {
            let pnl = trade.net_pnl();
            if pnl > 0.0 {
                stats.won += 1;
                stats.total_wins += pnl;
                stats.largest_win = stats.largest_win.max(pnl);
            } else if pnl < 0.0 {
                stats.lost += 1;
                stats.total_losses += pnl.abs();
                stats.largest_loss = stats.largest_loss.max(pnl.abs());
            } else {
                stats.breakeven += 1;
            }
            stats.total_duration_days += trade.holding_days();
        }
        stats
    }

    fn total(&self) -> usize {
        self.won + self.lost + self.breakeven
    }

    fn win_rate(&self) -> f64 {
        if self.total() > 0 {
            self.won as f64 / self.total() as f64
        } else {
            0.0
        }
    }

    fn profit_factor(&self) -> f64 {
        if self.total_losses > 0.0 {
            self.total_wins / self.total_losses
        } else if self.total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        }
    }

    fn avg_win(&self) -> f64 {
        if self.won > 0 {
            self.total_wins / self.won as f64
        } else {
            0.0
        }
    }

    fn avg_loss(&self) -> f64 {
        if self.lost > 0 {
            self.total_losses / self.lost as f64
        } else {
            0.0
        }
    }

    fn avg_duration(&self) -> f64 {
        if self.total() > 0 {
            self.total_duration_days as f64 / self.total() as f64
        } else {
            0.0
        }
    }
}

fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_risk_adjusted(equity_curve: &[EquityPoint], daily_rf: f64) -> (f64, f64) {
    if equity_curve.len() < 2 {
        return (0.0, 0.0);
    }

    let returns: Vec<f64> = equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                (w[1].equity - prev) / prev
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let excess_return = mean - daily_rf;

    let sharpe = if stddev > 0.0 {
        (excess_return / stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    let downside_sq: f64 = returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|&r| (r - daily_rf).powi(2))
        .sum();
    let downside_stddev = (downside_sq / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        (excess_return / downside_stddev) * TRADING_DAYS_PER_YEAR.sqrt()
    } else {
        0.0
    };

    (sharpe, sortino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{run_backtest, BacktestConfig};
    use crate::domain::ohlcv::Bar;
    use crate::domain::strategy::{Strategy, StrategyParams};
    use chrono::NaiveDate;

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| EquityPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                equity: v,
            })
            .collect()
    }

    fn make_trade(pnl: f64, days: i64) -> ClosedTrade {
        let entry_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ClosedTrade {
            side: Side::Long,
            quantity: 1.0,
            entry_date,
            exit_date: entry_date + chrono::Duration::days(days),
            entry_price: 20.0,
            exit_price: 20.0 + pnl,
            entry_commission: 0.0,
            exit_commission: 0.0,
            pnl,
        }
    }

    fn run(closes: &[f64]) -> BacktestResult {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars: Vec<Bar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::from_close(start + chrono::Duration::days(i as i64), c))
            .collect();
        let strategy = Strategy {
            name: "metrics".into(),
            params: StrategyParams::default(),
        };
        let config = BacktestConfig {
            commission_rate: 0.0,
            ..BacktestConfig::default()
        };
        run_backtest(&bars, &strategy, &config).unwrap()
    }

    #[test]
    fn metrics_flat_run() {
        let metrics = Metrics::compute(&run(&[17.0, 18.0, 16.0]), 0.0);
        assert_eq!(metrics.total_return, 0.0);
        assert_eq!(metrics.total_trades, 0);
        assert_eq!(metrics.max_drawdown, 0.0);
        assert_eq!(metrics.sharpe_ratio, 0.0);
        assert_eq!(metrics.win_rate, 0.0);
        assert_eq!(metrics.profit_factor, 0.0);
    }

    #[test]
    fn metrics_count_trades_by_side() {
        let metrics = Metrics::compute(&run(&[10.0, 12.0, 22.0, 21.0, 15.9]), 0.0);
        assert_eq!(metrics.total_trades, 2);
        assert_eq!(metrics.long_trades, 1);
        assert_eq!(metrics.short_trades, 1);
        assert_eq!(metrics.trades_lost, 2);
        assert!((metrics.total_return - (-3.0 / 100_000.0)).abs() < 1e-12);
        assert!((metrics.largest_loss - 2.0).abs() < 1e-9);
    }

    #[test]
    fn trade_stats_wins_and_losses() {
        let stats = TradeStats::from_trades(&[
            make_trade(100.0, 5),
            make_trade(-50.0, 3),
            make_trade(200.0, 10),
            make_trade(0.0, 2),
        ]);
        assert_eq!(stats.won, 2);
        assert_eq!(stats.lost, 1);
        assert_eq!(stats.breakeven, 1);
        assert!((stats.win_rate() - 0.5).abs() < f64::EPSILON);
        assert!((stats.profit_factor() - 6.0).abs() < 1e-9);
        assert!((stats.avg_win() - 150.0).abs() < 1e-9);
        assert!((stats.avg_loss() - 50.0).abs() < 1e-9);
        assert!((stats.avg_duration() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn trade_stats_use_net_pnl() {
        let mut trade = make_trade(0.1, 1);
        trade.entry_commission = 0.2;
        let stats = TradeStats::from_trades(&[trade]);
        assert_eq!(stats.lost, 1);
    }

    #[test]
    fn profit_factor_without_losses_is_infinite() {
        let stats = TradeStats::from_trades(&[make_trade(10.0, 1)]);
        assert!(stats.profit_factor().is_infinite());
    }

    #[test]
    fn max_drawdown() {
        let curve = make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        let (dd, _) = compute_drawdown(&curve);
        assert!((dd - (110.0 - 80.0) / 110.0).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_duration() {
        let curve = make_equity_curve(&[100.0, 110.0, 100.0, 90.0, 85.0, 95.0, 111.0]);
        let (_, duration) = compute_drawdown(&curve);
        assert_eq!(duration, 4);
    }

    #[test]
    fn sharpe_positive_for_steady_gains() {
        let values: Vec<f64> = (0..253).map(|i| 100_000.0 * (1.0 + 0.001 * i as f64)).collect();
        let curve = make_equity_curve(&values);
        let (sharpe, _) = compute_risk_adjusted(&curve, 0.0);
        assert!(sharpe > 0.0);
    }

    #[test]
    fn sortino_finite_with_mixed_returns() {
        let curve = make_equity_curve(&[100.0, 101.0, 100.5, 101.5, 100.0, 102.0]);
        let (sharpe, sortino) = compute_risk_adjusted(&curve, 0.0);
        assert!(sharpe.is_finite());
        assert!(sortino.is_finite());
    }
}
