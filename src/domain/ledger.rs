//! Cash, position and equity bookkeeping for a single-instrument backtest.
//!
//! The ledger holds at most one position. Entering while a position is
//! open, or exiting while flat, is a logic fault in the caller and is
//! reported as [`VoltraderError::InvalidState`] rather than ignored.
//!
//! Cash moves by realized P&L and commission only: opening a position
//! charges the entry commission, closing it books the price P&L less the
//! exit commission. Equity is cash plus the open position's unrealized P&L.

use chrono::NaiveDate;

use super::error::VoltraderError;
use super::position::{ClosedTrade, Position, Side};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Commission on a trade's notional.
pub fn calculate_commission(notional: f64, commission_rate: f64) -> f64 {
    notional.abs() * commission_rate
}

/// Initial stop level for a fresh position.
/// Long: entry * (1 - fraction). Short: entry * (1 + fraction).
pub fn initial_stop(side: Side, entry_price: f64, stop_loss_fraction: f64) -> f64 {
    match side {
        Side::Long => entry_price * (1.0 - stop_loss_fraction),
        Side::Short => entry_price * (1.0 + stop_loss_fraction),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    initial_cash: f64,
    cash: f64,
    commission_rate: f64,
    stop_loss_fraction: f64,
    position: Option<Position>,
    realized_pnl: f64,
    total_commission: f64,
    closed_trades: Vec<ClosedTrade>,
    equity_curve: Vec<EquityPoint>,
}

impl Ledger {
    pub fn new(initial_cash: f64, commission_rate: f64, stop_loss_fraction: f64) -> Self {
        Ledger {
            initial_cash,
            cash: initial_cash,
            commission_rate,
            stop_loss_fraction,
            position: None,
            realized_pnl: 0.0,
            total_commission: 0.0,
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn initial_cash(&self) -> f64 {
        self.initial_cash
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    /// Commission paid so far plus the P&L of closed trades. Always equals
    /// `cash - initial_cash`.
    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl
    }

    pub fn total_commission(&self) -> f64 {
        self.total_commission
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        &self.closed_trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Open a position at `price`.
    ///
    /// Fails if a position is already open, or if price/quantity are not
    /// positive finite numbers.
    pub fn enter(
        &mut self,
        side: Side,
        price: f64,
        quantity: f64,
        date: NaiveDate,
    ) -> Result<&Position, VoltraderError> {
        if let Some(open) = &self.position {
            return Err(VoltraderError::invalid_state(format!(
                "cannot enter {} on {}: {} position opened {} is still open",
                side, date, open.side, open.entry_date
            )));
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(VoltraderError::invalid_state(format!(
                "cannot enter {} on {} at non-positive price {}",
                side, date, price
            )));
        }
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(VoltraderError::invalid_state(format!(
                "cannot enter {} on {} with quantity {}",
                side, date, quantity
            )));
        }

        let commission = calculate_commission(price * quantity, self.commission_rate);
        self.cash -= commission;
        self.realized_pnl -= commission;
        self.total_commission += commission;

        Ok(&*self.position.insert(Position {
            side,
            quantity,
            entry_price: price,
            entry_date: date,
            stop_price: initial_stop(side, price, self.stop_loss_fraction),
            entry_commission: commission,
        }))
    }

    /// Close the open position at `price`, book the trade and go flat.
    pub fn exit(&mut self, price: f64, date: NaiveDate) -> Result<ClosedTrade, VoltraderError> {
        let position = self.position.take().ok_or_else(|| {
            VoltraderError::invalid_state(format!("cannot exit on {}: no open position", date))
        })?;

        let exit_commission = calculate_commission(price * position.quantity, self.commission_rate);
        let pnl = position.unrealized_pnl(price) - exit_commission;

        self.cash += pnl;
        self.realized_pnl += pnl;
        self.total_commission += exit_commission;

        let trade = ClosedTrade {
            side: position.side,
            quantity: position.quantity,
            entry_date: position.entry_date,
            exit_date: date,
            entry_price: position.entry_price,
            exit_price: price,
            entry_commission: position.entry_commission,
            exit_commission,
            pnl,
        };
        self.closed_trades.push(trade.clone());

        Ok(trade)
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.position
            .as_ref()
            .map(|p| p.unrealized_pnl(price))
            .unwrap_or(0.0)
    }

    /// Equity if the open position were valued at `price`. Does not mutate.
    pub fn mark_to_market(&self, price: f64) -> f64 {
        self.cash + self.unrealized_pnl(price)
    }

    /// Append an equity sample. Dates must be strictly increasing.
    pub fn record_equity(&mut self, date: NaiveDate, equity: f64) -> Result<(), VoltraderError> {
        if let Some(last) = self.equity_curve.last() {
            if date <= last.date {
                return Err(VoltraderError::invalid_state(format!(
                    "equity sample for {} is not after last sample {}",
                    date, last.date
                )));
            }
        }
        self.equity_curve.push(EquityPoint { date, equity });
        Ok(())
    }
}
