//! Open position and closed trade records.

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// A single open position. Being flat is represented by the absence of a
/// `Position`, so a flat book can never carry a non-zero size.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub quantity: f64,
    pub entry_price: f64,
    pub entry_date: NaiveDate,
    pub stop_price: f64,
    pub entry_commission: f64,
}

impl Position {
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.side.sign() * self.quantity * (price - self.entry_price)
    }

    /// Strict breach: a close exactly at the stop does not trigger.
    pub fn stop_breached(&self, price: f64) -> bool {
        match self.side {
            Side::Long => price < self.stop_price,
            Side::Short => price > self.stop_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub side: Side,
    pub quantity: f64,
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_commission: f64,
    pub exit_commission: f64,
    /// Price P&L less the exit commission.
    pub pnl: f64,
}

impl ClosedTrade {
    /// P&L after both legs' commission.
    pub fn net_pnl(&self) -> f64 {
        self.pnl - self.entry_commission
    }

    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }
}
