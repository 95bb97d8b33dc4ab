//! Core domain types and logic.

pub mod ohlcv;
pub mod position;
pub mod ledger;
pub mod strategy;
pub mod backtest;
pub mod regime;
pub mod metrics;
pub mod sweep;
pub mod config_validation;
pub mod error;
