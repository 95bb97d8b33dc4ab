#![allow(dead_code)]

use chrono::NaiveDate;
use std::cell::RefCell;
use voltrader::domain::backtest::BacktestConfig;
use voltrader::domain::error::VoltraderError;
pub use voltrader::domain::ohlcv::Bar;
use voltrader::domain::ohlcv::filter_range;
use voltrader::domain::strategy::{Strategy, StrategyParams};
use voltrader::ports::data_port::DataPort;

/// In-memory data port that records the range it was asked for.
pub struct MockDataPort {
    pub bars: Vec<Bar>,
    pub error: Option<String>,
    pub requests: RefCell<Vec<(Option<NaiveDate>, Option<NaiveDate>)>>,
}

impl MockDataPort {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self {
            bars,
            error: None,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            bars: Vec::new(),
            error: Some(reason.to_string()),
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, VoltraderError> {
        self.requests.borrow_mut().push((start_date, end_date));
        if let Some(reason) = &self.error {
            return Err(VoltraderError::data(reason.clone()));
        }
        Ok(filter_range(self.bars.clone(), start_date, end_date))
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date_str: &str, close: f64) -> Bar {
    Bar::from_close(
        NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap(),
        close,
    )
}

/// Consecutive calendar days starting 2024-01-01.
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let start = date(2024, 1, 1);
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::from_close(start + chrono::Duration::days(i as i64), c))
        .collect()
}

pub fn reference_strategy() -> Strategy {
    Strategy {
        name: "VIX threshold".to_string(),
        params: StrategyParams::default(),
    }
}

pub fn zero_commission_config() -> BacktestConfig {
    BacktestConfig {
        commission_rate: 0.0,
        ..BacktestConfig::default()
    }
}

pub fn write_csv(dir: &std::path::Path, name: &str, bars: &[Bar]) -> std::path::PathBuf {
    let mut content = String::from("Date,Open,High,Low,Close,Adj Close,Volume\n");
    for b in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.close, b.volume
        ));
    }
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
