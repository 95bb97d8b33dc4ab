//! CSV file data adapter.
//!
//! Reads a single headered price file such as a Yahoo Finance `^VIX`
//! download. Columns are matched by name, case-insensitively; `Date` and
//! `Close` are required, everything else is optional and extra columns
//! (`Adj Close`, ...) are ignored.

use crate::domain::error::VoltraderError;
use crate::domain::ohlcv::{filter_range, Bar, Regime};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::io::Read;
use std::path::PathBuf;

pub struct CsvAdapter {
    path: PathBuf,
}

#[derive(Debug, Default)]
struct Columns {
    date: usize,
    close: usize,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    volume: Option<usize>,
    regime: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, VoltraderError> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        Ok(Columns {
            date: find("date").ok_or_else(|| VoltraderError::data("missing Date column"))?,
            close: find("close").ok_or_else(|| VoltraderError::data("missing Close column"))?,
            open: find("open"),
            high: find("high"),
            low: find("low"),
            volume: find("volume"),
            regime: find("regime"),
        })
    }
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Parse bars from any reader. Row order is preserved; ordering problems
    /// are left for series validation to report.
    pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>, VoltraderError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let columns = Columns::from_headers(rdr.headers()?)?;
        let mut bars = Vec::new();

        for (i, result) in rdr.records().enumerate() {
            let record = result?;
            // Header is line 1.
            let line = i + 2;

            let date = parse_date(cell(&record, Some(columns.date)).unwrap_or(""))
                .ok_or_else(|| {
                    VoltraderError::data(format!("line {line}: invalid or missing date"))
                })?;
            let close = parse_price(&record, Some(columns.close), line, "close")?
                .ok_or_else(|| VoltraderError::data(format!("line {line}: missing close")))?;

            let open = parse_price(&record, columns.open, line, "open")?.unwrap_or(close);
            let high = parse_price(&record, columns.high, line, "high")?.unwrap_or(close);
            let low = parse_price(&record, columns.low, line, "low")?.unwrap_or(close);
            let volume = parse_price(&record, columns.volume, line, "volume")?
                .map(|v| v as i64)
                .unwrap_or(0);
            let regime = match cell(&record, columns.regime) {
                None => None,
                Some(raw) => {
                    let value = raw.parse::<u8>().map_err(|_| {
                        VoltraderError::data(format!("line {line}: invalid regime '{raw}'"))
                    })?;
                    Some(Regime::new(value)?)
                }
            };

            bars.push(Bar {
                date,
                open,
                high,
                low,
                close,
                volume,
                regime,
            });
        }

        Ok(bars)
    }
}

fn cell<'a>(record: &'a csv::StringRecord, index: Option<usize>) -> Option<&'a str> {
    index
        .and_then(|i| record.get(i))
        .filter(|s| !s.is_empty())
}

fn parse_price(
    record: &csv::StringRecord,
    index: Option<usize>,
    line: usize,
    field: &str,
) -> Result<Option<f64>, VoltraderError> {
    match cell(record, index) {
        None => Ok(None),
        Some(raw) => raw.parse::<f64>().map(Some).map_err(|_| {
            VoltraderError::data(format!("line {line}: invalid {field} value '{raw}'"))
        }),
    }
}

/// `YYYY-MM-DD`, optionally followed by a time (`2024-01-02 00:00:00`,
/// `2024-01-02T00:00:00-05:00`).
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let day = raw.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

impl DataPort for CsvAdapter {
    fn fetch_bars(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, VoltraderError> {
        let file = std::fs::File::open(&self.path).inspect_err(|e| {
            tracing::error!(path = %self.path.display(), error = %e, "cannot open data file");
        })?;
        let bars = Self::read_bars(file)?;
        let total = bars.len();
        let bars = filter_range(bars, start_date, end_date);
        tracing::info!(
            path = %self.path.display(),
            rows = total,
            kept = bars.len(),
            "bars loaded"
        );
        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const YAHOO: &str = "Date,Open,High,Low,Close,Adj Close,Volume\n\
        2024-01-02,13.21,14.22,13.10,13.20,13.20,0\n\
        2024-01-03,13.38,14.56,13.34,14.04,14.04,0\n\
        2024-01-04,13.95,14.20,13.64,14.13,14.13,0\n";

    fn setup(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("vix.csv");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn reads_yahoo_download() {
        let (_dir, path) = setup(YAHOO);
        let bars = CsvAdapter::new(path).fetch_bars(None, None).unwrap();

        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(bars[0].open, 13.21);
        assert_eq!(bars[0].high, 14.22);
        assert_eq!(bars[0].low, 13.10);
        assert_eq!(bars[0].close, 13.20);
        assert_eq!(bars[0].volume, 0);
        assert!(bars[0].regime.is_none());
    }

    #[test]
    fn filters_by_date() {
        let (_dir, path) = setup(YAHOO);
        let day = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let bars = CsvAdapter::new(path).fetch_bars(Some(day), Some(day)).unwrap();

        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].date, day);
    }

    #[test]
    fn close_only_file_defaults_other_fields() {
        let bars = CsvAdapter::read_bars("date,close\n2024-01-02,13.2\n".as_bytes()).unwrap();
        assert_eq!(bars[0].open, 13.2);
        assert_eq!(bars[0].low, 13.2);
        assert_eq!(bars[0].volume, 0);
    }

    #[test]
    fn reads_regime_column_and_time_suffix() {
        let csv = "Date,Close,Regime\n2024-01-02 00:00:00,13.2,2\n2024-01-03T00:00:00,14.0,\n";
        let bars = CsvAdapter::read_bars(csv.as_bytes()).unwrap();
        assert_eq!(bars[0].regime.map(|r| r.value()), Some(2));
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert!(bars[1].regime.is_none());
    }

    #[test]
    fn rows_keep_file_order() {
        let csv = "Date,Close\n2024-01-03,14\n2024-01-02,13\n";
        let bars = CsvAdapter::read_bars(csv.as_bytes()).unwrap();
        assert_eq!(bars[0].close, 14.0);
    }

    #[test]
    fn missing_close_column_is_data_error() {
        let err = CsvAdapter::read_bars("Date,Open\n2024-01-02,13\n".as_bytes()).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn bad_close_value_is_data_error() {
        let err = CsvAdapter::read_bars("Date,Close\n2024-01-02,n/a\n".as_bytes()).unwrap_err();
        assert!(err.is_data_error());
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn out_of_range_regime_is_rejected() {
        let err =
            CsvAdapter::read_bars("Date,Close,Regime\n2024-01-02,13,7\n".as_bytes()).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CsvAdapter::new(PathBuf::from("/nonexistent/vix.csv"))
            .fetch_bars(None, None)
            .unwrap_err();
        assert!(matches!(err, VoltraderError::Io(_)));
        assert!(!err.is_data_error());
    }
}
