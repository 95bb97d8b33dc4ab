//! Data access port trait.

use crate::domain::error::VoltraderError;
use crate::domain::ohlcv::Bar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars in source order, restricted to the inclusive `[start, end]`
    /// range when either bound is given.
    fn fetch_bars(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<Bar>, VoltraderError>;
}
