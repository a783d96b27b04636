//! Data access port trait.

use crate::domain::error::FlowError;
use crate::domain::ohlcv::PriceBar;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `symbol` in timestamp order, restricted to the inclusive
    /// date window when bounds are given.
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, FlowError>;

    fn list_symbols(&self) -> Result<Vec<String>, FlowError>;
}
