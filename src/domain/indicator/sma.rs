//! Simple Moving Average indicator.
//!
//! SMA(n)[i] = mean of the n trailing closes.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::stddev::rolling_mean;
use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, invalid_series,
};
use crate::domain::ohlcv::{PriceBar, closes};

pub fn calculate_sma(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return invalid_series(bars, IndicatorType::Sma(period), IndicatorValue::Simple(0.0));
    }

    let means = rolling_mean(&closes(bars), period);
    let values = bars
        .iter()
        .zip(means)
        .map(|(bar, mean)| IndicatorPoint {
            timestamp: bar.timestamp,
            valid: mean.is_some(),
            value: IndicatorValue::Simple(mean.unwrap_or(0.0)),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}
