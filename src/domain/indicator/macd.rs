//! MACD (Moving Average Convergence Divergence) indicator.
//!
//! DIF  = EMA(fast) - EMA(slow)
//! DEA  = EMA(signal) of DIF
//! Hist = DIF - DEA
//!
//! Every EMA is seeded with its first input value rather than an SMA warm-up,
//! so DIF and DEA exist from bar 0. Points are flagged valid once
//! max(slow, signal) bars have been seen; before that the seed still dominates.

use crate::domain::indicator::ema::ema_values;
use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, invalid_series,
};
use crate::domain::ohlcv::{PriceBar, closes};

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

pub fn calculate_macd(
    bars: &[PriceBar],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Macd {
        fast,
        slow,
        signal: signal_period,
    };
    let blank = IndicatorValue::Macd {
        dif: 0.0,
        dea: 0.0,
        hist: 0.0,
    };
    if bars.is_empty() || fast == 0 || slow == 0 || signal_period == 0 {
        return invalid_series(bars, indicator_type, blank);
    }

    let prices = closes(bars);
    let ema_fast = ema_values(&prices, fast);
    let ema_slow = ema_values(&prices, slow);
    let dif: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let dea = ema_values(&dif, signal_period);

    let warmup = slow.max(signal_period);
    let values = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| IndicatorPoint {
            timestamp: bar.timestamp,
            valid: i + 1 >= warmup,
            value: IndicatorValue::Macd {
                dif: dif[i],
                dea: dea[i],
                hist: dif[i] - dea[i],
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}
