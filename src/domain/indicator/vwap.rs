//! Rolling volume-weighted average price.
//!
//! VWAP(n)[i] = sum(C * V over last n bars) / sum(V over last n bars)
//! Warmup: first (n-1) bars are invalid. A window with zero total volume is
//! also invalid.

use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, invalid_series,
};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_vwap(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return invalid_series(bars, IndicatorType::Vwap(period), IndicatorValue::Simple(0.0));
    }

    let mut values = Vec::with_capacity(bars.len());
    let mut pv_sum = 0.0;
    let mut vol_sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        pv_sum += bar.close * bar.volume;
        vol_sum += bar.volume;
        if i >= period {
            let old = &bars[i - period];
            pv_sum -= old.close * old.volume;
            vol_sum -= old.volume;
        }

        let vwap = (i + 1 >= period && vol_sum > 0.0).then(|| pv_sum / vol_sum);
        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid: vwap.is_some(),
            value: IndicatorValue::Simple(vwap.unwrap_or(0.0)),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Vwap(period),
        values,
    }
}
