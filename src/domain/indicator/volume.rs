//! Volume ratio: current volume over its trailing mean.
//!
//! VOLUME_RATIO(n)[i] = V[i] / mean(V[i-n+1..=i])
//! Warmup: first (n-1) bars are invalid; a zero mean is invalid.

use crate::domain::indicator::stddev::rolling_mean;
use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, invalid_series,
};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_volume_ratio(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    if period == 0 {
        return invalid_series(
            bars,
            IndicatorType::VolumeRatio(period),
            IndicatorValue::Simple(0.0),
        );
    }

    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();
    let averages = rolling_mean(&volumes, period);

    let values = bars
        .iter()
        .zip(averages)
        .map(|(bar, avg)| {
            let ratio = avg.filter(|a| *a > 0.0).map(|a| bar.volume / a);
            IndicatorPoint {
                timestamp: bar.timestamp,
                valid: ratio.is_some(),
                value: IndicatorValue::Simple(ratio.unwrap_or(0.0)),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::VolumeRatio(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::IndicatorField;
    use crate::domain::indicator::test_support::make_bars_with_volume;

    #[test]
    fn volume_ratio_spike() {
        // mean of [100, 100, 400] = 200 -> 400 / 200 = 2
        let bars = make_bars_with_volume(&[10.0, 10.0, 10.0], &[100.0, 100.0, 400.0]);
        let series = calculate_volume_ratio(&bars, 3);
        assert!(!series.values[1].valid);
        let v = series.field_at(2, IndicatorField::Value).unwrap();
        assert!((v - 2.0).abs() < 1e-12);
    }

    #[test]
    fn volume_ratio_steady_volume_is_one() {
        let bars = make_bars_with_volume(&[10.0; 4], &[500.0; 4]);
        let series = calculate_volume_ratio(&bars, 2);
        let v = series.field_at(3, IndicatorField::Value).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn volume_ratio_zero_volume_is_invalid() {
        let bars = make_bars_with_volume(&[10.0; 3], &[0.0; 3]);
        let series = calculate_volume_ratio(&bars, 2);
        assert!(series.values.iter().all(|p| !p.valid));
    }
}
