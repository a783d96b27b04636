//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//! - Width: 2 × StdDev / Middle, a volatility proxy (0 when Middle is 0)
//!
//! Where StdDev is population standard deviation (divides by N, not N-1).
//!
//! Default parameters: period=20, multiplier=2.0
//! Warmup: first (period-1) bars are invalid.

use crate::domain::indicator::stddev::mean_and_stddev;
use crate::domain::indicator::{
    IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue, invalid_series,
};
use crate::domain::ohlcv::{PriceBar, closes};

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_MULT_X100: u32 = 200;

pub fn calculate_bollinger(
    bars: &[PriceBar],
    period: usize,
    stddev_mult_x100: u32,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Bollinger {
        period,
        stddev_mult_x100,
    };
    let blank = IndicatorValue::Bollinger {
        upper: 0.0,
        middle: 0.0,
        lower: 0.0,
        width: 0.0,
    };
    if period == 0 {
        return invalid_series(bars, indicator_type, blank);
    }

    let prices = closes(bars);
    let mult = stddev_mult_x100 as f64 / 100.0;
    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        if i + 1 < period {
            values.push(IndicatorPoint {
                timestamp: bar.timestamp,
                valid: false,
                value: blank.clone(),
            });
            continue;
        }

        let (middle, stddev) = mean_and_stddev(&prices[i + 1 - period..=i]);
        let width = if middle == 0.0 {
            0.0
        } else {
            2.0 * stddev / middle
        };

        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid: true,
            value: IndicatorValue::Bollinger {
                upper: middle + mult * stddev,
                middle,
                lower: middle - mult * stddev,
                width,
            },
        });
    }

    IndicatorSeries {
        indicator_type,
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::IndicatorField;
    use crate::domain::indicator::test_support::make_bars;

    #[test]
    fn bollinger_warmup() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        let series = calculate_bollinger(&bars, 3, 200);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
    }

    #[test]
    fn bollinger_known_values() {
        // window [2,4,4,4,5,5,7,9]: mean 5, population stddev 2
        let bars = make_bars(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let series = calculate_bollinger(&bars, 8, 200);
        let upper = series.field_at(7, IndicatorField::BollingerUpper).unwrap();
        let middle = series.field_at(7, IndicatorField::BollingerMiddle).unwrap();
        let lower = series.field_at(7, IndicatorField::BollingerLower).unwrap();
        let width = series.field_at(7, IndicatorField::BollingerWidth).unwrap();
        assert!((middle - 5.0).abs() < 1e-12);
        assert!((upper - 9.0).abs() < 1e-12);
        assert!((lower - 1.0).abs() < 1e-12);
        assert!((width - 0.8).abs() < 1e-12);
    }

    #[test]
    fn bollinger_fractional_multiplier() {
        let bars = make_bars(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let series = calculate_bollinger(&bars, 8, 150);
        let upper = series.field_at(7, IndicatorField::BollingerUpper).unwrap();
        assert!((upper - 8.0).abs() < 1e-12);
    }

    #[test]
    fn bollinger_flat_series_has_zero_width() {
        let bars = make_bars(&[10.0; 5]);
        let series = calculate_bollinger(&bars, 3, 200);
        let width = series.field_at(4, IndicatorField::BollingerWidth).unwrap();
        assert!(width.abs() < f64::EPSILON);
        let upper = series.field_at(4, IndicatorField::BollingerUpper).unwrap();
        assert!((upper - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bollinger_zero_period() {
        let bars = make_bars(&[10.0; 3]);
        let series = calculate_bollinger(&bars, 0, 200);
        assert!(series.values.iter().all(|p| !p.valid));
    }
}
