//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Closed set of indicator kinds + parameters (serves as HashMap key)
//! - `IndicatorField`: Which output of a multi-value indicator a condition reads
//! - `IndicatorSeries`: A time series of indicator values, same length as the bars
//!
//! Every calculation is a pure function of the bar slice; nothing here mutates
//! its input or keeps state between calls.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod stddev;
pub mod volume;
pub mod vwap;

use chrono::NaiveDateTime;
use std::fmt;

use crate::domain::error::FlowError;
use crate::domain::ohlcv::PriceBar;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        dif: f64,
        dea: f64,
        hist: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
        width: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Price,
    Sma(usize),
    Rsi(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    Vwap(usize),
    VolumeRatio(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorField {
    Value,
    MacdDif,
    MacdDea,
    MacdHist,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
    BollingerWidth,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Value of `field` at `index`, or `None` while the indicator is warming up.
    pub fn field_at(&self, index: usize, field: IndicatorField) -> Option<f64> {
        let point = self.values.get(index)?;
        if !point.valid {
            return None;
        }
        let v = extract_field(&point.value, field)?;
        v.is_finite().then_some(v)
    }
}

fn extract_field(value: &IndicatorValue, field: IndicatorField) -> Option<f64> {
    match (value, field) {
        (IndicatorValue::Simple(v), IndicatorField::Value) => Some(*v),
        (IndicatorValue::Macd { dif, .. }, IndicatorField::MacdDif) => Some(*dif),
        (IndicatorValue::Macd { dea, .. }, IndicatorField::MacdDea) => Some(*dea),
        (IndicatorValue::Macd { hist, .. }, IndicatorField::MacdHist) => Some(*hist),
        (IndicatorValue::Bollinger { upper, .. }, IndicatorField::BollingerUpper) => Some(*upper),
        (IndicatorValue::Bollinger { middle, .. }, IndicatorField::BollingerMiddle) => {
            Some(*middle)
        }
        (IndicatorValue::Bollinger { lower, .. }, IndicatorField::BollingerLower) => Some(*lower),
        (IndicatorValue::Bollinger { width, .. }, IndicatorField::BollingerWidth) => Some(*width),
        _ => None,
    }
}

impl IndicatorType {
    /// Field read when a condition does not name one.
    pub fn default_field(&self) -> IndicatorField {
        match self {
            IndicatorType::Macd { .. } => IndicatorField::MacdHist,
            IndicatorType::Bollinger { .. } => IndicatorField::BollingerMiddle,
            _ => IndicatorField::Value,
        }
    }

    pub fn supports_field(&self, field: IndicatorField) -> bool {
        match self {
            IndicatorType::Macd { .. } => matches!(
                field,
                IndicatorField::MacdDif | IndicatorField::MacdDea | IndicatorField::MacdHist
            ),
            IndicatorType::Bollinger { .. } => matches!(
                field,
                IndicatorField::BollingerUpper
                    | IndicatorField::BollingerMiddle
                    | IndicatorField::BollingerLower
                    | IndicatorField::BollingerWidth
            ),
            _ => field == IndicatorField::Value,
        }
    }

    /// Whether `field` is plotted on the price axis, so that conditions compare
    /// the close against it rather than against a bare threshold.
    pub fn is_price_overlay(&self, field: IndicatorField) -> bool {
        match self {
            IndicatorType::Sma(_) | IndicatorType::Vwap(_) => true,
            IndicatorType::Bollinger { .. } => matches!(
                field,
                IndicatorField::BollingerUpper
                    | IndicatorField::BollingerMiddle
                    | IndicatorField::BollingerLower
            ),
            _ => false,
        }
    }

    /// Reject parameter sets that cannot produce a series.
    pub fn validate(&self) -> Result<(), FlowError> {
        let bad = |reason: &str| -> Result<(), FlowError> {
            Err(FlowError::graph(format!("{}: {}", self, reason)))
        };
        match *self {
            IndicatorType::Price => Ok(()),
            IndicatorType::Sma(p)
            | IndicatorType::Rsi(p)
            | IndicatorType::Vwap(p)
            | IndicatorType::VolumeRatio(p) => {
                if p == 0 {
                    bad("period must be positive")
                } else {
                    Ok(())
                }
            }
            IndicatorType::Macd { fast, slow, signal } => {
                if fast == 0 || slow == 0 || signal == 0 {
                    bad("periods must be positive")
                } else if fast >= slow {
                    bad("fast period must be shorter than slow period")
                } else {
                    Ok(())
                }
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                if period == 0 {
                    bad("period must be positive")
                } else if stddev_mult_x100 == 0 {
                    bad("deviation multiplier must be positive")
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Compute this indicator over `bars`.
    pub fn compute(&self, bars: &[PriceBar]) -> IndicatorSeries {
        match *self {
            IndicatorType::Price => IndicatorSeries {
                indicator_type: IndicatorType::Price,
                values: bars
                    .iter()
                    .map(|b| IndicatorPoint {
                        timestamp: b.timestamp,
                        valid: true,
                        value: IndicatorValue::Simple(b.close),
                    })
                    .collect(),
            },
            IndicatorType::Sma(period) => sma::calculate_sma(bars, period),
            IndicatorType::Rsi(period) => rsi::calculate_rsi(bars, period),
            IndicatorType::Macd { fast, slow, signal } => {
                macd::calculate_macd(bars, fast, slow, signal)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => bollinger::calculate_bollinger(bars, period, stddev_mult_x100),
            IndicatorType::Vwap(period) => vwap::calculate_vwap(bars, period),
            IndicatorType::VolumeRatio(period) => volume::calculate_volume_ratio(bars, period),
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Price => write!(f, "PRICE"),
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
            IndicatorType::Vwap(period) => write!(f, "VWAP({})", period),
            IndicatorType::VolumeRatio(period) => write!(f, "VOLUME_RATIO({})", period),
        }
    }
}

/// Build a series whose points are all invalid, for degenerate parameters.
pub(crate) fn invalid_series(
    bars: &[PriceBar],
    indicator_type: IndicatorType,
    blank: IndicatorValue,
) -> IndicatorSeries {
    IndicatorSeries {
        indicator_type,
        values: bars
            .iter()
            .map(|b| IndicatorPoint {
                timestamp: b.timestamp,
                valid: false,
                value: blank.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::ohlcv::PriceBar;
    use chrono::NaiveDate;

    pub fn make_bars(prices: &[f64]) -> Vec<PriceBar> {
        make_bars_with_volume(prices, &vec![1000.0; prices.len()])
    }

    pub fn make_bars_with_volume(prices: &[f64], volumes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        prices
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| PriceBar {
                timestamp: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            })
            .collect()
    }
}
