//! OHLCV price bar representation.

use chrono::{NaiveDate, NaiveDateTime};

use super::error::FlowError;

#[derive(Debug, Clone, PartialEq)]
pub struct PriceBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Calendar day the bar belongs to.
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Check that a bar sequence can be replayed: non-empty, strictly increasing
/// timestamps, positive finite closes and non-negative finite volume.
pub fn validate_series(bars: &[PriceBar]) -> Result<(), FlowError> {
    if bars.is_empty() {
        return Err(FlowError::EmptySeries);
    }

    for (index, bar) in bars.iter().enumerate() {
        if !bar.close.is_finite() || bar.close <= 0.0 {
            return Err(FlowError::InvalidBar {
                index,
                reason: format!("close must be positive, got {}", bar.close),
            });
        }
        if !bar.volume.is_finite() || bar.volume < 0.0 {
            return Err(FlowError::InvalidBar {
                index,
                reason: format!("volume must be non-negative, got {}", bar.volume),
            });
        }
        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(FlowError::UnorderedSeries { index });
        }
    }

    Ok(())
}

/// Closing prices in bar order.
pub fn closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}
