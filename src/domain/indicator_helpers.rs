//! Shared helpers for computing indicator sets ahead of a run.

use std::collections::HashMap;

use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::PriceBar;

/// Compute each distinct indicator once over `bars`.
pub fn compute_indicators(
    bars: &[PriceBar],
    types: &[IndicatorType],
) -> HashMap<IndicatorType, IndicatorSeries> {
    let mut out = HashMap::with_capacity(types.len());
    for indicator_type in types {
        out.entry(*indicator_type)
            .or_insert_with(|| indicator_type.compute(bars));
    }
    out
}

/// Indicators in `indicators` that are never valid over the whole run,
/// sorted by name.
pub fn never_ready(indicators: &HashMap<IndicatorType, IndicatorSeries>) -> Vec<IndicatorType> {
    let mut cold: Vec<IndicatorType> = indicators
        .iter()
        .filter(|(_, series)| !series.values.iter().any(|p| p.valid))
        .map(|(indicator_type, _)| *indicator_type)
        .collect();
    cold.sort_by_key(|indicator_type| indicator_type.to_string());
    cold
}
