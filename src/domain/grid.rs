//! Grid trading variant.
//!
//! Long-only, level-driven. `[bottom, top]` is split into `grid_count` equal
//! steps. Per bar, in order:
//! 1. Stops (holding only): close at or below `stop_price`, equity down
//!    `stop_loss_pct`% from initial capital, or `max_holding_days` elapsed
//!    since the holding was opened. Any one liquidates the whole position.
//!    The equity stop also halts the grid for the rest of the run.
//! 2. Flat: enter with `position_size` of cash when the close is inside the
//!    grid and above `stop_price`, subject to the trend filter (close under
//!    SMA(60) blocks entry) and the volatility filter (Bollinger width under
//!    3% allows entries only on every third bar).
//! 3. Holding: close one step under average cost adds another slice; close one
//!    step above sells half, rounded down to a lot.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::domain::error::FlowError;
use crate::domain::execution::{
    BuySizing, ExecutionConfig, ExecutionResult, SellSizing, execute_buy, execute_sell,
};
use crate::domain::indicator::bollinger::{DEFAULT_MULT_X100, DEFAULT_PERIOD};
use crate::domain::indicator::{IndicatorField, IndicatorSeries, IndicatorType};
use crate::domain::indicator_helpers::compute_indicators;
use crate::domain::ohlcv::PriceBar;
use crate::domain::portfolio::Portfolio;
use crate::domain::position::TradeReason;

pub const TREND_FILTER_PERIOD: usize = 60;
pub const VOLATILITY_FILTER_WIDTH: f64 = 0.03;
pub const VOLATILITY_THROTTLE_BARS: usize = 3;

const TREND_SMA: IndicatorType = IndicatorType::Sma(TREND_FILTER_PERIOD);
const VOLATILITY_BANDS: IndicatorType = IndicatorType::Bollinger {
    period: DEFAULT_PERIOD,
    stddev_mult_x100: DEFAULT_MULT_X100,
};

#[derive(Debug, Clone, PartialEq)]
pub struct GridParams {
    pub bottom: f64,
    pub top: f64,
    pub grid_count: u32,
    /// Fraction of current cash committed per entry or add, in (0, 1].
    pub position_size: f64,
    pub trend_filter: bool,
    pub volatility_filter: bool,
    pub stop_price: Option<f64>,
    /// Percent of initial capital.
    pub stop_loss_pct: Option<f64>,
    pub max_holding_days: Option<u32>,
}

impl GridParams {
    pub fn new(bottom: f64, top: f64, grid_count: u32) -> Self {
        Self {
            bottom,
            top,
            grid_count,
            position_size: 0.5,
            trend_filter: false,
            volatility_filter: false,
            stop_price: None,
            stop_loss_pct: None,
            max_holding_days: None,
        }
    }

    pub fn step(&self) -> f64 {
        (self.top - self.bottom) / self.grid_count as f64
    }

    /// Price levels from bottom to top, inclusive.
    pub fn levels(&self) -> Vec<f64> {
        let step = self.step();
        (0..=self.grid_count)
            .map(|i| self.bottom + step * i as f64)
            .collect()
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        if !self.bottom.is_finite() || !self.top.is_finite() || self.bottom <= 0.0 {
            return Err(FlowError::param("bottom", "grid bounds must be positive numbers"));
        }
        if self.top <= self.bottom {
            return Err(FlowError::param(
                "top",
                format!("top ({}) must be above bottom ({})", self.top, self.bottom),
            ));
        }
        if self.grid_count == 0 {
            return Err(FlowError::param("grid_count", "must be positive"));
        }
        if !(self.position_size > 0.0 && self.position_size <= 1.0) {
            return Err(FlowError::param("position_size", "must be in (0, 1]"));
        }
        if let Some(p) = self.stop_price {
            if !p.is_finite() || p <= 0.0 {
                return Err(FlowError::param("stop_price", "must be positive"));
            }
        }
        if let Some(pct) = self.stop_loss_pct {
            if !(pct > 0.0 && pct < 100.0) {
                return Err(FlowError::param("stop_loss_pct", "must be in (0, 100)"));
            }
        }
        if self.max_holding_days == Some(0) {
            return Err(FlowError::param("max_holding_days", "must be positive"));
        }
        Ok(())
    }
}

fn to_decimal(name: &str, value: f64) -> Result<Decimal, FlowError> {
    Decimal::from_f64(value)
        .ok_or_else(|| FlowError::param(name, format!("{} is not representable", value)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopTrigger {
    Price,
    Equity,
    HoldingTime,
}

/// Per-run grid state: parameters in decimal form plus filter series.
pub(crate) struct GridEngine<'a> {
    params: &'a GridParams,
    step: Decimal,
    bottom: Decimal,
    top: Decimal,
    stop_price: Option<Decimal>,
    position_fraction: Decimal,
    stop_loss_fraction: Option<Decimal>,
    indicators: HashMap<IndicatorType, IndicatorSeries>,
    /// Set once the equity stop fires; no further entries for the run.
    halted: bool,
}

impl<'a> GridEngine<'a> {
    pub(crate) fn new(params: &'a GridParams, bars: &[PriceBar]) -> Result<Self, FlowError> {
        params.validate()?;

        let mut wanted = Vec::new();
        if params.trend_filter {
            wanted.push(TREND_SMA);
        }
        if params.volatility_filter {
            wanted.push(VOLATILITY_BANDS);
        }

        Ok(Self {
            params,
            step: to_decimal("grid step", params.step())?,
            bottom: to_decimal("bottom", params.bottom)?,
            top: to_decimal("top", params.top)?,
            stop_price: params
                .stop_price
                .map(|p| to_decimal("stop_price", p))
                .transpose()?,
            position_fraction: to_decimal("position_size", params.position_size)?,
            stop_loss_fraction: params
                .stop_loss_pct
                .map(|p| to_decimal("stop_loss_pct", p / 100.0))
                .transpose()?,
            indicators: compute_indicators(bars, &wanted),
            halted: false,
        })
    }

    fn check_stops(
        &self,
        portfolio: &Portfolio,
        timestamp: NaiveDateTime,
        price: Decimal,
    ) -> Option<StopTrigger> {
        if let Some(stop) = self.stop_price {
            if price <= stop {
                return Some(StopTrigger::Price);
            }
        }
        if let Some(fraction) = self.stop_loss_fraction {
            let equity = portfolio.total_assets(price);
            if portfolio.initial_capital - equity >= portfolio.initial_capital * fraction {
                return Some(StopTrigger::Equity);
            }
        }
        if let (Some(max_days), Some(opened)) =
            (self.params.max_holding_days, portfolio.position.opened_at)
        {
            let held = (timestamp.date() - opened.date()).num_days();
            if held >= i64::from(max_days) {
                return Some(StopTrigger::HoldingTime);
            }
        }
        None
    }

    fn entry_allowed(&self, bars: &[PriceBar], index: usize) -> bool {
        if self.params.trend_filter {
            let sma = self
                .indicators
                .get(&TREND_SMA)
                .and_then(|s| s.field_at(index, IndicatorField::Value));
            if let Some(sma) = sma {
                if bars[index].close < sma {
                    debug!(
                        index,
                        close = bars[index].close,
                        sma,
                        "grid entry blocked by trend filter"
                    );
                    return false;
                }
            }
        }
        if self.params.volatility_filter {
            let width = self
                .indicators
                .get(&VOLATILITY_BANDS)
                .and_then(|s| s.field_at(index, IndicatorField::BollingerWidth));
            if let Some(width) = width {
                if width < VOLATILITY_FILTER_WIDTH && index % VOLATILITY_THROTTLE_BARS != 0 {
                    debug!(index, width, "grid entry throttled by volatility filter");
                    return false;
                }
            }
        }
        true
    }

    /// Apply the grid rules for one bar. Emits at most one trade; `None`
    /// when no rule fired.
    pub(crate) fn on_bar(
        &mut self,
        bars: &[PriceBar],
        index: usize,
        price: Decimal,
        portfolio: &mut Portfolio,
        exec: &ExecutionConfig,
    ) -> Option<ExecutionResult> {
        let timestamp = bars[index].timestamp;
        let buy_slice = BuySizing::CashFraction(self.position_fraction);

        if !portfolio.is_flat() {
            if let Some(trigger) = self.check_stops(portfolio, timestamp, price) {
                info!(%timestamp, %price, ?trigger, "grid stop triggered");
                if trigger == StopTrigger::Equity {
                    self.halted = true;
                }
                return Some(execute_sell(
                    portfolio,
                    timestamp,
                    price,
                    &SellSizing::All,
                    exec,
                    TradeReason::StopLoss,
                ));
            }

            let avg = portfolio.position.average_cost;
            if price <= avg - self.step && price >= self.bottom {
                return Some(execute_buy(
                    portfolio,
                    timestamp,
                    price,
                    &buy_slice,
                    exec,
                    TradeReason::GridAdd,
                ));
            }
            if price >= avg + self.step {
                return Some(execute_sell(
                    portfolio,
                    timestamp,
                    price,
                    &SellSizing::Fraction(Decimal::new(5, 1)),
                    exec,
                    TradeReason::GridTakeProfit,
                ));
            }
            return None;
        }

        if self.halted || price < self.bottom || price > self.top {
            return None;
        }
        if self.stop_price.is_some_and(|stop| price <= stop) {
            debug!(index, %price, "grid entry blocked at or below stop price");
            return None;
        }
        if !self.entry_allowed(bars, index) {
            return None;
        }
        Some(execute_buy(
            portfolio,
            timestamp,
            price,
            &buy_slice,
            exec,
            TradeReason::GridEntry,
        ))
    }
}
