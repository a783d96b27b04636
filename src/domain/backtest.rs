//! Backtest engine and event loop.
//!
//! A run replays an immutable bar sequence once, in order:
//! 1. Validate configuration and series, convert closes to decimal
//! 2. Compile the strategy (graph) or prepare the grid engine
//! 3. Per bar: stop loss, then the strategy decision, at most one trade
//! 4. On the last bar, optionally liquidate whatever is still held
//! 5. Rebuild the asset curve from the ledger and derive metrics
//!
//! Runs share no state; the same inputs always give the same result.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::domain::error::FlowError;
use crate::domain::execution::{
    BuySizing, ExecutionConfig, ExecutionResult, SellSizing, execute_buy, execute_sell,
};
use crate::domain::graph::Signal;
use crate::domain::graph_eval::{CompiledGraph, compile};
use crate::domain::grid::GridEngine;
use crate::domain::indicator::{IndicatorSeries, IndicatorType};
use crate::domain::indicator_helpers::{compute_indicators, never_ready};
use crate::domain::metrics::{
    AssetSnapshot, Metrics, build_asset_snapshots, compute_metrics, daily_closes,
};
use crate::domain::ohlcv::{PriceBar, validate_series};
use crate::domain::portfolio::Portfolio;
use crate::domain::position::{Trade, TradeReason};
use crate::domain::strategy::{Strategy, StrategyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopLossKind {
    /// Unrealised loss as a percentage of the position's cost basis.
    Pct,
    /// Unrealised loss in currency.
    Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopLossAction {
    SellAll,
    ReduceHalf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StopLossConfig {
    pub kind: StopLossKind,
    pub value: Decimal,
    pub action: StopLossAction,
}

impl StopLossConfig {
    /// Whether holding at `price` has lost enough to trigger.
    pub fn triggered(&self, portfolio: &Portfolio, price: Decimal) -> bool {
        if portfolio.is_flat() {
            return false;
        }
        let loss = -portfolio.position.unrealized_pnl(price);
        if loss <= Decimal::ZERO {
            return false;
        }
        let limit = match self.kind {
            StopLossKind::Pct => {
                portfolio.position.cost_basis() * self.value / Decimal::ONE_HUNDRED
            }
            StopLossKind::Amount => self.value,
        };
        loss >= limit
    }

    fn sizing(&self) -> SellSizing {
        match self.action {
            StopLossAction::SellAll => SellSizing::All,
            StopLossAction::ReduceHalf => SellSizing::Fraction(Decimal::new(5, 1)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: Decimal,
    pub commission_rate: Decimal,
    pub lot_size: u64,
    pub buy_sizing: BuySizing,
    pub sell_sizing: SellSizing,
    /// Liquidate any open position at the last bar's close.
    pub close_at_end: bool,
    pub stop_loss: Option<StopLossConfig>,
    pub risk_free_rate: f64,
    /// Date window handed to the data source; the engine replays whatever
    /// bars it is given.
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            initial_capital: Decimal::new(100_000, 0),
            commission_rate: Decimal::new(1, 3),
            lot_size: 100,
            buy_sizing: BuySizing::full(),
            sell_sizing: SellSizing::All,
            close_at_end: true,
            stop_loss: None,
            risk_free_rate: 0.0,
            start_date: None,
            end_date: None,
        }
    }
}

impl BacktestConfig {
    pub fn execution_config(&self) -> ExecutionConfig {
        ExecutionConfig {
            commission_rate: self.commission_rate,
            lot_size: self.lot_size,
        }
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        if self.initial_capital <= Decimal::ZERO {
            return Err(FlowError::param("initial_capital", "must be positive"));
        }
        if self.commission_rate < Decimal::ZERO || self.commission_rate >= Decimal::ONE {
            return Err(FlowError::param("commission_rate", "must be in [0, 1)"));
        }
        if self.lot_size == 0 {
            return Err(FlowError::param("lot_size", "must be at least 1"));
        }
        match &self.buy_sizing {
            BuySizing::Fixed(0) => {
                return Err(FlowError::param("fixed_quantity", "must be positive"));
            }
            BuySizing::CashFraction(f) if *f <= Decimal::ZERO || *f > Decimal::ONE => {
                return Err(FlowError::param("position_sizing", "fraction must be in (0, 1]"));
            }
            _ => {}
        }
        match &self.sell_sizing {
            SellSizing::Fixed(0) => {
                return Err(FlowError::param("sell_quantity", "must be positive"));
            }
            SellSizing::Fraction(f) if *f <= Decimal::ZERO || *f > Decimal::ONE => {
                return Err(FlowError::param("sell_sizing", "fraction must be in (0, 1]"));
            }
            _ => {}
        }
        if let Some(stop) = &self.stop_loss {
            if stop.value <= Decimal::ZERO {
                return Err(FlowError::param("stop_loss value", "must be positive"));
            }
        }
        if !(0.0..1.0).contains(&self.risk_free_rate) {
            return Err(FlowError::param("risk_free_rate", "must be in [0, 1)"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return Err(FlowError::param("start_date", "must be before end_date"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub trades: Vec<Trade>,
    pub asset_snapshots: Vec<AssetSnapshot>,
    pub metrics: Metrics,
    /// The input bars, unchanged.
    pub price_series: Vec<PriceBar>,
}

enum Driver<'a> {
    Graph {
        compiled: CompiledGraph,
        indicators: HashMap<IndicatorType, IndicatorSeries>,
    },
    Grid(GridEngine<'a>),
}

fn decimal_closes(bars: &[PriceBar]) -> Result<Vec<Decimal>, FlowError> {
    bars.iter()
        .enumerate()
        .map(|(index, bar)| {
            Decimal::from_f64(bar.close).ok_or_else(|| FlowError::InvalidBar {
                index,
                reason: format!("close {} is not representable", bar.close),
            })
        })
        .collect()
}

fn prepare<'a>(strategy: &'a Strategy, bars: &[PriceBar]) -> Result<Driver<'a>, FlowError> {
    match &strategy.kind {
        StrategyKind::Graph(graph) => {
            let compiled = compile(graph)?;
            let indicators = compute_indicators(bars, compiled.indicators());
            for cold in never_ready(&indicators) {
                warn!(
                    strategy = %strategy.name,
                    indicator = %cold,
                    bars = bars.len(),
                    "indicator never warms up, its conditions stay undefined"
                );
            }
            Ok(Driver::Graph {
                compiled,
                indicators,
            })
        }
        StrategyKind::Grid(params) => Ok(Driver::Grid(GridEngine::new(params, bars)?)),
    }
}

fn graph_step(
    compiled: &CompiledGraph,
    indicators: &HashMap<IndicatorType, IndicatorSeries>,
    bars: &[PriceBar],
    index: usize,
    price: Decimal,
    portfolio: &mut Portfolio,
    config: &BacktestConfig,
) -> Option<ExecutionResult> {
    let timestamp = bars[index].timestamp;
    let exec = &config.execution_config();

    if let Some(stop) = &config.stop_loss {
        if stop.triggered(portfolio, price) {
            info!(
                %timestamp,
                %price,
                average_cost = %portfolio.position.average_cost,
                "stop loss triggered"
            );
            return Some(execute_sell(
                portfolio,
                timestamp,
                price,
                &stop.sizing(),
                exec,
                TradeReason::StopLoss,
            ));
        }
    }

    match compiled.evaluate(bars, indicators, index) {
        Signal::Buy => Some(execute_buy(
            portfolio,
            timestamp,
            price,
            &config.buy_sizing,
            exec,
            TradeReason::Signal,
        )),
        Signal::Sell => Some(execute_sell(
            portfolio,
            timestamp,
            price,
            &config.sell_sizing,
            exec,
            TradeReason::Signal,
        )),
        Signal::None => None,
    }
}

/// Replay `bars` through `strategy` and account every fill.
pub fn run_backtest(
    bars: &[PriceBar],
    strategy: &Strategy,
    config: &BacktestConfig,
) -> Result<BacktestResult, FlowError> {
    config.validate()?;
    validate_series(bars)?;
    let closes = decimal_closes(bars)?;
    let mut driver = prepare(strategy, bars)?;
    let exec = config.execution_config();

    info!(
        strategy = %strategy.name,
        kind = strategy.kind_name(),
        bars = bars.len(),
        initial_capital = %config.initial_capital,
        "backtest started"
    );

    let mut portfolio = Portfolio::new(config.initial_capital);
    let last = bars.len() - 1;
    let mut skipped = 0usize;

    for (index, &price) in closes.iter().enumerate() {
        if config.close_at_end && index == last {
            if !portfolio.is_flat() {
                debug!(
                    quantity = portfolio.position.quantity,
                    %price,
                    "closing position at period end"
                );
                execute_sell(
                    &mut portfolio,
                    bars[index].timestamp,
                    price,
                    &SellSizing::All,
                    &exec,
                    TradeReason::EndOfPeriod,
                );
            }
            break;
        }

        let outcome = match &mut driver {
            Driver::Graph {
                compiled,
                indicators,
            } => graph_step(
                compiled,
                indicators,
                bars,
                index,
                price,
                &mut portfolio,
                config,
            ),
            Driver::Grid(engine) => engine.on_bar(bars, index, price, &mut portfolio, &exec),
        };
        if outcome.is_some_and(|result| !result.is_filled()) {
            skipped += 1;
        }
    }

    let trades = portfolio.into_trades();
    let daily = daily_closes(bars, &closes);
    let asset_snapshots = build_asset_snapshots(&trades, &daily, config.initial_capital);
    let metrics = compute_metrics(
        &trades,
        &asset_snapshots,
        config.initial_capital,
        config.risk_free_rate,
    );

    info!(
        strategy = %strategy.name,
        trades = trades.len(),
        skipped_signals = skipped,
        round_trips = metrics.total_trades,
        total_return = metrics.total_return,
        max_drawdown = metrics.max_drawdown,
        "backtest finished"
    );

    Ok(BacktestResult {
        strategy_name: strategy.name.clone(),
        trades,
        asset_snapshots,
        metrics,
        price_series: bars.to_vec(),
    })
}
