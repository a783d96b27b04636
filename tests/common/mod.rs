#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use flowtrader::domain::backtest::BacktestConfig;
use flowtrader::domain::error::FlowError;
use flowtrader::domain::execution::BuySizing;
use flowtrader::domain::graph::{ActionKind, Condition, ConditionOperator, StrategyGraph};
use flowtrader::domain::indicator::IndicatorType;
pub use flowtrader::domain::ohlcv::PriceBar;
use flowtrader::domain::strategy::Strategy;
use flowtrader::ports::data_port::DataPort;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::process::ExitCode;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(
        &self,
        symbol: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, FlowError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(FlowError::Data {
                reason: reason.clone(),
            });
        }
        let bars = self.data.get(symbol).cloned().unwrap_or_default();
        Ok(bars
            .into_iter()
            .filter(|b| start_date.is_none_or(|s| b.date() >= s))
            .filter(|b| end_date.is_none_or(|e| b.date() <= e))
            .collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, FlowError> {
        let mut symbols: Vec<String> = self
            .data
            .keys()
            .chain(self.errors.keys())
            .cloned()
            .collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn day(date: &str) -> NaiveDateTime {
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

pub fn make_bar(date: &str, close: f64) -> PriceBar {
    PriceBar {
        timestamp: day(date),
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 10_000.0,
    }
}

/// One bar per calendar day starting at `start`.
pub fn bars_from_closes(start: &str, closes: &[f64]) -> Vec<PriceBar> {
    let first = day(start);
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| PriceBar {
            timestamp: first + chrono::Duration::days(i as i64),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 10_000.0 + (i % 7) as f64 * 500.0,
        })
        .collect()
}

/// A deterministic oscillating series around `base`, long enough for the
/// common indicator windows.
pub fn generate_bars(start: &str, count: usize, base: f64) -> Vec<PriceBar> {
    let closes: Vec<f64> = (0..count)
        .map(|i| {
            let t = i as f64;
            base + base * 0.08 * (t / 6.0).sin() + base * 0.002 * t
        })
        .collect();
    bars_from_closes(start, &closes)
}

pub fn price_rule(op: ConditionOperator, threshold: f64, action: ActionKind) -> StrategyGraph {
    StrategyGraph::new()
        .condition("rule", Condition::new(IndicatorType::Price, op, threshold))
        .action("act", action)
        .edge("rule", "act")
}

/// RSI(6) mean reversion: buy below 35, sell above 65.
pub fn rsi_strategy() -> Strategy {
    let graph = StrategyGraph::new()
        .condition(
            "oversold",
            Condition::new(IndicatorType::Rsi(6), ConditionOperator::Lt, 35.0),
        )
        .condition(
            "overbought",
            Condition::new(IndicatorType::Rsi(6), ConditionOperator::Gt, 65.0),
        )
        .action("buy", ActionKind::Buy)
        .action("sell", ActionKind::Sell)
        .edge("oversold", "buy")
        .edge("overbought", "sell");
    Strategy::graph("RSI reversal", graph)
}

pub fn zero_commission_config() -> BacktestConfig {
    BacktestConfig {
        commission_rate: Decimal::ZERO,
        buy_sizing: BuySizing::Fixed(100),
        ..BacktestConfig::default()
    }
}

pub fn same_code(a: ExitCode, b: ExitCode) -> bool {
    format!("{a:?}") == format!("{b:?}")
}

pub fn is_success(code: ExitCode) -> bool {
    same_code(code, ExitCode::SUCCESS)
}
