//! Configuration validation.
//!
//! Reads the `[backtest]`, `[stop_loss]`, `[strategy]` and `[grid]` sections
//! into typed values, rejecting anything malformed or out of range before a
//! run starts. Values are parsed from the raw strings so that a typo is an
//! error rather than a silent fallback to the default.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::backtest::{BacktestConfig, StopLossAction, StopLossConfig, StopLossKind};
use crate::domain::error::FlowError;
use crate::domain::execution::{BuySizing, SellSizing};
use crate::domain::graph_eval::compile;
use crate::domain::graph_parser::graph_from_config;
use crate::domain::grid::GridParams;
use crate::domain::strategy::Strategy;
use crate::ports::config_port::ConfigPort;

pub const BACKTEST_SECTION: &str = "backtest";
pub const STOP_LOSS_SECTION: &str = "stop_loss";
pub const STRATEGY_SECTION: &str = "strategy";
pub const GRID_SECTION: &str = "grid";

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), FlowError> {
    backtest_config_from(config).map(|_| ())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), FlowError> {
    let strategy = strategy_from(config)?;
    strategy.validate()
}

fn raw(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    what: &str,
) -> Result<Option<T>, FlowError> {
    match raw(config, section, key) {
        None => Ok(None),
        Some(v) => v.parse::<T>().map(Some).map_err(|_| {
            FlowError::config_invalid(section, key, format!("'{}' is not {}", v, what))
        }),
    }
}

fn decimal(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Decimal>, FlowError> {
    parsed(config, section, key, "a number")
}

fn float(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, FlowError> {
    let value: Option<f64> = parsed(config, section, key, "a number")?;
    match value {
        Some(v) if !v.is_finite() => Err(FlowError::config_invalid(section, key, "must be finite")),
        other => Ok(other),
    }
}

fn unsigned(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<u64>, FlowError> {
    parsed(config, section, key, "a non-negative integer")
}

fn boolean(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<bool>, FlowError> {
    match raw(config, section, key) {
        None => Ok(None),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(Some(true)),
            "false" | "no" | "0" => Ok(Some(false)),
            _ => Err(FlowError::config_invalid(
                section,
                key,
                format!("'{}' is not a boolean", v),
            )),
        },
    }
}

fn date(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<NaiveDate>, FlowError> {
    match raw(config, section, key) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(&v, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                FlowError::config_invalid(
                    section,
                    key,
                    format!("invalid {} format, expected YYYY-MM-DD", key),
                )
            }),
    }
}

fn choice(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    raw(config, section, key).map(|v| v.to_ascii_lowercase())
}

fn required<T>(value: Option<T>, section: &str, key: &str) -> Result<T, FlowError> {
    value.ok_or_else(|| FlowError::config_missing(section, key))
}

fn buy_sizing_from(config: &dyn ConfigPort) -> Result<BuySizing, FlowError> {
    let s = BACKTEST_SECTION;
    let sizing = choice(config, s, "position_sizing").unwrap_or_else(|| "full".to_string());
    match sizing.as_str() {
        "full" => Ok(BuySizing::full()),
        "half" => Ok(BuySizing::half()),
        "third" => Ok(BuySizing::third()),
        "quarter" => Ok(BuySizing::quarter()),
        "fixed" => {
            let qty = required(unsigned(config, s, "fixed_quantity")?, s, "fixed_quantity")?;
            if qty == 0 {
                return Err(FlowError::config_invalid(
                    s,
                    "fixed_quantity",
                    "fixed_quantity must be positive",
                ));
            }
            Ok(BuySizing::Fixed(qty))
        }
        other => Err(FlowError::config_invalid(
            s,
            "position_sizing",
            format!("unknown sizing '{}', expected full|half|third|quarter|fixed", other),
        )),
    }
}

fn sell_sizing_from(config: &dyn ConfigPort) -> Result<SellSizing, FlowError> {
    let s = BACKTEST_SECTION;
    let sizing = choice(config, s, "sell_sizing").unwrap_or_else(|| "all".to_string());
    match sizing.as_str() {
        "all" => Ok(SellSizing::All),
        "half" => Ok(SellSizing::Fraction(Decimal::new(5, 1))),
        "fixed" => {
            let qty = required(unsigned(config, s, "sell_quantity")?, s, "sell_quantity")?;
            if qty == 0 {
                return Err(FlowError::config_invalid(
                    s,
                    "sell_quantity",
                    "sell_quantity must be positive",
                ));
            }
            Ok(SellSizing::Fixed(qty))
        }
        other => Err(FlowError::config_invalid(
            s,
            "sell_sizing",
            format!("unknown sizing '{}', expected all|half|fixed", other),
        )),
    }
}

/// `[stop_loss]`, if the section is present.
pub fn stop_loss_from(config: &dyn ConfigPort) -> Result<Option<StopLossConfig>, FlowError> {
    let s = STOP_LOSS_SECTION;
    if !config.has_section(s) {
        return Ok(None);
    }

    let kind = match choice(config, s, "type").as_deref() {
        None | Some("pct") => StopLossKind::Pct,
        Some("amount") => StopLossKind::Amount,
        Some(other) => {
            return Err(FlowError::config_invalid(
                s,
                "type",
                format!("unknown stop loss type '{}', expected pct|amount", other),
            ));
        }
    };
    let value = required(decimal(config, s, "value")?, s, "value")?;
    if value <= Decimal::ZERO {
        return Err(FlowError::config_invalid(s, "value", "value must be positive"));
    }
    let action = match choice(config, s, "action").as_deref() {
        None | Some("sell_all") => StopLossAction::SellAll,
        Some("reduce_half") => StopLossAction::ReduceHalf,
        Some(other) => {
            return Err(FlowError::config_invalid(
                s,
                "action",
                format!("unknown stop loss action '{}', expected sell_all|reduce_half", other),
            ));
        }
    };

    Ok(Some(StopLossConfig {
        kind,
        value,
        action,
    }))
}

/// Typed `[backtest]` (plus `[stop_loss]`), defaults filled in.
pub fn backtest_config_from(config: &dyn ConfigPort) -> Result<BacktestConfig, FlowError> {
    let s = BACKTEST_SECTION;
    let defaults = BacktestConfig::default();

    let initial_capital =
        decimal(config, s, "initial_capital")?.unwrap_or(defaults.initial_capital);
    if initial_capital <= Decimal::ZERO {
        return Err(FlowError::config_invalid(
            s,
            "initial_capital",
            "initial_capital must be positive",
        ));
    }

    let commission_rate =
        decimal(config, s, "commission_rate")?.unwrap_or(defaults.commission_rate);
    if commission_rate < Decimal::ZERO || commission_rate >= Decimal::ONE {
        return Err(FlowError::config_invalid(
            s,
            "commission_rate",
            "commission_rate must be between 0 and 1",
        ));
    }

    let lot_size = unsigned(config, s, "lot_size")?.unwrap_or(defaults.lot_size);
    if lot_size == 0 {
        return Err(FlowError::config_invalid(
            s,
            "lot_size",
            "lot_size must be at least 1",
        ));
    }

    let risk_free_rate = float(config, s, "risk_free_rate")?.unwrap_or(defaults.risk_free_rate);
    if !(0.0..1.0).contains(&risk_free_rate) {
        return Err(FlowError::config_invalid(
            s,
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }

    let start_date = date(config, s, "start_date")?;
    let end_date = date(config, s, "end_date")?;
    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start >= end {
            return Err(FlowError::config_invalid(
                s,
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }

    let result = BacktestConfig {
        initial_capital,
        commission_rate,
        lot_size,
        buy_sizing: buy_sizing_from(config)?,
        sell_sizing: sell_sizing_from(config)?,
        close_at_end: boolean(config, s, "close_at_end")?.unwrap_or(defaults.close_at_end),
        stop_loss: stop_loss_from(config)?,
        risk_free_rate,
        start_date,
        end_date,
    };
    result.validate()?;
    Ok(result)
}

/// Typed `[grid]`.
pub fn grid_params_from(config: &dyn ConfigPort) -> Result<GridParams, FlowError> {
    let s = GRID_SECTION;
    let bottom = required(float(config, s, "bottom")?, s, "bottom")?;
    let top = required(float(config, s, "top")?, s, "top")?;
    let grid_count = required(unsigned(config, s, "grid_count")?, s, "grid_count")?;
    let grid_count = u32::try_from(grid_count).map_err(|_| {
        FlowError::config_invalid(s, "grid_count", "grid_count is too large")
    })?;

    if bottom <= 0.0 {
        return Err(FlowError::config_invalid(s, "bottom", "bottom must be positive"));
    }
    if top <= bottom {
        return Err(FlowError::config_invalid(s, "top", "top must be above bottom"));
    }
    if grid_count == 0 {
        return Err(FlowError::config_invalid(
            s,
            "grid_count",
            "grid_count must be positive",
        ));
    }

    let mut params = GridParams::new(bottom, top, grid_count);
    if let Some(size) = float(config, s, "position_size")? {
        if size <= 0.0 || size > 1.0 {
            return Err(FlowError::config_invalid(
                s,
                "position_size",
                "position_size must be between 0 and 1",
            ));
        }
        params.position_size = size;
    }
    params.trend_filter = boolean(config, s, "trend_filter")?.unwrap_or(false);
    params.volatility_filter = boolean(config, s, "volatility_filter")?.unwrap_or(false);
    params.stop_price = float(config, s, "stop_price")?;
    params.stop_loss_pct = float(config, s, "stop_loss_pct")?;
    params.max_holding_days = match unsigned(config, s, "max_holding_days")? {
        None => None,
        Some(days) => Some(u32::try_from(days).map_err(|_| {
            FlowError::config_invalid(s, "max_holding_days", "max_holding_days is too large")
        })?),
    };

    params.validate().map_err(|e| match e {
        FlowError::InvalidParameter { name, reason } => FlowError::config_invalid(s, &name, reason),
        other => other,
    })?;
    Ok(params)
}

/// `[strategy]` plus either the node sections or `[grid]`.
pub fn strategy_from(config: &dyn ConfigPort) -> Result<Strategy, FlowError> {
    let s = STRATEGY_SECTION;
    let name = raw(config, s, "name").unwrap_or_else(|| "unnamed".to_string());
    match choice(config, s, "kind").as_deref() {
        None | Some("graph") => {
            let graph = graph_from_config(config)?;
            compile(&graph)?;
            Ok(Strategy::graph(name, graph))
        }
        Some("grid") => Ok(Strategy::grid(name, grid_params_from(config)?)),
        Some(other) => Err(FlowError::config_invalid(
            s,
            "kind",
            format!("unknown strategy kind '{}', expected graph|grid", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::strategy::StrategyKind;
    use rust_decimal_macros::dec;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    const GRAPH_STRATEGY: &str = r#"
[strategy]
name = RSI reversal
kind = graph

[node.oversold]
kind = condition
indicator = RSI(14)
operator = <
threshold = 30

[node.overbought]
kind = condition
indicator = RSI(14)
operator = >
threshold = 70

[node.buy]
kind = action
action = buy

[node.sell]
kind = action
action = sell

[graph]
edges = oversold -> buy, overbought -> sell
"#;

    #[test]
    fn valid_backtest_config_passes() {
        let config = make_config(
            r#"
[backtest]
initial_capital = 50000
commission_rate = 0.0003
lot_size = 100
position_sizing = half
sell_sizing = all
close_at_end = false
risk_free_rate = 0.02
start_date = 2020-01-01
end_date = 2024-12-31
"#,
        );
        let c = backtest_config_from(&config).unwrap();
        assert_eq!(c.initial_capital, dec!(50000));
        assert_eq!(c.commission_rate, dec!(0.0003));
        assert_eq!(c.buy_sizing, BuySizing::half());
        assert!(!c.close_at_end);
        assert_eq!(c.start_date, NaiveDate::from_ymd_opt(2020, 1, 1));
        assert!(validate_backtest_config(&config).is_ok());
    }

    #[test]
    fn empty_backtest_section_uses_defaults() {
        let c = backtest_config_from(&make_config("[backtest]\n")).unwrap();
        assert_eq!(c, BacktestConfig::default());
    }

    #[test]
    fn initial_capital_must_be_positive() {
        let config = make_config("[backtest]\ninitial_capital = 0\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(
            matches!(err, FlowError::ConfigInvalid { key, .. } if key == "initial_capital")
        );
    }

    #[test]
    fn non_numeric_value_is_rejected() {
        let config = make_config("[backtest]\ninitial_capital = lots\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(
            matches!(err, FlowError::ConfigInvalid { key, .. } if key == "initial_capital")
        );
    }

    #[test]
    fn commission_out_of_range_fails() {
        let config = make_config("[backtest]\ncommission_rate = -0.1\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(
            matches!(err, FlowError::ConfigInvalid { key, .. } if key == "commission_rate")
        );
    }

    #[test]
    fn lot_size_zero_fails() {
        let config = make_config("[backtest]\nlot_size = 0\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { key, .. } if key == "lot_size"));
    }

    #[test]
    fn risk_free_rate_out_of_range_fails() {
        let config = make_config("[backtest]\nrisk_free_rate = 1.5\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(
            matches!(err, FlowError::ConfigInvalid { key, .. } if key == "risk_free_rate")
        );
    }

    #[test]
    fn invalid_date_format_fails() {
        let config = make_config("[backtest]\nstart_date = 2020/01/01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn start_date_after_end_date_fails() {
        let config = make_config("[backtest]\nstart_date = 2024-12-31\nend_date = 2020-01-01\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { key, .. } if key == "start_date"));
    }

    #[test]
    fn fixed_sizing_requires_quantity() {
        let config = make_config("[backtest]\nposition_sizing = fixed\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigMissing { key, .. } if key == "fixed_quantity"));

        let config = make_config("[backtest]\nposition_sizing = fixed\nfixed_quantity = 300\n");
        let c = backtest_config_from(&config).unwrap();
        assert_eq!(c.buy_sizing, BuySizing::Fixed(300));
    }

    #[test]
    fn unknown_sizing_fails() {
        let config = make_config("[backtest]\nposition_sizing = most\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { key, .. } if key == "position_sizing"));
    }

    #[test]
    fn stop_loss_section_is_read() {
        let config = make_config(
            "[backtest]\n[stop_loss]\ntype = amount\nvalue = 500\naction = reduce_half\n",
        );
        let c = backtest_config_from(&config).unwrap();
        assert_eq!(
            c.stop_loss,
            Some(StopLossConfig {
                kind: StopLossKind::Amount,
                value: dec!(500),
                action: StopLossAction::ReduceHalf,
            })
        );
    }

    #[test]
    fn stop_loss_requires_value() {
        let config = make_config("[backtest]\n[stop_loss]\ntype = pct\n");
        let err = validate_backtest_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigMissing { section, key } if section == "stop_loss" && key == "value"));
    }

    #[test]
    fn graph_strategy_is_built() {
        let strategy = strategy_from(&make_config(GRAPH_STRATEGY)).unwrap();
        assert_eq!(strategy.name, "RSI reversal");
        let StrategyKind::Graph(graph) = &strategy.kind else {
            panic!("expected graph strategy");
        };
        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.edges.len(), 2);
        assert!(validate_strategy_config(&make_config(GRAPH_STRATEGY)).is_ok());
    }

    #[test]
    fn graph_with_dangling_action_fails() {
        let config = make_config(
            "[strategy]\nkind = graph\n[node.buy]\nkind = action\naction = buy\n",
        );
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::GraphInvalid { .. }));
    }

    #[test]
    fn unknown_indicator_is_a_parse_error() {
        let config = make_config(
            "[strategy]\n[node.c]\nkind = condition\nindicator = KDJ(9)\noperator = >\n[node.a]\nkind = action\naction = buy\n[graph]\nedges = c -> a\n",
        );
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::GraphParse(_)));
    }

    #[test]
    fn grid_strategy_is_built() {
        let config = make_config(
            r#"
[strategy]
name = range
kind = grid

[grid]
bottom = 90
top = 110
grid_count = 10
position_size = 0.3
trend_filter = true
stop_loss_pct = 8
max_holding_days = 20
"#,
        );
        let strategy = strategy_from(&config).unwrap();
        let StrategyKind::Grid(params) = strategy.kind else {
            panic!("expected grid strategy");
        };
        assert_eq!(params.grid_count, 10);
        assert_eq!(params.position_size, 0.3);
        assert!(params.trend_filter);
        assert!(!params.volatility_filter);
        assert_eq!(params.stop_loss_pct, Some(8.0));
        assert_eq!(params.max_holding_days, Some(20));
        assert_eq!(params.stop_price, None);
    }

    #[test]
    fn grid_top_below_bottom_fails() {
        let config =
            make_config("[strategy]\nkind = grid\n[grid]\nbottom = 110\ntop = 90\ngrid_count = 5");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { key, .. } if key == "top"));
    }

    #[test]
    fn grid_count_zero_fails() {
        let config =
            make_config("[strategy]\nkind = grid\n[grid]\nbottom = 90\ntop = 110\ngrid_count = 0");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { key, .. } if key == "grid_count"));
    }

    #[test]
    fn grid_missing_bounds_fails() {
        let config = make_config("[strategy]\nkind = grid\n[grid]\ntop = 110\ngrid_count = 5\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigMissing { key, .. } if key == "bottom"));
    }

    #[test]
    fn unknown_strategy_kind_fails() {
        let config = make_config("[strategy]\nkind = neural\n");
        let err = validate_strategy_config(&config).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { key, .. } if key == "kind"));
    }
}
