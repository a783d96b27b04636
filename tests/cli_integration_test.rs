//! CLI integration tests for config loading and the backtest orchestration.
//!
//! Tests cover:
//! - Config parsing (build_backtest_config, build_strategy)
//! - Dry-run and validate with real INI files on disk
//! - Full pipeline with MockDataPort
//! - Full pipeline over CSV files in a temp directory

mod common;

use common::*;
use flowtrader::adapters::file_config_adapter::FileConfigAdapter;
use flowtrader::cli;
use flowtrader::domain::backtest::BacktestConfig;
use flowtrader::domain::error::FlowError;
use flowtrader::domain::execution::{BuySizing, SellSizing};
use flowtrader::domain::indicator::IndicatorType;
use flowtrader::domain::strategy::StrategyKind;
use rust_decimal_macros::dec;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const VALID_INI: &str = r#"
[backtest]
initial_capital = 200000
commission_rate = 0.0003
lot_size = 100
position_sizing = half
sell_sizing = all
close_at_end = true
risk_free_rate = 0.02
start_date = 2022-01-01
end_date = 2022-12-31

[stop_loss]
type = pct
value = 8
action = sell_all

[strategy]
name = MACD and RSI
kind = graph

[node.golden]
kind = condition
indicator = MACD(12,26,9)
field = dif
operator = crossover
threshold = 0

[node.calm]
kind = condition
indicator = RSI(14)
operator = <
threshold = 70

[node.entry]
kind = logic
op = and

[node.buy]
kind = action
action = buy

[node.hot]
kind = condition
indicator = RSI(14)
operator = >
threshold = 80

[node.dead]
kind = condition
indicator = MACD(12,26,9)
operator = crossunder
threshold = 0

[node.sell]
kind = action
action = sell

[graph]
edges = golden -> entry, calm -> entry, entry -> buy, hot -> sell, dead -> sell
"#;

const GRID_INI: &str = r#"
[backtest]
initial_capital = 100000
commission_rate = 0
close_at_end = false

[strategy]
name = Range grid
kind = grid

[grid]
bottom = 90
top = 110
grid_count = 10
position_size = 0.5
"#;

mod config_loading {
    use super::*;

    #[test]
    fn build_backtest_config_valid_full() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();

        assert_eq!(config.initial_capital, dec!(200000));
        assert_eq!(config.commission_rate, dec!(0.0003));
        assert_eq!(config.lot_size, 100);
        assert_eq!(config.buy_sizing, BuySizing::half());
        assert_eq!(config.sell_sizing, SellSizing::All);
        assert!(config.close_at_end);
        assert!(config.stop_loss.is_some());
        assert!((config.risk_free_rate - 0.02).abs() < f64::EPSILON);
    }

    #[test]
    fn build_backtest_config_uses_defaults() {
        let adapter = FileConfigAdapter::from_string("[backtest]\n").unwrap();
        let config = cli::build_backtest_config(&adapter).unwrap();
        assert_eq!(config, BacktestConfig::default());
    }

    #[test]
    fn build_backtest_config_rejects_typos() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\ncommission_rate = 0,001\n").unwrap();
        let err = cli::build_backtest_config(&adapter).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { key, .. } if key == "commission_rate"));
    }

    #[test]
    fn build_strategy_graph() {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let strategy = cli::build_strategy(&adapter).unwrap();
        assert_eq!(strategy.name, "MACD and RSI");
        let indicators = strategy.indicators();
        assert!(indicators.contains(&IndicatorType::Rsi(14)));
        assert!(indicators.contains(&IndicatorType::Macd {
            fast: 12,
            slow: 26,
            signal: 9
        }));
        assert_eq!(indicators.len(), 2);
    }

    #[test]
    fn build_strategy_grid() {
        let adapter = FileConfigAdapter::from_string(GRID_INI).unwrap();
        let strategy = cli::build_strategy(&adapter).unwrap();
        let StrategyKind::Grid(params) = strategy.kind else {
            panic!("expected grid");
        };
        assert_eq!(params.grid_count, 10);
        assert_eq!(params.bottom, 90.0);
    }

    #[test]
    fn build_strategy_bad_indicator_fails() {
        let ini = "[strategy]\n[node.c]\nkind = condition\nindicator = SMA(\noperator = >\n[node.b]\nkind = action\naction = buy\n[graph]\nedges = c -> b\n";
        let adapter = FileConfigAdapter::from_string(ini).unwrap();
        let code = cli::build_strategy(&adapter).unwrap_err();
        assert!(same_code(code, ExitCode::from(4)));
    }
}

mod dry_run {
    use super::*;

    #[test]
    fn dry_run_valid_config_succeeds() {
        let file = write_temp_ini(VALID_INI);
        let path = PathBuf::from(file.path());
        assert!(is_success(cli::run_dry_run(&path, None)));
    }

    #[test]
    fn dry_run_with_separate_strategy_file() {
        let run = write_temp_ini("[backtest]\ninitial_capital = 50000\n");
        let strategy = write_temp_ini(GRID_INI);
        let run_path = PathBuf::from(run.path());
        let strategy_path = PathBuf::from(strategy.path());
        assert!(is_success(cli::run_dry_run(&run_path, Some(&strategy_path))));
    }

    #[test]
    fn dry_run_missing_file_fails() {
        let path = PathBuf::from("/nonexistent/path/config.ini");
        assert!(same_code(cli::run_dry_run(&path, None), ExitCode::from(2)));
    }

    #[test]
    fn dry_run_cyclic_graph_fails() {
        let ini = r#"
[backtest]
initial_capital = 100000

[strategy]
kind = graph

[node.c]
kind = condition
indicator = PRICE
operator = >
threshold = 10

[node.a]
kind = logic
op = or

[node.b]
kind = logic
op = or

[node.buy]
kind = action
action = buy

[graph]
edges = c -> a, b -> a, a -> b, a -> buy
"#;
        let file = write_temp_ini(ini);
        let path = PathBuf::from(file.path());
        assert!(same_code(cli::run_dry_run(&path, None), ExitCode::from(4)));
    }

    #[test]
    fn dry_run_bad_backtest_value_fails() {
        let file = write_temp_ini("[backtest]\ninitial_capital = -5\n[strategy]\nkind = grid\n");
        let path = PathBuf::from(file.path());
        assert!(same_code(cli::run_dry_run(&path, None), ExitCode::from(2)));
    }
}

mod pipeline_mock {
    use super::*;

    fn graph_inputs() -> (flowtrader::domain::strategy::Strategy, BacktestConfig) {
        let adapter = FileConfigAdapter::from_string(VALID_INI).unwrap();
        let strategy = cli::build_strategy(&adapter).unwrap();
        let mut config = cli::build_backtest_config(&adapter).unwrap();
        config.start_date = None;
        config.end_date = None;
        (strategy, config)
    }

    #[test]
    fn pipeline_multiple_symbols_succeeds() {
        let mock = MockDataPort::new()
            .with_bars("AAA", generate_bars("2022-01-03", 160, 30.0))
            .with_bars("BBB", generate_bars("2022-01-03", 160, 80.0));
        let (strategy, config) = graph_inputs();
        let symbols = vec!["AAA".to_string(), "BBB".to_string()];
        let code = cli::run_backtest_pipeline(&mock, &strategy, &config, &symbols, true, true);
        assert!(is_success(code));
    }

    #[test]
    fn pipeline_lists_symbols_when_none_given() {
        let mock = MockDataPort::new().with_bars("AAA", generate_bars("2022-01-03", 60, 30.0));
        let (strategy, config) = graph_inputs();
        let code = cli::run_backtest_pipeline(&mock, &strategy, &config, &[], false, false);
        assert!(is_success(code));
    }

    #[test]
    fn pipeline_skips_symbols_that_fail_to_load() {
        let mock = MockDataPort::new()
            .with_bars("AAA", generate_bars("2022-01-03", 60, 30.0))
            .with_error("BAD", "corrupt file");
        let (strategy, config) = graph_inputs();
        let symbols = vec!["AAA".to_string(), "BAD".to_string()];
        let code = cli::run_backtest_pipeline(&mock, &strategy, &config, &symbols, true, false);
        assert!(is_success(code));
    }

    #[test]
    fn pipeline_no_data_returns_error() {
        let mock = MockDataPort::new().with_error("BAD", "corrupt file");
        let (strategy, config) = graph_inputs();
        let symbols = vec!["BAD".to_string()];
        let code = cli::run_backtest_pipeline(&mock, &strategy, &config, &symbols, true, false);
        assert!(same_code(code, ExitCode::from(3)));
    }

    #[test]
    fn pipeline_all_runs_failing_returns_error() {
        // empty series for the only symbol
        let mock = MockDataPort::new().with_bars("EMPTY", Vec::new());
        let (strategy, config) = graph_inputs();
        let symbols = vec!["EMPTY".to_string()];
        let code = cli::run_backtest_pipeline(&mock, &strategy, &config, &symbols, true, false);
        assert!(same_code(code, ExitCode::from(3)));
    }
}

mod csv_end_to_end {
    use super::*;
    use std::fs;

    fn write_csv(dir: &std::path::Path, symbol: &str, bars: &[PriceBar]) {
        let mut content = String::from("timestamp,open,high,low,close,volume\n");
        for b in bars {
            content.push_str(&format!(
                "{},{},{},{},{},{}\n",
                b.timestamp.format("%Y-%m-%d"),
                b.open,
                b.high,
                b.low,
                b.close,
                b.volume
            ));
        }
        fs::write(dir.join(format!("{symbol}.csv")), content).unwrap();
    }

    #[test]
    fn grid_backtest_over_csv_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        write_csv(
            dir.path(),
            "RANGE",
            &bars_from_closes("2024-01-01", &[100.0, 97.0, 95.0, 99.0, 104.0, 96.0, 103.0]),
        );
        let config = write_temp_ini(GRID_INI);
        let config_path = PathBuf::from(config.path());
        let cli = cli::Cli {
            log_level: "warn".to_string(),
            command: cli::Command::Backtest {
                config: config_path,
                strategy: None,
                data_dir: dir.path().to_path_buf(),
                symbols: Vec::new(),
                sequential: true,
                trades: true,
                dry_run: false,
            },
        };
        assert!(is_success(cli::run(cli)));
    }

    #[test]
    fn validate_command_accepts_graph_file() {
        let file = write_temp_ini(VALID_INI);
        let cli = cli::Cli {
            log_level: "warn".to_string(),
            command: cli::Command::Validate {
                strategy: PathBuf::from(file.path()),
            },
        };
        assert!(is_success(cli::run(cli)));
    }

    #[test]
    fn list_symbols_over_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        write_csv(dir.path(), "ONE", &bars_from_closes("2024-01-01", &[1.0]));
        let cli = cli::Cli {
            log_level: "warn".to_string(),
            command: cli::Command::ListSymbols {
                data_dir: dir.path().to_path_buf(),
            },
        };
        assert!(is_success(cli::run(cli)));
    }
}
