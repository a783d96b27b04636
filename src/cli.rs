//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestResult};
use crate::domain::batch::{BatchJob, BatchOutcome, run_batch_with_progress};
use crate::domain::config_validation::{
    backtest_config_from, strategy_from, validate_backtest_config, validate_strategy_config,
};
use crate::domain::error::FlowError;
use crate::domain::graph::NodeKind;
use crate::domain::graph_eval::compile;
use crate::domain::strategy::{Strategy, StrategyKind};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "flowtrader", about = "Strategy-graph and grid backtester")]
pub struct Cli {
    /// Log filter used when RUST_LOG is unset (e.g. `info`, `flowtrader=debug`)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest over one or more symbols
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Strategy file; defaults to the strategy sections of --config
        #[arg(short, long)]
        strategy: Option<PathBuf>,
        /// Directory holding one `<SYMBOL>.csv` per symbol
        #[arg(short, long)]
        data_dir: PathBuf,
        /// Symbols to run; every CSV in --data-dir when omitted
        #[arg(long = "symbol")]
        symbols: Vec<String>,
        /// Run symbols one after another instead of in parallel
        #[arg(long)]
        sequential: bool,
        /// Print the trade ledger of each run
        #[arg(long)]
        trades: bool,
        /// Validate configuration and stop
        #[arg(long)]
        dry_run: bool,
    },
    /// List symbols available in a data directory
    ListSymbols {
        #[arg(short, long)]
        data_dir: PathBuf,
    },
    /// Validate a strategy configuration
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
}

/// Install the fmt subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            strategy,
            data_dir,
            symbols,
            sequential,
            trades,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, strategy.as_ref())
            } else {
                run_backtest(
                    &config,
                    strategy.as_ref(),
                    &data_dir,
                    &symbols,
                    !sequential,
                    trades,
                )
            }
        }
        Command::ListSymbols { data_dir } => run_list_symbols(&data_dir),
        Command::Validate { strategy } => run_validate(&strategy),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = FlowError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, FlowError> {
    backtest_config_from(adapter)
}

pub fn build_strategy(adapter: &dyn ConfigPort) -> Result<Strategy, ExitCode> {
    strategy_from(adapter).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

/// Stages shared by `backtest` and `backtest --dry-run`: load and validate
/// the run config and the strategy.
fn load_run_inputs(
    config_path: &PathBuf,
    strategy_path: Option<&PathBuf>,
) -> Result<(BacktestConfig, Strategy), ExitCode> {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;

    // Stage 2: Validate backtest config
    if let Err(e) = validate_backtest_config(&adapter) {
        eprintln!("error: {e}");
        return Err((&e).into());
    }
    let bt_config = build_backtest_config(&adapter).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;

    // Stage 3: Resolve strategy source, validate, build
    let strategy_adapter = match strategy_path {
        Some(path) => {
            eprintln!("Loading strategy from {}", path.display());
            Some(load_config(path)?)
        }
        None => None,
    };
    let strategy_config: &dyn ConfigPort = match &strategy_adapter {
        Some(a) => a,
        None => &adapter,
    };
    if let Err(e) = validate_strategy_config(strategy_config) {
        eprintln!("error: {e}");
        return Err((&e).into());
    }
    let strategy = build_strategy(strategy_config)?;
    eprintln!("Loaded {} strategy: {}", strategy.kind_name(), strategy.name);

    Ok((bt_config, strategy))
}

fn run_backtest(
    config_path: &PathBuf,
    strategy_path: Option<&PathBuf>,
    data_dir: &PathBuf,
    symbols: &[String],
    parallel: bool,
    show_trades: bool,
) -> ExitCode {
    let (bt_config, strategy) = match load_run_inputs(config_path, strategy_path) {
        Ok(inputs) => inputs,
        Err(code) => return code,
    };

    let data_port = CsvAdapter::new(data_dir.clone());
    run_backtest_pipeline(
        &data_port,
        &strategy,
        &bt_config,
        symbols,
        parallel,
        show_trades,
    )
}

pub fn run_backtest_pipeline(
    data_port: &dyn DataPort,
    strategy: &Strategy,
    bt_config: &BacktestConfig,
    symbols: &[String],
    parallel: bool,
    show_trades: bool,
) -> ExitCode {
    // Stage 4: Resolve symbols
    let symbols = if symbols.is_empty() {
        match data_port.list_symbols() {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    } else {
        symbols.to_vec()
    };
    if symbols.is_empty() {
        eprintln!("error: no symbols to backtest");
        return ExitCode::from(3);
    }

    // Stage 5: Fetch bars
    let mut jobs = Vec::with_capacity(symbols.len());
    for symbol in &symbols {
        let bars = match data_port.fetch_bars(symbol, bt_config.start_date, bt_config.end_date) {
            Ok(bars) => bars,
            Err(e) => {
                eprintln!("warning: skipping {} ({})", symbol, e);
                continue;
            }
        };
        jobs.push(BatchJob {
            label: symbol.clone(),
            bars,
            strategy: strategy.clone(),
            config: bt_config.clone(),
        });
    }
    if jobs.is_empty() {
        eprintln!("error: no symbols with data to backtest");
        return ExitCode::from(3);
    }

    // Stage 6: Run
    eprintln!(
        "Running backtest: {} symbols, {}",
        jobs.len(),
        if parallel { "parallel" } else { "sequential" }
    );
    let outcomes = run_batch_with_progress(&jobs, parallel, |processed, total| {
        eprintln!("  [{}/{}]", processed, total);
    });

    // Stage 7: Report
    print_summary(&outcomes, show_trades);

    match outcomes.iter().find_map(|o| o.result.as_ref().err()) {
        Some(e) if outcomes.iter().all(|o| !o.is_ok()) => e.into(),
        _ => ExitCode::SUCCESS,
    }
}

fn print_result(label: &str, result: &BacktestResult, show_trades: bool) {
    let m = &result.metrics;
    println!("=== {} ({}) ===", label, result.strategy_name);
    println!("Total Return:     {:.2}%", m.total_return * 100.0);
    println!("Annualized:       {:.2}%", m.annualized_return * 100.0);
    println!("Sharpe Ratio:     {:.2}", m.sharpe_ratio);
    println!("Max Drawdown:     -{:.2}%", m.max_drawdown * 100.0);
    println!("Total Trades:     {}", m.total_trades);
    println!(
        "Win Rate:         {:.1}% ({} won, {} lost)",
        m.win_rate * 100.0,
        m.winning_trades,
        m.losing_trades
    );
    println!("Profit/Loss:      {:.2}", m.profit_loss_ratio);
    println!("Final Equity:     {:.2}", m.final_equity);

    if show_trades && !result.trades.is_empty() {
        println!("Trades:");
        for t in &result.trades {
            let pnl = t
                .realized_pnl
                .map(|p| format!("{:.2}", p))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {}  {:<4} {:>8} @ {:<10} amount {:<12.2} pnl {:<10} {}",
                t.timestamp, t.action, t.quantity, t.price, t.amount, pnl, t.reason
            );
        }
    }
    println!();
}

fn print_summary(outcomes: &[BatchOutcome], show_trades: bool) {
    for outcome in outcomes {
        match &outcome.result {
            Ok(result) => print_result(&outcome.label, result, show_trades),
            Err(e) => eprintln!("error: {}: {}", outcome.label, e),
        }
    }
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    eprintln!(
        "{} runs completed, {} failed",
        outcomes.len() - failed,
        failed
    );
}

pub fn run_dry_run(config_path: &PathBuf, strategy_path: Option<&PathBuf>) -> ExitCode {
    let (bt_config, strategy) = match load_run_inputs(config_path, strategy_path) {
        Ok(inputs) => inputs,
        Err(code) => return code,
    };

    eprintln!("Config validated successfully");
    eprintln!("\nBacktest:");
    eprintln!("  initial_capital: {}", bt_config.initial_capital);
    eprintln!("  commission_rate: {}", bt_config.commission_rate);
    eprintln!("  lot_size:        {}", bt_config.lot_size);
    eprintln!("  buy sizing:      {:?}", bt_config.buy_sizing);
    eprintln!("  sell sizing:     {:?}", bt_config.sell_sizing);
    eprintln!("  close_at_end:    {}", bt_config.close_at_end);
    if let Some(stop) = &bt_config.stop_loss {
        eprintln!(
            "  stop loss:       {:?} {} ({:?})",
            stop.kind, stop.value, stop.action
        );
    }

    let indicators = strategy.indicators();
    if !indicators.is_empty() {
        eprintln!("\nIndicators to compute:");
        for ind in &indicators {
            eprintln!("  {}", ind);
        }
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_list_symbols(data_dir: &PathBuf) -> ExitCode {
    let adapter = CsvAdapter::new(data_dir.clone());
    let symbols = match adapter.list_symbols() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if symbols.is_empty() {
        eprintln!("No symbols found in {}", data_dir.display());
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}

fn run_validate(strategy_path: &PathBuf) -> ExitCode {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let adapter = match load_config(strategy_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_strategy_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }

    let strategy = match build_strategy(&adapter) {
        Ok(s) => s,
        Err(code) => return code,
    };

    match &strategy.kind {
        StrategyKind::Graph(graph) => {
            let compiled = match compile(graph) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("error: {e}");
                    return (&e).into();
                }
            };
            eprintln!("\nNodes (evaluation order):");
            for id in compiled.evaluation_order() {
                match graph.node(id).map(|n| &n.kind) {
                    Some(NodeKind::Condition(c)) => eprintln!(
                        "  {:<16} condition  {} {:?} {} {}",
                        id, c.indicator, c.field, c.operator, c.threshold
                    ),
                    Some(NodeKind::Logic(op)) => {
                        eprintln!("  {:<16} logic      {:?}", id, op)
                    }
                    Some(NodeKind::Action(a)) => {
                        eprintln!("  {:<16} action     {:?}", id, a)
                    }
                    // synthesised during normalisation
                    None => eprintln!("  {:<16} logic      Or (implicit)", id),
                }
            }
            eprintln!("\nIndicators:");
            for ind in compiled.indicators() {
                eprintln!("  {}", ind);
            }
        }
        StrategyKind::Grid(params) => {
            eprintln!(
                "\nGrid: {} to {} in {} steps of {:.4}",
                params.bottom,
                params.top,
                params.grid_count,
                params.step()
            );
            eprintln!("  position_size:     {}", params.position_size);
            eprintln!("  trend_filter:      {}", params.trend_filter);
            eprintln!("  volatility_filter: {}", params.volatility_filter);
        }
    }

    eprintln!("\nStrategy configuration is valid.");
    ExitCode::SUCCESS
}
