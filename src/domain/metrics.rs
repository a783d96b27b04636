//! Asset curve reconstruction and performance metrics.
//!
//! The daily asset curve is never stored during a run. It is rebuilt from the
//! trade ledger and the daily closing prices, so the curve and the ledger
//! cannot disagree:
//! - state on a day = ledger replayed through the last trade on or before it
//! - `total_assets = cash + quantity * close`
//!
//! Ratios that would divide by zero fall back to fixed values instead of
//! producing NaN or infinity.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::ohlcv::PriceBar;
use super::position::{Trade, TradeAction};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Last close of a calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyClose {
    pub date: NaiveDate,
    pub close: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetSnapshot {
    pub date: NaiveDate,
    pub cash: Decimal,
    pub position: u64,
    pub mark_price: Decimal,
    pub total_assets: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_loss_ratio: f64,
    /// Completed round trips, i.e. sell trades.
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub final_equity: Decimal,
}

fn ratio(num: Decimal, den: Decimal) -> f64 {
    if den.is_zero() {
        return 0.0;
    }
    (num / den).to_f64().unwrap_or_default()
}

/// Collapse bars to the last close of each calendar day. `closes` holds the
/// bar closes already converted to decimal, index-aligned with `bars`.
pub fn daily_closes(bars: &[PriceBar], closes: &[Decimal]) -> Vec<DailyClose> {
    let mut out: Vec<DailyClose> = Vec::new();
    for (bar, close) in bars.iter().zip(closes) {
        let date = bar.date();
        match out.last_mut() {
            Some(last) if last.date == date => last.close = *close,
            _ => out.push(DailyClose {
                date,
                close: *close,
            }),
        }
    }
    out
}

/// Replay `trades` (in ledger order) against each trading day.
pub fn build_asset_snapshots(
    trades: &[Trade],
    daily: &[DailyClose],
    initial_capital: Decimal,
) -> Vec<AssetSnapshot> {
    let mut cash = initial_capital;
    let mut quantity: u64 = 0;
    let mut next = 0;
    let mut out = Vec::with_capacity(daily.len());

    for day in daily {
        while next < trades.len() && trades[next].timestamp.date() <= day.date {
            let trade = &trades[next];
            cash += trade.cash_delta();
            quantity = match trade.action {
                TradeAction::Buy => quantity + trade.quantity,
                TradeAction::Sell => quantity.saturating_sub(trade.quantity),
            };
            next += 1;
        }
        out.push(AssetSnapshot {
            date: day.date,
            cash,
            position: quantity,
            mark_price: day.close,
            total_assets: cash + Decimal::from(quantity) * day.close,
        });
    }
    out
}

/// Largest peak-to-trough decline as a fraction of the running peak.
pub fn max_drawdown(snapshots: &[AssetSnapshot]) -> f64 {
    let mut peak: Option<Decimal> = None;
    let mut worst = Decimal::ZERO;
    for snap in snapshots {
        let p = match peak {
            Some(p) if p >= snap.total_assets => p,
            _ => snap.total_assets,
        };
        peak = Some(p);
        if p > Decimal::ZERO {
            let dd = (p - snap.total_assets) / p;
            if dd > worst {
                worst = dd;
            }
        }
    }
    worst.to_f64().unwrap_or_default()
}

fn sharpe_ratio(snapshots: &[AssetSnapshot], risk_free_rate: f64) -> f64 {
    if snapshots.len() < 2 {
        return 0.0;
    }

    let returns: Vec<f64> = snapshots
        .windows(2)
        .map(|w| {
            if w[0].total_assets > Decimal::ZERO {
                ratio(w[1].total_assets - w[0].total_assets, w[0].total_assets)
            } else {
                0.0
            }
        })
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;

    if stddev > 0.0 {
        let sharpe = (mean - daily_rf) / stddev * TRADING_DAYS_PER_YEAR.sqrt();
        if sharpe.is_finite() { sharpe } else { 0.0 }
    } else {
        0.0
    }
}

fn annualized_return(total_return: f64, trading_days: usize) -> f64 {
    if trading_days == 0 {
        return 0.0;
    }
    let years = trading_days as f64 / TRADING_DAYS_PER_YEAR;
    let growth = 1.0 + total_return;
    if growth <= 0.0 {
        return -1.0;
    }
    let annualized = growth.powf(1.0 / years) - 1.0;
    if annualized.is_finite() {
        annualized
    } else {
        0.0
    }
}

pub fn compute_metrics(
    trades: &[Trade],
    snapshots: &[AssetSnapshot],
    initial_capital: Decimal,
    risk_free_rate: f64,
) -> Metrics {
    let final_equity = snapshots
        .last()
        .map(|s| s.total_assets)
        .unwrap_or(initial_capital);
    let total_return = ratio(final_equity - initial_capital, initial_capital);

    let mut total_trades = 0usize;
    let mut winning_trades = 0usize;
    let mut losing_trades = 0usize;
    let mut gains = Decimal::ZERO;
    let mut losses = Decimal::ZERO;

    for pnl in trades
        .iter()
        .filter(|t| t.action == TradeAction::Sell)
        .map(|t| t.realized_pnl.unwrap_or_default())
    {
        total_trades += 1;
        if pnl > Decimal::ZERO {
            winning_trades += 1;
            gains += pnl;
        } else if pnl < Decimal::ZERO {
            losing_trades += 1;
            losses += pnl.abs();
        }
    }

    let win_rate = if total_trades > 0 {
        winning_trades as f64 / total_trades as f64
    } else {
        0.0
    };

    let profit_loss_ratio = if losses > Decimal::ZERO {
        ratio(gains, losses)
    } else {
        gains.to_f64().unwrap_or_default()
    };

    Metrics {
        total_return,
        max_drawdown: max_drawdown(snapshots),
        win_rate,
        profit_loss_ratio,
        total_trades,
        winning_trades,
        losing_trades,
        annualized_return: annualized_return(total_return, snapshots.len()),
        sharpe_ratio: sharpe_ratio(snapshots, risk_free_rate),
        final_equity,
    }
}
