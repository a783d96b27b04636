//! Trade execution against the portfolio.
//!
//! Turns a buy or sell decision into at most one fill:
//! 1. Size the order from the sizing policy, rounded down to whole lots
//! 2. Clamp buys to what cash covers including commission, sells to holdings
//! 3. Skip silently (no trade) when fewer than one lot is affordable or
//!    nothing is held
//! 4. Move cash, update the position and append the trade to the ledger
//!
//! Commission is `commission_rate * notional`: added to the cash outflow of a
//! buy, deducted from the proceeds of a sell.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::debug;

use super::portfolio::Portfolio;
use super::position::{Trade, TradeAction, TradeReason};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionConfig {
    pub commission_rate: Decimal,
    pub lot_size: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            commission_rate: Decimal::ZERO,
            lot_size: 1,
        }
    }
}

/// How many shares a buy signal asks for.
#[derive(Debug, Clone, PartialEq)]
pub enum BuySizing {
    Fixed(u64),
    /// Fraction of current cash to commit.
    CashFraction(Decimal),
}

impl BuySizing {
    pub fn full() -> Self {
        BuySizing::CashFraction(Decimal::ONE)
    }

    pub fn half() -> Self {
        BuySizing::CashFraction(Decimal::new(5, 1))
    }

    pub fn third() -> Self {
        BuySizing::CashFraction(Decimal::ONE / Decimal::from(3))
    }

    pub fn quarter() -> Self {
        BuySizing::CashFraction(Decimal::new(25, 2))
    }
}

/// How many shares a sell signal releases.
#[derive(Debug, Clone, PartialEq)]
pub enum SellSizing {
    All,
    Fixed(u64),
    /// Fraction of holdings, rounded down to whole lots but never below one
    /// lot (or the whole position if smaller).
    Fraction(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    BelowOneLot,
    InsufficientCash,
    NoPosition,
    InvalidPrice,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Filled(Trade),
    Skipped(SkipReason),
}

impl ExecutionResult {
    pub fn is_filled(&self) -> bool {
        matches!(self, ExecutionResult::Filled(_))
    }
}

pub fn calculate_commission(notional: Decimal, config: &ExecutionConfig) -> Decimal {
    notional * config.commission_rate
}

fn round_down_to_lot(quantity: u64, lot_size: u64) -> u64 {
    let lot = lot_size.max(1);
    quantity / lot * lot
}

/// Largest whole-lot quantity whose cost plus commission fits in `cash`.
pub fn affordable_quantity(cash: Decimal, price: Decimal, config: &ExecutionConfig) -> u64 {
    if price <= Decimal::ZERO || cash <= Decimal::ZERO {
        return 0;
    }
    let lot = config.lot_size.max(1);
    let unit = price * (Decimal::ONE + config.commission_rate) * Decimal::from(lot);
    let mut lots = (cash / unit).floor().to_u64().unwrap_or(0);
    // Decimal division rounds at 28 digits; confirm the fit exactly.
    while lots > 0 && total_buy_cost(lots * lot, price, config) > cash {
        lots -= 1;
    }
    lots * lot
}

fn total_buy_cost(quantity: u64, price: Decimal, config: &ExecutionConfig) -> Decimal {
    let notional = price * Decimal::from(quantity);
    notional + calculate_commission(notional, config)
}

fn desired_buy_quantity(
    portfolio: &Portfolio,
    price: Decimal,
    sizing: &BuySizing,
    config: &ExecutionConfig,
) -> u64 {
    let raw = match sizing {
        BuySizing::Fixed(q) => *q,
        BuySizing::CashFraction(f) => {
            let budget = portfolio.cash * *f;
            if budget <= Decimal::ZERO {
                0
            } else {
                (budget / price).floor().to_u64().unwrap_or(0)
            }
        }
    };
    round_down_to_lot(raw, config.lot_size)
}

pub fn execute_buy(
    portfolio: &mut Portfolio,
    timestamp: NaiveDateTime,
    price: Decimal,
    sizing: &BuySizing,
    config: &ExecutionConfig,
    reason: TradeReason,
) -> ExecutionResult {
    if price <= Decimal::ZERO {
        return ExecutionResult::Skipped(SkipReason::InvalidPrice);
    }

    let desired = desired_buy_quantity(portfolio, price, sizing, config);
    let affordable = affordable_quantity(portfolio.cash, price, config);
    let quantity = desired.min(affordable);

    if quantity < config.lot_size.max(1) {
        let skip = if desired == 0 {
            SkipReason::BelowOneLot
        } else {
            SkipReason::InsufficientCash
        };
        debug!(%timestamp, %price, desired, affordable, ?skip, "buy skipped");
        return ExecutionResult::Skipped(skip);
    }

    let notional = price * Decimal::from(quantity);
    let commission = calculate_commission(notional, config);
    let amount = notional + commission;

    portfolio.cash -= amount;
    portfolio.position.apply_buy(quantity, price, timestamp);

    let trade = Trade {
        timestamp,
        action: TradeAction::Buy,
        price,
        quantity,
        amount,
        commission,
        realized_pnl: None,
        reason,
    };
    portfolio.record_trade(trade.clone());
    ExecutionResult::Filled(trade)
}

fn sell_quantity(held: u64, sizing: &SellSizing, config: &ExecutionConfig) -> u64 {
    let quantity = match sizing {
        SellSizing::All => held,
        SellSizing::Fixed(q) => *q,
        SellSizing::Fraction(f) => {
            let raw = (Decimal::from(held) * *f).floor().to_u64().unwrap_or(0);
            let rounded = round_down_to_lot(raw, config.lot_size);
            if rounded == 0 {
                config.lot_size.max(1)
            } else {
                rounded
            }
        }
    };
    quantity.min(held)
}

pub fn execute_sell(
    portfolio: &mut Portfolio,
    timestamp: NaiveDateTime,
    price: Decimal,
    sizing: &SellSizing,
    config: &ExecutionConfig,
    reason: TradeReason,
) -> ExecutionResult {
    if portfolio.position.is_flat() {
        return ExecutionResult::Skipped(SkipReason::NoPosition);
    }
    if price <= Decimal::ZERO {
        return ExecutionResult::Skipped(SkipReason::InvalidPrice);
    }

    let quantity = sell_quantity(portfolio.position.quantity, sizing, config);
    if quantity == 0 {
        debug!(%timestamp, "sell skipped, nothing to release");
        return ExecutionResult::Skipped(SkipReason::NoPosition);
    }

    let notional = price * Decimal::from(quantity);
    let commission = calculate_commission(notional, config);
    let amount = notional - commission;
    let realized_pnl = (price - portfolio.position.average_cost) * Decimal::from(quantity);

    portfolio.cash += amount;
    portfolio.position.apply_sell(quantity);

    let trade = Trade {
        timestamp,
        action: TradeAction::Sell,
        price,
        quantity,
        amount,
        commission,
        realized_pnl: Some(realized_pnl),
        reason,
    };
    portfolio.record_trade(trade.clone());
    ExecutionResult::Filled(trade)
}
