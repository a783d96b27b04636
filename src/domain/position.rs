//! Long-only position and trade ledger records.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use std::fmt;

/// Holdings of the single traded instrument. `average_cost` is the
/// volume-weighted purchase price and only moves on buys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    pub quantity: u64,
    pub average_cost: Decimal,
    /// Time of the buy that opened the current holding; `None` when flat.
    pub opened_at: Option<NaiveDateTime>,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    pub fn market_value(&self, price: Decimal) -> Decimal {
        Decimal::from(self.quantity) * price
    }

    pub fn cost_basis(&self) -> Decimal {
        Decimal::from(self.quantity) * self.average_cost
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        (price - self.average_cost) * Decimal::from(self.quantity)
    }

    pub(crate) fn apply_buy(&mut self, quantity: u64, price: Decimal, at: NaiveDateTime) {
        if quantity == 0 {
            return;
        }
        let new_quantity = self.quantity + quantity;
        self.average_cost = (self.average_cost * Decimal::from(self.quantity)
            + price * Decimal::from(quantity))
            / Decimal::from(new_quantity);
        if self.quantity == 0 {
            self.opened_at = Some(at);
        }
        self.quantity = new_quantity;
    }

    /// Reduce holdings. Average cost is kept while shares remain and reset
    /// once the position is closed.
    pub(crate) fn apply_sell(&mut self, quantity: u64) {
        self.quantity = self.quantity.saturating_sub(quantity);
        if self.quantity == 0 {
            self.average_cost = Decimal::ZERO;
            self.opened_at = None;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "buy"),
            TradeAction::Sell => write!(f, "sell"),
        }
    }
}

/// Why a trade was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeReason {
    Signal,
    StopLoss,
    GridEntry,
    GridAdd,
    GridTakeProfit,
    EndOfPeriod,
}

impl fmt::Display for TradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TradeReason::Signal => "signal",
            TradeReason::StopLoss => "stop loss",
            TradeReason::GridEntry => "grid entry",
            TradeReason::GridAdd => "grid add",
            TradeReason::GridTakeProfit => "grid take profit",
            TradeReason::EndOfPeriod => "end of period",
        };
        write!(f, "{}", s)
    }
}

/// One executed fill. `amount` includes commission: the total outflow of a
/// buy, the net inflow of a sell.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub timestamp: NaiveDateTime,
    pub action: TradeAction,
    pub price: Decimal,
    pub quantity: u64,
    pub amount: Decimal,
    pub commission: Decimal,
    /// `(price - average cost) * quantity`, sells only.
    pub realized_pnl: Option<Decimal>,
    pub reason: TradeReason,
}

impl Trade {
    /// Signed effect on cash.
    pub fn cash_delta(&self) -> Decimal {
        match self.action {
            TradeAction::Buy => -self.amount,
            TradeAction::Sell => self.amount,
        }
    }

    pub fn quantity_delta(&self) -> i128 {
        match self.action {
            TradeAction::Buy => self.quantity as i128,
            TradeAction::Sell => -(self.quantity as i128),
        }
    }
}
