//! Cash, holdings and the trade ledger of a single run.

use rust_decimal::Decimal;

use super::position::{Position, Trade};

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: Decimal,
    pub initial_capital: Decimal,
    pub position: Position,
    pub trades: Vec<Trade>,
}

impl Portfolio {
    pub fn new(initial_capital: Decimal) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            position: Position::default(),
            trades: Vec::new(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_flat()
    }

    /// Mark-to-market value at `price`.
    pub fn total_assets(&self, price: Decimal) -> Decimal {
        self.cash + self.position.market_value(price)
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(dec!(100000));
        assert_eq!(portfolio.cash, dec!(100000));
        assert_eq!(portfolio.initial_capital, dec!(100000));
        assert!(portfolio.is_flat());
        assert!(portfolio.trades.is_empty());
    }

    #[test]
    fn total_assets_marks_position() {
        let mut portfolio = Portfolio::new(dec!(100000));
        let at = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        portfolio.position.apply_buy(100, dec!(100), at);
        portfolio.cash -= dec!(10000);
        assert_eq!(portfolio.total_assets(dec!(90)), dec!(99000));
        assert_eq!(portfolio.total_assets(dec!(120)), dec!(102000));
    }
}
