use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The single shared pool every wager draws from and credits to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bankroll {
    pub balance: Decimal,
    pub initial_balance: Decimal,
    /// Global high-water mark.
    pub peak_balance: Decimal,
    pub max_drawdown: Decimal,
}

impl Bankroll {
    pub fn new(initial: Decimal) -> Self {
        Self {
            balance: initial,
            initial_balance: initial,
            peak_balance: initial,
            max_drawdown: Decimal::ZERO,
        }
    }

    pub fn profit(&self) -> Decimal {
        self.balance - self.initial_balance
    }

    pub fn can_afford(&self, amount: Decimal) -> bool {
        amount <= self.balance
    }

    pub(crate) fn debit(&mut self, amount: Decimal) {
        self.balance -= amount;
    }

    pub(crate) fn credit(&mut self, amount: Decimal) {
        self.balance += amount;
    }

    pub fn current_drawdown(&self) -> Decimal {
        (self.peak_balance - self.balance).max(Decimal::ZERO)
    }

    /// Raise the high-water mark and widen the max drawdown if needed.
    /// Returns the current drawdown.
    pub fn mark_drawdown(&mut self) -> Decimal {
        if self.balance > self.peak_balance {
            self.peak_balance = self.balance;
        }
        let drawdown = self.current_drawdown();
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
        drawdown
    }

    pub fn drawdown_pct(&self) -> f64 {
        if self.peak_balance <= Decimal::ZERO {
            return 0.0;
        }
        (self.current_drawdown() / self.peak_balance).to_f64().unwrap_or(0.0) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_drawdown_tracks_high_water_mark() {
        let mut bank = Bankroll::new(dec!(1000));
        bank.credit(dec!(200));
        assert_eq!(bank.mark_drawdown(), dec!(0));
        assert_eq!(bank.peak_balance, dec!(1200));

        bank.debit(dec!(300));
        assert_eq!(bank.mark_drawdown(), dec!(300));
        bank.credit(dec!(100));
        assert_eq!(bank.mark_drawdown(), dec!(200));
        assert_eq!(bank.max_drawdown, dec!(300));
        assert_eq!(bank.profit(), dec!(0));
        assert!((bank.drawdown_pct() - 16.666).abs() < 0.01);
    }
}
