use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Stake sizing utilities.
///
/// Implements the Kelly criterion against decimal payout odds.
pub struct Sizing;

impl Sizing {
    /// Raw Kelly fraction for a binary bet at decimal odds.
    ///
    /// f* = (b*p - q) / b
    /// where b = odds - 1 (net payout per unit), p = win probability, q = 1-p.
    /// May be zero or negative when there is no edge.
    pub fn kelly_fraction(win_prob: f64, decimal_odds: f64) -> f64 {
        let b = decimal_odds - 1.0;
        if b <= 0.0 || !win_prob.is_finite() {
            return 0.0;
        }
        let p = win_prob.clamp(0.0, 1.0);
        let q = 1.0 - p;
        (b * p - q) / b
    }

    /// Stake for a Kelly task: `bankroll * f * risk_fraction`, floored to
    /// whole units, never below `base` and never above `bankroll`.
    /// Without an edge (`f <= 0`) the stake is `base`.
    pub fn kelly_stake(
        bankroll: Decimal,
        confidence: f64,
        odds: Decimal,
        risk_fraction: f64,
        base: Decimal,
    ) -> Decimal {
        let odds_f = odds.to_f64().unwrap_or(0.0);
        let f = Self::kelly_fraction(confidence / 100.0, odds_f);
        if f <= 0.0 {
            return base;
        }

        let bank_f = bankroll.to_f64().unwrap_or(0.0);
        let raw = Decimal::from_f64(bank_f * f * risk_fraction).unwrap_or(Decimal::ZERO);
        Self::floor_units(raw).max(base).min(bankroll)
    }

    /// Drop fractional units.
    pub fn floor_units(amount: Decimal) -> Decimal {
        amount.floor()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kelly_fraction_positive_edge() {
        // 60% at 1.98: b = 0.98, f = (0.588 - 0.4) / 0.98
        let f = Sizing::kelly_fraction(0.60, 1.98);
        assert!((f - 0.191_836).abs() < 1e-5);
    }

    #[test]
    fn test_kelly_fraction_no_edge() {
        assert!(Sizing::kelly_fraction(0.50, 1.98) < 0.0);
        assert_eq!(Sizing::kelly_fraction(0.90, 1.0), 0.0);
    }

    #[test]
    fn test_kelly_stake_scales_with_bankroll() {
        // 1000 * 0.1918 * 0.2 = 38.36 -> 38
        let stake = Sizing::kelly_stake(dec!(1000), 60.0, dec!(1.98), 0.2, dec!(10));
        assert_eq!(stake, dec!(38));
    }

    #[test]
    fn test_kelly_stake_floored_at_base() {
        let stake = Sizing::kelly_stake(dec!(1000), 60.0, dec!(1.98), 0.2, dec!(100));
        assert_eq!(stake, dec!(100));
    }

    #[test]
    fn test_kelly_stake_without_edge_is_base() {
        let stake = Sizing::kelly_stake(dec!(1000), 50.0, dec!(1.98), 0.2, dec!(25));
        assert_eq!(stake, dec!(25));
        assert!(stake > Decimal::ZERO);
    }

    #[test]
    fn test_kelly_stake_capped_at_bankroll() {
        // base above a shrunken bankroll: the cap wins over the floor
        let stake = Sizing::kelly_stake(dec!(80), 99.0, dec!(3.0), 1.0, dec!(100));
        assert_eq!(stake, dec!(80));
    }
}
