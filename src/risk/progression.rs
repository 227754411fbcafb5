use rust_decimal::Decimal;

use crate::error::EngineError;
use crate::models::task::{StakeState, Strategy};

/// Fibonacci multipliers of the base stake.
pub const FIBONACCI: [u32; 20] = [
    1, 1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233, 377, 610, 987, 1597, 2584, 4181, 6765,
];

/// The 1-3-2-6 positive progression.
pub const ONE_THREE_TWO_SIX: [u32; 4] = [1, 3, 2, 6];

/// Paroli resets after this many consecutive wins.
pub const PAROLI_WINS: usize = 3;

/// Reject strategy parameters that must never reach [`advance`].
pub fn validate(strategy: &Strategy, base: Decimal) -> Result<(), EngineError> {
    if base <= Decimal::ZERO {
        return Err(EngineError::config(format!("base stake must be positive, got {base}")));
    }

    match strategy {
        Strategy::Martingale {
            multiplier,
            max_cycle,
        } => {
            if *multiplier <= Decimal::ZERO {
                return Err(EngineError::config(format!(
                    "martingale multiplier must be positive, got {multiplier}"
                )));
            }
            if *max_cycle == 0 {
                return Err(EngineError::config("martingale max_cycle must be at least 1"));
            }
        }
        Strategy::DAlembert { step } => {
            if *step <= Decimal::ZERO {
                return Err(EngineError::config(format!("d'alembert step must be positive, got {step}")));
            }
        }
        Strategy::Custom { sequence } => {
            if sequence.is_empty() {
                return Err(EngineError::config("custom sequence is empty"));
            }
            if let Some(bad) = sequence.iter().find(|m| **m <= Decimal::ZERO) {
                return Err(EngineError::config(format!(
                    "custom sequence entries must be positive, got {bad}"
                )));
            }
        }
        Strategy::Kelly { risk_fraction } => {
            if !(risk_fraction.is_finite() && *risk_fraction > 0.0 && *risk_fraction <= 1.0) {
                return Err(EngineError::config(format!(
                    "kelly risk fraction must be in (0, 1], got {risk_fraction}"
                )));
            }
        }
        Strategy::Flat | Strategy::Fibonacci | Strategy::Paroli | Strategy::OneThreeTwoSix => {}
    }
    Ok(())
}

/// Stake state of a freshly created task.
pub fn initial_state(strategy: &Strategy, base: Decimal) -> StakeState {
    let first = match strategy {
        Strategy::Custom { sequence } => sequence.first().copied().unwrap_or(Decimal::ONE),
        _ => Decimal::ONE,
    };
    StakeState {
        stake_amount: (base * first).floor(),
        consecutive_losses: 0,
        sequence_index: 0,
    }
}

/// Next stake state after one settled wager.
///
/// Pure: the same inputs always give the same output. Kelly sizing happens at
/// placement, so a Kelly state only keeps the loss counter.
pub fn advance(prev: &StakeState, strategy: &Strategy, base: Decimal, won: bool) -> StakeState {
    let losses = if won { 0 } else { prev.consecutive_losses + 1 };
    let reset = StakeState {
        stake_amount: base,
        consecutive_losses: losses,
        sequence_index: 0,
    };

    let next = match strategy {
        Strategy::Flat | Strategy::Kelly { .. } => reset,

        Strategy::Martingale {
            multiplier,
            max_cycle,
        } => {
            if won {
                reset
            } else if losses >= *max_cycle {
                // cycle exhausted: take the loss and start over
                StakeState {
                    consecutive_losses: 0,
                    ..reset
                }
            } else {
                StakeState {
                    stake_amount: prev.stake_amount * multiplier,
                    consecutive_losses: losses,
                    sequence_index: 0,
                }
            }
        }

        Strategy::DAlembert { step } => {
            let stake = if won {
                (prev.stake_amount - step).max(base)
            } else {
                prev.stake_amount + step
            };
            StakeState {
                stake_amount: stake,
                ..reset
            }
        }

        Strategy::Fibonacci => {
            let last = FIBONACCI.len() - 1;
            let idx = if won {
                prev.sequence_index.saturating_sub(2)
            } else {
                (prev.sequence_index + 1).min(last)
            };
            StakeState {
                stake_amount: base * Decimal::from(FIBONACCI[idx.min(last)]),
                consecutive_losses: losses,
                sequence_index: idx,
            }
        }

        Strategy::Paroli => {
            if !won {
                return floored(reset);
            }
            let idx = prev.sequence_index + 1;
            if idx >= PAROLI_WINS {
                reset
            } else {
                StakeState {
                    stake_amount: prev.stake_amount * Decimal::TWO,
                    consecutive_losses: 0,
                    sequence_index: idx,
                }
            }
        }

        Strategy::OneThreeTwoSix => {
            if !won {
                return floored(reset);
            }
            let idx = prev.sequence_index + 1;
            match ONE_THREE_TWO_SIX.get(idx) {
                Some(mult) => StakeState {
                    stake_amount: base * Decimal::from(*mult),
                    consecutive_losses: 0,
                    sequence_index: idx,
                },
                None => reset,
            }
        }

        Strategy::Custom { sequence } => {
            // loss walks forward and wraps; win goes back to the start
            let idx = if won || sequence.is_empty() {
                0
            } else {
                (prev.sequence_index + 1) % sequence.len()
            };
            let mult = sequence.get(idx).copied().unwrap_or(Decimal::ONE);
            StakeState {
                stake_amount: base * mult,
                consecutive_losses: losses,
                sequence_index: idx,
            }
        }
    };

    floored(next)
}

fn floored(state: StakeState) -> StakeState {
    StakeState {
        stake_amount: state.stake_amount.floor().max(Decimal::ZERO),
        ..state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn play(strategy: &Strategy, base: Decimal, results: &[bool]) -> Vec<Decimal> {
        let mut state = initial_state(strategy, base);
        let mut stakes = vec![state.stake_amount];
        for won in results {
            state = advance(&state, strategy, base, *won);
            stakes.push(state.stake_amount);
        }
        stakes
    }

    #[test]
    fn test_flat() {
        let stakes = play(&Strategy::Flat, dec!(100), &[false, true, false]);
        assert!(stakes.iter().all(|s| *s == dec!(100)));
    }

    #[test]
    fn test_martingale_cap_resets_after_cycle() {
        let strategy = Strategy::Martingale {
            multiplier: dec!(2),
            max_cycle: 3,
        };
        let stakes = play(&strategy, dec!(100), &[false, false, false]);
        assert_eq!(stakes, vec![dec!(100), dec!(200), dec!(400), dec!(100)]);
    }

    #[test]
    fn test_martingale_win_resets() {
        let strategy = Strategy::Martingale {
            multiplier: dec!(2.5),
            max_cycle: 10,
        };
        let stakes = play(&strategy, dec!(10), &[false, false, true]);
        assert_eq!(stakes, vec![dec!(10), dec!(25), dec!(62), dec!(10)]);
    }

    #[test]
    fn test_dalembert_floored_at_base() {
        let strategy = Strategy::DAlembert { step: dec!(50) };
        let stakes = play(&strategy, dec!(100), &[false, false, true, true, true]);
        assert_eq!(
            stakes,
            vec![dec!(100), dec!(150), dec!(200), dec!(150), dec!(100), dec!(100)]
        );
    }

    #[test]
    fn test_fibonacci_walk() {
        let stakes = play(&Strategy::Fibonacci, dec!(10), &[false, false, false, false, true]);
        // idx 0,1,2,3,4 -> win back two to idx 2
        assert_eq!(
            stakes,
            vec![dec!(10), dec!(10), dec!(20), dec!(30), dec!(50), dec!(20)]
        );
    }

    #[test]
    fn test_fibonacci_saturates() {
        let losses = vec![false; 40];
        let stakes = play(&Strategy::Fibonacci, dec!(1), &losses);
        assert_eq!(*stakes.last().unwrap(), dec!(6765));
    }

    #[test]
    fn test_paroli() {
        let stakes = play(&Strategy::Paroli, dec!(100), &[true, true, true, true, false]);
        assert_eq!(
            stakes,
            vec![dec!(100), dec!(200), dec!(400), dec!(100), dec!(200), dec!(100)]
        );
    }

    #[test]
    fn test_one_three_two_six() {
        let stakes = play(&Strategy::OneThreeTwoSix, dec!(10), &[true, true, true, true, true, false]);
        assert_eq!(
            stakes,
            vec![dec!(10), dec!(30), dec!(20), dec!(60), dec!(10), dec!(30), dec!(10)]
        );
    }

    #[test]
    fn test_custom_wraps_on_loss_and_resets_on_win() {
        let strategy = Strategy::Custom {
            sequence: vec![dec!(1), dec!(2), dec!(4)],
        };
        let stakes = play(&strategy, dec!(100), &[false, false, false, false, true]);
        assert_eq!(
            stakes,
            vec![dec!(100), dec!(200), dec!(400), dec!(100), dec!(200), dec!(100)]
        );
    }

    #[test]
    fn test_custom_initial_uses_first_entry() {
        let strategy = Strategy::Custom {
            sequence: vec![dec!(1.5), dec!(3)],
        };
        assert_eq!(initial_state(&strategy, dec!(10)).stake_amount, dec!(15));
    }

    #[test]
    fn test_kelly_state_stays_at_base() {
        let strategy = Strategy::Kelly { risk_fraction: 0.2 };
        let stakes = play(&strategy, dec!(50), &[false, true, false]);
        assert!(stakes.iter().all(|s| *s == dec!(50)));
    }

    #[test]
    fn test_advance_is_deterministic() {
        let strategy = Strategy::Martingale {
            multiplier: dec!(2),
            max_cycle: 5,
        };
        let state = StakeState {
            stake_amount: dec!(400),
            consecutive_losses: 2,
            sequence_index: 0,
        };
        let a = advance(&state, &strategy, dec!(100), false);
        let b = advance(&state, &strategy, dec!(100), false);
        assert_eq!(a, b);
        assert_eq!(a.stake_amount, dec!(800));
    }

    #[test]
    fn test_validation_rejects_bad_parameters() {
        assert!(validate(&Strategy::Flat, dec!(0)).is_err());
        assert!(validate(
            &Strategy::Martingale {
                multiplier: dec!(-1),
                max_cycle: 3
            },
            dec!(10)
        )
        .is_err());
        assert!(validate(&Strategy::DAlembert { step: dec!(0) }, dec!(10)).is_err());
        assert!(validate(&Strategy::Custom { sequence: vec![] }, dec!(10)).is_err());
        assert!(validate(
            &Strategy::Custom {
                sequence: vec![dec!(1), dec!(0)]
            },
            dec!(10)
        )
        .is_err());
        assert!(validate(&Strategy::Kelly { risk_fraction: 1.5 }, dec!(10)).is_err());
        assert!(validate(&Strategy::Fibonacci, dec!(10)).is_ok());
    }
}
