use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::EngineConfig;
use crate::error::WagerError;
use crate::models::bankroll::Bankroll;

/// Why the global guard stopped all tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopTrigger {
    StopLoss { profit: Decimal, limit: Decimal },
    TakeProfit { profit: Decimal, target: Decimal },
}

impl std::fmt::Display for StopTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopTrigger::StopLoss { profit, limit } => {
                write!(f, "stop-loss hit (profit={profit} <= -{limit})")
            }
            StopTrigger::TakeProfit { profit, target } => {
                write!(f, "take-profit hit (profit={profit} >= {target})")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskAction {
    Continue,
    Halt(StopTrigger),
}

/// Bankroll-level guard: pre-flight stake checks, drawdown marking and the
/// global stop-loss / take-profit.
pub struct RiskManager<'a> {
    config: &'a EngineConfig,
}

impl<'a> RiskManager<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Pre-flight check before a stake is debited.
    pub fn check_stake(&self, bankroll: &Bankroll, stake: Decimal) -> Result<(), WagerError> {
        if stake <= Decimal::ZERO {
            return Err(WagerError::NonPositiveStake(stake));
        }
        if !bankroll.can_afford(stake) {
            return Err(WagerError::InsufficientBankroll {
                required: stake,
                available: bankroll.balance,
            });
        }
        Ok(())
    }

    /// Stop condition against the current profit. A zero limit is disabled.
    pub fn stop_trigger(&self, bankroll: &Bankroll) -> Option<StopTrigger> {
        let profit = bankroll.profit();
        let take_profit = self.config.take_profit;
        let stop_loss = self.config.stop_loss;

        if take_profit > Decimal::ZERO && profit >= take_profit {
            return Some(StopTrigger::TakeProfit {
                profit,
                target: take_profit,
            });
        }
        if stop_loss > Decimal::ZERO && profit <= -stop_loss {
            return Some(StopTrigger::StopLoss {
                profit,
                limit: stop_loss,
            });
        }
        None
    }

    /// Once-per-cycle check: mark drawdown, then test the stop condition.
    pub fn periodic_check(&self, bankroll: &mut Bankroll) -> RiskAction {
        bankroll.mark_drawdown();
        match self.stop_trigger(bankroll) {
            Some(trigger) => {
                warn!("RISK: {trigger}, halting all tasks");
                RiskAction::Halt(trigger)
            }
            None => RiskAction::Continue,
        }
    }
}
