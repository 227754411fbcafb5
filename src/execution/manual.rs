use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::error::{EngineError, WagerError};
use crate::execution::ledger::WagerLedger;
use crate::models::bankroll::Bankroll;
use crate::models::block::{Axis, Outcome};
use crate::models::rule::RuleId;
use crate::models::wager::{WagerId, WagerTicket};
use crate::risk::risk_manager::RiskManager;

/// An operator's one-off wager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualWager {
    pub rule_id: RuleId,
    pub target_height: u64,
    pub axis: Axis,
    pub outcome: Outcome,
    pub stake: Decimal,
}

/// Place a manual wager through the shared ledger. The stake is taken as
/// given; no progression or sizing applies.
pub fn try_place_manual(
    ledger: &mut WagerLedger,
    bankroll: &mut Bankroll,
    config: &EngineConfig,
    latest_height: Option<u64>,
    request: ManualWager,
) -> Result<WagerId, EngineError> {
    let rule = config
        .rule(&request.rule_id)
        .ok_or_else(|| EngineError::InvalidRuleReference(request.rule_id.clone()))?;

    if request.outcome.axis() != request.axis {
        return Err(WagerError::AxisMismatch.into());
    }
    if request.stake <= Decimal::ZERO {
        return Err(WagerError::NonPositiveStake(request.stake).into());
    }
    if let Some(latest) = latest_height {
        if request.target_height <= latest {
            return Err(WagerError::StaleTarget {
                target_height: request.target_height,
                latest_height: latest,
            }
            .into());
        }
    }
    if !rule.is_aligned(request.target_height) {
        return Err(WagerError::Misaligned {
            rule_id: rule.id.clone(),
            target_height: request.target_height,
        }
        .into());
    }

    let ticket = WagerTicket {
        task_id: None,
        rule_id: request.rule_id,
        target_height: request.target_height,
        predicted: request.outcome,
        stake: request.stake,
        payout_multiplier: config.payout_odds,
        confidence: None,
    };
    let risk = RiskManager::new(config);
    let id = ledger.place(ticket, bankroll, &risk)?;
    info!(
        "Manual wager #{id}: {} on height {} stake={} balance={}",
        request.outcome, request.target_height, request.stake, bankroll.balance
    );
    Ok(id)
}

/// Boolean form of [`try_place_manual`]: `false` on any rejection.
pub fn place_manual(
    ledger: &mut WagerLedger,
    bankroll: &mut Bankroll,
    config: &EngineConfig,
    latest_height: Option<u64>,
    request: ManualWager,
) -> bool {
    match try_place_manual(ledger, bankroll, config, latest_height, request) {
        Ok(_) => true,
        Err(e) => {
            warn!("Manual wager rejected: {e}");
            false
        }
    }
}
