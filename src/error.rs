use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::rule::RuleId;
use crate::models::task::TaskId;
use crate::models::wager::WagerId;

/// Engine-level failures. None of these is fatal to the process.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    ConfigValidation(String),
    #[error("rule {0} does not exist")]
    InvalidRuleReference(RuleId),
    #[error("task {0} does not exist")]
    UnknownTask(TaskId),
    #[error(transparent)]
    Wager(#[from] WagerError),
}

impl EngineError {
    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::ConfigValidation(msg.into())
    }
}

/// Reasons a wager is refused at placement.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WagerError {
    #[error("duplicate wager on rule {rule_id} at height {target_height}")]
    Duplicate { rule_id: RuleId, target_height: u64 },
    #[error("insufficient bankroll: need={required} have={available}")]
    InsufficientBankroll { required: Decimal, available: Decimal },
    #[error("stake must be positive, got {0}")]
    NonPositiveStake(Decimal),
    #[error("height {target_height} is not aligned to rule {rule_id}")]
    Misaligned { rule_id: RuleId, target_height: u64 },
    #[error("height {target_height} is already known (latest={latest_height})")]
    StaleTarget { target_height: u64, latest_height: u64 },
    #[error("outcome does not belong to the requested axis")]
    AxisMismatch,
}

/// First divergence found while replaying the ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    #[error("wager {id}: replayed bankroll {replayed} != recorded {recorded}")]
    BankrollMismatch {
        id: WagerId,
        replayed: Decimal,
        recorded: Decimal,
    },
    #[error("wager {0} is settled but carries no resulting bankroll")]
    MissingResult(WagerId),
    #[error("ledger event {0} is recorded twice")]
    DuplicateEvent(u64),
    #[error("replayed balance {replayed} != live balance {live}")]
    BalanceMismatch { replayed: Decimal, live: Decimal },
}
