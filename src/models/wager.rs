use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::block::{Axis, Outcome};
use super::rule::RuleId;
use super::task::TaskId;

pub type WagerId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
}

/// Who placed a wager. Manual wagers never collide with task-owned ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WagerSource {
    Task(TaskId),
    Manual,
}

/// Duplicate-detection key: one wager per rule, height and source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WagerKey {
    pub rule_id: RuleId,
    pub target_height: u64,
    pub source: WagerSource,
}

/// A wager before the ledger accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct WagerTicket {
    pub task_id: Option<TaskId>,
    pub rule_id: RuleId,
    pub target_height: u64,
    pub predicted: Outcome,
    pub stake: Decimal,
    pub payout_multiplier: Decimal,
    pub confidence: Option<f64>,
}

impl WagerTicket {
    pub fn source(&self) -> WagerSource {
        match self.task_id {
            Some(id) => WagerSource::Task(id),
            None => WagerSource::Manual,
        }
    }

    pub fn key(&self) -> WagerKey {
        WagerKey {
            rule_id: self.rule_id.clone(),
            target_height: self.target_height,
            source: self.source(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wager {
    pub id: WagerId,
    pub task_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    pub rule_id: RuleId,
    pub target_height: u64,
    pub axis: Axis,
    pub predicted: Outcome,
    pub stake: Decimal,
    pub payout_multiplier: Decimal,
    pub status: WagerStatus,
    pub payout: Decimal,
    /// Bankroll right after this wager settled.
    pub resulting_bankroll: Option<Decimal>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Ledger event number of the placement (stake debit).
    #[serde(default)]
    pub placed_seq: u64,
    /// Ledger event number of the settlement (payout credit).
    #[serde(default)]
    pub settled_seq: Option<u64>,
}

impl Wager {
    pub fn from_ticket(id: WagerId, placed_seq: u64, ticket: WagerTicket) -> Self {
        Self {
            id,
            task_id: ticket.task_id,
            created_at: Utc::now(),
            axis: ticket.predicted.axis(),
            rule_id: ticket.rule_id,
            target_height: ticket.target_height,
            predicted: ticket.predicted,
            stake: ticket.stake,
            payout_multiplier: ticket.payout_multiplier,
            status: WagerStatus::Pending,
            payout: Decimal::ZERO,
            resulting_bankroll: None,
            confidence: ticket.confidence,
            placed_seq,
            settled_seq: None,
        }
    }

    pub fn source(&self) -> WagerSource {
        match self.task_id {
            Some(id) => WagerSource::Task(id),
            None => WagerSource::Manual,
        }
    }

    pub fn key(&self) -> WagerKey {
        WagerKey {
            rule_id: self.rule_id.clone(),
            target_height: self.target_height,
            source: self.source(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == WagerStatus::Pending
    }

    pub fn net(&self) -> Decimal {
        match self.status {
            WagerStatus::Pending => Decimal::ZERO,
            _ => self.payout - self.stake,
        }
    }
}
