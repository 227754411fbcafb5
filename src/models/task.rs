use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::block::{Axis, Outcome};
use super::rule::RuleId;

pub type TaskId = Uuid;

/// Stake-sizing progression, one variant per strategy kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    Flat,
    Martingale { multiplier: Decimal, max_cycle: u32 },
    DAlembert { step: Decimal },
    Fibonacci,
    Paroli,
    OneThreeTwoSix,
    /// Multipliers of the base stake, walked forward on every loss.
    Custom { sequence: Vec<Decimal> },
    /// Fractional Kelly sized at placement time from the predictor's confidence.
    Kelly { risk_fraction: f64 },
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Flat => "flat",
            Strategy::Martingale { .. } => "martingale",
            Strategy::DAlembert { .. } => "dalembert",
            Strategy::Fibonacci => "fibonacci",
            Strategy::Paroli => "paroli",
            Strategy::OneThreeTwoSix => "1-3-2-6",
            Strategy::Custom { .. } => "custom",
            Strategy::Kelly { .. } => "kelly",
        }
    }
}

/// How a task picks what to bet on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetPolicy {
    /// Always bet the same outcome.
    Fixed { outcome: Outcome },
    /// Bet with the current streak once it is long enough.
    FollowLast { axis: Axis, min_streak: usize },
    /// Bet against the current streak once it is long enough.
    ReverseLast { axis: Axis, min_streak: usize },
    /// Heuristic predictor on the task's own rule.
    AiSingle,
    /// Heuristic predictor across every rule; best candidate wins.
    AiScan,
    /// Longest trend-road streak across every rule.
    DragonTrend { min_streak: usize },
    /// Longest bead-road row streak across every rule.
    DragonBead { min_streak: usize },
}

impl TargetPolicy {
    /// Scan policies search all rules and hold at most one pending wager.
    pub fn is_scan(&self) -> bool {
        matches!(
            self,
            TargetPolicy::AiScan | TargetPolicy::DragonTrend { .. } | TargetPolicy::DragonBead { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Single(RuleId),
    AllRules,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeState {
    pub stake_amount: Decimal,
    pub consecutive_losses: u32,
    pub sequence_index: usize,
}

/// Running per-task statistics. Every field defaults so that older
/// snapshots without newer fields still load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskStats {
    pub wins: u64,
    pub losses: u64,
    pub profit: Decimal,
    pub peak_profit: Decimal,
    pub max_drawdown: Decimal,
    pub total_staked: Decimal,
}

impl TaskStats {
    pub fn record(&mut self, won: bool, stake: Decimal, payout: Decimal) {
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.profit += payout - stake;
        self.total_staked += stake;
        if self.profit > self.peak_profit {
            self.peak_profit = self.profit;
        }
        let drawdown = self.current_drawdown();
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
        }
    }

    pub fn current_drawdown(&self) -> Decimal {
        self.peak_profit - self.profit
    }

    pub fn win_rate(&self) -> f64 {
        let total = self.wins + self.losses;
        if total == 0 {
            return 0.0;
        }
        self.wins as f64 / total as f64
    }
}

/// Operator-supplied task definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub name: String,
    pub scope: RuleScope,
    pub strategy: Strategy,
    pub policy: TargetPolicy,
    /// Falls back to the engine's configured base stake.
    #[serde(default)]
    pub base_stake: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub scope: RuleScope,
    pub strategy: Strategy,
    pub policy: TargetPolicy,
    pub base_stake: Decimal,
    pub stake_state: StakeState,
    pub is_active: bool,
    #[serde(default)]
    pub stats: TaskStats,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// New tasks start paused.
    pub fn new(spec: TaskSpec, base_stake: Decimal, stake_state: StakeState) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: spec.name,
            scope: spec.scope,
            strategy: spec.strategy,
            policy: spec.policy,
            base_stake,
            stake_state,
            is_active: false,
            stats: TaskStats::default(),
            created_at: Utc::now(),
        }
    }

    pub fn rule_id(&self) -> Option<&RuleId> {
        match &self.scope {
            RuleScope::Single(id) => Some(id),
            RuleScope::AllRules => None,
        }
    }
}
