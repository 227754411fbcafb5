use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::config::{validate_rule, EngineConfig};
use crate::error::{AuditError, EngineError};
use crate::execution::ledger::WagerLedger;
use crate::execution::manual::{self, ManualWager};
use crate::models::bankroll::Bankroll;
use crate::models::block::Block;
use crate::models::rule::Rule;
use crate::models::task::{RuleScope, Task, TaskId, TaskSpec};
use crate::models::wager::WagerId;
use crate::risk::progression;
use crate::signals::predictor::Predictor;
use crate::strategies::orchestrator::{process_cycle, CycleReport};

/// Partial update of the global risk settings. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskAdjustment {
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub payout_odds: Option<Decimal>,
    pub base_stake: Option<Decimal>,
}

/// The whole mutable engine: bankroll, ledger, tasks and their config.
/// This is also the persisted layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub config: EngineConfig,
    pub bankroll: Bankroll,
    pub ledger: WagerLedger,
    pub tasks: Vec<Task>,
}

impl EngineState {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            bankroll: Bankroll::new(config.initial_balance),
            ledger: WagerLedger::new(),
            tasks: Vec::new(),
            config,
        })
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task, EngineError> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(EngineError::UnknownTask(id))
    }

    /// Validate and add a task. New tasks start paused.
    pub fn create_task(&mut self, spec: TaskSpec) -> Result<TaskId, EngineError> {
        let base = spec.base_stake.unwrap_or(self.config.base_stake);
        progression::validate(&spec.strategy, base)?;

        match (&spec.scope, spec.policy.is_scan()) {
            (RuleScope::Single(id), false) => {
                if self.config.rule(id).is_none() {
                    return Err(EngineError::InvalidRuleReference(id.clone()));
                }
            }
            (RuleScope::AllRules, true) => {}
            (RuleScope::Single(_), true) => {
                return Err(EngineError::config("scan policies must scope all rules"));
            }
            (RuleScope::AllRules, false) => {
                return Err(EngineError::config("single-rule policies need a rule id"));
            }
        }

        let initial = progression::initial_state(&spec.strategy, base);
        let task = Task::new(spec, base, initial);
        let id = task.id;
        info!(
            "Task created: {} [{}] base={} id={id}",
            task.name,
            task.strategy.label(),
            task.base_stake
        );
        self.tasks.push(task);
        Ok(id)
    }

    /// Flip a task between paused and active. Returns the new state.
    pub fn toggle_task(&mut self, id: TaskId) -> Result<bool, EngineError> {
        let task = self.task_mut(id)?;
        task.is_active = !task.is_active;
        info!(
            "Task {} {}",
            task.name,
            if task.is_active { "activated" } else { "paused" }
        );
        Ok(task.is_active)
    }

    /// Remove a task. Its wagers stay in the ledger and still settle.
    pub fn delete_task(&mut self, id: TaskId) -> Result<Task, EngineError> {
        let pos = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(EngineError::UnknownTask(id))?;
        let task = self.tasks.remove(pos);
        info!("Task deleted: {}", task.name);
        Ok(task)
    }

    pub fn adjust_risk(&mut self, adj: RiskAdjustment) -> Result<(), EngineError> {
        let mut next = self.config.clone();
        if let Some(v) = adj.stop_loss {
            next.stop_loss = v;
        }
        if let Some(v) = adj.take_profit {
            next.take_profit = v;
        }
        if let Some(v) = adj.payout_odds {
            next.payout_odds = v;
        }
        if let Some(v) = adj.base_stake {
            next.base_stake = v;
        }
        next.validate()?;

        info!(
            "Risk config: stop_loss={} take_profit={} odds={} base_stake={}",
            next.stop_loss, next.take_profit, next.payout_odds, next.base_stake
        );
        self.config = next;
        Ok(())
    }

    pub fn add_rule(&mut self, rule: Rule) -> Result<(), EngineError> {
        validate_rule(&rule)?;
        if self.config.rule(&rule.id).is_some() {
            return Err(EngineError::config(format!("duplicate rule id {}", rule.id)));
        }
        info!("Rule added: {} (step={} offset={})", rule.id, rule.step, rule.offset);
        self.config.rules.push(rule);
        Ok(())
    }

    /// Tasks still bound to a removed rule stay as they are and skip every
    /// cycle until the rule is re-added or the task is deleted.
    pub fn remove_rule(&mut self, id: &str) -> Result<Rule, EngineError> {
        let pos = self
            .config
            .rules
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| EngineError::InvalidRuleReference(id.to_string()))?;
        let rule = self.config.rules.remove(pos);
        info!("Rule removed: {}", rule.id);
        Ok(rule)
    }

    /// Back to a fresh bankroll with no wagers and no tasks. The config,
    /// including rules, is kept.
    pub fn reset_all(&mut self) {
        self.bankroll = Bankroll::new(self.config.initial_balance);
        self.ledger = WagerLedger::new();
        self.tasks.clear();
        info!("Engine reset: balance={}", self.bankroll.balance);
    }

    pub fn try_place_manual(
        &mut self,
        latest_height: Option<u64>,
        request: ManualWager,
    ) -> Result<WagerId, EngineError> {
        manual::try_place_manual(
            &mut self.ledger,
            &mut self.bankroll,
            &self.config,
            latest_height,
            request,
        )
    }

    pub fn place_manual(&mut self, latest_height: Option<u64>, request: ManualWager) -> bool {
        manual::place_manual(
            &mut self.ledger,
            &mut self.bankroll,
            &self.config,
            latest_height,
            request,
        )
    }

    /// Replay the ledger and check it lands on the live balance.
    pub fn audit(&self) -> Result<Decimal, AuditError> {
        let replayed = self.ledger.audit(self.bankroll.initial_balance)?;
        if replayed != self.bankroll.balance {
            return Err(AuditError::BalanceMismatch {
                replayed,
                live: self.bankroll.balance,
            });
        }
        Ok(replayed)
    }

    pub fn active_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_active).count()
    }
}

/// Shared handle over the engine state.
///
/// A cycle runs on a private copy and is published with one write, so
/// readers only ever see whole cycles. Writers are serialized so a command
/// issued mid-cycle is never lost.
#[derive(Clone)]
pub struct Engine {
    state: Arc<RwLock<EngineState>>,
    writer: Arc<Mutex<()>>,
}

impl Engine {
    pub fn new(state: EngineState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub async fn snapshot(&self) -> EngineState {
        self.state.read().await.clone()
    }

    pub async fn read<T>(&self, f: impl FnOnce(&EngineState) -> T) -> T {
        f(&*self.state.read().await)
    }

    /// Apply an operator command atomically.
    pub async fn update<T>(&self, f: impl FnOnce(&mut EngineState) -> T) -> T {
        let _writer = self.writer.lock().await;
        f(&mut *self.state.write().await)
    }

    pub async fn run_cycle(&self, blocks: &[Block], predictor: &mut (dyn Predictor + Send)) -> CycleReport {
        let _writer = self.writer.lock().await;
        let current = self.state.read().await.clone();
        let (next, report) = process_cycle(current, blocks, predictor);
        *self.state.write().await = next;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::block::{Axis, Outcome};
    use crate::models::task::{Strategy, TargetPolicy};
    use rust_decimal_macros::dec;

    fn spec(scope: RuleScope, policy: TargetPolicy) -> TaskSpec {
        TaskSpec {
            name: "t".into(),
            scope,
            strategy: Strategy::Flat,
            policy,
            base_stake: Some(dec!(100)),
        }
    }

    #[test]
    fn test_create_task_validates() {
        let mut state = EngineState::new(EngineConfig::default()).unwrap();
        let fixed = TargetPolicy::Fixed { outcome: Outcome::Odd };

        let id = state.create_task(spec(RuleScope::Single("20".into()), fixed.clone())).unwrap();
        assert!(!state.task(id).unwrap().is_active);

        assert!(matches!(
            state.create_task(spec(RuleScope::Single("7".into()), fixed.clone())),
            Err(EngineError::InvalidRuleReference(_))
        ));
        assert!(state.create_task(spec(RuleScope::AllRules, fixed)).is_err());
        assert!(state
            .create_task(spec(RuleScope::Single("20".into()), TargetPolicy::AiScan))
            .is_err());

        let mut bad = spec(RuleScope::Single("1".into()), TargetPolicy::AiSingle);
        bad.base_stake = Some(dec!(0));
        assert!(matches!(state.create_task(bad), Err(EngineError::ConfigValidation(_))));
        assert_eq!(state.tasks.len(), 1);
    }

    #[test]
    fn test_toggle_and_delete() {
        let mut state = EngineState::new(EngineConfig::default()).unwrap();
        let id = state
            .create_task(spec(RuleScope::AllRules, TargetPolicy::DragonTrend { min_streak: 4 }))
            .unwrap();
        assert!(state.toggle_task(id).unwrap());
        assert!(!state.toggle_task(id).unwrap());
        state.delete_task(id).unwrap();
        assert!(matches!(state.toggle_task(id), Err(EngineError::UnknownTask(_))));
    }

    #[test]
    fn test_adjust_risk_is_all_or_nothing() {
        let mut state = EngineState::new(EngineConfig::default()).unwrap();
        state
            .adjust_risk(RiskAdjustment {
                stop_loss: Some(dec!(500)),
                ..RiskAdjustment::default()
            })
            .unwrap();
        assert_eq!(state.config.stop_loss, dec!(500));

        let res = state.adjust_risk(RiskAdjustment {
            take_profit: Some(dec!(1000)),
            payout_odds: Some(dec!(0)),
            ..RiskAdjustment::default()
        });
        assert!(res.is_err());
        assert_eq!(state.config.take_profit, dec!(0));
        assert_eq!(state.config.payout_odds, dec!(1.98));
    }

    #[test]
    fn test_adjusted_base_stake_applies_to_new_tasks() {
        let mut state = EngineState::new(EngineConfig::default()).unwrap();
        let fixed = TargetPolicy::Fixed { outcome: Outcome::Odd };
        let before = state
            .create_task(TaskSpec {
                base_stake: None,
                ..spec(RuleScope::Single("1".into()), fixed.clone())
            })
            .unwrap();

        state
            .adjust_risk(RiskAdjustment {
                base_stake: Some(dec!(40)),
                ..RiskAdjustment::default()
            })
            .unwrap();
        let inherited = state
            .create_task(TaskSpec {
                base_stake: None,
                ..spec(RuleScope::Single("1".into()), fixed.clone())
            })
            .unwrap();
        let explicit = state.create_task(spec(RuleScope::Single("1".into()), fixed)).unwrap();

        assert_eq!(state.task(before).unwrap().base_stake, dec!(100));
        let task = state.task(inherited).unwrap();
        assert_eq!(task.base_stake, dec!(40));
        assert_eq!(task.stake_state.stake_amount, dec!(40));
        assert_eq!(state.task(explicit).unwrap().base_stake, dec!(100));
    }

    #[test]
    fn test_rules_add_and_remove() {
        let mut state = EngineState::new(EngineConfig::default()).unwrap();
        state.add_rule(Rule::new("20+7", "Every 20 from 7", 20, 7)).unwrap();
        assert!(state.add_rule(Rule::new("20+7", "dup", 20, 7)).is_err());
        assert!(state.add_rule(Rule::new("z", "zero", 0, 0)).is_err());
        assert_eq!(state.remove_rule("20+7").unwrap().offset, 7);
        assert!(matches!(state.remove_rule("20+7"), Err(EngineError::InvalidRuleReference(_))));
    }

    #[test]
    fn test_reset_all() {
        let mut state = EngineState::new(EngineConfig::default()).unwrap();
        state
            .create_task(spec(RuleScope::Single("1".into()), TargetPolicy::AiSingle))
            .unwrap();
        let placed = state.place_manual(
            Some(10),
            ManualWager {
                rule_id: "1".into(),
                target_height: 11,
                axis: Axis::Parity,
                outcome: Outcome::Even,
                stake: dec!(250),
            },
        );
        assert!(placed);
        assert_eq!(state.bankroll.balance, dec!(9750));
        assert_eq!(state.audit(), Ok(dec!(9750)));

        state.reset_all();
        assert_eq!(state.bankroll, Bankroll::new(dec!(10000)));
        assert!(state.ledger.is_empty());
        assert!(state.tasks.is_empty());
        assert_eq!(state.config.rules.len(), 6);
    }

    #[tokio::test]
    async fn test_engine_handle_commits_cycles() {
        use crate::signals::predictor::Prediction;
        use crate::signals::streak::test_support::run;

        struct Silent;
        impl Predictor for Silent {
            fn predict(&mut self, _: &[Block], _: &Rule) -> Prediction {
                Prediction::none()
            }
        }

        let engine = Engine::new(EngineState::new(EngineConfig::default()).unwrap());
        let id = engine
            .update(|s| {
                s.create_task(spec(
                    RuleScope::Single("1".into()),
                    TargetPolicy::Fixed { outcome: Outcome::Odd },
                ))
            })
            .await
            .unwrap();
        engine.update(|s| s.toggle_task(id)).await.unwrap();

        let report = engine.run_cycle(&run(10, &[1; 11]), &mut Silent).await;
        assert_eq!(report.placements.len(), 1);
        assert_eq!(engine.read(|s| s.bankroll.balance).await, dec!(9900));

        let report = engine.run_cycle(&run(11, &[1; 12]), &mut Silent).await;
        assert_eq!(report.settlements.len(), 1);
        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.task(id).unwrap().stats.wins, 1);
        assert!(snapshot.audit().is_ok());
    }
}
