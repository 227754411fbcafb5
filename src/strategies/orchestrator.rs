use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::engine::EngineState;
use crate::error::WagerError;
use crate::execution::ledger::Settlement;
use crate::models::block::{Block, Outcome};
use crate::models::rule::RuleId;
use crate::models::task::{Strategy, Task, TaskId};
use crate::models::wager::{WagerId, WagerSource, WagerTicket};
use crate::risk::progression;
use crate::risk::risk_manager::{RiskAction, RiskManager, StopTrigger};
use crate::risk::sizing::Sizing;
use crate::signals::predictor::Predictor;
use crate::strategies::targeting::{bound_rule, select, Selection};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StatusReason {
    Bankrupt { required: Decimal, available: Decimal },
    Stop(StopTrigger),
}

/// A task switched from active to paused by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusChange {
    pub task_id: TaskId,
    pub task_name: String,
    pub reason: StatusReason,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedTask {
    pub task_id: TaskId,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Placement {
    pub wager_id: WagerId,
    pub task_id: TaskId,
    pub task_name: String,
    pub rule_id: RuleId,
    pub target_height: u64,
    pub outcome: Outcome,
    pub stake: Decimal,
    pub confidence: Option<f64>,
}

/// Everything one settlement + placement cycle did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub latest_height: Option<u64>,
    pub settlements: Vec<Settlement>,
    pub placements: Vec<Placement>,
    pub status_changes: Vec<StatusChange>,
    pub skipped: Vec<SkippedTask>,
    pub stop: Option<StopTrigger>,
    pub balance: Decimal,
    pub drawdown: Decimal,
}

impl CycleReport {
    /// Nothing settled, placed or changed state.
    pub fn is_quiet(&self) -> bool {
        self.settlements.is_empty() && self.placements.is_empty() && self.status_changes.is_empty()
    }

    /// Net result of this cycle's settlements.
    pub fn settled_net(&self) -> Decimal {
        self.settlements.iter().map(Settlement::net).sum()
    }
}

/// Run one engine cycle over the current window (`blocks`, descending).
///
/// Settles every resolvable wager, advances the owning tasks' progressions,
/// applies the global stop guard, then lets each active task place at most
/// one wager. Takes the state by value and hands back the next one, so a
/// caller can publish the result in a single step.
pub fn process_cycle(
    mut state: EngineState,
    blocks: &[Block],
    predictor: &mut dyn Predictor,
) -> (EngineState, CycleReport) {
    let mut report = CycleReport {
        latest_height: blocks.iter().map(|b| b.height).max(),
        ..CycleReport::default()
    };

    // 1. settlement
    let settlements = state.ledger.settle_window(blocks, &mut state.bankroll);
    for s in &settlements {
        apply_settlement(&mut state.tasks, s);
    }
    report.settlements = settlements;

    // 2-3. drawdown and the global stop
    let risk = RiskManager::new(&state.config);
    if let RiskAction::Halt(trigger) = risk.periodic_check(&mut state.bankroll) {
        for task in state.tasks.iter_mut().filter(|t| t.is_active) {
            task.is_active = false;
            report.status_changes.push(StatusChange {
                task_id: task.id,
                task_name: task.name.clone(),
                reason: StatusReason::Stop(trigger),
            });
        }
        report.stop = Some(trigger);
        return finish(state, report);
    }

    // 4. placement
    let Some(latest) = report.latest_height else {
        return finish(state, report);
    };
    let sizing_balance = state.bankroll.balance;

    for task in state.tasks.iter_mut().filter(|t| t.is_active) {
        let source = WagerSource::Task(task.id);

        if task.policy.is_scan() {
            if state.ledger.has_pending_for(source) {
                continue;
            }
        } else {
            match bound_rule(task, &state.config.rules) {
                Ok(rule) => {
                    if state.ledger.has_pending(&rule.id, rule.next_aligned(latest), source) {
                        continue;
                    }
                }
                Err(e) => {
                    debug!("Task {} skipped: {e}", task.name);
                    report.skipped.push(SkippedTask {
                        task_id: task.id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            }
        }

        let selection = match select(task, &state.config.rules, blocks, latest, predictor) {
            Ok(Some(s)) => s,
            Ok(None) => continue,
            Err(e) => {
                debug!("Task {} skipped: {e}", task.name);
                report.skipped.push(SkippedTask {
                    task_id: task.id,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let stake = stake_for(
            task,
            &selection,
            sizing_balance,
            state.bankroll.balance,
            state.config.payout_odds,
        );

        if let Err(e) = risk.check_stake(&state.bankroll, stake) {
            match e {
                WagerError::InsufficientBankroll { required, available } => {
                    warn!(
                        "Task {} bankrupt: stake={required} balance={available}, deactivating",
                        task.name
                    );
                    task.is_active = false;
                    report.status_changes.push(StatusChange {
                        task_id: task.id,
                        task_name: task.name.clone(),
                        reason: StatusReason::Bankrupt { required, available },
                    });
                }
                other => report.skipped.push(SkippedTask {
                    task_id: task.id,
                    reason: other.to_string(),
                }),
            }
            continue;
        }

        let ticket = WagerTicket {
            task_id: Some(task.id),
            rule_id: selection.rule_id.clone(),
            target_height: selection.target_height,
            predicted: selection.outcome,
            stake,
            payout_multiplier: state.config.payout_odds,
            confidence: selection.confidence,
        };

        match state.ledger.place(ticket, &mut state.bankroll, &risk) {
            Ok(wager_id) => {
                info!(
                    "Task {} [{}] bets {} on rule {} height {} stake={}{}",
                    task.name,
                    task.strategy.label(),
                    selection.outcome,
                    selection.rule_id,
                    selection.target_height,
                    stake,
                    selection
                        .confidence
                        .map(|c| format!(" conf={c:.0}%"))
                        .unwrap_or_default(),
                );
                report.placements.push(Placement {
                    wager_id,
                    task_id: task.id,
                    task_name: task.name.clone(),
                    rule_id: selection.rule_id,
                    target_height: selection.target_height,
                    outcome: selection.outcome,
                    stake,
                    confidence: selection.confidence,
                });
            }
            Err(WagerError::Duplicate { .. }) => {
                debug!("Task {} already holds that wager", task.name);
            }
            Err(e) => report.skipped.push(SkippedTask {
                task_id: task.id,
                reason: e.to_string(),
            }),
        }
    }

    finish(state, report)
}

/// Close the cycle. Placements moved the balance after the pre-placement
/// stop check, so the high-water mark is brought up to date before commit.
fn finish(mut state: EngineState, mut report: CycleReport) -> (EngineState, CycleReport) {
    report.drawdown = state.bankroll.mark_drawdown();
    report.balance = state.bankroll.balance;
    if !report.is_quiet() {
        info!(
            "Cycle @{}: settled={} (net {}) placed={} paused={} balance={} drawdown={}",
            report.latest_height.map(|h| h.to_string()).unwrap_or_else(|| "-".into()),
            report.settlements.len(),
            report.settled_net(),
            report.placements.len(),
            report.status_changes.len(),
            report.balance,
            report.drawdown,
        );
    }
    (state, report)
}

/// Advance the owning task's progression and stats. Wagers of deleted tasks
/// settle without touching any task.
fn apply_settlement(tasks: &mut [Task], s: &Settlement) {
    let Some(task_id) = s.task_id else {
        return;
    };
    let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) else {
        debug!("Wager #{} belongs to a deleted task", s.wager_id);
        return;
    };
    task.stake_state = progression::advance(&task.stake_state, &task.strategy, task.base_stake, s.won);
    task.stats.record(s.won, s.stake, s.payout);
}

/// Kelly stakes are sized off the post-settlement balance shared by every
/// task this cycle, then capped at what sibling placements have left.
fn stake_for(
    task: &Task,
    selection: &Selection,
    sizing_balance: Decimal,
    available: Decimal,
    odds: Decimal,
) -> Decimal {
    match &task.strategy {
        Strategy::Kelly { risk_fraction } => {
            let stake = Sizing::kelly_stake(
                sizing_balance,
                selection.confidence.unwrap_or(0.0),
                odds,
                *risk_fraction,
                task.base_stake,
            );
            let cap = available.floor();
            if cap > Decimal::ZERO {
                stake.min(cap)
            } else {
                stake
            }
        }
        _ => task.stake_state.stake_amount,
    }
}
