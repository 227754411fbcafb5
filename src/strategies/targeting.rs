use crate::error::EngineError;
use crate::models::block::{Axis, Block, Outcome};
use crate::models::rule::Rule;
use crate::models::task::{RuleScope, TargetPolicy, Task};
use crate::signals::predictor::Predictor;
use crate::signals::streak::{bead_row_streaks, rule_blocks, streak};

/// Minimum predictor confidence for a single-rule AI task.
pub const AI_SINGLE_THRESHOLD: f64 = 92.0;
/// Stricter floor when scanning every rule.
pub const AI_SCAN_THRESHOLD: f64 = 94.0;

/// What a task's policy decided to bet on this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub rule_id: String,
    pub target_height: u64,
    pub outcome: Outcome,
    pub confidence: Option<f64>,
    /// Streak length behind a streak-driven pick, 0 otherwise.
    pub streak: usize,
}

/// Resolve the rule a standard (single-rule) task is bound to.
pub fn bound_rule<'a>(task: &Task, rules: &'a [Rule]) -> Result<&'a Rule, EngineError> {
    match &task.scope {
        RuleScope::Single(id) => rules
            .iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| EngineError::InvalidRuleReference(id.clone())),
        RuleScope::AllRules => Err(EngineError::config(format!(
            "task {} scans all rules but its policy is single-rule",
            task.name
        ))),
    }
}

/// Evaluate `task`'s target policy against the current window.
///
/// `blocks` is descending; `latest` is the chain head. Pending-wager checks
/// are the caller's concern.
pub fn select(
    task: &Task,
    rules: &[Rule],
    blocks: &[Block],
    latest: u64,
    predictor: &mut dyn Predictor,
) -> Result<Option<Selection>, EngineError> {
    let selection = match &task.policy {
        TargetPolicy::Fixed { outcome } => {
            let rule = bound_rule(task, rules)?;
            Some(pick(rule, latest, *outcome, None, 0))
        }
        TargetPolicy::FollowLast { axis, min_streak } => {
            let rule = bound_rule(task, rules)?;
            streak_pick(rule, blocks, *axis, *min_streak, latest, false)
        }
        TargetPolicy::ReverseLast { axis, min_streak } => {
            let rule = bound_rule(task, rules)?;
            streak_pick(rule, blocks, *axis, *min_streak, latest, true)
        }
        TargetPolicy::AiSingle => {
            let rule = bound_rule(task, rules)?;
            predictor
                .predict(blocks, rule)
                .call()
                .filter(|c| c.confidence >= AI_SINGLE_THRESHOLD)
                .map(|c| pick(rule, latest, c.outcome, Some(c.confidence), 0))
        }
        TargetPolicy::AiScan => ai_scan(rules, blocks, latest, predictor),
        TargetPolicy::DragonTrend { min_streak } => dragon_trend(rules, blocks, latest, *min_streak),
        TargetPolicy::DragonBead { min_streak } => dragon_bead(rules, blocks, latest, *min_streak),
    };
    Ok(selection)
}

fn pick(rule: &Rule, latest: u64, outcome: Outcome, confidence: Option<f64>, streak: usize) -> Selection {
    Selection {
        rule_id: rule.id.clone(),
        target_height: rule.next_aligned(latest),
        outcome,
        confidence,
        streak,
    }
}

fn streak_pick(
    rule: &Rule,
    blocks: &[Block],
    axis: Axis,
    min_streak: usize,
    latest: u64,
    reverse: bool,
) -> Option<Selection> {
    let s = streak(rule_blocks(blocks, rule), axis);
    let outcome = s.outcome?;
    if s.length < min_streak.max(1) {
        return None;
    }
    let outcome = if reverse { outcome.opposite() } else { outcome };
    Some(pick(rule, latest, outcome, None, s.length))
}

fn ai_scan(rules: &[Rule], blocks: &[Block], latest: u64, predictor: &mut dyn Predictor) -> Option<Selection> {
    let mut best: Option<Selection> = None;
    for rule in rules {
        let Some(call) = predictor.predict(blocks, rule).call() else {
            continue;
        };
        if call.confidence < AI_SCAN_THRESHOLD {
            continue;
        }
        let better = best
            .as_ref()
            .map_or(true, |b| call.confidence > b.confidence.unwrap_or(0.0));
        if better {
            best = Some(pick(rule, latest, call.outcome, Some(call.confidence), 0));
        }
    }
    best
}

/// Longest trend-road streak over every rule and axis. Earlier rules and
/// the parity axis win ties.
fn dragon_trend(rules: &[Rule], blocks: &[Block], latest: u64, min_streak: usize) -> Option<Selection> {
    let floor = min_streak.max(1);
    let mut best: Option<Selection> = None;
    for rule in rules {
        for axis in Axis::ALL {
            let s = streak(rule_blocks(blocks, rule), axis);
            let Some(outcome) = s.outcome else {
                continue;
            };
            if s.length >= floor && best.as_ref().map_or(true, |b| s.length > b.streak) {
                best = Some(pick(rule, latest, outcome, None, s.length));
            }
        }
    }
    best
}

/// Longest bead-road row streak over every rule, axis and row. The bet
/// targets the next empty cell of the winning row.
fn dragon_bead(rules: &[Rule], blocks: &[Block], latest: u64, min_streak: usize) -> Option<Selection> {
    let floor = min_streak.max(1);
    let mut best: Option<Selection> = None;
    for rule in rules {
        for axis in Axis::ALL {
            for row in bead_row_streaks(blocks, rule, axis, latest) {
                let Some(outcome) = row.streak.outcome else {
                    continue;
                };
                let length = row.streak.length;
                if length >= floor && best.as_ref().map_or(true, |b| length > b.streak) {
                    best = Some(Selection {
                        rule_id: rule.id.clone(),
                        target_height: row.next_height,
                        outcome,
                        confidence: None,
                        streak: length,
                    });
                }
            }
        }
    }
    best
}
