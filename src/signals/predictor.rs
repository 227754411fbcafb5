use rand::{Rng, RngCore};
use statrs::distribution::{Binomial, DiscreteCDF};
use tracing::debug;

use crate::models::block::{Axis, Block, Outcome};
use crate::models::rule::Rule;
use crate::signals::streak::rule_blocks;

/// Most recent rule-aligned blocks considered.
pub const MAX_WINDOW: usize = 80;
/// Fewer aligned blocks than this never produce a signal.
pub const MIN_SAMPLES: usize = 24;
/// Length of the per-axis symbol string the pattern tests run on.
pub const RECENT_LEN: usize = 12;

const CONF_PERIOD_2: f64 = 95.0;
const CONF_PERIOD_4: f64 = 93.0;
const CONF_RUN: f64 = 91.0;
const RUN_MIN: usize = 4;
const BIAS_CAP_CONFIRMED: f64 = 94.0;
const BIAS_CAP: f64 = 88.0;
const BIAS_MIN_DEVIATION: f64 = 0.12;
const DAMPER_FLOOR: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCall {
    pub outcome: Outcome,
    /// 0-100
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Prediction {
    pub should_predict: bool,
    pub parity: Option<AxisCall>,
    pub size: Option<AxisCall>,
}

impl Prediction {
    pub fn none() -> Self {
        Self::default()
    }

    /// The surviving call, if the predictor chose to speak.
    pub fn call(&self) -> Option<AxisCall> {
        if !self.should_predict {
            return None;
        }
        self.parity.or(self.size)
    }
}

/// Pattern detector consumed by AI-driven tasks.
pub trait Predictor {
    fn predict(&mut self, blocks: &[Block], rule: &Rule) -> Prediction;
}

/// Toy periodicity / run-density / bias detector with a random damper.
///
/// Output is not repeatable for identical input; inject a seeded or mock
/// `RngCore` when determinism matters.
pub struct HeuristicPredictor<R: RngCore> {
    rng: R,
}

impl<R: RngCore> HeuristicPredictor<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl HeuristicPredictor<rand::rngs::StdRng> {
    pub fn from_entropy() -> Self {
        use rand::SeedableRng;
        Self::new(rand::rngs::StdRng::from_entropy())
    }
}

impl<R: RngCore> Predictor for HeuristicPredictor<R> {
    fn predict(&mut self, blocks: &[Block], rule: &Rule) -> Prediction {
        let window: Vec<&Block> = rule_blocks(blocks, rule).take(MAX_WINDOW).collect();
        if window.len() < MIN_SAMPLES {
            return Prediction::none();
        }

        let (parity, size) = match (analyze_axis(&window, Axis::Parity), analyze_axis(&window, Axis::Size)) {
            (Some(a), Some(b)) if b.confidence > a.confidence => (None, Some(b)),
            (Some(a), Some(_)) => (Some(a), None),
            other => other,
        };

        let Some(call) = parity.or(size) else {
            return Prediction::none();
        };

        let suppress_prob = DAMPER_FLOOR + (100.0 - call.confidence) / 100.0;
        let draw: f64 = self.rng.gen();
        let should_predict = draw >= suppress_prob;
        if !should_predict {
            debug!(
                "Predictor damped: rule={} {} @ {:.0}% (draw={:.3} < {:.3})",
                rule.id, call.outcome, call.confidence, draw, suppress_prob
            );
        }

        Prediction {
            should_predict,
            parity,
            size,
        }
    }
}

/// Road symbols for `axis`, oldest first.
pub fn road_string(window: &[&Block], axis: Axis) -> String {
    window.iter().rev().map(|b| b.outcome(axis).symbol()).collect()
}

fn analyze_axis(window: &[&Block], axis: Axis) -> Option<AxisCall> {
    let recent: Vec<Outcome> = window
        .iter()
        .take(RECENT_LEN)
        .rev()
        .map(|b| b.outcome(axis))
        .collect();

    period_two(&recent)
        .or_else(|| period_four(&recent))
        .or_else(|| run_density(&recent))
        .or_else(|| bias(window, &recent, axis))
}

/// Last six strictly alternate: bet the alternation continues.
fn period_two(recent: &[Outcome]) -> Option<AxisCall> {
    let tail = recent.get(recent.len().checked_sub(6)?..)?;
    if tail.windows(2).all(|w| w[0] != w[1]) {
        let last = *tail.last()?;
        return Some(AxisCall {
            outcome: last.opposite(),
            confidence: CONF_PERIOD_2,
        });
    }
    None
}

/// Last eight read `xxyy xxyy`: bet the next `x`.
fn period_four(recent: &[Outcome]) -> Option<AxisCall> {
    let tail = recent.get(recent.len().checked_sub(8)?..)?;
    let (x, y) = (tail[0], tail[2]);
    let pattern = [x, x, y, y, x, x, y, y];
    if x != y && tail == pattern {
        return Some(AxisCall {
            outcome: x,
            confidence: CONF_PERIOD_4,
        });
    }
    None
}

/// Four or more identical at the head: follow the dragon.
fn run_density(recent: &[Outcome]) -> Option<AxisCall> {
    let last = *recent.last()?;
    let run = recent.iter().rev().take_while(|o| **o == last).count();
    (run >= RUN_MIN).then_some(AxisCall {
        outcome: last,
        confidence: CONF_RUN,
    })
}

/// Window-wide imbalance: bet the minority side catches up.
fn bias(window: &[&Block], recent: &[Outcome], axis: Axis) -> Option<AxisCall> {
    let reference = match axis {
        Axis::Parity => Outcome::Odd,
        Axis::Size => Outcome::Big,
    };
    let n = window.len() as u64;
    let hits = window.iter().filter(|b| b.outcome(axis) == reference).count() as u64;
    let share = hits as f64 / n as f64;
    if (share - 0.5).abs() < BIAS_MIN_DEVIATION {
        return None;
    }

    let majority = if share > 0.5 { reference } else { reference.opposite() };
    let majority_hits = hits.max(n - hits);

    // Two-sided tail probability of a split at least this lopsided.
    let binomial = Binomial::new(0.5, n).ok()?;
    let tail = binomial.sf(majority_hits.saturating_sub(1));
    let p_value = (2.0 * tail).min(1.0);

    let recent_majority = recent.iter().filter(|o| **o == majority).count() * 2 > recent.len();
    let cap = if recent_majority { BIAS_CAP_CONFIRMED } else { BIAS_CAP };

    Some(AxisCall {
        outcome: majority.opposite(),
        confidence: (50.0 + 50.0 * (1.0 - p_value)).min(cap),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::streak::test_support::run;
    use rand::rngs::mock::StepRng;

    fn never_damped() -> HeuristicPredictor<StepRng> {
        HeuristicPredictor::new(StepRng::new(u64::MAX, 0))
    }

    fn always_damped() -> HeuristicPredictor<StepRng> {
        HeuristicPredictor::new(StepRng::new(0, 0))
    }

    fn tail(digits: &[u8]) -> Vec<u8> {
        // 20 blocks of balanced filler (even/small, odd/big) then `digits`.
        let mut out: Vec<u8> = (0..20).map(|i| if i % 2 == 0 { 2 } else { 7 }).collect();
        out.extend_from_slice(digits);
        out
    }

    #[test]
    fn test_requires_min_samples() {
        let window = run(22, &[1; 23]);
        let p = never_damped().predict(&window, &Rule::every_block());
        assert_eq!(p, Prediction::none());
    }

    #[test]
    fn test_only_aligned_blocks_count() {
        // 60 consecutive blocks but only 3 aligned to step 20
        let window = run(59, &[1; 60]);
        let p = never_damped().predict(&window, &Rule::new("20", "x", 20, 0));
        assert!(!p.should_predict);
    }

    #[test]
    fn test_period_two_alternation() {
        // 2 7 2 7 2 7: parity alternates and ends ODD, so EVEN is next
        // size also alternates (2 small, 7 big); equal confidence keeps parity
        let window = run(99, &tail(&[2, 7, 2, 7, 2, 7]));
        let p = never_damped().predict(&window, &Rule::every_block());
        assert!(p.should_predict);
        let call = p.call().unwrap();
        assert_eq!(call.outcome, Outcome::Even);
        assert_eq!(call.confidence, 95.0);
        assert!(p.size.is_none(), "only one axis survives");
    }

    #[test]
    fn test_run_density_follows_dragon() {
        // last five are 1 (odd, small); size run also qualifies but parity wins the tie
        let window = run(99, &tail(&[6, 8, 1, 1, 1, 1, 1]));
        let p = never_damped().predict(&window, &Rule::every_block());
        let call = p.call().unwrap();
        assert_eq!(call.outcome, Outcome::Odd);
        assert_eq!(call.confidence, 91.0);
    }

    #[test]
    fn test_higher_confidence_axis_wins() {
        // parity: 3 3 4 4 3 3 4 4 -> period four (93)
        // size: all small -> run density (91)
        let window = run(99, &tail(&[3, 3, 4, 4, 3, 3, 4, 4]));
        let p = never_damped().predict(&window, &Rule::every_block());
        assert!(p.size.is_none());
        let call = p.parity.unwrap();
        assert_eq!(call.outcome, Outcome::Odd);
        assert_eq!(call.confidence, 93.0);
    }

    #[test]
    fn test_damper_suppresses() {
        let window = run(99, &tail(&[2, 7, 2, 7, 2, 7]));
        let p = always_damped().predict(&window, &Rule::every_block());
        assert!(!p.should_predict);
        assert!(p.call().is_none());
        assert!(p.parity.is_some());
    }

    #[test]
    fn test_bias_bets_minority() {
        // 40 blocks, 30 even; recent tail broken up so no pattern fires
        let mut digits = vec![0u8; 28];
        digits.extend_from_slice(&[1, 0, 3, 3, 0, 1, 1, 0, 0, 3, 3, 0]);
        let window = run(39, &digits);
        let refs: Vec<&Block> = window.iter().collect();
        let call = bias(&refs, &[], Axis::Parity).unwrap();
        assert_eq!(call.outcome, Outcome::Odd);
        assert!(call.confidence > 50.0 && call.confidence <= BIAS_CAP);
    }

    #[test]
    fn test_road_string_oldest_first() {
        let window = run(3, &[1, 2, 7, 8]);
        let refs: Vec<&Block> = window.iter().collect();
        assert_eq!(road_string(&refs, Axis::Parity), "OEOE");
        assert_eq!(road_string(&refs, Axis::Size), "SSBB");
    }
}
