use serde::{Deserialize, Serialize};

pub type RuleId = String;

/// A sampling cadence selecting a sub-sequence of block heights.
///
/// `step = 20, offset = 0` tracks heights 0, 20, 40, ...;
/// `step = 20, offset = 7` tracks 7, 27, 47, ...
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub label: String,
    pub step: u64,
    pub offset: u64,
}

impl Rule {
    pub fn new(id: impl Into<String>, label: impl Into<String>, step: u64, offset: u64) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            step,
            offset,
        }
    }

    /// Every block.
    pub fn every_block() -> Self {
        Self::new("1", "Every block", 1, 0)
    }

    pub fn is_aligned(&self, height: u64) -> bool {
        if self.step <= 1 {
            return true;
        }
        if self.offset > 0 {
            height >= self.offset && (height - self.offset) % self.step == 0
        } else {
            height % self.step == 0
        }
    }

    /// Smallest aligned height strictly greater than `height`.
    pub fn next_aligned(&self, height: u64) -> u64 {
        if self.step <= 1 {
            return height + 1;
        }
        if height < self.offset {
            return self.offset;
        }

        let slot = (height - self.offset) / self.step + 1;
        let mut candidate = self.offset + slot * self.step;
        if candidate <= height {
            candidate += self.step;
        }
        candidate
    }

    /// Position of an aligned height within the rule's sequence.
    pub fn ordinal(&self, height: u64) -> u64 {
        if self.step <= 1 {
            height
        } else {
            height.saturating_sub(self.offset) / self.step
        }
    }
}

/// Default rule set: every block plus the common 5/10/20/50/100 cadences.
pub fn default_rules() -> Vec<Rule> {
    let mut rules = vec![Rule::every_block()];
    for step in [5u64, 10, 20, 50, 100] {
        rules.push(Rule::new(step.to_string(), format!("Every {step} blocks"), step, 0));
    }
    rules
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_twenty_alignment() {
        let rule = Rule::new("20", "Every 20", 20, 0);
        for h in [0, 20, 40, 60, 1_000] {
            assert!(rule.is_aligned(h), "{h} should be aligned");
        }
        for h in [1, 19, 21, 25, 39, 41] {
            assert!(!rule.is_aligned(h), "{h} should not be aligned");
        }
        assert_eq!(rule.next_aligned(25), 40);
        assert_eq!(rule.next_aligned(20), 40);
        assert_eq!(rule.next_aligned(19), 20);
    }

    #[test]
    fn test_offset_alignment() {
        let rule = Rule::new("20+7", "Every 20 from 7", 20, 7);
        assert!(!rule.is_aligned(0));
        assert!(!rule.is_aligned(20));
        assert!(rule.is_aligned(7));
        assert!(rule.is_aligned(27));
        assert_eq!(rule.next_aligned(3), 7);
        assert_eq!(rule.next_aligned(7), 27);
        assert_eq!(rule.next_aligned(26), 27);
        assert_eq!(rule.next_aligned(27), 47);
    }

    #[test]
    fn test_step_one_aligns_everything() {
        let rule = Rule::every_block();
        assert!(rule.is_aligned(0));
        assert!(rule.is_aligned(12_345));
        assert_eq!(rule.next_aligned(99), 100);
    }

    #[test]
    fn test_next_aligned_is_monotonic_and_aligned() {
        let rules = [
            Rule::new("a", "a", 3, 0),
            Rule::new("b", "b", 7, 2),
            Rule::new("c", "c", 10, 15),
        ];
        for rule in &rules {
            let mut prev = rule.next_aligned(0);
            for h in 0..200u64 {
                let next = rule.next_aligned(h);
                assert!(next > h);
                assert!(rule.is_aligned(next));
                assert!(next >= prev);
                prev = next;
            }
        }
    }

    #[test]
    fn test_ordinal() {
        let rule = Rule::new("20+7", "x", 20, 7);
        assert_eq!(rule.ordinal(7), 0);
        assert_eq!(rule.ordinal(47), 2);
        assert_eq!(Rule::every_block().ordinal(42), 42);
    }
}
