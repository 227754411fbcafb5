use crate::models::block::{Axis, Block, Outcome};
use crate::models::rule::Rule;

/// Rows in a bead-road grid. Cells fill top to bottom, then the next column.
pub const BEAD_ROWS: u64 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streak {
    pub outcome: Option<Outcome>,
    pub length: usize,
}

impl Streak {
    pub const EMPTY: Streak = Streak {
        outcome: None,
        length: 0,
    };
}

/// Run length of the most recent outcome on `axis`.
///
/// `blocks` must be ordered most recent first. Stops at the first break.
pub fn streak<'a, I>(blocks: I, axis: Axis) -> Streak
where
    I: IntoIterator<Item = &'a Block>,
{
    let mut iter = blocks.into_iter();
    let Some(head) = iter.next() else {
        return Streak::EMPTY;
    };
    let outcome = head.outcome(axis);
    let length = 1 + iter.take_while(|b| b.outcome(axis) == outcome).count();

    Streak {
        outcome: Some(outcome),
        length,
    }
}

/// Blocks aligned to `rule`, preserving the input (descending) order.
pub fn rule_blocks<'a>(blocks: &'a [Block], rule: &'a Rule) -> impl Iterator<Item = &'a Block> + 'a {
    blocks.iter().filter(move |b| rule.is_aligned(b.height))
}

/// Bead-road row a given aligned height lands on.
pub fn bead_row(rule: &Rule, height: u64) -> u64 {
    rule.ordinal(height) % BEAD_ROWS
}

/// Next aligned height after `latest` that lands on `row`.
pub fn next_in_row(rule: &Rule, latest: u64, row: u64) -> u64 {
    let mut h = rule.next_aligned(latest);
    for _ in 0..BEAD_ROWS {
        if bead_row(rule, h) == row {
            break;
        }
        h = rule.next_aligned(h);
    }
    h
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowStreak {
    pub row: u64,
    pub streak: Streak,
    /// Next empty cell of this row.
    pub next_height: u64,
}

/// Current streak of every bead-road row of `rule` on `axis`.
pub fn bead_row_streaks(blocks: &[Block], rule: &Rule, axis: Axis, latest: u64) -> Vec<RowStreak> {
    (0..BEAD_ROWS)
        .map(|row| {
            let cells = rule_blocks(blocks, rule).filter(|b| bead_row(rule, b.height) == row);
            RowStreak {
                row,
                streak: streak(cells, axis),
                next_height: next_in_row(rule, latest, row),
            }
        })
        .collect()
}
