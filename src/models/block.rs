use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the two independent classifications derived from a block hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Axis A: ODD / EVEN
    Parity,
    /// Axis B: BIG / SMALL
    Size,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::Parity, Axis::Size];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Odd,
    Even,
    Big,
    Small,
}

impl Outcome {
    pub fn axis(&self) -> Axis {
        match self {
            Outcome::Odd | Outcome::Even => Axis::Parity,
            Outcome::Big | Outcome::Small => Axis::Size,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Outcome::Odd => Outcome::Even,
            Outcome::Even => Outcome::Odd,
            Outcome::Big => Outcome::Small,
            Outcome::Small => Outcome::Big,
        }
    }

    /// Single-letter road symbol, as drawn in a bead cell.
    pub fn symbol(&self) -> char {
        match self {
            Outcome::Odd => 'O',
            Outcome::Even => 'E',
            Outcome::Big => 'B',
            Outcome::Small => 'S',
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Outcome::Odd => "ODD",
            Outcome::Even => "EVEN",
            Outcome::Big => "BIG",
            Outcome::Small => "SMALL",
        };
        f.write_str(label)
    }
}

/// An immutable block record as delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub parity: Outcome,
    pub size: Outcome,
    pub intensity: u8,
    pub produced_at: DateTime<Utc>,
}

impl Block {
    /// Build a block, classifying it from its hash.
    pub fn new(height: u64, hash: impl Into<String>, produced_at: DateTime<Utc>) -> Self {
        let hash = hash.into();
        let c = classify(&hash);
        Self {
            height,
            hash,
            parity: c.parity,
            size: c.size,
            intensity: c.intensity,
            produced_at,
        }
    }

    pub fn outcome(&self, axis: Axis) -> Outcome {
        match axis {
            Axis::Parity => self.parity,
            Axis::Size => self.size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub parity: Outcome,
    pub size: Outcome,
    pub intensity: u8,
}

/// Map a block hash to its two-axis outcome.
///
/// The intensity is the last decimal digit in the hash; hex letters are
/// skipped. A hash without any decimal digit classifies as intensity 0.
pub fn classify(hash: &str) -> Classification {
    let intensity = hash
        .chars()
        .rev()
        .find_map(|c| c.to_digit(10))
        .unwrap_or(0) as u8;

    Classification {
        parity: if intensity % 2 == 1 { Outcome::Odd } else { Outcome::Even },
        size: if intensity >= 5 { Outcome::Big } else { Outcome::Small },
        intensity,
    }
}
