//! Advantage state for d20 rolls.
//!
//! D&D 5e rolls the full expression once, twice, or three times depending
//! on the advantage state, then keeps the best (or worst) total.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Advantage state applied to a roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AdvantageMode {
    #[default]
    Normal,
    Advantage,
    Disadvantage,
    /// Advantage rolled with three dice instead of two (Elven Accuracy feat).
    ElvenAccuracy,
}

impl AdvantageMode {
    /// Number of times the full expression is rolled in this mode.
    pub fn roll_count(&self) -> usize {
        match self {
            AdvantageMode::Normal => 1,
            AdvantageMode::Advantage | AdvantageMode::Disadvantage => 2,
            AdvantageMode::ElvenAccuracy => 3,
        }
    }

    /// Index of the repetition this mode keeps, given the total of each.
    ///
    /// Ties resolve to the earliest qualifying repetition. An empty slice
    /// returns 0.
    pub fn pick(&self, totals: &[i64]) -> usize {
        match self {
            AdvantageMode::Normal => 0,
            AdvantageMode::Advantage | AdvantageMode::ElvenAccuracy => {
                best_index(totals, |candidate, best| candidate > best)
            }
            AdvantageMode::Disadvantage => best_index(totals, |candidate, best| candidate < best),
        }
    }

    /// Combine two advantage states (advantage + disadvantage = normal).
    ///
    /// Elven Accuracy behaves as an upgraded advantage: it cancels against
    /// disadvantage and absorbs plain advantage.
    pub fn combine(self, other: AdvantageMode) -> AdvantageMode {
        use AdvantageMode::*;
        match (self, other) {
            (Normal, x) | (x, Normal) => x,
            (Advantage, Disadvantage) | (Disadvantage, Advantage) => Normal,
            (ElvenAccuracy, Disadvantage) | (Disadvantage, ElvenAccuracy) => Normal,
            (Advantage, Advantage) => Advantage,
            (Disadvantage, Disadvantage) => Disadvantage,
            (ElvenAccuracy, _) | (_, ElvenAccuracy) => ElvenAccuracy,
        }
    }
}

fn best_index(totals: &[i64], better: impl Fn(i64, i64) -> bool) -> usize {
    let mut best = 0;
    for (i, &total) in totals.iter().enumerate().skip(1) {
        if better(total, totals[best]) {
            best = i;
        }
    }
    best
}

impl fmt::Display for AdvantageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdvantageMode::Normal => "normal",
            AdvantageMode::Advantage => "advantage",
            AdvantageMode::Disadvantage => "disadvantage",
            AdvantageMode::ElvenAccuracy => "elven accuracy",
        };
        write!(f, "{name}")
    }
}
