//! Dice rolling and initiative tracking for a D&D chat bot.
//!
//! This crate provides:
//! - Dice-notation parsing and evaluation (`2d6+3`, keep/clamp/reroll
//!   modifiers, comparisons, comma sets)
//! - Advantage-aware rolling (advantage, disadvantage, Elven Accuracy)
//! - Outcome classification (natural 20, natural 1, "dirty 20")
//! - Per-channel initiative tracking with deterministic ordering
//!
//! The chat-platform layer (command registration, embeds, persistence)
//! lives elsewhere; everything here is computation over strings and
//! integers plus one in-memory store.
//!
//! # Quick Start
//!
//! ```
//! use dicebot_core::{roll_with_mode, AdvantageMode};
//!
//! let result = roll_with_mode("1d20+5", AdvantageMode::Advantage)?;
//! println!("{}", result.winner());
//! # Ok::<(), dicebot_core::RollError>(())
//! ```

pub mod advantage;
pub mod expr;
pub mod fuzzy;
pub mod initiative;
pub mod parse;
pub mod roll;

// Primary public API
pub use advantage::AdvantageMode;
pub use expr::{DiceExpression, Expr, RollError};
pub use initiative::{
    GroupRollSpec, InitiativeEntry, InitiativeTracker, SessionKey, SharedTracker, TrackerError,
    UserId,
};
pub use roll::{
    parse_title, roll, roll_title, roll_with_mode, roll_with_mode_rng, Crit, RollResult,
    SingleRollResult,
};
