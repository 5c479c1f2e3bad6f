//! Rolling and evaluating dice expressions.
//!
//! Each evaluation pass walks the parsed tree once: every dice leaf rolls
//! fresh faces, modifiers apply in written order, arithmetic runs in i64
//! with floor division, and comparisons collapse to 1 or 0. Advantage
//! modes repeat the pass and keep the winning repetition. Arithmetic
//! saturates at the i64 range.

use crate::advantage::AdvantageMode;
use crate::expr::{BinaryOp, DiceExpression, DiceModifier, DiceTerm, Expr, RollError, UnaryOp};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Special outcome of a single roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crit {
    /// The kept d20 face is 20.
    NaturalTwenty,
    /// The kept d20 face is 1.
    NaturalOne,
    /// A total of exactly 20 reached through modifiers, not the face.
    DirtyTwenty,
}

/// One die rolled as part of a dice term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolledDie {
    /// Face values in order; rerolls and clamps append, the last stands.
    pub faces: Vec<i64>,
    /// Whether this die counts toward the total.
    pub kept: bool,
}

impl RolledDie {
    fn new(face: i64) -> Self {
        Self {
            faces: vec![face],
            kept: true,
        }
    }

    /// The face value that stands after rerolls and clamps.
    pub fn value(&self) -> i64 {
        self.faces.last().copied().unwrap_or(0)
    }
}

/// All dice rolled for one dice term in one evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolledDice {
    pub sides: u32,
    pub dice: Vec<RolledDie>,
}

impl RolledDice {
    pub fn total(&self) -> i64 {
        self.dice
            .iter()
            .filter(|d| d.kept)
            .fold(0i64, |acc, d| acc.saturating_add(d.value()))
    }
}

/// Immutable outcome of one evaluation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleRollResult {
    /// Canonical form of the rolled expression.
    pub expression: String,
    /// Rendered faces and operators; kept values bare, discarded in parens.
    pub breakdown: String,
    /// Raw faces per dice term, in evaluation order.
    pub dice: Vec<RolledDice>,
    pub total: i64,
    pub crit: Option<Crit>,
    /// At least one dice term with a nonzero kept set.
    pub contains_dice: bool,
    /// The expression is a comparison at the top level.
    pub has_comparison_result: bool,
}

impl SingleRollResult {
    pub fn is_natural_twenty(&self) -> bool {
        self.crit == Some(Crit::NaturalTwenty)
    }

    pub fn is_natural_one(&self) -> bool {
        self.crit == Some(Crit::NaturalOne)
    }

    pub fn is_dirty_twenty(&self) -> bool {
        self.crit == Some(Crit::DirtyTwenty)
    }
}

impl fmt::Display for SingleRollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.breakdown, self.total)
    }
}

/// One to three evaluation passes plus the mode that selects between them.
///
/// `rolls` is never empty when produced by the rolling functions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollResult {
    pub rolls: Vec<SingleRollResult>,
    pub mode: AdvantageMode,
    /// Clamp notices carried over from parsing.
    pub warnings: Vec<String>,
}

impl RollResult {
    /// The repetition the advantage mode keeps.
    pub fn winner(&self) -> &SingleRollResult {
        let totals: Vec<i64> = self.rolls.iter().map(|r| r.total).collect();
        &self.rolls[self.mode.pick(&totals)]
    }

    /// Total of the winning repetition.
    pub fn total(&self) -> i64 {
        self.winner().total
    }
}

impl fmt::Display for RollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.winner())
    }
}

impl DiceExpression {
    /// Evaluate the expression once.
    pub fn eval(&self) -> Result<SingleRollResult, RollError> {
        self.eval_with_rng(&mut rand::thread_rng())
    }

    /// Evaluate once with a specific RNG (useful for testing).
    pub fn eval_with_rng<R: Rng>(&self, rng: &mut R) -> Result<SingleRollResult, RollError> {
        let mut pass = EvalPass {
            rng,
            rolled: Vec::new(),
        };
        let (total, breakdown) = pass.eval(&self.root)?;
        let crit = classify(&self.root, &pass.rolled, total);
        Ok(SingleRollResult {
            expression: self.to_string(),
            breakdown,
            dice: pass.rolled,
            total,
            crit,
            contains_dice: self.root.contains_dice(),
            has_comparison_result: self.root.is_comparison(),
        })
    }

    /// Roll the expression under an advantage mode.
    pub fn roll(&self, mode: AdvantageMode) -> Result<RollResult, RollError> {
        self.roll_with_rng(mode, &mut rand::thread_rng())
    }

    /// Roll under an advantage mode with a specific RNG.
    pub fn roll_with_rng<R: Rng>(
        &self,
        mode: AdvantageMode,
        rng: &mut R,
    ) -> Result<RollResult, RollError> {
        let rolls = (0..mode.roll_count())
            .map(|_| self.eval_with_rng(rng))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RollResult {
            rolls,
            mode,
            warnings: self.warnings.clone(),
        })
    }
}

/// Roll dice notation once, no advantage.
pub fn roll(notation: &str) -> Result<RollResult, RollError> {
    roll_with_mode(notation, AdvantageMode::Normal)
}

/// Parse and roll under an advantage mode.
pub fn roll_with_mode(notation: &str, mode: AdvantageMode) -> Result<RollResult, RollError> {
    roll_with_mode_rng(notation, mode, &mut rand::thread_rng())
}

/// Parse and roll with a specific RNG (useful for testing).
pub fn roll_with_mode_rng<R: Rng>(
    notation: &str,
    mode: AdvantageMode,
    rng: &mut R,
) -> Result<RollResult, RollError> {
    DiceExpression::parse(notation)?.roll_with_rng(mode, rng)
}

/// Title line for a roll message.
///
/// The marker substrings ("with advantage", "with disadvantage",
/// "multiple times") are load-bearing: re-roll buttons recover the
/// expression and mode from the rendered title via [`parse_title`].
pub fn roll_title(expression: &str, mode: AdvantageMode, reroll: bool) -> String {
    let prefix = if reroll { "Re-rolling" } else { "Rolling" };
    match mode {
        AdvantageMode::Normal => format!("{prefix} {expression}!"),
        AdvantageMode::Advantage => format!("{prefix} {expression} with advantage!"),
        AdvantageMode::Disadvantage => format!("{prefix} {expression} with disadvantage!"),
        AdvantageMode::ElvenAccuracy => format!("{prefix} {expression} multiple times!"),
    }
}

/// Recover the expression and mode from a rendered title line.
pub fn parse_title(title: &str) -> Option<(String, AdvantageMode)> {
    let rest = title
        .strip_prefix("Re-rolling ")
        .or_else(|| title.strip_prefix("Rolling "))?;
    let rest = rest.strip_suffix('!').unwrap_or(rest);
    let (expression, mode) = if let Some(expr) = rest.strip_suffix(" with advantage") {
        (expr, AdvantageMode::Advantage)
    } else if let Some(expr) = rest.strip_suffix(" with disadvantage") {
        (expr, AdvantageMode::Disadvantage)
    } else if let Some(expr) = rest.strip_suffix(" multiple times") {
        (expr, AdvantageMode::ElvenAccuracy)
    } else {
        (rest, AdvantageMode::Normal)
    };
    let expression = expression.trim();
    if expression.is_empty() {
        return None;
    }
    Some((expression.to_string(), mode))
}

struct EvalPass<'a, R: Rng> {
    rng: &'a mut R,
    rolled: Vec<RolledDice>,
}

impl<R: Rng> EvalPass<'_, R> {
    fn eval(&mut self, expr: &Expr) -> Result<(i64, String), RollError> {
        match expr {
            Expr::Literal(value) => Ok((*value, value.to_string())),
            Expr::Dice(term) => {
                let rolled = self.roll_term(term);
                let total = rolled.total();
                let breakdown = format!("[{}]", render_dice(&rolled));
                self.rolled.push(rolled);
                Ok((total, breakdown))
            }
            Expr::Unary(UnaryOp::Plus, inner) => {
                let (value, breakdown) = self.eval(inner)?;
                Ok((value, format!("+{breakdown}")))
            }
            Expr::Unary(UnaryOp::Minus, inner) => {
                let (value, breakdown) = self.eval(inner)?;
                Ok((value.saturating_neg(), format!("-{breakdown}")))
            }
            Expr::Binary(op, lhs, rhs) => {
                let (lv, lb) = self.eval(lhs)?;
                let (rv, rb) = self.eval(rhs)?;
                let value = match op {
                    BinaryOp::Add => lv.saturating_add(rv),
                    BinaryOp::Sub => lv.saturating_sub(rv),
                    BinaryOp::Mul => lv.saturating_mul(rv),
                    BinaryOp::Div => floor_div(lv, rv)?,
                };
                Ok((value, format!("{lb} {} {rb}", op.symbol())))
            }
            Expr::Compare(op, lhs, rhs) => {
                let (lv, lb) = self.eval(lhs)?;
                let (rv, rb) = self.eval(rhs)?;
                let value = i64::from(op.apply(lv, rv));
                Ok((value, format!("{lb} {} {rb}", op.symbol())))
            }
            Expr::Paren(inner) => {
                let (value, breakdown) = self.eval(inner)?;
                Ok((value, format!("({breakdown})")))
            }
            Expr::Set(items, modifiers) => self.eval_set(items, modifiers),
        }
    }

    fn eval_set(
        &mut self,
        items: &[Expr],
        modifiers: &[DiceModifier],
    ) -> Result<(i64, String), RollError> {
        let mut values = Vec::with_capacity(items.len());
        let mut breakdowns = Vec::with_capacity(items.len());
        for item in items {
            let (value, breakdown) = self.eval(item)?;
            values.push(value);
            breakdowns.push(breakdown);
        }

        let mut kept = vec![true; values.len()];
        for modifier in modifiers {
            match modifier {
                DiceModifier::KeepHighest(n) => keep_extreme(&values, &mut kept, *n as usize, true),
                DiceModifier::KeepLowest(n) => keep_extreme(&values, &mut kept, *n as usize, false),
                // The parser only lets keep modifiers through on sets.
                _ => {}
            }
        }

        let total = values
            .iter()
            .zip(&kept)
            .filter(|(_, &keep)| keep)
            .fold(0i64, |acc, (value, _)| acc.saturating_add(*value));
        let rendered: Vec<String> = breakdowns
            .iter()
            .zip(&kept)
            .map(|(breakdown, &keep)| {
                if keep {
                    breakdown.clone()
                } else {
                    format!("({breakdown})")
                }
            })
            .collect();
        Ok((total, format!("({})", rendered.join(", "))))
    }

    fn roll_term(&mut self, term: &DiceTerm) -> RolledDice {
        let mut dice: Vec<RolledDie> = (0..term.count)
            .map(|_| RolledDie::new(self.roll_face(term.sides)))
            .collect();

        for modifier in &term.modifiers {
            match modifier {
                DiceModifier::RerollOnce(target) => {
                    for die in &mut dice {
                        if die.value() == *target {
                            let face = self.roll_face(term.sides);
                            die.faces.push(face);
                        }
                    }
                }
                DiceModifier::Minimum(floor) => {
                    for die in &mut dice {
                        if die.value() < *floor {
                            die.faces.push(*floor);
                        }
                    }
                }
                DiceModifier::Maximum(ceiling) => {
                    for die in &mut dice {
                        if die.value() > *ceiling {
                            die.faces.push(*ceiling);
                        }
                    }
                }
                DiceModifier::KeepHighest(n) | DiceModifier::KeepLowest(n) => {
                    let values: Vec<i64> = dice.iter().map(RolledDie::value).collect();
                    let mut kept: Vec<bool> = dice.iter().map(|d| d.kept).collect();
                    let highest = matches!(modifier, DiceModifier::KeepHighest(_));
                    keep_extreme(&values, &mut kept, *n as usize, highest);
                    for (die, keep) in dice.iter_mut().zip(kept) {
                        die.kept = keep;
                    }
                }
            }
        }

        RolledDice {
            sides: term.sides,
            dice,
        }
    }

    fn roll_face(&mut self, sides: u32) -> i64 {
        self.rng.gen_range(1..=i64::from(sides))
    }
}

/// Mark all but the n highest (or lowest) still-kept values as dropped.
/// Ties keep earlier values.
fn keep_extreme(values: &[i64], kept: &mut [bool], n: usize, highest: bool) {
    let mut order: Vec<usize> = (0..values.len()).filter(|&i| kept[i]).collect();
    order.sort_by(|&a, &b| {
        if highest {
            values[b].cmp(&values[a])
        } else {
            values[a].cmp(&values[b])
        }
    });
    for &idx in order.iter().skip(n) {
        kept[idx] = false;
    }
}

fn render_dice(rolled: &RolledDice) -> String {
    rolled
        .dice
        .iter()
        .map(|die| {
            let mut parts = Vec::with_capacity(die.faces.len());
            for (i, face) in die.faces.iter().enumerate() {
                let stands = i + 1 == die.faces.len() && die.kept;
                if stands {
                    parts.push(face.to_string());
                } else {
                    parts.push(format!("({face})"));
                }
            }
            parts.join(" ")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn floor_div(lhs: i64, rhs: i64) -> Result<i64, RollError> {
    if rhs == 0 {
        return Err(RollError::DivideByZero);
    }
    if rhs == -1 {
        return Ok(lhs.saturating_neg());
    }
    let quotient = lhs / rhs;
    if lhs % rhs != 0 && (lhs < 0) != (rhs < 0) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

/// Crit classification only applies to the single-kept-d20 shape; the face
/// that stands (after die-level clamps) decides naturals, the total
/// decides a dirty 20.
fn classify(expr: &Expr, rolled: &[RolledDice], total: i64) -> Option<Crit> {
    if !expr.is_simple_d20() {
        return None;
    }
    let d20 = rolled.iter().find(|r| r.sides == 20)?;
    let face = d20.dice.iter().find(|d| d.kept)?.value();
    if face == 20 {
        Some(Crit::NaturalTwenty)
    } else if face == 1 {
        Some(Crit::NaturalOne)
    } else if total == 20 {
        Some(Crit::DirtyTwenty)
    } else {
        None
    }
}
