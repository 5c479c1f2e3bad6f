//! Parsed form of a dice expression.
//!
//! A [`DiceExpression`] is a tree of typed nodes: literals, dice terms with
//! ordered modifiers, arithmetic and comparison operators, parenthesized
//! groups, and comma sets. Parsing lives in [`crate::parse`], evaluation in
//! [`crate::roll`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for dice parsing and evaluation.
#[derive(Debug, Error)]
pub enum RollError {
    #[error("Invalid dice notation: {0}")]
    Syntax(String),
    #[error("Invalid die size: d{0}")]
    InvalidDieSize(u32),
    #[error("Cannot keep {keep} dice when only rolling {count}")]
    InvalidKeepCount { keep: u32, count: u32 },
    #[error("{count}d{sides} is over the limit of {max_dice} dice of {max_sides} sides")]
    LimitExceeded {
        count: u32,
        sides: u32,
        max_dice: u32,
        max_sides: u32,
    },
    #[error("Division by zero")]
    DivideByZero,
}

/// Unary sign operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Minus,
}

/// Binary arithmetic operator. Division is integer floor division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

/// Comparison operator, evaluating to 1 (true) or 0 (false).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Greater,
    Less,
    GreaterEq,
    LessEq,
    Eq,
    NotEq,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Greater => ">",
            CompareOp::Less => "<",
            CompareOp::GreaterEq => ">=",
            CompareOp::LessEq => "<=",
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
        }
    }

    pub fn apply(&self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Greater => lhs > rhs,
            CompareOp::Less => lhs < rhs,
            CompareOp::GreaterEq => lhs >= rhs,
            CompareOp::LessEq => lhs <= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::NotEq => lhs != rhs,
        }
    }
}

/// Suffix modifier on a dice term or set, applied in written order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiceModifier {
    /// `khN` - keep only the N highest values.
    KeepHighest(u32),
    /// `klN` - keep only the N lowest values.
    KeepLowest(u32),
    /// `miN` - treat any face below N as N.
    Minimum(i64),
    /// `maN` - treat any face above N as N.
    Maximum(i64),
    /// `roN` - reroll each die that lands on N, once; the new face stands.
    RerollOnce(i64),
}

impl fmt::Display for DiceModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiceModifier::KeepHighest(n) => write!(f, "kh{n}"),
            DiceModifier::KeepLowest(n) => write!(f, "kl{n}"),
            DiceModifier::Minimum(n) => write!(f, "mi{n}"),
            DiceModifier::Maximum(n) => write!(f, "ma{n}"),
            DiceModifier::RerollOnce(n) => write!(f, "ro{n}"),
        }
    }
}

/// A dice term: `count` dice of `sides` sides plus suffix modifiers.
///
/// A bare die (`d20`) is a term with `count == 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiceTerm {
    pub count: u32,
    pub sides: u32,
    pub modifiers: Vec<DiceModifier>,
}

impl DiceTerm {
    pub fn new(count: u32, sides: u32) -> Self {
        Self {
            count,
            sides,
            modifiers: Vec::new(),
        }
    }

    /// Number of dice still counted after keep modifiers.
    pub fn kept_count(&self) -> u32 {
        let mut kept = self.count;
        for modifier in &self.modifiers {
            match modifier {
                DiceModifier::KeepHighest(n) | DiceModifier::KeepLowest(n) => {
                    kept = kept.min(*n);
                }
                _ => {}
            }
        }
        kept
    }
}

impl fmt::Display for DiceTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        for modifier in &self.modifiers {
            write!(f, "{modifier}")?;
        }
        Ok(())
    }
}

/// A node in a parsed dice expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(i64),
    Dice(DiceTerm),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Paren(Box<Expr>),
    /// Comma set, e.g. `(1d6, 1d8, 4)kh2`. Only keep modifiers are legal.
    Set(Vec<Expr>, Vec<DiceModifier>),
}

impl Expr {
    /// True when the tree contains at least one dice term with a nonzero
    /// kept set. `0d6` and `2d6kh0` do not count.
    pub fn contains_dice(&self) -> bool {
        match self {
            Expr::Literal(_) => false,
            Expr::Dice(term) => term.count > 0 && term.kept_count() > 0,
            Expr::Unary(_, inner) | Expr::Paren(inner) => inner.contains_dice(),
            Expr::Binary(_, lhs, rhs) | Expr::Compare(_, lhs, rhs) => {
                lhs.contains_dice() || rhs.contains_dice()
            }
            Expr::Set(items, _) => items.iter().any(Expr::contains_dice),
        }
    }

    /// True when the expression is a comparison at the top level, looking
    /// through parentheses and unary signs. `(6>7)*2` is not a comparison.
    pub fn is_comparison(&self) -> bool {
        match self {
            Expr::Compare(..) => true,
            Expr::Unary(_, inner) | Expr::Paren(inner) => inner.is_comparison(),
            _ => false,
        }
    }

    /// True when the expression is a single kept d20 combined only with
    /// added or subtracted integer literals - the shape that can score a
    /// natural 20, natural 1, or dirty 20.
    pub fn is_simple_d20(&self) -> bool {
        let mut dice = Vec::new();
        if !self.collect_simple_terms(&mut dice) {
            return false;
        }
        match dice.as_slice() {
            // A single kept die also covers manually written advantage
            // (`2d20kh1`), which still crits on a natural 20.
            [term] => term.sides == 20 && term.kept_count() == 1,
            _ => false,
        }
    }

    /// Collect dice terms while checking the tree uses only `+`/`-` and
    /// literals around them. Returns false as soon as the shape breaks.
    fn collect_simple_terms<'a>(&'a self, dice: &mut Vec<&'a DiceTerm>) -> bool {
        match self {
            Expr::Literal(_) => true,
            Expr::Dice(term) => {
                dice.push(term);
                true
            }
            Expr::Unary(_, inner) | Expr::Paren(inner) => inner.collect_simple_terms(dice),
            Expr::Binary(BinaryOp::Add | BinaryOp::Sub, lhs, rhs) => {
                lhs.collect_simple_terms(dice) && rhs.collect_simple_terms(dice)
            }
            Expr::Binary(..) | Expr::Compare(..) | Expr::Set(..) => false,
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{value}"),
            Expr::Dice(term) => write!(f, "{term}"),
            Expr::Unary(UnaryOp::Plus, inner) => write!(f, "+{inner}"),
            Expr::Unary(UnaryOp::Minus, inner) => write!(f, "-{inner}"),
            Expr::Binary(op, lhs, rhs) => write!(f, "{lhs}{}{rhs}", op.symbol()),
            Expr::Compare(op, lhs, rhs) => write!(f, "{lhs}{}{rhs}", op.symbol()),
            Expr::Paren(inner) => write!(f, "({inner})"),
            Expr::Set(items, modifiers) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")?;
                for modifier in modifiers {
                    write!(f, "{modifier}")?;
                }
                Ok(())
            }
        }
    }
}

/// A validated dice expression in canonical form.
///
/// The `Display` form is the normalized notation used for re-display and
/// re-rolling; `warnings` carries clamp notices from parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceExpression {
    pub root: Expr,
    pub warnings: Vec<String>,
}

impl fmt::Display for DiceExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

impl FromStr for DiceExpression {
    type Err = RollError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiceExpression::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(notation: &str) -> DiceExpression {
        DiceExpression::parse(notation).unwrap()
    }

    #[test]
    fn test_canonical_display() {
        assert_eq!(parse("1d20 + 5").to_string(), "1d20+5");
        assert_eq!(parse("D6").to_string(), "1d6");
        assert_eq!(parse("4d6KH3").to_string(), "4d6kh3");
        assert_eq!(parse("(1d8+2)*3").to_string(), "(1d8+2)*3");
        assert_eq!(parse("(1, 2,3)kh2").to_string(), "(1, 2, 3)kh2");
    }

    #[test]
    fn test_contains_dice() {
        assert!(parse("1d20+5").root.contains_dice());
        assert!(!parse("120 + 5").root.contains_dice());
        assert!(!parse("0d6+1").root.contains_dice());
        assert!(!parse("2d6kh0").root.contains_dice());
    }

    #[test]
    fn test_is_comparison() {
        assert!(parse("1>0").root.is_comparison());
        assert!(parse("(1==1)").root.is_comparison());
        assert!(!parse("(6>7)*1").root.is_comparison());
        assert!(!parse("1d20+5").root.is_comparison());
    }

    #[test]
    fn test_simple_d20_shapes() {
        assert!(parse("1d20").root.is_simple_d20());
        assert!(parse("1d20+5").root.is_simple_d20());
        assert!(parse("-(1d20) + 3 - 1").root.is_simple_d20());
        assert!(parse("1d20mi20+5").root.is_simple_d20());
        assert!(parse("2d20kh1+3").root.is_simple_d20());
        // Multiplication, extra dice, or the wrong die all break the shape.
        assert!(!parse("1d20*2").root.is_simple_d20());
        assert!(!parse("2d20+3").root.is_simple_d20());
        assert!(!parse("1d20+1d4").root.is_simple_d20());
        assert!(!parse("1d12+5").root.is_simple_d20());
    }

    #[test]
    fn test_kept_count() {
        let term = DiceTerm {
            count: 4,
            sides: 6,
            modifiers: vec![DiceModifier::KeepHighest(3)],
        };
        assert_eq!(term.kept_count(), 3);
        assert_eq!(DiceTerm::new(2, 20).kept_count(), 2);
    }

    #[test]
    fn test_serde_round_trip() {
        let expr = parse("2d6kh1+1d4-2");
        let json = serde_json::to_string(&expr).unwrap();
        let back: DiceExpression = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expr);
    }
}
