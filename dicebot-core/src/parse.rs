//! Dice-notation parser.
//!
//! Hand-rolled recursive descent over a character cursor. Grammar, loosest
//! binding first:
//!
//! ```text
//! expr      := additive (cmp-op additive)*
//! additive  := term (('+'|'-') term)*
//! term      := unary (('*'|'/') unary)*
//! unary     := ('+'|'-')* primary
//! primary   := INT | dice | '(' expr (',' expr)* ')' mods
//! dice      := [INT] 'd' INT mods
//! mods      := ('kh'|'kl'|'mi'|'ma'|'ro') [INT] ...
//! ```
//!
//! Input is lowercased and whitespace-insensitive, except that modifiers
//! must directly follow their dice term. A modifier with no digits
//! defaults its argument to 1.

use crate::expr::{
    BinaryOp, CompareOp, DiceExpression, DiceModifier, DiceTerm, Expr, RollError, UnaryOp,
};
use tracing::warn;

/// Most dice a single term may roll; larger counts clamp (or reject).
pub const MAX_DICE: u32 = 256;
/// Largest die size; bigger dice clamp (or reject).
pub const MAX_SIDES: u32 = 2048;

impl DiceExpression {
    /// Parse dice notation, clamping oversized dice terms to the safety
    /// ceiling and recording a warning for each clamp.
    pub fn parse(notation: &str) -> Result<Self, RollError> {
        Self::parse_inner(notation, false)
    }

    /// Parse dice notation, rejecting oversized dice terms with
    /// [`RollError::LimitExceeded`] instead of clamping.
    pub fn parse_strict(notation: &str) -> Result<Self, RollError> {
        Self::parse_inner(notation, true)
    }

    fn parse_inner(notation: &str, strict: bool) -> Result<Self, RollError> {
        let mut parser = Parser::new(notation, strict);
        parser.skip_whitespace();
        if parser.at_end() {
            return Err(RollError::Syntax("empty expression".into()));
        }
        let root = parser.expression()?;
        parser.skip_whitespace();
        if let Some(c) = parser.peek() {
            return Err(RollError::Syntax(format!("unexpected '{c}'")));
        }
        Ok(DiceExpression {
            root,
            warnings: parser.warnings,
        })
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    strict: bool,
    warnings: Vec<String>,
}

impl Parser {
    fn new(notation: &str, strict: bool) -> Self {
        Self {
            chars: notation.trim().to_lowercase().chars().collect(),
            pos: 0,
            strict,
            warnings: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn bump2(&mut self) {
        self.pos += 2;
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    /// Consume a run of digits, if any.
    fn integer(&mut self) -> Result<Option<i64>, RollError> {
        let mut value: i64 = 0;
        let mut seen = false;
        while let Some(digit) = self.peek().and_then(|c| c.to_digit(10)) {
            seen = true;
            self.pos += 1;
            value = value
                .checked_mul(10)
                .and_then(|v| v.checked_add(i64::from(digit)))
                .ok_or_else(|| RollError::Syntax("number too large".into()))?;
        }
        Ok(seen.then_some(value))
    }

    fn expression(&mut self) -> Result<Expr, RollError> {
        let mut expr = self.additive()?;
        loop {
            self.skip_whitespace();
            let Some(op) = self.compare_op()? else { break };
            let rhs = self.additive()?;
            expr = Expr::Compare(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn compare_op(&mut self) -> Result<Option<CompareOp>, RollError> {
        let op = match (self.peek(), self.peek2()) {
            (Some('>'), Some('=')) => {
                self.bump2();
                CompareOp::GreaterEq
            }
            (Some('<'), Some('=')) => {
                self.bump2();
                CompareOp::LessEq
            }
            (Some('='), Some('=')) => {
                self.bump2();
                CompareOp::Eq
            }
            (Some('!'), Some('=')) => {
                self.bump2();
                CompareOp::NotEq
            }
            (Some('>'), _) => {
                self.bump();
                CompareOp::Greater
            }
            (Some('<'), _) => {
                self.bump();
                CompareOp::Less
            }
            (Some('='), _) => {
                return Err(RollError::Syntax("expected '=='".into()));
            }
            (Some('!'), _) => {
                return Err(RollError::Syntax("expected '!='".into()));
            }
            _ => return Ok(None),
        };
        Ok(Some(op))
    }

    fn additive(&mut self) -> Result<Expr, RollError> {
        let mut expr = self.term()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('+') => BinaryOp::Add,
                Some('-') => BinaryOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.term()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn term(&mut self) -> Result<Expr, RollError> {
        let mut expr = self.unary()?;
        loop {
            self.skip_whitespace();
            let op = match self.peek() {
                Some('*') => BinaryOp::Mul,
                Some('/') => BinaryOp::Div,
                _ => break,
            };
            self.bump();
            let rhs = self.unary()?;
            expr = Expr::Binary(op, Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    fn unary(&mut self) -> Result<Expr, RollError> {
        self.skip_whitespace();
        match self.peek() {
            Some('+') => {
                self.bump();
                Ok(Expr::Unary(UnaryOp::Plus, Box::new(self.unary()?)))
            }
            Some('-') => {
                self.bump();
                Ok(Expr::Unary(UnaryOp::Minus, Box::new(self.unary()?)))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, RollError> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => self.group(),
            Some('d') => self.dice(1),
            Some(c) if c.is_ascii_digit() => {
                let value = self.integer()?.unwrap_or(0);
                if self.peek() == Some('d') {
                    let count = u32::try_from(value).unwrap_or(u32::MAX);
                    self.dice(count)
                } else {
                    Ok(Expr::Literal(value))
                }
            }
            Some(c) => Err(RollError::Syntax(format!("unexpected '{c}'"))),
            None => Err(RollError::Syntax("expected a value".into())),
        }
    }

    fn dice(&mut self, count: u32) -> Result<Expr, RollError> {
        self.bump(); // 'd'
        let sides = match self.integer()? {
            Some(v) => u32::try_from(v).unwrap_or(u32::MAX),
            None => return Err(RollError::Syntax("missing die size after 'd'".into())),
        };
        if sides == 0 {
            return Err(RollError::InvalidDieSize(0));
        }
        let (count, sides) = self.check_limits(count, sides)?;
        let modifiers = self.dice_modifiers(count)?;
        Ok(Expr::Dice(DiceTerm {
            count,
            sides,
            modifiers,
        }))
    }

    fn check_limits(&mut self, count: u32, sides: u32) -> Result<(u32, u32), RollError> {
        if count <= MAX_DICE && sides <= MAX_SIDES {
            return Ok((count, sides));
        }
        if self.strict {
            return Err(RollError::LimitExceeded {
                count,
                sides,
                max_dice: MAX_DICE,
                max_sides: MAX_SIDES,
            });
        }
        let clamped_count = count.min(MAX_DICE);
        let clamped_sides = sides.min(MAX_SIDES);
        let message =
            format!("{count}d{sides} is too large, rolling {clamped_count}d{clamped_sides} instead");
        warn!(%message, "clamped oversized dice term");
        self.warnings.push(message);
        Ok((clamped_count, clamped_sides))
    }

    fn dice_modifiers(&mut self, count: u32) -> Result<Vec<DiceModifier>, RollError> {
        let mut modifiers = Vec::new();
        loop {
            let modifier = match (self.peek(), self.peek2()) {
                (Some('k'), Some('h')) => {
                    self.bump2();
                    let keep = self.keep_arg()?;
                    if keep > count {
                        return Err(RollError::InvalidKeepCount { keep, count });
                    }
                    DiceModifier::KeepHighest(keep)
                }
                (Some('k'), Some('l')) => {
                    self.bump2();
                    let keep = self.keep_arg()?;
                    if keep > count {
                        return Err(RollError::InvalidKeepCount { keep, count });
                    }
                    DiceModifier::KeepLowest(keep)
                }
                (Some('m'), Some('i')) => {
                    self.bump2();
                    DiceModifier::Minimum(self.modifier_arg()?)
                }
                (Some('m'), Some('a')) => {
                    self.bump2();
                    DiceModifier::Maximum(self.modifier_arg()?)
                }
                (Some('r'), Some('o')) => {
                    self.bump2();
                    DiceModifier::RerollOnce(self.modifier_arg()?)
                }
                _ => break,
            };
            modifiers.push(modifier);
        }
        Ok(modifiers)
    }

    /// Keep modifiers are the only ones legal on a comma set.
    fn set_modifiers(&mut self, len: u32) -> Result<Vec<DiceModifier>, RollError> {
        let mut modifiers = Vec::new();
        loop {
            let modifier = match (self.peek(), self.peek2()) {
                (Some('k'), Some('h')) => {
                    self.bump2();
                    let keep = self.keep_arg()?;
                    if keep > len {
                        return Err(RollError::InvalidKeepCount { keep, count: len });
                    }
                    DiceModifier::KeepHighest(keep)
                }
                (Some('k'), Some('l')) => {
                    self.bump2();
                    let keep = self.keep_arg()?;
                    if keep > len {
                        return Err(RollError::InvalidKeepCount { keep, count: len });
                    }
                    DiceModifier::KeepLowest(keep)
                }
                (Some('m'), Some('i'))
                | (Some('m'), Some('a'))
                | (Some('r'), Some('o')) => {
                    return Err(RollError::Syntax(
                        "only keep modifiers may follow a set".into(),
                    ));
                }
                _ => break,
            };
            modifiers.push(modifier);
        }
        Ok(modifiers)
    }

    fn modifier_arg(&mut self) -> Result<i64, RollError> {
        Ok(self.integer()?.unwrap_or(1))
    }

    fn keep_arg(&mut self) -> Result<u32, RollError> {
        let value = self.modifier_arg()?;
        Ok(u32::try_from(value).unwrap_or(u32::MAX))
    }

    fn group(&mut self) -> Result<Expr, RollError> {
        self.bump(); // '('
        let first = self.expression()?;
        self.skip_whitespace();
        if self.eat(',') {
            let mut items = vec![first];
            loop {
                items.push(self.expression()?);
                self.skip_whitespace();
                if !self.eat(',') {
                    break;
                }
            }
            self.skip_whitespace();
            if !self.eat(')') {
                return Err(RollError::Syntax("unmatched '('".into()));
            }
            let modifiers = self.set_modifiers(items.len() as u32)?;
            Ok(Expr::Set(items, modifiers))
        } else {
            if !self.eat(')') {
                return Err(RollError::Syntax("unmatched '('".into()));
            }
            Ok(Expr::Paren(Box::new(first)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let expr = DiceExpression::parse("1d20").unwrap();
        assert_eq!(
            expr.root,
            Expr::Dice(DiceTerm::new(1, 20)),
        );
        assert!(expr.warnings.is_empty());
    }

    #[test]
    fn test_parse_bare_die() {
        assert_eq!(DiceExpression::parse("d8").unwrap().to_string(), "1d8");
    }

    #[test]
    fn test_parse_modifiers_in_order() {
        let expr = DiceExpression::parse("4d6ro1kh3").unwrap();
        let Expr::Dice(term) = &expr.root else {
            panic!("expected a dice term");
        };
        assert_eq!(
            term.modifiers,
            vec![DiceModifier::RerollOnce(1), DiceModifier::KeepHighest(3)]
        );
    }

    #[test]
    fn test_modifier_default_argument() {
        let expr = DiceExpression::parse("2d20kh").unwrap();
        let Expr::Dice(term) = &expr.root else {
            panic!("expected a dice term");
        };
        assert_eq!(term.modifiers, vec![DiceModifier::KeepHighest(1)]);
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        // 2+3*4 groups as 2+(3*4).
        let expr = DiceExpression::parse("2+3*4").unwrap();
        let Expr::Binary(BinaryOp::Add, lhs, rhs) = &expr.root else {
            panic!("expected addition at the top");
        };
        assert_eq!(**lhs, Expr::Literal(2));
        assert!(matches!(**rhs, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_parse_comparison_binds_loosest() {
        let expr = DiceExpression::parse("1d20+5>=15").unwrap();
        assert!(matches!(expr.root, Expr::Compare(CompareOp::GreaterEq, _, _)));
    }

    #[test]
    fn test_parse_set() {
        let expr = DiceExpression::parse("(1d6, 1d8, 4)kh2").unwrap();
        let Expr::Set(items, modifiers) = &expr.root else {
            panic!("expected a set");
        };
        assert_eq!(items.len(), 3);
        assert_eq!(modifiers, &vec![DiceModifier::KeepHighest(2)]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            DiceExpression::parse(""),
            Err(RollError::Syntax(_))
        ));
        assert!(matches!(
            DiceExpression::parse("1d20+"),
            Err(RollError::Syntax(_))
        ));
        assert!(matches!(
            DiceExpression::parse("(1d20"),
            Err(RollError::Syntax(_))
        ));
        assert!(matches!(
            DiceExpression::parse("1d20 && 5"),
            Err(RollError::Syntax(_))
        ));
        assert!(matches!(
            DiceExpression::parse("1 = 1"),
            Err(RollError::Syntax(_))
        ));
        assert!(matches!(
            DiceExpression::parse("2d"),
            Err(RollError::Syntax(_))
        ));
        assert!(matches!(
            DiceExpression::parse("1d0"),
            Err(RollError::InvalidDieSize(0))
        ));
    }

    #[test]
    fn test_invalid_keep_count() {
        assert!(matches!(
            DiceExpression::parse("4d6kh5"),
            Err(RollError::InvalidKeepCount { keep: 5, count: 4 })
        ));
        assert!(DiceExpression::parse("4d6kh4").is_ok());
        assert!(matches!(
            DiceExpression::parse("(1, 2)kh3"),
            Err(RollError::InvalidKeepCount { keep: 3, count: 2 })
        ));
    }

    #[test]
    fn test_set_rejects_clamp_modifiers() {
        assert!(matches!(
            DiceExpression::parse("(1, 2)mi3"),
            Err(RollError::Syntax(_))
        ));
    }

    #[test]
    fn test_clamp_with_warning() {
        let expr = DiceExpression::parse("1000d9999").unwrap();
        let Expr::Dice(term) = &expr.root else {
            panic!("expected a dice term");
        };
        assert_eq!(term.count, MAX_DICE);
        assert_eq!(term.sides, MAX_SIDES);
        assert_eq!(expr.warnings.len(), 1);
        assert!(expr.warnings[0].contains("1000d9999"));
    }

    #[test]
    fn test_strict_rejects_oversized() {
        assert!(matches!(
            DiceExpression::parse_strict("1000d6"),
            Err(RollError::LimitExceeded { count: 1000, .. })
        ));
        assert!(DiceExpression::parse_strict("256d2048").is_ok());
    }

    #[test]
    fn test_whitespace_insensitive() {
        assert_eq!(
            DiceExpression::parse(" 120 + 5 ").unwrap().to_string(),
            "120+5"
        );
    }
}
