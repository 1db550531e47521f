//! Pluggable arithmetic/variable expression evaluation
//!
//! `%...` assignment lines and `[expr]` substitutions both go through an
//! `ExpressionEvaluator`. [`BasicEvaluator`] is the built-in default: a small
//! recursive-descent parser over `+ - * /`, parentheses, numeric literals,
//! and identifiers resolved against the populated [`Context`].

use super::context::Context;
use tinygd_core::GcodeError;

/// Evaluates arithmetic expressions and `%` assignment statements against a
/// [`Context`]. Implement this to plug in a richer grammar.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluate a bare arithmetic expression (no leading `%` or brackets)
    fn evaluate(&self, expr: &str, ctx: &Context) -> Result<f64, GcodeError>;

    /// Apply a `%`-prefixed assignment line's body (the part after `%`) to
    /// the context. Only `global.<key> = <expr>` is required to be supported.
    fn assign(&self, body: &str, ctx: &mut Context) -> Result<(), GcodeError> {
        let (lhs, rhs) = body.split_once('=').ok_or_else(|| GcodeError::InvalidAssignment {
            line_number: 0,
            reason: format!("expected '=' in assignment '{body}'"),
        })?;
        let lhs = lhs.trim();
        let key = lhs.strip_prefix("global.").ok_or_else(|| GcodeError::InvalidAssignment {
            line_number: 0,
            reason: format!("only global.<key> assignments are supported, got '{lhs}'"),
        })?;
        let value = self.evaluate(rhs.trim(), ctx)?;
        ctx.assign_global(key, value);
        Ok(())
    }
}

/// Built-in evaluator: `+ - * /`, unary minus, parentheses, numbers and
/// context-resolved identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicEvaluator;

impl ExpressionEvaluator for BasicEvaluator {
    fn evaluate(&self, expr: &str, ctx: &Context) -> Result<f64, GcodeError> {
        let tokens = tokenize_expr(expr);
        let mut parser = Parser { tokens: &tokens, pos: 0, ctx, source: expr };
        let value = parser.parse_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(GcodeError::ExpressionError {
                expr: expr.to_string(),
                reason: "trailing tokens after expression".to_string(),
            });
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize_expr(expr: &str) -> Vec<Tok> {
    let mut out = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => { out.push(Tok::Plus); i += 1; }
            '-' => { out.push(Tok::Minus); i += 1; }
            '*' => { out.push(Tok::Star); i += 1; }
            '/' => { out.push(Tok::Slash); i += 1; }
            '(' => { out.push(Tok::LParen); i += 1; }
            ')' => { out.push(Tok::RParen); i += 1; }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num: String = chars[start..i].iter().collect();
                out.push(Tok::Num(num.parse().unwrap_or(0.0)));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                out.push(Tok::Ident(chars[start..i].iter().collect()));
            }
            _ => i += 1,
        }
    }
    out
}

struct Parser<'a> {
    tokens: &'a [Tok],
    pos: usize,
    ctx: &'a Context,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&Tok> {
        let t = self.tokens.get(self.pos);
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self) -> Result<f64, GcodeError> {
        let mut value = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Tok::Plus) => { self.bump(); value += self.parse_term()?; }
                Some(Tok::Minus) => { self.bump(); value -= self.parse_term()?; }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<f64, GcodeError> {
        let mut value = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Tok::Star) => { self.bump(); value *= self.parse_unary()?; }
                Some(Tok::Slash) => {
                    self.bump();
                    let rhs = self.parse_unary()?;
                    if rhs == 0.0 {
                        return Err(GcodeError::ExpressionError {
                            expr: self.source.to_string(),
                            reason: "division by zero".to_string(),
                        });
                    }
                    value /= rhs;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> Result<f64, GcodeError> {
        if let Some(Tok::Minus) = self.peek() {
            self.bump();
            return Ok(-self.parse_unary()?);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<f64, GcodeError> {
        let tok = self.bump().cloned();
        match tok {
            Some(Tok::Num(n)) => Ok(n),
            Some(Tok::Ident(name)) => self.ctx.lookup(&name).ok_or(GcodeError::UnknownVariable {
                name,
            }),
            Some(Tok::LParen) => {
                let value = self.parse_expr()?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(value),
                    _ => Err(GcodeError::ExpressionError {
                        expr: self.source.to_string(),
                        reason: "missing closing parenthesis".to_string(),
                    }),
                }
            }
            _ => Err(GcodeError::ExpressionError {
                expr: self.source.to_string(),
                reason: "unexpected end of expression".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_arithmetic_with_precedence() {
        let ctx = Context::new(0);
        let e = BasicEvaluator;
        assert_eq!(e.evaluate("1 + 2 * 3", &ctx).unwrap(), 7.0);
        assert_eq!(e.evaluate("(1 + 2) * 3", &ctx).unwrap(), 9.0);
    }

    #[test]
    fn evaluates_unary_minus() {
        let ctx = Context::new(0);
        let e = BasicEvaluator;
        assert_eq!(e.evaluate("-5 + 3", &ctx).unwrap(), -2.0);
    }

    #[test]
    fn resolves_context_variables() {
        let mut ctx = Context::new(0);
        ctx.machine_position.x = 10.0;
        let e = BasicEvaluator;
        assert_eq!(e.evaluate("mposx / 2", &ctx).unwrap(), 5.0);
    }

    #[test]
    fn unknown_variable_is_an_error() {
        let ctx = Context::new(0);
        let e = BasicEvaluator;
        assert!(matches!(e.evaluate("bogus", &ctx), Err(GcodeError::UnknownVariable { .. })));
    }

    #[test]
    fn assign_writes_into_global_namespace() {
        let mut ctx = Context::new(0);
        let e = BasicEvaluator;
        e.assign("global.depth = 1 + 2", &mut ctx).unwrap();
        assert_eq!(ctx.lookup("global.depth"), Some(3.0));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let ctx = Context::new(0);
        let e = BasicEvaluator;
        assert!(e.evaluate("1 / 0", &ctx).is_err());
    }
}
