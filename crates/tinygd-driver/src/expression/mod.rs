//! Shared preprocessing applied to every line pulled from Feeder or Sender

pub mod context;
pub mod evaluator;
pub mod tokenizer;

pub use context::Context;
pub use evaluator::{BasicEvaluator, ExpressionEvaluator};
pub use tokenizer::{has_token, BasicTokenizer, GcodeTokenizer};

use tinygd_core::GcodeError;

/// Why the expression stage is asking the caller to raise a hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoldReason {
    /// `%wait` — hold until the planner queue report shows it is empty
    Wait,
    /// `M0`/`M1` program pause; carries which code triggered it
    ProgramPause(String),
    /// `M6` tool change
    ToolChange,
}

/// Result of running a line through the expression stage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpressionOutcome {
    /// Line to transmit; empty means "nothing to send" (e.g. a bare assignment)
    pub line: String,
    pub hold: Option<HoldReason>,
}

/// Applies comment-stripping, `%` handling, `[expr]` substitution, and
/// M0/M1/M6 detection to a raw source line.
pub struct ExpressionStage {
    evaluator: Box<dyn ExpressionEvaluator>,
    tokenizer: Box<dyn GcodeTokenizer>,
}

impl Default for ExpressionStage {
    fn default() -> Self {
        Self::new(Box::new(BasicEvaluator), Box::new(BasicTokenizer))
    }
}

impl ExpressionStage {
    pub fn new(evaluator: Box<dyn ExpressionEvaluator>, tokenizer: Box<dyn GcodeTokenizer>) -> Self {
        Self { evaluator, tokenizer }
    }

    pub fn process(&self, raw_line: &str, ctx: &mut Context) -> Result<ExpressionOutcome, GcodeError> {
        let stripped = strip_comment(raw_line).trim().to_string();

        if let Some(rest) = stripped.strip_prefix('%') {
            if stripped.eq_ignore_ascii_case("%wait") {
                return Ok(ExpressionOutcome {
                    line: "G4 P0.5".to_string(),
                    hold: Some(HoldReason::Wait),
                });
            }
            self.evaluator.assign(rest.trim(), ctx)?;
            return Ok(ExpressionOutcome { line: String::new(), hold: None });
        }

        let substituted = self.substitute_brackets(&stripped, ctx)?;
        let tokens = self.tokenizer.tokenize(&substituted);

        let hold = if has_token(&tokens, "M6") {
            Some(HoldReason::ToolChange)
        } else if has_token(&tokens, "M0") {
            Some(HoldReason::ProgramPause("M0".to_string()))
        } else if has_token(&tokens, "M1") {
            Some(HoldReason::ProgramPause("M1".to_string()))
        } else {
            None
        };

        Ok(ExpressionOutcome { line: substituted, hold })
    }

    fn substitute_brackets(&self, line: &str, ctx: &Context) -> Result<String, GcodeError> {
        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        while let Some(open) = rest.find('[') {
            out.push_str(&rest[..open]);
            let after_open = &rest[open + 1..];
            let close = after_open.find(']').ok_or_else(|| GcodeError::ExpressionError {
                expr: line.to_string(),
                reason: "unmatched '['".to_string(),
            })?;
            let expr = &after_open[..close];
            let value = self.evaluator.evaluate(expr, ctx)?;
            out.push_str(&format_number(value));
            rest = &after_open[close + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_comment() {
        let stage = ExpressionStage::default();
        let mut ctx = Context::new(0);
        let outcome = stage.process("G1 X10 ; move", &mut ctx).unwrap();
        assert_eq!(outcome.line, "G1 X10");
        assert_eq!(outcome.hold, None);
    }

    #[test]
    fn wait_raises_hold_and_substitutes_dwell() {
        let stage = ExpressionStage::default();
        let mut ctx = Context::new(0);
        let outcome = stage.process("%wait", &mut ctx).unwrap();
        assert_eq!(outcome.line, "G4 P0.5");
        assert_eq!(outcome.hold, Some(HoldReason::Wait));
    }

    #[test]
    fn assignment_line_produces_no_output() {
        let stage = ExpressionStage::default();
        let mut ctx = Context::new(0);
        let outcome = stage.process("%global.depth = 5", &mut ctx).unwrap();
        assert_eq!(outcome.line, "");
        assert_eq!(ctx.lookup("global.depth"), Some(5.0));
    }

    #[test]
    fn bracket_expression_is_substituted() {
        let stage = ExpressionStage::default();
        let mut ctx = Context::new(0);
        ctx.assign_global("depth", 2.0);
        let outcome = stage.process("G1 Z[global.depth * -1]", &mut ctx).unwrap();
        assert_eq!(outcome.line, "G1 Z-2");
    }

    #[test]
    fn m0_raises_program_pause_hold() {
        let stage = ExpressionStage::default();
        let mut ctx = Context::new(0);
        let outcome = stage.process("M0", &mut ctx).unwrap();
        assert_eq!(outcome.hold, Some(HoldReason::ProgramPause("M0".to_string())));
    }

    #[test]
    fn m6_raises_tool_change_hold() {
        let stage = ExpressionStage::default();
        let mut ctx = Context::new(0);
        let outcome = stage.process("M6 T2", &mut ctx).unwrap();
        assert_eq!(outcome.hold, Some(HoldReason::ToolChange));
    }
}
