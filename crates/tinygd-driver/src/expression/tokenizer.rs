//! Pluggable g-code line tokenization
//!
//! Only enough grammar is implemented locally to split a line into
//! whitespace-delimited tokens and detect M0/M1/M6/M7/M8 — a richer
//! tokenizer can be substituted by implementing [`GcodeTokenizer`].

/// Splits a g-code line into tokens and answers token-inspection questions
/// the expression stage needs (pause/tool-change detection).
pub trait GcodeTokenizer: Send + Sync {
    /// Split a line into whitespace-delimited tokens
    fn tokenize(&self, line: &str) -> Vec<String>;
}

/// Built-in tokenizer: splits on whitespace, uppercasing letter prefixes
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicTokenizer;

impl GcodeTokenizer for BasicTokenizer {
    fn tokenize(&self, line: &str) -> Vec<String> {
        line.split_whitespace()
            .map(|tok| {
                let mut chars = tok.chars();
                match chars.next() {
                    Some(first) if first.is_alphabetic() => {
                        format!("{}{}", first.to_ascii_uppercase(), chars.as_str())
                    }
                    _ => tok.to_string(),
                }
            })
            .collect()
    }
}

/// True if any token matches `code` exactly (case-insensitive), e.g. `"M0"`
pub fn has_token(tokens: &[String], code: &str) -> bool {
    tokens.iter().any(|t| t.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_uppercases_letter_prefix() {
        let t = BasicTokenizer;
        assert_eq!(t.tokenize("g1 x10.5 m6"), vec!["G1", "X10.5", "M6"]);
    }

    #[test]
    fn detects_m0_pause_token() {
        let t = BasicTokenizer;
        let tokens = t.tokenize("M0");
        assert!(has_token(&tokens, "M0"));
        assert!(!has_token(&tokens, "M1"));
    }
}
