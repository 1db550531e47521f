//! Program streamer operating under SEND/RESPONSE discipline
//!
//! At most one line is in flight between a `send` and its matching `r`
//! acknowledgement. See [`Sender::next`] for the line-number rewrite applied
//! just before transmission.

use crate::expression::{Context, ExpressionStage};
use tinygd_core::{GcodeError, SenderStatus};

/// A line ready to be written to the transport, already expression-processed
/// and line-number-rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderLine {
    pub text: String,
}

#[derive(Default)]
pub struct Sender {
    name: Option<String>,
    lines: Vec<String>,
    total: usize,
    sent: usize,
    received: usize,
    held: bool,
    hold_reason: Option<String>,
    start_time_ms: Option<u64>,
    finish_time_ms: Option<u64>,
    context: Context,
}

impl Sender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize `content` into lines (LF or CRLF), append the trailer
    /// `%wait ; Wait for the planner to empty`, and reset counters.
    pub fn load(&mut self, name: impl Into<String>, content: &str, context: Context) -> Result<(), GcodeError> {
        if content.trim().is_empty() {
            return Err(GcodeError::EmptyProgram);
        }
        let mut lines: Vec<String> = content
            .split('\n')
            .map(|l| l.trim_end_matches('\r').to_string())
            .collect();
        lines.push("%wait ; Wait for the planner to empty".to_string());

        self.name = Some(name.into());
        self.total = lines.len();
        self.lines = lines;
        self.sent = 0;
        self.received = 0;
        self.held = false;
        self.hold_reason = None;
        self.start_time_ms = Some(context.now_ms());
        self.finish_time_ms = None;
        self.context = context;
        Ok(())
    }

    pub fn unload(&mut self) {
        *self = Self::default();
    }

    pub fn rewind(&mut self) {
        self.sent = 0;
        self.received = 0;
        self.held = false;
        self.hold_reason = None;
        self.finish_time_ms = None;
    }

    /// Pull, expression-process, and line-number-rewrite the next line.
    /// Lines that evaluate to empty output (pure `%` assignments) are
    /// consumed without a physical byte going to the wire, so `received`
    /// is advanced in lockstep with `sent` for them — no `r` acknowledgement
    /// will ever arrive for a slot that was never transmitted.
    pub fn next(&mut self, stage: &ExpressionStage) -> Result<Option<SenderLine>, GcodeError> {
        loop {
            if self.held || self.sent >= self.total {
                return Ok(None);
            }
            let raw = self.lines[self.sent].clone();
            let outcome = stage.process(&raw, &mut self.context)?;

            if let Some(reason) = &outcome.hold {
                self.held = true;
                self.hold_reason = Some(format!("{reason:?}"));
            }

            if outcome.line.is_empty() {
                self.sent += 1;
                self.received += 1;
                continue;
            }

            let text = rewrite_line_number(&outcome.line, self.sent);
            self.sent += 1;
            return Ok(Some(SenderLine { text }));
        }
    }

    /// Record one acknowledgement
    pub fn ack(&mut self, now_ms: u64) {
        self.received += 1;
        if self.received >= self.total {
            self.finish_time_ms = Some(now_ms);
        }
    }

    pub fn hold(&mut self, reason: impl Into<String>) {
        self.held = true;
        self.hold_reason = Some(reason.into());
    }

    pub fn unhold(&mut self) {
        self.held = false;
        self.hold_reason = None;
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn finish_time_ms(&self) -> Option<u64> {
        self.finish_time_ms
    }

    pub fn is_loaded(&self) -> bool {
        self.total > 0
    }

    pub fn status(&self) -> SenderStatus {
        SenderStatus {
            name: self.name.clone(),
            total: self.total,
            sent: self.sent,
            received: self.received,
            held: self.held,
            hold_reason: self.hold_reason.clone(),
        }
    }
}

/// Strip all whitespace, then rewrite a leading `N<digits>` token (if any)
/// to `N<sent>`.
fn rewrite_line_number(line: &str, sent: usize) -> String {
    let stripped: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    let rest = stripped.trim_start_matches('N');
    let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if stripped.starts_with('N') && digits_end > 0 {
        format!("N{}{}", sent, &rest[digits_end..])
    } else {
        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> ExpressionStage {
        ExpressionStage::default()
    }

    #[test]
    fn load_rejects_empty_content() {
        let mut s = Sender::new();
        assert!(matches!(s.load("p", "   \n", Context::new(0)), Err(GcodeError::EmptyProgram)));
    }

    #[test]
    fn load_appends_wait_trailer() {
        let mut s = Sender::new();
        s.load("p", "G0 X1\nG0 X2", Context::new(0)).unwrap();
        assert_eq!(s.total(), 3);
    }

    #[test]
    fn next_increments_sent_and_rewrites_line_number() {
        let mut s = Sender::new();
        s.load("p", "N10 G0 X1", Context::new(0)).unwrap();
        let line = s.next(&stage()).unwrap().unwrap();
        assert_eq!(line.text, "N0G0X1");
        assert_eq!(s.sent(), 1);
    }

    #[test]
    fn assignment_only_line_does_not_consume_a_send_slot() {
        let mut s = Sender::new();
        s.load("p", "%global.x = 1\nG0 X1", Context::new(0)).unwrap();
        let line = s.next(&stage()).unwrap().unwrap();
        assert_eq!(line.text, "G0X1");
        assert_eq!(s.sent(), 2);
        assert_eq!(s.received(), 1);
    }

    #[test]
    fn program_reaches_total_received_despite_an_assignment_line() {
        let mut s = Sender::new();
        s.load("p", "%global.x = 1\nG0 X1", Context::new(0)).unwrap();
        s.next(&stage()).unwrap();
        s.ack(100);
        assert!(s.finish_time_ms().is_none());
        s.next(&stage()).unwrap();
        s.ack(200);
        assert_eq!(s.received(), s.total());
        assert_eq!(s.finish_time_ms(), Some(200));
    }

    #[test]
    fn ack_at_total_sets_finish_time() {
        let mut s = Sender::new();
        s.load("p", "G0 X1", Context::new(0)).unwrap();
        assert_eq!(s.total(), 2);
        s.ack(100);
        assert!(s.finish_time_ms().is_none());
        s.ack(200);
        assert_eq!(s.finish_time_ms(), Some(200));
    }

    #[test]
    fn rewind_resets_counters_but_keeps_program() {
        let mut s = Sender::new();
        s.load("p", "G0 X1", Context::new(0)).unwrap();
        s.next(&stage()).unwrap();
        s.ack(1);
        s.rewind();
        assert_eq!(s.sent(), 0);
        assert_eq!(s.received(), 0);
        assert_eq!(s.total(), 2);
    }

    #[test]
    fn m0_hold_blocks_further_next_calls() {
        let mut s = Sender::new();
        s.load("p", "M0\nG0 X1", Context::new(0)).unwrap();
        let line = s.next(&stage()).unwrap().unwrap();
        assert_eq!(line.text, "M0");
        assert!(s.is_held());
        assert!(s.next(&stage()).unwrap().is_none());
    }
}
