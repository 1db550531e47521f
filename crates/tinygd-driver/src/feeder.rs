//! Unbounded FIFO for manual/jog commands

use crate::expression::Context;
use std::collections::VecDeque;
use tinygd_core::FeederStatus;

struct Item {
    line: String,
    context: Context,
}

/// Manual/jog command queue. Holdable; reset drains and clears the hold.
#[derive(Default)]
pub struct Feeder {
    queue: VecDeque<Item>,
    held: bool,
    hold_reason: Option<String>,
}

impl Feeder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append lines sharing one context
    pub fn feed(&mut self, lines: Vec<String>, context: Context) {
        for line in lines {
            self.queue.push_back(Item { line, context: context.clone() });
        }
    }

    /// Pull the next line and its context, unless held or empty
    pub fn next(&mut self) -> Option<(String, Context)> {
        if self.held {
            return None;
        }
        self.queue.pop_front().map(|item| (item.line, item.context))
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

    pub fn hold_reason(&self) -> Option<&str> {
        self.hold_reason.as_deref()
    }

    /// Drain the queue and clear any hold
    pub fn reset(&mut self) {
        self.queue.clear();
        self.unhold();
    }

    /// Whether there is pending work, without consuming it
    pub fn peek(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn status(&self) -> FeederStatus {
        FeederStatus {
            pending: self.peek(),
            queue_len: self.queue.len(),
            held: self.held,
            hold_reason: self.hold_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_then_next_is_fifo() {
        let mut f = Feeder::new();
        f.feed(vec!["G0 X1".into(), "G0 X2".into()], Context::new(0));
        assert_eq!(f.next().unwrap().0, "G0 X1");
        assert_eq!(f.next().unwrap().0, "G0 X2");
        assert!(f.next().is_none());
    }

    #[test]
    fn held_feeder_yields_nothing() {
        let mut f = Feeder::new();
        f.feed(vec!["G0 X1".into()], Context::new(0));
        f.hold("manual");
        assert!(f.next().is_none());
        f.unhold();
        assert_eq!(f.next().unwrap().0, "G0 X1");
    }

    #[test]
    fn reset_drains_queue_and_clears_hold() {
        let mut f = Feeder::new();
        f.feed(vec!["G0 X1".into()], Context::new(0));
        f.hold("x");
        f.reset();
        assert!(!f.peek());
        assert!(!f.is_held());
    }

    #[test]
    fn hold_and_unhold_are_idempotent() {
        let mut f = Feeder::new();
        f.hold("a");
        f.hold("b");
        assert_eq!(f.hold_reason(), Some("b"));
        f.unhold();
        f.unhold();
        assert!(!f.is_held());
    }
}
