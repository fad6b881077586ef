//! Transmission queue
//!
//! An ordered, cancellable backlog of pending commands. Insertion order is
//! send order; nothing is ever reordered or de-duplicated. The queue knows
//! nothing about flow control or framing: only the orchestrator pops it,
//! and only when the flow controller authorizes a send.

use std::collections::VecDeque;

/// FIFO backlog of commands awaiting delivery.
#[derive(Debug, Default)]
pub struct TransmissionQueue {
    pending: VecDeque<String>,
}

impl TransmissionQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single command to the tail. Never blocks; the backlog is
    /// logically unbounded (backpressure is the caller's concern).
    pub fn enqueue(&mut self, command: impl Into<String>) {
        self.pending.push_back(command.into());
    }

    /// Split a multi-line G-code block, trim each line, skip blanks and
    /// `%`-comments, and enqueue the rest. Returns the number of lines
    /// accepted.
    pub fn enqueue_block(&mut self, block: &str) -> usize {
        let mut added = 0;
        for line in block.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') {
                continue;
            }
            self.pending.push_back(line.to_string());
            added += 1;
        }
        added
    }

    /// Atomically discard every pending command. Idempotent on an empty
    /// queue; a command already handed to the codec is unaffected.
    pub fn cancel(&mut self) {
        self.pending.clear();
    }

    /// Remove and return the head command. Orchestrator use only.
    pub(crate) fn pop(&mut self) -> Option<String> {
        self.pending.pop_front()
    }

    /// Peek at the head command without removing it.
    pub(crate) fn peek(&self) -> Option<&str> {
        self.pending.front().map(String::as_str)
    }

    /// Put a popped command back at the head, e.g. after a zero-byte
    /// write. It goes out first on the next attempt.
    pub(crate) fn requeue_front(&mut self, command: String) {
        self.pending.push_front(command);
    }

    /// Number of pending commands. Does not include anything in flight.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let mut queue = TransmissionQueue::new();
        queue.enqueue("G0 X10");
        queue.enqueue("G0 Y10");
        queue.enqueue("M3");

        assert_eq!(queue.pop().as_deref(), Some("G0 X10"));
        assert_eq!(queue.pop().as_deref(), Some("G0 Y10"));
        assert_eq!(queue.pop().as_deref(), Some("M3"));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn cancel_empties_pending() {
        let mut queue = TransmissionQueue::new();
        for i in 0..5 {
            queue.enqueue(format!("G1 X{}", i));
        }
        queue.cancel();
        assert_eq!(queue.len(), 0);

        // Idempotent on empty.
        queue.cancel();
        assert!(queue.is_empty());
    }

    #[test]
    fn block_filtering() {
        let mut queue = TransmissionQueue::new();
        let added = queue.enqueue_block("G0 X1\n\n% layer 2\n  G0 X2  \nM3\n");
        assert_eq!(added, 3);
        assert_eq!(queue.pop().as_deref(), Some("G0 X1"));
        assert_eq!(queue.pop().as_deref(), Some("G0 X2"));
        assert_eq!(queue.pop().as_deref(), Some("M3"));
    }

    #[test]
    fn duplicates_kept() {
        let mut queue = TransmissionQueue::new();
        queue.enqueue("G4 P0");
        queue.enqueue("G4 P0");
        assert_eq!(queue.len(), 2);
    }
}
