//! Priority buffer for outbound messages.
//!
//! Lower priority value dequeues first; equal priorities dequeue in insertion
//! order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::message::Message;

/// Queue entry (wraps for min-heap behavior).
#[derive(Debug, Clone)]
pub struct PrioritizedMessage {
    pub priority: i32, // Lower = dequeued sooner
    pub sequence: u64, // FIFO within same priority
    pub message: Message,
}

impl PartialEq for PrioritizedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for PrioritizedMessage {}

impl Ord for PrioritizedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is max-heap, so reverse both keys
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for PrioritizedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-priority queue with FIFO tie-break.
#[derive(Debug, Default)]
pub struct PriorityBuffer {
    heap: BinaryHeap<PrioritizedMessage>,
    next_sequence: u64,
}

impl PriorityBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message, priority: i32) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(PrioritizedMessage {
            priority,
            sequence,
            message,
        });
    }

    pub fn pop(&mut self) -> Option<PrioritizedMessage> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgcore::message::MessageType;
    use proptest::prelude::*;
    use serde_json::json;

    fn msg(n: usize) -> Message {
        Message::new(MessageType::Snapshots, json!({ "n": n }))
    }

    fn drain(buffer: &mut PriorityBuffer) -> Vec<(i32, u64)> {
        std::iter::from_fn(|| buffer.pop())
            .map(|item| (item.priority, item.sequence))
            .collect()
    }

    #[test]
    fn test_priority_order_with_fifo_tie_break() {
        let mut buffer = PriorityBuffer::new();
        for (n, priority) in [5, 1, 3, 1].into_iter().enumerate() {
            buffer.push(msg(n), priority);
        }

        let order: Vec<usize> = std::iter::from_fn(|| buffer.pop())
            .map(|item| item.message.payload["n"].as_u64().unwrap() as usize)
            .collect();
        // priorities [1, 1, 3, 5]; the first priority-1 message (n=1) before n=3
        assert_eq!(order, vec![1, 3, 2, 0]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_negative_priorities_first() {
        let mut buffer = PriorityBuffer::new();
        buffer.push(msg(0), 0);
        buffer.push(msg(1), -10);
        assert_eq!(buffer.pop().unwrap().priority, -10);
        assert_eq!(buffer.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_drain_is_stable_sort(priorities in proptest::collection::vec(-5i32..5, 0..64)) {
            let mut buffer = PriorityBuffer::new();
            for (n, p) in priorities.iter().enumerate() {
                buffer.push(msg(n), *p);
            }

            let mut expected: Vec<(i32, u64)> = priorities
                .iter()
                .enumerate()
                .map(|(n, p)| (*p, n as u64))
                .collect();
            expected.sort_by_key(|(p, _)| *p);

            prop_assert_eq!(drain(&mut buffer), expected);
        }
    }
}
