//! Restart decision queue.
//!
//! Requests come out highest priority first; equal priorities come out in
//! request order. Duplicates are kept.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::lifecycle::request::{Priority, RestartRequest};

#[derive(Debug)]
struct Queued {
    /// Insertion order, breaks ties between equal timestamps.
    seq: u64,
    request: RestartRequest,
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap pops the greatest element, so older requests must compare greater.
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| other.request.timestamp.cmp(&self.request.timestamp))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for Queued {}

/// Priority-then-FIFO queue of restart requests.
#[derive(Debug, Default)]
pub struct RestartQueue {
    heap: BinaryHeap<Queued>,
    next_seq: u64,
}

impl RestartQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: RestartRequest) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Queued { seq, request });
    }

    /// Remove and return the request that should be dispatched next.
    pub fn pop(&mut self) -> Option<RestartRequest> {
        self.heap.pop().map(|queued| queued.request)
    }

    /// Priority of the next request, without removing it.
    pub fn peek_priority(&self) -> Option<Priority> {
        self.heap.peek().map(|queued| queued.request.priority)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Empty the queue, returning requests in dispatch order.
    pub fn drain_ordered(&mut self) -> Vec<RestartRequest> {
        let mut drained = Vec::with_capacity(self.heap.len());
        while let Some(request) = self.pop() {
            drained.push(request);
        }
        drained
    }
}
