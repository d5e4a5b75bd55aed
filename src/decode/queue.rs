use std::{collections::BinaryHeap, iter::FromIterator};

/// Max-priority queue: `pop` yields the greatest item first.
pub(super) struct PriorityQueue<T>(BinaryHeap<T>);

impl<T: Ord> PriorityQueue<T> {
    pub(super) fn new() -> Self {
        Self(BinaryHeap::new())
    }

    pub(super) fn push(&mut self, item: T) {
        self.0.push(item);
    }

    pub(super) fn pop(&mut self) -> Option<T> {
        self.0.pop()
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.0.len()
    }
}

impl<T: Ord> FromIterator<T> for PriorityQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
