//! Bounded buffer of recent position samples.

use std::collections::VecDeque;

use super::PositionSample;

/// Fixed-capacity ring of the most recent samples, oldest first.
#[derive(Debug, Clone)]
pub struct PositionHistory {
    samples: VecDeque<PositionSample>,
    capacity: usize,
}

impl PositionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: PositionSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&PositionSample> {
        self.samples.back()
    }

    /// The last `n` samples, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &PositionSample> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples.iter().skip(skip)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
