//! The in-memory accumulation buffer of a sort stage.

use crate::ordering::RecordOrdering;

/// Collects records until a record-count threshold is reached.
#[derive(Debug)]
pub struct RunBuffer<T> {
    records: Vec<T>,
    capacity: usize,
}

impl<T> RunBuffer<T> {
    /// Creates a buffer holding at most `capacity` records. A capacity of
    /// zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Adds a record and reports whether the buffer is now full.
    pub fn push(&mut self, record: T) -> bool {
        self.records.push(record);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stably sorts the buffered records, returning them as a run and leaving
    /// the buffer empty.
    pub fn take_sorted(&mut self, ordering: &dyn RecordOrdering<T>) -> Vec<T> {
        let mut run = std::mem::take(&mut self.records);
        run.sort_by(|a, b| ordering.compare(a, b));
        run
    }
}
