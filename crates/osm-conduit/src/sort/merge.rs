//! K-way merge over sorted runs.
//!
//! Each run contributes its head record to a binary min-heap keyed by the
//! active ordering. Records comparing equal leave the heap in run order, so
//! the merge is stable when runs are numbered in the order their records
//! arrived.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::errors::PipelineResult;
use crate::ordering::SharedOrdering;
use crate::pipeline::pipe::PipeReceiver;
use crate::record::Record;
use crate::sort::spill::SpilledRunReader;

/// A forward-only source of sorted records.
#[async_trait]
pub trait RunCursor<T>: Send {
    async fn next_record(&mut self) -> PipelineResult<Option<T>>;
}

#[async_trait]
impl<T: Send> RunCursor<T> for std::vec::IntoIter<T> {
    async fn next_record(&mut self) -> PipelineResult<Option<T>> {
        Ok(self.next())
    }
}

#[async_trait]
impl<T: Record> RunCursor<T> for SpilledRunReader<T> {
    async fn next_record(&mut self) -> PipelineResult<Option<T>> {
        SpilledRunReader::next_record(self).await
    }
}

#[async_trait]
impl<T: Send + 'static> RunCursor<T> for PipeReceiver<T> {
    async fn next_record(&mut self) -> PipelineResult<Option<T>> {
        self.recv().await
    }
}

struct HeapEntry<T> {
    record: T,
    run: usize,
    ordering: SharedOrdering<T>,
}

impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap yields the smallest record, earliest run first
        self.ordering
            .compare(&other.record, &self.record)
            .then_with(|| other.run.cmp(&self.run))
    }
}

impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for HeapEntry<T> {}

/// Lazily merges sorted runs into one sorted sequence.
///
/// The engine is not restartable: once [`next`](Self::next) returns
/// `Ok(None)` it keeps doing so.
pub struct MergeEngine<T> {
    ordering: SharedOrdering<T>,
    runs: Vec<Box<dyn RunCursor<T>>>,
    heap: BinaryHeap<HeapEntry<T>>,
    primed: bool,
    pending: Option<usize>,
    exhausted: bool,
}

impl<T: Send + 'static> MergeEngine<T> {
    /// Creates an engine over `runs`. A run's position is its tie-break rank.
    pub fn new(ordering: SharedOrdering<T>, runs: Vec<Box<dyn RunCursor<T>>>) -> Self {
        let heap = BinaryHeap::with_capacity(runs.len());
        Self {
            ordering,
            runs,
            heap,
            primed: false,
            pending: None,
            exhausted: false,
        }
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Returns the next record in merged order.
    pub async fn next(&mut self) -> PipelineResult<Option<T>> {
        if self.exhausted {
            return Ok(None);
        }

        if !self.primed {
            for run in 0..self.runs.len() {
                self.advance(run).await?;
            }
            self.primed = true;
        }

        if let Some(run) = self.pending.take() {
            self.advance(run).await?;
        }

        match self.heap.pop() {
            Some(entry) => {
                self.pending = Some(entry.run);
                Ok(Some(entry.record))
            }
            None => {
                self.exhausted = true;
                self.runs.clear();
                Ok(None)
            }
        }
    }

    async fn advance(&mut self, run: usize) -> PipelineResult<()> {
        if let Some(record) = self.runs[run].next_record().await? {
            self.heap.push(HeapEntry {
                record,
                run,
                ordering: self.ordering.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Send + 'static> RunCursor<T> for MergeEngine<T> {
    async fn next_record(&mut self) -> PipelineResult<Option<T>> {
        self.next().await
    }
}
