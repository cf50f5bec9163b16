//! The sort stage state machine.
//!
//! ```text
//! Accumulating --(first pull | finish)--> Merging --(merge exhausted)--> Done
//! ```
//!
//! While accumulating, records go to the run buffer; every full buffer is
//! sorted and spilled. Finishing freezes the remainder as the in-memory tail
//! run and starts a merge over the spilled runs followed by the tail. The
//! final merge reads at most `max_fan_in` runs at once; when more were
//! spilled, neighbouring runs are merged into larger ones first.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::defaults::DEFAULT_MAX_MERGE_FAN_IN;
use crate::errors::{PipelineError, PipelineResult};
use crate::ordering::SharedOrdering;
use crate::record::Record;
use crate::sort::merge::{MergeEngine, RunCursor};
use crate::sort::run_buffer::RunBuffer;
use crate::sort::spill::{SpillMedium, SpillStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortState {
    Accumulating,
    Merging,
    Done,
}

/// Imposes an ordering on a stream that may not fit in memory.
pub struct SortStage<T> {
    ordering: SharedOrdering<T>,
    buffer: RunBuffer<T>,
    store: SpillStore<T>,
    merge: Option<MergeEngine<T>>,
    max_fan_in: usize,
    state: SortState,
    appended: u64,
    emitted: u64,
}

impl<T: Record> SortStage<T> {
    /// Creates a stage spilling a run every `buffer_size` records.
    pub fn new(ordering: SharedOrdering<T>, buffer_size: usize, medium: Arc<dyn SpillMedium>) -> Self {
        Self {
            ordering,
            buffer: RunBuffer::new(buffer_size),
            store: SpillStore::new(medium),
            merge: None,
            max_fan_in: DEFAULT_MAX_MERGE_FAN_IN,
            state: SortState::Accumulating,
            appended: 0,
            emitted: 0,
        }
    }

    /// Limits how many runs a single merge reads at once. Values below two
    /// are raised to two.
    #[must_use]
    pub fn with_max_fan_in(mut self, max_fan_in: usize) -> Self {
        self.max_fan_in = max_fan_in.max(2);
        self
    }

    pub fn state(&self) -> SortState {
        self.state
    }

    /// Runs spilled from the record buffer.
    pub fn spilled_runs(&self) -> usize {
        self.store.flushed_runs()
    }

    /// Intermediate runs written to keep the final merge within its fan-in.
    pub fn merged_runs(&self) -> usize {
        self.store.merged_runs()
    }

    /// Adds a record to the stage.
    ///
    /// # Errors
    /// Returns [`PipelineError::ContractViolation`] once the stage stopped
    /// accumulating, and spill errors if flushing a full buffer fails.
    pub async fn append(&mut self, record: T) -> PipelineResult<()> {
        if self.state != SortState::Accumulating {
            return Err(PipelineError::contract_violation(format!(
                "record appended to a sort stage in state {:?}",
                self.state
            )));
        }

        self.appended += 1;
        if self.buffer.push(record) {
            let run = self.buffer.take_sorted(self.ordering.as_ref());
            self.store.spill(run).await?;
        }
        Ok(())
    }

    /// Ends the input. Calling it again has no effect.
    pub async fn finish(&mut self) -> PipelineResult<()> {
        if self.state != SortState::Accumulating {
            return Ok(());
        }

        let tail = self.buffer.take_sorted(self.ordering.as_ref());
        let spill_limit = if tail.is_empty() {
            self.max_fan_in
        } else {
            self.max_fan_in - 1
        };
        if self.store.run_count() > spill_limit {
            info!(
                "Merging {} spilled runs down to {} before the final merge",
                self.store.run_count(),
                spill_limit
            );
            self.store
                .reduce_runs(&self.ordering, self.max_fan_in, spill_limit)
                .await?;
        }

        let mut runs: Vec<Box<dyn RunCursor<T>>> = Vec::with_capacity(self.store.run_count() + 1);
        for reader in self.store.open_runs().await? {
            runs.push(Box::new(reader));
        }
        debug!(
            "Sort input complete: {} records, {} spilled runs, {} in memory",
            self.appended,
            runs.len(),
            tail.len()
        );
        runs.push(Box::new(tail.into_iter()));

        self.merge = Some(MergeEngine::new(self.ordering.clone(), runs));
        self.state = SortState::Merging;
        Ok(())
    }

    /// Returns the next record in sorted order, finishing the input first if
    /// needed.
    pub async fn next(&mut self) -> PipelineResult<Option<T>> {
        match self.state {
            SortState::Accumulating => self.finish().await?,
            SortState::Merging => {}
            SortState::Done => return Ok(None),
        }

        let merge = self
            .merge
            .as_mut()
            .ok_or_else(|| PipelineError::contract_violation("merging sort stage without a merge engine"))?;

        match merge.next().await? {
            Some(record) => {
                self.emitted += 1;
                Ok(Some(record))
            }
            None => {
                self.state = SortState::Done;
                self.merge = None;
                info!(
                    "Sorted {} records using {} spilled runs ({} merged)",
                    self.emitted,
                    self.store.flushed_runs(),
                    self.store.merged_runs()
                );
                Ok(None)
            }
        }
    }

    /// Releases every spilled run. Safe to call in any state, any number of
    /// times.
    pub async fn dispose(&mut self) {
        self.merge = None;
        self.store.dispose().await;
    }
}
