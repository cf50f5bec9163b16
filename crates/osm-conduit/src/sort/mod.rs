//! Generic external sort.
//!
//! A [`SortStage`] buffers records in a [`RunBuffer`], spills every full
//! buffer as a sorted run through a [`SpillStore`], and produces the final
//! order with a stable [`MergeEngine`] over the spilled runs and the
//! in-memory tail.

pub mod merge;
pub mod run_buffer;
pub mod spill;
pub mod stage;

pub use merge::{MergeEngine, RunCursor};
pub use run_buffer::RunBuffer;
pub use spill::{FileSpillMedium, MemorySpillMedium, RunWriter, SpillMedium, SpillStore, SpilledRunReader};
pub use stage::{SortStage, SortState};
