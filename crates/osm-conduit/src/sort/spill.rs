//! Spill storage for sorted runs.
//!
//! Runs are written as newline-delimited JSON, one record per line, to a
//! [`SpillMedium`]. The medium only moves bytes; [`SpillStore`] owns encoding
//! and the lifetime of every run it wrote. Records are encoded and handed to
//! the medium in bounded chunks, so spilling never holds a second copy of a
//! whole run.

use async_trait::async_trait;
use spill_file_manager::SpillDirectory;
use std::collections::HashMap;
use std::io::Cursor;
use std::marker::PhantomData;
use std::ops::Range;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{PipelineError, PipelineResult};
use crate::ordering::SharedOrdering;
use crate::record::Record;
use crate::sort::merge::{MergeEngine, RunCursor};

/// Encoded bytes collected before they are passed to a [`RunWriter`].
const WRITE_CHUNK_BYTES: usize = 64 * 1024;

/// Sequential reader over one spilled run.
pub type RunReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Sequential writer filling one spilled run.
#[async_trait]
pub trait RunWriter: Send {
    async fn write(&mut self, bytes: &[u8]) -> PipelineResult<()>;

    /// Completes the run. It can be read once this returns.
    async fn finish(self: Box<Self>) -> PipelineResult<()>;
}

/// Byte storage for spilled runs.
#[async_trait]
pub trait SpillMedium: Send + Sync {
    /// Starts a new run under `run_id`.
    async fn create_run(&self, run_id: &str) -> PipelineResult<Box<dyn RunWriter>>;

    /// Opens a finished run for sequential reading.
    async fn read_run(&self, run_id: &str) -> PipelineResult<RunReader>;

    /// Releases a run, finished or not.
    async fn dispose_run(&self, run_id: &str) -> PipelineResult<()>;
}

/// Spill medium backed by a sandboxed spill directory.
#[derive(Clone, Debug)]
pub struct FileSpillMedium {
    directory: SpillDirectory,
}

impl FileSpillMedium {
    pub fn new(directory: SpillDirectory) -> Self {
        Self { directory }
    }

    pub fn directory(&self) -> &SpillDirectory {
        &self.directory
    }
}

struct FileRunWriter {
    directory: SpillDirectory,
    run_id: String,
    file: File,
    written: u64,
}

#[async_trait]
impl RunWriter for FileRunWriter {
    async fn write(&mut self, bytes: &[u8]) -> PipelineResult<()> {
        self.file.write_all(bytes).await?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> PipelineResult<()> {
        self.file.flush().await?;
        self.directory.record_size(&self.run_id, self.written).await?;
        Ok(())
    }
}

#[async_trait]
impl SpillMedium for FileSpillMedium {
    async fn create_run(&self, run_id: &str) -> PipelineResult<Box<dyn RunWriter>> {
        let file = self.directory.create(run_id).await?;
        Ok(Box::new(FileRunWriter {
            directory: self.directory.clone(),
            run_id: run_id.to_string(),
            file,
            written: 0,
        }))
    }

    async fn read_run(&self, run_id: &str) -> PipelineResult<RunReader> {
        let file = self.directory.open(run_id).await?;
        Ok(Box::new(BufReader::new(file)))
    }

    async fn dispose_run(&self, run_id: &str) -> PipelineResult<()> {
        self.directory.remove_file(run_id).await?;
        Ok(())
    }
}

type MemoryRuns = Arc<Mutex<HashMap<String, Vec<u8>>>>;

fn lock_runs(runs: &Mutex<HashMap<String, Vec<u8>>>) -> PipelineResult<MutexGuard<'_, HashMap<String, Vec<u8>>>> {
    runs.lock()
        .map_err(|_| PipelineError::contract_violation("memory spill medium lock poisoned"))
}

/// Spill medium keeping runs in process memory.
#[derive(Debug, Default)]
pub struct MemorySpillMedium {
    runs: MemoryRuns,
}

impl MemorySpillMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs currently stored, finished or not.
    pub fn run_count(&self) -> usize {
        self.runs.lock().map(|runs| runs.len()).unwrap_or(0)
    }
}

struct MemoryRunWriter {
    runs: MemoryRuns,
    run_id: String,
    bytes: Vec<u8>,
}

#[async_trait]
impl RunWriter for MemoryRunWriter {
    async fn write(&mut self, bytes: &[u8]) -> PipelineResult<()> {
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> PipelineResult<()> {
        let MemoryRunWriter { runs, run_id, bytes } = *self;
        lock_runs(&runs)?.insert(run_id, bytes);
        Ok(())
    }
}

#[async_trait]
impl SpillMedium for MemorySpillMedium {
    async fn create_run(&self, run_id: &str) -> PipelineResult<Box<dyn RunWriter>> {
        let mut runs = lock_runs(&self.runs)?;
        if runs.contains_key(run_id) {
            return Err(PipelineError::contract_violation(format!(
                "spill run {run_id} written twice"
            )));
        }
        runs.insert(run_id.to_string(), Vec::new());
        Ok(Box::new(MemoryRunWriter {
            runs: self.runs.clone(),
            run_id: run_id.to_string(),
            bytes: Vec::new(),
        }))
    }

    async fn read_run(&self, run_id: &str) -> PipelineResult<RunReader> {
        let bytes = lock_runs(&self.runs)?
            .get(run_id)
            .cloned()
            .ok_or_else(|| PipelineError::contract_violation(format!("unknown spill run {run_id}")))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn dispose_run(&self, run_id: &str) -> PipelineResult<()> {
        lock_runs(&self.runs)?.remove(run_id);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct SpilledRun {
    run_id: String,
    records: usize,
}

/// The spilled runs of one sort stage, in flush order.
pub struct SpillStore<T> {
    medium: Arc<dyn SpillMedium>,
    store_id: Uuid,
    runs: Vec<SpilledRun>,
    next_run: usize,
    flushed_runs: usize,
    merged_runs: usize,
    spilled_records: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> SpillStore<T> {
    pub fn new(medium: Arc<dyn SpillMedium>) -> Self {
        Self {
            medium,
            store_id: Uuid::new_v4(),
            runs: Vec::new(),
            next_run: 0,
            flushed_runs: 0,
            merged_runs: 0,
            spilled_records: 0,
            _marker: PhantomData,
        }
    }

    /// Encodes a sorted run and writes it to the medium.
    pub async fn spill(&mut self, run: Vec<T>) -> PipelineResult<()> {
        if run.is_empty() {
            return Ok(());
        }

        let mut records = run.into_iter();
        let spilled = self.write_run(&mut records).await?;
        debug!("Spilled {} records to run {}", spilled.records, spilled.run_id);

        self.spilled_records += spilled.records as u64;
        self.flushed_runs += 1;
        self.runs.push(spilled);
        Ok(())
    }

    /// Runs currently held by the store.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Runs spilled from the record buffer, not counting merged runs.
    pub fn flushed_runs(&self) -> usize {
        self.flushed_runs
    }

    /// Runs written by [`reduce_runs`](Self::reduce_runs).
    pub fn merged_runs(&self) -> usize {
        self.merged_runs
    }

    pub fn spilled_records(&self) -> u64 {
        self.spilled_records
    }

    /// Merges neighbouring runs, at most `fan_in` at a time, until no more
    /// than `max_runs` remain.
    ///
    /// A merged run takes the place of the runs it consumed, so the store
    /// stays in flush order and ties keep resolving to the earliest record.
    pub async fn reduce_runs(
        &mut self,
        ordering: &SharedOrdering<T>,
        fan_in: usize,
        max_runs: usize,
    ) -> PipelineResult<()> {
        let fan_in = fan_in.max(2);
        let max_runs = max_runs.max(1);
        let mut position = 0;

        while self.runs.len() > max_runs {
            if position + 1 >= self.runs.len() {
                position = 0;
            }
            let excess = self.runs.len() - max_runs;
            let end = (position + fan_in.min(excess + 1)).min(self.runs.len());
            self.merge_range(ordering, position..end).await?;
            position += 1;
        }
        Ok(())
    }

    async fn merge_range(&mut self, ordering: &SharedOrdering<T>, range: Range<usize>) -> PipelineResult<()> {
        let mut cursors: Vec<Box<dyn RunCursor<T>>> = Vec::with_capacity(range.len());
        for run in &self.runs[range.clone()] {
            cursors.push(Box::new(self.open_run(run).await?));
        }

        let mut merge = MergeEngine::new(ordering.clone(), cursors);
        let merged = self.write_run(&mut merge).await?;
        drop(merge);
        debug!(
            "Merged {} runs into {} ({} records)",
            range.len(),
            merged.run_id,
            merged.records
        );

        self.merged_runs += 1;
        let consumed: Vec<SpilledRun> = self.runs.splice(range, [merged]).collect();
        for run in &consumed {
            self.dispose_run(run).await;
        }
        Ok(())
    }

    /// Streams `records` into a new run. A run that cannot be completed is
    /// released before the error is returned.
    async fn write_run(&mut self, records: &mut dyn RunCursor<T>) -> PipelineResult<SpilledRun> {
        let run_id = format!("run_{}_{:04}", self.store_id, self.next_run);
        self.next_run += 1;

        let mut writer = self.medium.create_run(&run_id).await?;
        let written = async {
            let mut chunk = Vec::with_capacity(WRITE_CHUNK_BYTES);
            let mut count = 0;
            while let Some(record) = records.next_record().await? {
                serde_json::to_writer(&mut chunk, &record)?;
                chunk.push(b'\n');
                count += 1;
                if chunk.len() >= WRITE_CHUNK_BYTES {
                    writer.write(&chunk).await?;
                    chunk.clear();
                }
            }
            if !chunk.is_empty() {
                writer.write(&chunk).await?;
            }
            writer.finish().await?;
            Ok::<usize, PipelineError>(count)
        }
        .await;

        match written {
            Ok(records) => Ok(SpilledRun { run_id, records }),
            Err(e) => {
                if let Err(dispose_error) = self.medium.dispose_run(&run_id).await {
                    warn!("Failed to release incomplete spill run {}: {}", run_id, dispose_error);
                }
                Err(e)
            }
        }
    }

    async fn open_run(&self, run: &SpilledRun) -> PipelineResult<SpilledRunReader<T>> {
        let reader = self.medium.read_run(&run.run_id).await?;
        debug!("Opened run {} ({} records)", run.run_id, run.records);
        Ok(SpilledRunReader {
            run_id: run.run_id.clone(),
            lines: reader.lines(),
            _marker: PhantomData,
        })
    }

    /// Opens a reader for every run, in flush order.
    pub async fn open_runs(&self) -> PipelineResult<Vec<SpilledRunReader<T>>> {
        let mut readers = Vec::with_capacity(self.runs.len());
        for run in &self.runs {
            readers.push(self.open_run(run).await?);
        }
        Ok(readers)
    }

    async fn dispose_run(&self, run: &SpilledRun) {
        if let Err(e) = self.medium.dispose_run(&run.run_id).await {
            warn!("Failed to dispose spill run {}: {}", run.run_id, e);
        }
    }

    /// Disposes every run exactly once. Failures are logged and skipped.
    pub async fn dispose(&mut self) {
        for run in std::mem::take(&mut self.runs) {
            self.dispose_run(&run).await;
        }
    }
}

/// Decodes the records of one spilled run in order.
pub struct SpilledRunReader<T> {
    run_id: String,
    lines: Lines<RunReader>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> SpilledRunReader<T> {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn next_record(&mut self) -> PipelineResult<Option<T>> {
        while let Some(line) = self.lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            return Ok(Some(serde_json::from_str(&line)?));
        }
        Ok(None)
    }
}
