//! In-memory sources and sinks for driving pipelines from library code.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::errors::PipelineResult;
use crate::pipeline::registry::{TaskContext, TaskFactory};
use crate::pipeline::task::{Task, TaskIo, TaskPorts};
use crate::record::Record;

/// Builds sources emitting a fixed list of records, then end-of-stream.
pub struct MemorySourceFactory<T> {
    records: Vec<T>,
}

impl<T: Record + Clone> MemorySourceFactory<T> {
    pub fn new(records: impl IntoIterator<Item = T>) -> Self {
        Self {
            records: records.into_iter().collect(),
        }
    }
}

impl<T: Record + Clone + Sync> TaskFactory for MemorySourceFactory<T> {
    fn create_task(&self, _context: TaskContext) -> PipelineResult<Box<dyn Task>> {
        Ok(Box::new(MemorySource {
            records: self.records.clone(),
        }))
    }
}

struct MemorySource<T> {
    records: Vec<T>,
}

#[async_trait]
impl<T: Record> Task for MemorySource<T> {
    fn ports(&self) -> TaskPorts {
        TaskPorts::new().output::<T>()
    }

    async fn run(self: Box<Self>, mut io: TaskIo) -> PipelineResult<()> {
        let output = io.output::<T>(0)?;
        for record in self.records {
            output.send(record).await?;
        }
        output.close().await
    }
}

#[derive(Debug)]
struct Collected<T> {
    records: Vec<T>,
    failure: Option<String>,
    completed: bool,
}

/// Shared view of what a collecting sink received.
#[derive(Debug)]
pub struct CollectedRecords<T> {
    inner: Arc<Mutex<Collected<T>>>,
}

impl<T> Clone for CollectedRecords<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone> CollectedRecords<T> {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Collected {
                records: Vec::new(),
                failure: None,
                completed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Collected<T>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records received so far, in arrival order.
    pub fn records(&self) -> Vec<T> {
        self.lock().records.clone()
    }

    /// The error that stopped the sink, if any.
    pub fn failure(&self) -> Option<String> {
        self.lock().failure.clone()
    }

    /// Whether the sink saw end-of-stream.
    pub fn completed(&self) -> bool {
        self.lock().completed
    }
}

/// Builds sinks that store every record they receive.
///
/// All sinks built by one factory share the factory's
/// [`CollectedRecords`] handle.
pub struct CollectingSinkFactory<T> {
    collected: CollectedRecords<T>,
}

impl<T: Record + Clone> CollectingSinkFactory<T> {
    pub fn new() -> Self {
        Self {
            collected: CollectedRecords::new(),
        }
    }

    pub fn collected(&self) -> CollectedRecords<T> {
        self.collected.clone()
    }
}

impl<T: Record + Clone> Default for CollectingSinkFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record + Clone> TaskFactory for CollectingSinkFactory<T> {
    fn create_task(&self, _context: TaskContext) -> PipelineResult<Box<dyn Task>> {
        Ok(Box::new(CollectingSink {
            collected: self.collected.clone(),
        }))
    }
}

struct CollectingSink<T> {
    collected: CollectedRecords<T>,
}

#[async_trait]
impl<T: Record + Clone> Task for CollectingSink<T> {
    fn ports(&self) -> TaskPorts {
        TaskPorts::new().input::<T>()
    }

    async fn run(self: Box<Self>, mut io: TaskIo) -> PipelineResult<()> {
        let mut input = io.input::<T>(0)?;
        loop {
            match input.recv().await {
                Ok(Some(record)) => self.collected.lock().records.push(record),
                Ok(None) => {
                    let mut collected = self.collected.lock();
                    collected.completed = true;
                    debug!("Collected {} records", collected.records.len());
                    return Ok(());
                }
                Err(e) => {
                    warn!("Collecting sink {} stopped: {}", io.task_id(), e);
                    self.collected.lock().failure = Some(e.to_string());
                    return Err(e);
                }
            }
        }
    }
}
