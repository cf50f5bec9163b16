#![allow(dead_code)]

use async_trait::async_trait;
use osm_conduit::errors::{PipelineError, PipelineResult};
use osm_conduit::ordering::OrderingRegistry;
use osm_conduit::pipeline::{Task, TaskContext, TaskFactory, TaskIo, TaskPorts, TaskRegistry};
use osm_conduit::sort::{MemorySpillMedium, SpillMedium};
use osm_conduit::sort::spill::{RunReader, RunWriter};
use osm_conduit::tasks::{CollectedRecords, CollectingSinkFactory, MemorySourceFactory, SortTaskFactory};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub fn ascending_orderings() -> OrderingRegistry<i64> {
    let mut orderings: OrderingRegistry<i64> = OrderingRegistry::new();
    orderings
        .register("ascending", |a: &i64, b: &i64| a.cmp(b), true)
        .unwrap();
    orderings
        .register("descending", |a: &i64, b: &i64| b.cmp(a), false)
        .unwrap();
    orderings
}

/// Registry with `source`, `sort` and `collect` task types over `i64`.
pub fn integer_registry(
    records: Vec<i64>,
    medium: Arc<dyn SpillMedium>,
) -> (TaskRegistry, CollectedRecords<i64>) {
    let mut registry = TaskRegistry::new();
    let sink = CollectingSinkFactory::<i64>::new();
    let collected = sink.collected();

    registry
        .register("source", Arc::new(MemorySourceFactory::new(records)))
        .unwrap();
    registry
        .register(
            "sort",
            Arc::new(SortTaskFactory::new(ascending_orderings(), 100, medium)),
        )
        .unwrap();
    registry.register("collect", Arc::new(sink)).unwrap();
    (registry, collected)
}

pub fn memory_medium() -> Arc<MemorySpillMedium> {
    Arc::new(MemorySpillMedium::new())
}

/// Spill medium counting the runs created through it.
pub struct CountingMedium {
    inner: Arc<dyn SpillMedium>,
    writes: AtomicUsize,
}

impl CountingMedium {
    pub fn new(inner: Arc<dyn SpillMedium>) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpillMedium for CountingMedium {
    async fn create_run(&self, run_id: &str) -> PipelineResult<Box<dyn RunWriter>> {
        let writer = self.inner.create_run(run_id).await?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(writer)
    }

    async fn read_run(&self, run_id: &str) -> PipelineResult<RunReader> {
        self.inner.read_run(run_id).await
    }

    async fn dispose_run(&self, run_id: &str) -> PipelineResult<()> {
        self.inner.dispose_run(run_id).await
    }
}

/// Source emitting some records and then failing.
///
/// With a gate set, the source waits until the medium has created that many
/// runs before it fails, so downstream sorts are known to have spilled.
pub struct FailingSourceFactory {
    pub records: Vec<i64>,
    pub gate: Option<(Arc<CountingMedium>, usize)>,
}

impl TaskFactory for FailingSourceFactory {
    fn create_task(&self, _context: TaskContext) -> PipelineResult<Box<dyn Task>> {
        Ok(Box::new(FailingSource {
            records: self.records.clone(),
            gate: self.gate.clone(),
        }))
    }
}

struct FailingSource {
    records: Vec<i64>,
    gate: Option<(Arc<CountingMedium>, usize)>,
}

#[async_trait]
impl Task for FailingSource {
    fn ports(&self) -> TaskPorts {
        TaskPorts::new().output::<i64>()
    }

    async fn run(self: Box<Self>, mut io: TaskIo) -> PipelineResult<()> {
        let output = io.output::<i64>(0)?;
        for record in self.records {
            output.send(record).await?;
        }
        if let Some((medium, runs)) = &self.gate {
            while medium.writes() < *runs {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
        Err(PipelineError::Io(std::io::Error::other("source dataset truncated")))
    }
}

/// Source emitting its records only after a delay.
pub struct DelayedSourceFactory {
    pub records: Vec<i64>,
    pub delay: Duration,
}

impl TaskFactory for DelayedSourceFactory {
    fn create_task(&self, _context: TaskContext) -> PipelineResult<Box<dyn Task>> {
        Ok(Box::new(DelayedSource {
            records: self.records.clone(),
            delay: self.delay,
        }))
    }
}

struct DelayedSource {
    records: Vec<i64>,
    delay: Duration,
}

#[async_trait]
impl Task for DelayedSource {
    fn ports(&self) -> TaskPorts {
        TaskPorts::new().output::<i64>()
    }

    async fn run(self: Box<Self>, mut io: TaskIo) -> PipelineResult<()> {
        let output = io.output::<i64>(0)?;
        tokio::select! {
            _ = io.cancellation_token().cancelled() => return Err(PipelineError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }
        for record in self.records {
            output.send(record).await?;
        }
        output.close().await
    }
}
